pub mod command;
pub mod connection;
pub mod constants;
pub mod types;
pub mod writer;
