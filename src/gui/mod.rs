pub mod application;
pub mod debounce;
pub mod types;
