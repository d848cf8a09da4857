use std::env;
use clap::Parser;

use crate::gui::application::run_application;
use crate::error::AppRunError;

pub mod config;
pub mod device;
pub mod error;
pub mod gui;

#[derive(Parser, Debug)]
#[command(name = "matrix-remote", version, about = "Remote control for a BLE LED matrix")]
pub struct CliArgs {
    /// Advertised name of the device to connect to, overrides the configured name
    #[arg(long)]
    pub device_name: Option<String>,
}

pub fn init_logging() {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

pub fn run(args: CliArgs) -> Result<(), AppRunError> {
    run_application(args.device_name)?;
    Ok(())
}
