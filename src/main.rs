//! Parley - FIPA request protocol runtime.
//!
//! Command line entry point.

use clap::Parser;
use std::process::ExitCode;

use parley::{logging, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    // The guard flushes the file log on drop.
    let _guard = match logging::init() {
        Ok((guard, _log_dir)) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let args = Commands::parse();

    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
