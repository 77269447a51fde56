// Main entry point - Logging, configuration and command selection
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::infrastructure::config::load_settings;
use crate::presentation::cli::{CliCommand, USAGE, parse_args};
use crate::presentation::handlers;

/// Logs go to stderr, or to `log_path` while the terminal chart owns the screen.
fn init_tracing(log_path: Option<&str>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;
    let settings = load_settings()?;

    let log_path = match command {
        CliCommand::Monitor => settings.monitor.log_path(),
        _ => None,
    };
    init_tracing(log_path)?;

    match command {
        CliCommand::Monitor => handlers::monitor(&settings).await,
        CliCommand::Command(command) => handlers::dispatch(&settings, command).await,
        CliCommand::Status => handlers::status(&settings).await,
        CliCommand::Help => {
            println!("{}", USAGE);
            Ok(())
        }
    }
}
