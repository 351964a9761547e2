// ABOUTME: Main entry point for the statepool CLI
//
// Binary: statepool
// Usage: statepool [--config PATH] [--format text|json] [--stderr] <COMMAND>
// - demo: run concurrent traffic through a pool and print its report
// - config: print the effective configuration

#![allow(missing_docs)]

use anyhow::Result;
use clap::Parser;
use statepool::config::{LoggingConfig, StatePoolConfig};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let config = match &args.config {
        Some(path) => StatePoolConfig::load(path)?,
        None => StatePoolConfig::load_default()?,
    };

    setup_logging(&config.logging, args.stderr);
    setup_panic_handler();

    match args.command {
        cli::Commands::Demo(demo_args) => cli::demo::execute(demo_args, &config, args.format).await,
        cli::Commands::Config => cli::config::execute(&config, args.format),
    }
}

fn setup_logging(logging: &LoggingConfig, to_stderr: bool) {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| logging.filter.as_str().into())
    };

    let stderr_logging = || {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter())
            .init();
    };

    if to_stderr {
        stderr_logging();
        return;
    }

    // Create log directory if it doesn't exist
    let log_dir = logging.log_dir();
    let _ = std::fs::create_dir_all(&log_dir);

    // Create JSONL log file with timestamp
    let log_file = log_dir.join(format!(
        "statepool-{}.jsonl",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let file = match OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {}: {e}, logging to stderr", log_file.display());
            stderr_logging();
            return;
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()             // Output in JSON Lines format
                .with_target(true)  // Include target module in JSON
                .with_writer(file)
                .with_ansi(false),
        )
        .with(filter())
        .init();
}

fn setup_panic_handler() {
    use tracing::error;

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {}", panic_info);
        eprintln!("Application panicked: {}", panic_info);
        eprintln!("Please check the logs for more details.");
    }));
}
