// ABOUTME: CLI argument parsing and command routing for statepool
//
// Provides command-line interface for:
// - Exercising a pool with concurrent traffic (demo)
// - Showing the effective configuration (config)

pub mod config;
pub mod demo;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Reference-counted pool of per-model sessions
#[derive(Parser)]
#[command(name = "statepool")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./.statepool/config.toml, then ~/.statepool/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    pub stderr: bool,
}

/// Output format for commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run concurrent get/put traffic against a pool and print its report
    Demo(DemoArgs),

    /// Print the effective configuration
    Config,
}

/// Arguments for the demo command
#[derive(clap::Args, Clone, Debug)]
pub struct DemoArgs {
    /// Number of distinct models
    #[arg(long, default_value_t = 3)]
    pub models: usize,

    /// Number of concurrent callers
    #[arg(long, default_value_t = 16)]
    pub callers: usize,

    /// How long each caller holds its session, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub hold_ms: u64,

    /// Remove the first model while a reference is still held
    #[arg(long)]
    pub remove_one: bool,
}
