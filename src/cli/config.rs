// ABOUTME: CLI config command - print the effective configuration

use super::OutputFormat;
use anyhow::{Context, Result};
use statepool::config::StatePoolConfig;

/// Execute the config command
pub fn execute(config: &StatePoolConfig, format: OutputFormat) -> Result<()> {
    println!("{}", render(config, format)?);
    Ok(())
}

fn render(config: &StatePoolConfig, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(config).context("Failed to serialize config as JSON")
        }
        OutputFormat::Text => {
            toml::to_string_pretty(config).context("Failed to serialize config as TOML")
        }
    }
}
