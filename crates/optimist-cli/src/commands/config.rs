//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use optimist_core::Config;

use super::load_config;
use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config = load_config(config_path)?;

    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let retry = &config.retry;
            let remote = &config.remote;
            println!("Configuration:");
            println!("  data_dir:         {}", config.data_dir.display());
            println!("  database:         {}", config.database_path().display());
            println!();
            println!("Retry:");
            println!("  initial_delay_ms: {}", retry.initial_delay_ms);
            println!("  max_delay_ms:     {}", retry.max_delay_ms);
            println!("  max_attempts:     {}", retry.max_attempts);
            println!("  removal_grace_ms: {}", retry.removal_grace_ms);
            println!();
            println!("Remote:");
            println!("  latency_ms:       {}", remote.latency_ms);
            println!("  failure_rate:     {}", remote.failure_rate);
            println!();
            println!("Config file: {}", effective_path(config_path).display());
        }
    }

    Ok(())
}

/// Print the config file path in use
pub fn path(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let path = effective_path(config_path);
    if output.is_json() {
        println!(
            "{}",
            serde_json::json!({"path": path, "exists": path.exists()})
        );
    } else {
        println!("{}", path.display());
    }
    Ok(())
}

/// Write the current configuration (defaults plus overrides) to the config file
pub fn init(config_path: Option<&PathBuf>, force: bool, output: &Output) -> Result<()> {
    let path = effective_path(config_path);
    if path.exists() && !force {
        bail!(
            "Config file already exists: {}\nUse --force to overwrite it.",
            path.display()
        );
    }

    let config = load_config(config_path)?;
    config
        .save_to_path(&path)
        .context("Failed to save configuration")?;

    output.success(&format!("Wrote {}", path.display()));
    Ok(())
}

fn effective_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path)
}
