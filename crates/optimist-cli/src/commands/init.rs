//! Init command handler

use anyhow::{Context, Result};

use optimist_core::Config;

use super::open_remote;
use crate::output::{Output, OutputFormat};

/// Create the widget database and optionally add demo widgets
pub async fn run(config: &Config, seed: usize, output: &Output) -> Result<()> {
    let remote = open_remote(config)?;
    let count = remote
        .seed_widgets(seed)
        .await
        .context("Failed to seed widgets")?;

    let path = config.database_path();
    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "database": path,
                    "seeded": seed,
                    "widgets": count
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", path.display());
        }
        OutputFormat::Human => {
            output.success(&format!("Database ready: {}", path.display()));
            if seed > 0 {
                println!("Added {} widget(s), {} in total.", seed, count);
            } else {
                println!("{} widget(s) stored.", count);
            }
        }
    }

    Ok(())
}
