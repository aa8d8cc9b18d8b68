//! Optimist CLI
//!
//! Command-line interface for optimist - optimistic widget updates synced to
//! a local SQLite database in the background.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "optimist")]
#[command(about = "Optimist - optimistic updates with background sync and rollback")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log sync activity to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use a specific config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the widget database
    Init {
        /// Number of demo widgets to add
        #[arg(long, default_value_t = 0)]
        seed: usize,
    },
    /// List all widgets with their sync status
    #[command(alias = "ls")]
    List,
    /// Activate widgets
    Activate {
        #[command(flatten)]
        target: Target,
    },
    /// Deactivate widgets
    Deactivate {
        #[command(flatten)]
        target: Target,
    },
    /// Create a widget
    #[command(alias = "add")]
    Create {
        /// Widget description
        #[arg(required_unless_present = "random")]
        description: Option<String>,
        /// Use a random description
        #[arg(long, conflicts_with = "description")]
        random: bool,
        /// Create the widget already active
        #[arg(long)]
        active: bool,
        /// Re-issue the creation once if it fails
        #[arg(long)]
        retry_failed: bool,
    },
    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

/// Which widgets a toggle applies to
#[derive(clap::Args)]
struct Target {
    /// Widget ids
    #[arg(required_unless_present = "all")]
    ids: Vec<i64>,
    /// Every stored widget
    #[arg(long, conflicts_with = "ids")]
    all: bool,
    /// Re-issue the change once if it fails
    #[arg(long)]
    retry_failed: bool,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Print the config file path
    Path,
    /// Write the effective configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();
    let load_config = || commands::load_config(config_path);

    match cli.command {
        // Config commands don't need the database
        Commands::Config { command } => handle_config_command(command, config_path, &output),
        Commands::Init { seed } => commands::init::run(&load_config()?, seed, &output).await,
        Commands::List => commands::widget::list(&load_config()?, &output).await,
        Commands::Activate { target } => {
            set_active(&load_config()?, target, true, &output).await
        }
        Commands::Deactivate { target } => {
            set_active(&load_config()?, target, false, &output).await
        }
        Commands::Create {
            description,
            random,
            active,
            retry_failed,
        } => {
            let config = load_config()?;
            commands::widget::create(&config, description, random, active, retry_failed, &output)
                .await
        }
    }
}

async fn set_active(
    config: &optimist_core::Config,
    target: Target,
    active: bool,
    output: &Output,
) -> Result<()> {
    commands::widget::set_active(
        config,
        target.ids,
        target.all,
        active,
        target.retry_failed,
        output,
    )
    .await
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Path) => commands::config::path(config_path, output),
        Some(ConfigCommands::Init { force }) => commands::config::init(config_path, force, output),
    }
}

/// Log to stderr so stdout stays clean for --json and --quiet
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("optimist_core={},optimist_cli={}", level, level))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
