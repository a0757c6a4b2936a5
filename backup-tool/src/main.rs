//! Backup Tool - Main entry point

use anyhow::{bail, Context, Result};
use backup_tool::{config::Config, events::TracingSink, utils, Coordinator, Destination, Strategy, StrategyKind};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up a source directory to one or more destinations
    Backup(BackupArgs),
}

#[derive(Args, Debug)]
struct BackupArgs {
    /// Source directory to back up
    #[arg(short, long)]
    source: PathBuf,

    /// Destinations (comma-separated); s3://, azure://, gdrive:// and ftp:// are remote
    #[arg(short, long = "dest", value_delimiter = ',', required = true)]
    dest: Vec<String>,

    /// Backup strategy: copy, compress (alias: archive)
    #[arg(short = 't', long, default_value = "copy")]
    strategy: StrategyKind,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load config {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level, config.log.file.as_deref())?;

    tracing::debug!("Starting backup-tool v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Backup(args) => backup(args, &config).await,
    }
}

async fn backup(args: BackupArgs, config: &Config) -> Result<()> {
    let destinations = args
        .dest
        .iter()
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .map(|raw| Destination::parse(raw).with_context(|| format!("invalid destination '{raw}'")))
        .collect::<Result<Vec<_>>>()?;

    if destinations.is_empty() {
        bail!("--source and --dest are required");
    }

    let strategy = Strategy::from_config(args.strategy, config)?;
    let coordinator = Coordinator::from_config(config, Arc::new(TracingSink));

    match coordinator.run(&args.source, destinations, strategy).await {
        Ok(summaries) => {
            tracing::info!("Backup completed successfully ({} destination(s))", summaries.len());
            Ok(())
        }
        Err(e) => {
            tracing::error!("Backup failed: {}", e);
            Err(e.into())
        }
    }
}
