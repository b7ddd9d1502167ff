//! Tidemark CLI - administer TimescaleDB hypertables, policies and compression.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tidemark_core::{PgEngine, TableName, TidemarkConfig};
use tracing_subscriber::EnvFilter;

use commands::compression::CompressionCommand;
use commands::hypertable::HypertableCommand;
use commands::policy::RetentionCommand;

#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(about = "Administer TimescaleDB hypertables, policies and compression")]
#[command(version)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Database URL (overrides the configuration file).
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert tables and manage chunk intervals
    Hypertable {
        #[command(subcommand)]
        command: HypertableCommand,
    },

    /// Manage retention policies
    Retention {
        #[command(subcommand)]
        command: RetentionCommand,
    },

    /// Manage compression settings, policies and chunks
    Compression {
        #[command(subcommand)]
        command: CompressionCommand,
    },

    /// List policy jobs scheduled for a hypertable
    Jobs {
        /// Hypertable, optionally schema-qualified
        table: TableName,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<TidemarkConfig> {
    let mut config = match &cli.config {
        Some(path) => TidemarkConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => TidemarkConfig::load().context("failed to load tidemark.toml")?,
    };
    if let Some(url) = &cli.database_url {
        config.database.url.clone_from(url);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug,sqlx=info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = load_config(&cli)?;
    tracing::debug!(
        max_connections = config.database.max_connections,
        strategy = %config.migration.strategy,
        "configuration loaded"
    );

    let engine = Arc::new(
        PgEngine::connect(&config.database)
            .await
            .context("failed to connect to database")?,
    );

    match cli.command {
        Commands::Hypertable { command } => {
            commands::hypertable::run(engine, &config, command).await
        }
        Commands::Retention { command } => commands::policy::run(engine, command).await,
        Commands::Compression { command } => commands::compression::run(engine, command).await,
        Commands::Jobs { table } => commands::policy::jobs(engine, &table).await,
    }
}
