//! CLI commands for hypertable conversion and status.

use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use serde_json::json;
use tidemark_core::{Engine, Ident, PartitionSpec, TableName, TidemarkConfig};
use tidemark_migrate::{Migrator, SchemaRegistry};

use super::print_json;

#[derive(Subcommand, Debug)]
pub enum HypertableCommand {
    /// Convert an existing table into a hypertable
    Convert {
        /// Table to convert, optionally schema-qualified
        table: TableName,

        /// Partitioning time column
        #[arg(long, default_value = "time")]
        column: Ident,

        /// Time range covered by each chunk
        #[arg(long, default_value = "7 days")]
        chunk_interval: String,

        /// Move existing rows into chunks
        #[arg(long)]
        migrate_data: bool,

        /// Keep the table's primary key
        #[arg(long)]
        retain_primary_key: bool,
    },

    /// Change the chunk interval of a hypertable
    SetInterval {
        /// Hypertable
        table: TableName,

        /// New chunk interval, e.g. "1 day"
        interval: String,
    },

    /// Show whether a table is a hypertable
    Status {
        /// Table to inspect
        table: TableName,
    },
}

pub async fn run(engine: Arc<dyn Engine>, config: &TidemarkConfig, command: HypertableCommand) -> Result<()> {
    let migrator = Migrator::new(engine, Arc::new(SchemaRegistry::new()))
        .with_config(config.migration.clone());

    match command {
        HypertableCommand::Convert {
            table,
            column,
            chunk_interval,
            migrate_data,
            retain_primary_key,
        } => {
            if config.migration.prepare_extension {
                migrator.prepare_extension().await?;
            }
            let mut spec = PartitionSpec::new(chunk_interval)?;
            if retain_primary_key {
                spec = spec.retaining_primary_key();
            }
            migrator
                .convert_to_hypertable(&table, &column, &spec, migrate_data)
                .await?;
            print_json(&json!({
                "table": table.to_string(),
                "column": column.as_str(),
                "chunk_interval": spec.chunk_interval,
            }))
        }
        HypertableCommand::SetInterval { table, interval } => {
            let interval = tidemark_core::normalize_interval(interval)?;
            migrator.set_chunk_interval(&table, interval).await?;
            print_json(&json!({
                "table": table.to_string(),
                "chunk_interval": interval,
            }))
        }
        HypertableCommand::Status { table } => {
            let hypertable = migrator.is_hypertable(&table).await?;
            print_json(&json!({
                "table": table.to_string(),
                "hypertable": hypertable,
            }))
        }
    }
}
