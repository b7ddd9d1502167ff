//! CLI commands for compression settings, policies and chunks.

use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use serde_json::json;
use tidemark_core::{Engine, TableName};
use tidemark_policy::{CompressionSettings, PolicyManager};

use super::policy::PolicyArgs;
use super::print_json;

#[derive(Subcommand, Debug)]
pub enum CompressionCommand {
    /// Enable compression on a hypertable
    Enable {
        /// Hypertable
        table: TableName,

        /// Columns to segment compressed data by (comma separated)
        #[arg(long, value_delimiter = ',')]
        segment_by: Vec<String>,

        /// Ordering of compressed data, e.g. "time DESC" (comma separated)
        #[arg(long, value_delimiter = ',')]
        order_by: Vec<String>,

        /// Chunk interval used once chunks are compressed
        #[arg(long)]
        chunk_time_interval: Option<String>,

        /// Report instead of failing when chunks are already compressed
        #[arg(long)]
        if_not_exists: bool,
    },

    /// Add a compression policy
    Add(PolicyArgs),

    /// Remove the compression policy of a hypertable
    Remove {
        /// Hypertable
        table: TableName,

        /// Succeed when no policy exists
        #[arg(long)]
        if_exists: bool,
    },

    /// Show compression statistics
    Stats {
        /// Hypertable
        table: TableName,
    },

    /// Compress one chunk
    Compress {
        /// Chunk, e.g. _timescaledb_internal._hyper_1_1_chunk
        chunk: TableName,

        /// Succeed when the chunk is already compressed
        #[arg(long)]
        if_not_compressed: bool,
    },

    /// Decompress one chunk
    Decompress {
        /// Chunk
        chunk: TableName,

        /// Succeed when the chunk is not compressed
        #[arg(long)]
        if_compressed: bool,
    },
}

pub async fn run(engine: Arc<dyn Engine>, command: CompressionCommand) -> Result<()> {
    let manager = PolicyManager::new(engine);
    match command {
        CompressionCommand::Enable {
            table,
            segment_by,
            order_by,
            chunk_time_interval,
            if_not_exists,
        } => {
            let mut settings = CompressionSettings::new().if_not_exists(if_not_exists);
            for column in segment_by {
                settings = settings.segment_by(column.trim());
            }
            for entry in order_by {
                settings = settings.order_by(entry.trim());
            }
            if let Some(interval) = chunk_time_interval {
                settings = settings.chunk_time_interval(interval);
            }
            let enabled = manager.enable_compression(&table, &settings).await?;
            print_json(&json!({ "table": table.to_string(), "enabled": enabled }))
        }
        CompressionCommand::Add(args) => {
            let job_id = manager
                .add_compression_policy(&args.table, &args.options())
                .await?;
            print_json(&json!({ "table": args.table.to_string(), "job_id": job_id }))
        }
        CompressionCommand::Remove { table, if_exists } => {
            let removed = manager.remove_compression_policy(&table, if_exists).await?;
            print_json(&json!({ "table": table.to_string(), "removed": removed }))
        }
        CompressionCommand::Stats { table } => {
            let stats = manager.get_compression_stats(&table).await?;
            print_json(&stats)
        }
        CompressionCommand::Compress {
            chunk,
            if_not_compressed,
        } => {
            let compressed = manager.compress_chunk(&chunk, if_not_compressed).await?;
            print_json(&json!({ "chunk": chunk.to_string(), "compressed": compressed }))
        }
        CompressionCommand::Decompress {
            chunk,
            if_compressed,
        } => {
            let decompressed = manager.decompress_chunk(&chunk, if_compressed).await?;
            print_json(&json!({ "chunk": chunk.to_string(), "decompressed": decompressed }))
        }
    }
}
