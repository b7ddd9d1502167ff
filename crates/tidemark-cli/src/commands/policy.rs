//! CLI commands for retention policies and job listing.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde_json::json;
use tidemark_core::{Engine, TableName};
use tidemark_policy::{PolicyManager, PolicyOptions};

use super::print_json;

/// Arguments shared by `retention add` and `compression add`.
///
/// Exactly one of `--after` and `--created-before` is accepted by the
/// engine; giving both is rejected before any statement is sent.
#[derive(Args, Debug)]
pub struct PolicyArgs {
    /// Hypertable, optionally schema-qualified
    pub table: TableName,

    /// Act on chunks whose data is older than this, e.g. "30 days"
    #[arg(long)]
    pub after: Option<String>,

    /// Act on chunks created longer ago than this
    #[arg(long)]
    pub created_before: Option<String>,

    /// How often the policy job runs
    #[arg(long)]
    pub schedule_interval: Option<String>,

    /// First run time (RFC 3339)
    #[arg(long)]
    pub initial_start: Option<DateTime<Utc>>,

    /// Timezone used to schedule the job
    #[arg(long)]
    pub timezone: Option<String>,

    /// Return the existing job instead of failing
    #[arg(long)]
    pub if_not_exists: bool,
}

impl PolicyArgs {
    pub fn options(&self) -> PolicyOptions {
        let mut options = PolicyOptions::new().if_not_exists(self.if_not_exists);
        if let Some(after) = &self.after {
            options = options.after(after);
        }
        if let Some(before) = &self.created_before {
            options = options.created_before(before);
        }
        if let Some(schedule) = &self.schedule_interval {
            options = options.schedule_interval(schedule);
        }
        if let Some(start) = self.initial_start {
            options = options.initial_start(start);
        }
        if let Some(tz) = &self.timezone {
            options = options.timezone(tz);
        }
        options
    }
}

#[derive(Subcommand, Debug)]
pub enum RetentionCommand {
    /// Add a retention policy
    Add(PolicyArgs),

    /// Remove the retention policy of a hypertable
    Remove {
        /// Hypertable
        table: TableName,

        /// Succeed when no policy exists
        #[arg(long)]
        if_exists: bool,
    },
}

pub async fn run(engine: Arc<dyn Engine>, command: RetentionCommand) -> Result<()> {
    let manager = PolicyManager::new(engine);
    match command {
        RetentionCommand::Add(args) => {
            let job_id = manager
                .add_retention_policy(&args.table, &args.options())
                .await?;
            print_json(&json!({ "table": args.table.to_string(), "job_id": job_id }))
        }
        RetentionCommand::Remove { table, if_exists } => {
            let removed = manager.remove_retention_policy(&table, if_exists).await?;
            print_json(&json!({ "table": table.to_string(), "removed": removed }))
        }
    }
}

pub async fn jobs(engine: Arc<dyn Engine>, table: &TableName) -> Result<()> {
    let jobs = PolicyManager::new(engine).list_jobs(table).await?;
    print_json(&jobs)
}
