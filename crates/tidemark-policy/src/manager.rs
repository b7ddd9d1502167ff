//! Policy and compression administration.
//!
//! Every call is a single request against the engine. Policy jobs run inside
//! the engine; this module only defines and removes them.

use std::sync::Arc;

use serde::Serialize;
use tidemark_core::{Command, Engine, Interval, PolicyKind, Row, TableName, Value};

use crate::compression::CompressionSettings;
use crate::error::{PolicyError, PolicyResult};
use crate::options::PolicyOptions;

/// A policy job scheduled by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyJob {
    /// Engine-assigned job id.
    pub job_id: i64,
    /// Job procedure, e.g. `policy_retention`.
    pub proc_name: String,
    /// How often the job runs.
    pub schedule_interval: Option<Interval>,
    /// Job configuration as stored by the engine.
    pub config: serde_json::Value,
}

impl PolicyJob {
    /// Policy kind, when the job is one tidemark manages.
    #[must_use]
    pub fn kind(&self) -> Option<PolicyKind> {
        [PolicyKind::Retention, PolicyKind::Compression]
            .into_iter()
            .find(|kind| kind.proc_name() == self.proc_name)
    }

    fn from_row(row: &Row) -> PolicyResult<Self> {
        let job_id = row
            .get("job_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| PolicyError::unexpected("list_jobs", "job without an id"))?;
        let proc_name = row
            .get("proc_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let schedule_interval = match row.get("schedule_interval") {
            Some(Value::Interval(interval)) => Some(*interval),
            _ => None,
        };
        let config = match row.get("config").and_then(Value::as_str) {
            Some(text) => serde_json::from_str(text).map_err(|e| {
                PolicyError::unexpected("list_jobs", format!("job {job_id} config: {e}"))
            })?,
            None => serde_json::Value::Null,
        };
        Ok(Self {
            job_id,
            proc_name,
            schedule_interval,
            config,
        })
    }
}

/// Issues policy and compression statements against an engine.
#[derive(Clone)]
pub struct PolicyManager {
    engine: Arc<dyn Engine>,
}

impl std::fmt::Debug for PolicyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyManager").finish_non_exhaustive()
    }
}

impl PolicyManager {
    /// Create a manager over `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// Add a retention policy and return its job id.
    pub async fn add_retention_policy(
        &self,
        table: &TableName,
        options: &PolicyOptions,
    ) -> PolicyResult<i64> {
        self.add_policy(PolicyKind::Retention, table, options).await
    }

    /// Add a compression policy and return its job id.
    ///
    /// Compression must already be enabled on the table.
    pub async fn add_compression_policy(
        &self,
        table: &TableName,
        options: &PolicyOptions,
    ) -> PolicyResult<i64> {
        self.add_policy(PolicyKind::Compression, table, options).await
    }

    /// Remove the table's retention policy.
    ///
    /// Returns `true` when a policy was removed, and also when `if_exists`
    /// turned a missing policy into a no-op.
    pub async fn remove_retention_policy(
        &self,
        table: &TableName,
        if_exists: bool,
    ) -> PolicyResult<bool> {
        self.remove_policy(PolicyKind::Retention, table, if_exists)
            .await
    }

    /// Remove the table's compression policy. Same result contract as
    /// [`PolicyManager::remove_retention_policy`].
    pub async fn remove_compression_policy(
        &self,
        table: &TableName,
        if_exists: bool,
    ) -> PolicyResult<bool> {
        self.remove_policy(PolicyKind::Compression, table, if_exists)
            .await
    }

    /// Enable compression with the given storage options.
    ///
    /// Referenced columns are checked against the catalog before anything is
    /// embedded. Returns `false` when the settings tolerate existing
    /// compression and the engine reports chunks as already compressed.
    pub async fn enable_compression(
        &self,
        table: &TableName,
        settings: &CompressionSettings,
    ) -> PolicyResult<bool> {
        let tolerate = settings.tolerates_existing();
        let validated = settings.validate()?;

        let referenced: Vec<&str> = validated
            .segment_by
            .iter()
            .chain(validated.order_by.iter().map(|o| &o.column))
            .map(|c| c.as_str())
            .collect();
        if !referenced.is_empty() {
            let columns = self.table_columns(table).await?;
            // An empty catalog means the table is missing; the engine reports that.
            if !columns.is_empty() {
                if let Some(missing) = referenced
                    .iter()
                    .copied()
                    .find(|c| !columns.iter().any(|n| n == c))
                {
                    return Err(PolicyError::UnknownColumn {
                        table: table.to_string(),
                        column: missing.to_owned(),
                    });
                }
            }
        }

        tracing::info!(
            table = %table,
            segment_by = validated.segment_by.len(),
            order_by = validated.order_by.len(),
            "enabling compression"
        );
        let command = Command::EnableCompression {
            table: table.clone(),
            segment_by: validated.segment_by,
            order_by: validated.order_by,
            chunk_time_interval: validated.chunk_time_interval,
        };
        match self.engine.run(&command).await {
            Ok(_) => Ok(true),
            Err(e) if tolerate && e.message_contains("already compressed") => {
                tracing::debug!(table = %table, error = %e, "compression already configured");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Compress one chunk. Returns whether the chunk was compressed by this
    /// call; with `if_not_compressed`, an already compressed chunk yields
    /// `false` instead of an error.
    pub async fn compress_chunk(&self, chunk: &TableName, if_not_compressed: bool) -> PolicyResult<bool> {
        tracing::info!(chunk = %chunk, "compressing chunk");
        let value = self
            .engine
            .fetch_scalar(&Command::CompressChunk {
                chunk: chunk.clone(),
                if_not_compressed,
            })
            .await?;
        expect_bool("compress_chunk", &value)
    }

    /// Decompress one chunk. Returns whether the chunk was decompressed by
    /// this call; with `if_compressed`, an uncompressed chunk yields `false`
    /// instead of an error.
    pub async fn decompress_chunk(&self, chunk: &TableName, if_compressed: bool) -> PolicyResult<bool> {
        tracing::info!(chunk = %chunk, "decompressing chunk");
        let value = self
            .engine
            .fetch_scalar(&Command::DecompressChunk {
                chunk: chunk.clone(),
                if_compressed,
            })
            .await?;
        expect_bool("decompress_chunk", &value)
    }

    /// Rows of `hypertable_compression_stats` for the table.
    pub async fn get_compression_stats(&self, table: &TableName) -> PolicyResult<Vec<Row>> {
        Ok(self
            .engine
            .run(&Command::CompressionStats {
                table: table.clone(),
            })
            .await?)
    }

    /// Policy jobs the engine has scheduled for the table, by job id.
    pub async fn list_jobs(&self, table: &TableName) -> PolicyResult<Vec<PolicyJob>> {
        self.engine
            .run(&Command::ListJobs {
                table: table.clone(),
            })
            .await?
            .iter()
            .map(PolicyJob::from_row)
            .collect()
    }

    async fn add_policy(
        &self,
        kind: PolicyKind,
        table: &TableName,
        options: &PolicyOptions,
    ) -> PolicyResult<i64> {
        let call = options.to_call(kind, table)?;
        tracing::info!(
            table = %table,
            policy = %kind,
            if_not_exists = call.if_not_exists,
            "adding policy"
        );
        let value = self.engine.fetch_scalar(&Command::AddPolicy(call)).await?;
        let job_id = value.as_i64().ok_or_else(|| {
            PolicyError::unexpected(kind.add_function(), format!("job id was {}", value.type_name()))
        })?;
        tracing::debug!(table = %table, policy = %kind, job_id, "policy scheduled");
        Ok(job_id)
    }

    async fn remove_policy(
        &self,
        kind: PolicyKind,
        table: &TableName,
        if_exists: bool,
    ) -> PolicyResult<bool> {
        tracing::info!(table = %table, policy = %kind, if_exists, "removing policy");
        let value = self
            .engine
            .fetch_scalar(&Command::RemovePolicy {
                kind,
                table: table.clone(),
                if_exists,
            })
            .await?;
        match value {
            // The engine functions return void on success, including the
            // idempotent no-op under `if_exists`.
            Value::Null => Ok(true),
            Value::Bool(removed) => Ok(removed || if_exists),
            other => Err(PolicyError::unexpected(
                kind.remove_function(),
                format!("returned {}", other.type_name()),
            )),
        }
    }

    async fn table_columns(&self, table: &TableName) -> PolicyResult<Vec<String>> {
        let rows = self
            .engine
            .run(&Command::TableColumns {
                table: table.clone(),
            })
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("column_name").and_then(Value::as_str))
            .map(str::to_owned)
            .collect())
    }
}

fn expect_bool(operation: &'static str, value: &Value) -> PolicyResult<bool> {
    value.as_bool().ok_or_else(|| {
        PolicyError::unexpected(operation, format!("returned {}", value.type_name()))
    })
}
