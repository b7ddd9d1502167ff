//! Engine commands.
//!
//! Each administrative call and catalog query is a typed [`Command`] that
//! renders to exactly one parameterized [`Statement`]. Engines may execute
//! the rendered SQL (PostgreSQL) or interpret the typed command directly
//! (the in-memory engine).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ident::{Ident, TableName};
use crate::interval::Interval;
use crate::statement::{quote_literal, Cast, Statement, StatementBuilder};

/// Which background policy a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Drops chunks older than a threshold.
    Retention,
    /// Compresses chunks older than a threshold.
    Compression,
}

impl PolicyKind {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retention => "retention",
            Self::Compression => "compression",
        }
    }

    /// Engine function creating the policy.
    #[must_use]
    pub const fn add_function(self) -> &'static str {
        match self {
            Self::Retention => "add_retention_policy",
            Self::Compression => "add_compression_policy",
        }
    }

    /// Engine function removing the policy.
    #[must_use]
    pub const fn remove_function(self) -> &'static str {
        match self {
            Self::Retention => "remove_retention_policy",
            Self::Compression => "remove_compression_policy",
        }
    }

    /// Job procedure name reported by `timescaledb_information.jobs`.
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Retention => "policy_retention",
            Self::Compression => "policy_compression",
        }
    }

    /// Name of the time-range threshold argument.
    #[must_use]
    pub const fn after_arg(self) -> &'static str {
        match self {
            Self::Retention => "drop_after",
            Self::Compression => "compress_after",
        }
    }

    /// Name of the creation-time threshold argument.
    #[must_use]
    pub const fn created_before_arg(self) -> &'static str {
        match self {
            Self::Retention => "drop_created_before",
            Self::Compression => "compress_created_before",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Age threshold of a policy. The engine accepts exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// Relative to the chunk's time range.
    After(Interval),
    /// Relative to the chunk's creation time.
    CreatedBefore(Interval),
}

/// Arguments of `add_retention_policy` / `add_compression_policy`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyCall {
    /// Policy kind.
    pub kind: PolicyKind,
    /// Target hypertable.
    pub table: TableName,
    /// Age threshold; `None` is passed through for the engine to reject.
    pub threshold: Option<Threshold>,
    /// How often the job runs.
    pub schedule_interval: Option<Interval>,
    /// First run time.
    pub initial_start: Option<DateTime<Utc>>,
    /// Timezone used for scheduling.
    pub timezone: Option<String>,
    /// Return the existing job instead of failing.
    pub if_not_exists: bool,
}

/// One `compress_orderby` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Column name.
    pub column: Ident,
    /// Descending order.
    #[serde(default)]
    pub desc: bool,
    /// Explicit NULLS FIRST / NULLS LAST.
    #[serde(default)]
    pub nulls_first: Option<bool>,
}

impl OrderBy {
    /// Ascending order on `column`.
    #[must_use]
    pub fn asc(column: Ident) -> Self {
        Self {
            column,
            desc: false,
            nulls_first: None,
        }
    }

    /// Descending order on `column`.
    #[must_use]
    pub fn desc(column: Ident) -> Self {
        Self {
            column,
            desc: true,
            nulls_first: None,
        }
    }

    fn render(&self) -> String {
        let mut out = self.column.quoted();
        if self.desc {
            out.push_str(" DESC");
        }
        match self.nulls_first {
            Some(true) => out.push_str(" NULLS FIRST"),
            Some(false) => out.push_str(" NULLS LAST"),
            None => {}
        }
        out
    }
}

/// A request to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `CREATE EXTENSION IF NOT EXISTS timescaledb`
    CreateExtension,
    /// Whether the table is registered as a hypertable.
    HypertableExists {
        /// Table to look up.
        table: TableName,
    },
    /// Name of the table's single-column primary key constraint.
    PrimaryKeyConstraint {
        /// Table to look up.
        table: TableName,
    },
    /// `ALTER TABLE .. DROP CONSTRAINT ..`
    DropConstraint {
        /// Table owning the constraint.
        table: TableName,
        /// Constraint name.
        constraint: Ident,
    },
    /// `create_hypertable(..)`
    CreateHypertable {
        /// Table to convert.
        table: TableName,
        /// Partitioning column.
        column: Ident,
        /// Chunk width.
        chunk_time_interval: Interval,
        /// Move existing rows into chunks.
        migrate_data: bool,
    },
    /// `set_chunk_time_interval(..)`
    SetChunkTimeInterval {
        /// Hypertable.
        table: TableName,
        /// New chunk width.
        interval: Interval,
    },
    /// `add_*_policy(..)`
    AddPolicy(PolicyCall),
    /// `remove_*_policy(..)`
    RemovePolicy {
        /// Policy kind.
        kind: PolicyKind,
        /// Hypertable.
        table: TableName,
        /// Don't fail when no policy exists.
        if_exists: bool,
    },
    /// `ALTER TABLE .. SET (timescaledb.compress ..)`
    EnableCompression {
        /// Hypertable.
        table: TableName,
        /// `compress_segmentby` columns.
        segment_by: Vec<Ident>,
        /// `compress_orderby` entries.
        order_by: Vec<OrderBy>,
        /// `compress_chunk_time_interval`.
        chunk_time_interval: Option<Interval>,
    },
    /// `compress_chunk(..)`
    CompressChunk {
        /// Chunk relation.
        chunk: TableName,
        /// Succeed with a false indicator when already compressed.
        if_not_compressed: bool,
    },
    /// `decompress_chunk(..)`
    DecompressChunk {
        /// Chunk relation.
        chunk: TableName,
        /// Succeed with a false indicator when not compressed.
        if_compressed: bool,
    },
    /// `hypertable_compression_stats(..)`
    CompressionStats {
        /// Hypertable.
        table: TableName,
    },
    /// Columns of a table from `information_schema.columns`.
    TableColumns {
        /// Table to describe.
        table: TableName,
    },
    /// Jobs scheduled for a hypertable from `timescaledb_information.jobs`.
    ListJobs {
        /// Hypertable.
        table: TableName,
    },
    /// An arbitrary rendered query.
    Query(Statement),
}

/// Match catalog rows whose `(schema, name)` columns name the relation
/// `table` resolves to. Unqualified names follow the `search_path`; a table
/// that does not resolve matches nothing.
fn push_relation_predicate(
    b: &mut StatementBuilder,
    schema_column: &str,
    name_column: &str,
    table: &TableName,
) {
    b.push_sql("(")
        .push_sql(schema_column)
        .push_sql("::text, ")
        .push_sql(name_column)
        .push_sql(
            "::text) = (SELECT n.nspname::text, c.relname::text FROM pg_class c \
             JOIN pg_namespace n ON n.oid = c.relnamespace WHERE c.oid = to_regclass(",
        )
        .push_bind_cast(table.quoted(), Cast::Text)
        .push_sql("))");
}

fn push_regclass(b: &mut StatementBuilder, table: &TableName) {
    b.push_bind_cast(table.quoted(), Cast::Regclass);
}

impl Command {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateExtension => "create_extension",
            Self::HypertableExists { .. } => "hypertable_exists",
            Self::PrimaryKeyConstraint { .. } => "primary_key_constraint",
            Self::DropConstraint { .. } => "drop_constraint",
            Self::CreateHypertable { .. } => "create_hypertable",
            Self::SetChunkTimeInterval { .. } => "set_chunk_time_interval",
            Self::AddPolicy(call) => call.kind.add_function(),
            Self::RemovePolicy { kind, .. } => kind.remove_function(),
            Self::EnableCompression { .. } => "enable_compression",
            Self::CompressChunk { .. } => "compress_chunk",
            Self::DecompressChunk { .. } => "decompress_chunk",
            Self::CompressionStats { .. } => "hypertable_compression_stats",
            Self::TableColumns { .. } => "table_columns",
            Self::ListJobs { .. } => "list_jobs",
            Self::Query(_) => "query",
        }
    }

    /// Render the command as a single statement.
    #[must_use]
    pub fn to_statement(&self) -> Statement {
        let mut b = StatementBuilder::new();
        match self {
            Self::CreateExtension => {
                b.push_sql("CREATE EXTENSION IF NOT EXISTS timescaledb");
            }
            Self::HypertableExists { table } => {
                b.push_sql(
                    "SELECT EXISTS (SELECT 1 FROM timescaledb_information.hypertables WHERE ",
                );
                push_relation_predicate(&mut b, "hypertable_schema", "hypertable_name", table);
                b.push_sql(") AS is_hypertable");
            }
            Self::PrimaryKeyConstraint { table } => {
                b.push_sql("SELECT conname::text AS constraint_name FROM pg_constraint WHERE conrelid = ");
                push_regclass(&mut b, table);
                b.push_sql(" AND contype = 'p' AND array_length(conkey, 1) = 1");
            }
            Self::DropConstraint { table, constraint } => {
                b.push_sql("ALTER TABLE ")
                    .push_table(table)
                    .push_sql(" DROP CONSTRAINT ")
                    .push_ident(constraint);
            }
            Self::CreateHypertable {
                table,
                column,
                chunk_time_interval,
                migrate_data,
            } => {
                b.push_sql("SELECT create_hypertable(");
                push_regclass(&mut b, table);
                b.push_sql(", ")
                    .push_bind_cast(column.as_str(), Cast::Name)
                    .push_sql(", chunk_time_interval => ")
                    .push_bind_cast(*chunk_time_interval, Cast::Interval)
                    .push_sql(", migrate_data => ")
                    .push_bind_cast(*migrate_data, Cast::Boolean)
                    .push_sql(")");
            }
            Self::SetChunkTimeInterval { table, interval } => {
                b.push_sql("SELECT set_chunk_time_interval(");
                push_regclass(&mut b, table);
                b.push_sql(", ")
                    .push_bind_cast(*interval, Cast::Interval)
                    .push_sql(")");
            }
            Self::AddPolicy(call) => {
                b.push_sql("SELECT ")
                    .push_sql(call.kind.add_function())
                    .push_sql("(");
                push_regclass(&mut b, &call.table);
                match call.threshold {
                    Some(Threshold::After(after)) => {
                        b.push_sql(", ")
                            .push_sql(call.kind.after_arg())
                            .push_sql(" => ")
                            .push_bind_cast(after, Cast::Interval);
                    }
                    Some(Threshold::CreatedBefore(before)) => {
                        b.push_sql(", ")
                            .push_sql(call.kind.created_before_arg())
                            .push_sql(" => ")
                            .push_bind_cast(before, Cast::Interval);
                    }
                    None => {}
                }
                if let Some(schedule) = call.schedule_interval {
                    b.push_sql(", schedule_interval => ")
                        .push_bind_cast(schedule, Cast::Interval);
                }
                if let Some(start) = call.initial_start {
                    b.push_sql(", initial_start => ")
                        .push_bind_cast(start, Cast::Timestamptz);
                }
                if let Some(tz) = &call.timezone {
                    b.push_sql(", timezone => ")
                        .push_bind_cast(tz.as_str(), Cast::Text);
                }
                b.push_sql(", if_not_exists => ")
                    .push_bind_cast(call.if_not_exists, Cast::Boolean)
                    .push_sql(") AS job_id");
            }
            Self::RemovePolicy {
                kind,
                table,
                if_exists,
            } => {
                b.push_sql("SELECT ")
                    .push_sql(kind.remove_function())
                    .push_sql("(");
                push_regclass(&mut b, table);
                b.push_sql(", if_exists => ")
                    .push_bind_cast(*if_exists, Cast::Boolean)
                    .push_sql(") AS removed");
            }
            Self::EnableCompression {
                table,
                segment_by,
                order_by,
                chunk_time_interval,
            } => {
                // Storage options cannot be bound. Only validated identifiers
                // and canonical interval literals are embedded here.
                let mut options = vec!["timescaledb.compress = true".to_owned()];
                if !segment_by.is_empty() {
                    let cols: Vec<String> = segment_by.iter().map(Ident::quoted).collect();
                    options.push(format!(
                        "timescaledb.compress_segmentby = {}",
                        quote_literal(&cols.join(", "))
                    ));
                }
                if !order_by.is_empty() {
                    let cols: Vec<String> = order_by.iter().map(OrderBy::render).collect();
                    options.push(format!(
                        "timescaledb.compress_orderby = {}",
                        quote_literal(&cols.join(", "))
                    ));
                }
                if let Some(interval) = chunk_time_interval {
                    options.push(format!(
                        "timescaledb.compress_chunk_time_interval = {}",
                        quote_literal(&interval.to_string())
                    ));
                }
                b.push_sql("ALTER TABLE ")
                    .push_table(table)
                    .push_sql(" SET (")
                    .push_sql(&options.join(", "))
                    .push_sql(")");
            }
            Self::CompressChunk {
                chunk,
                if_not_compressed,
            } => {
                b.push_sql("SELECT compress_chunk(");
                push_regclass(&mut b, chunk);
                b.push_sql(", if_not_compressed => ")
                    .push_bind_cast(*if_not_compressed, Cast::Boolean)
                    .push_sql(") IS NOT NULL AS compressed");
            }
            Self::DecompressChunk {
                chunk,
                if_compressed,
            } => {
                b.push_sql("SELECT decompress_chunk(");
                push_regclass(&mut b, chunk);
                b.push_sql(", if_compressed => ")
                    .push_bind_cast(*if_compressed, Cast::Boolean)
                    .push_sql(") IS NOT NULL AS decompressed");
            }
            Self::CompressionStats { table } => {
                b.push_sql("SELECT * FROM hypertable_compression_stats(");
                push_regclass(&mut b, table);
                b.push_sql(")");
            }
            Self::TableColumns { table } => {
                b.push_sql(
                    "SELECT column_name::text AS column_name, data_type::text AS data_type \
                     FROM information_schema.columns WHERE ",
                );
                push_relation_predicate(&mut b, "table_schema", "table_name", table);
                b.push_sql(" ORDER BY ordinal_position");
            }
            Self::ListJobs { table } => {
                b.push_sql(
                    "SELECT job_id::bigint AS job_id, proc_name::text AS proc_name, \
                     schedule_interval, config::text AS config \
                     FROM timescaledb_information.jobs WHERE ",
                );
                push_relation_predicate(&mut b, "hypertable_schema", "hypertable_name", table);
                b.push_sql(" ORDER BY job_id");
            }
            Self::Query(statement) => return statement.clone(),
        }
        b.build()
    }
}
