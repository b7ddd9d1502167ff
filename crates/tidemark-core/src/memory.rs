//! In-memory engine for testing.
//!
//! Interprets typed [`Command`]s against a small simulated catalog. It
//! reproduces the engine behaviour the higher layers depend on (duplicate
//! conversion errors, primary key incompatibility, policy idempotency,
//! compression preconditions) without a database. Arbitrary queries return
//! scripted results.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::command::{Command, PolicyCall, PolicyKind, Threshold};
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::ident::{TableName, MAX_IDENTIFIER_LEN};
use crate::interval::{divide_interval, Interval};
use crate::schema::{DataType, TableSchema};
use crate::statement::Statement;
use crate::value::{Row, Value};

const DEFAULT_SCHEMA: &str = "public";
const CHUNK_SCHEMA: &str = "_timescaledb_internal";
const FIRST_JOB_ID: i64 = 1000;

#[derive(Debug, Clone, Default)]
struct TableState {
    columns: Vec<(String, String)>,
    /// `(constraint name, column)`
    primary_key: Option<(String, String)>,
    rows: u64,
}

#[derive(Debug, Clone, Default)]
struct CompressionState {
    segment_by: Vec<String>,
    order_by: Vec<String>,
    chunk_time_interval: Option<Interval>,
}

#[derive(Debug, Clone)]
struct HypertableState {
    id: i64,
    column: String,
    chunk_interval: Interval,
    compression: Option<CompressionState>,
    chunks: u32,
}

#[derive(Debug, Clone)]
struct Job {
    id: i64,
    kind: PolicyKind,
    table: String,
    threshold: Threshold,
    schedule_interval: Interval,
}

#[derive(Debug, Clone)]
struct Chunk {
    hypertable: String,
    compressed: bool,
}

#[derive(Debug, Default)]
struct Catalog {
    extension_installed: bool,
    deny_extension: bool,
    tables: HashMap<String, TableState>,
    hypertables: HashMap<String, HypertableState>,
    jobs: Vec<Job>,
    next_job_id: i64,
    next_hypertable_id: i64,
    chunks: HashMap<String, Chunk>,
    query_results: VecDeque<Vec<Row>>,
    statements: Vec<Statement>,
}

fn key(table: &TableName) -> String {
    let schema = table.schema().map_or(DEFAULT_SCHEMA, |s| s.as_str());
    format!("{schema}.{}", table.name())
}

fn undefined_table(table: &TableName) -> EngineError {
    EngineError::database("42P01", format!("relation \"{table}\" does not exist"))
}

fn not_hypertable(table: &TableName) -> EngineError {
    EngineError::database("TS101", format!("table \"{table}\" is not a hypertable"))
}

fn sql_type_name(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Timestamptz => "timestamp with time zone",
        DataType::Integer => "integer",
        DataType::BigInt => "bigint",
        DataType::Double => "double precision",
        DataType::Text => "text",
        DataType::Boolean => "boolean",
    }
}

fn pkey_name(table: &str) -> String {
    // PostgreSQL truncates the table part so the name fits NAMEDATALEN.
    let max = MAX_IDENTIFIER_LEN - "_pkey".len();
    let base: String = table.chars().take(max).collect();
    format!("{base}_pkey")
}

impl Catalog {
    fn table(&self, table: &TableName) -> EngineResult<&TableState> {
        self.tables.get(&key(table)).ok_or_else(|| undefined_table(table))
    }

    fn hypertable(&self, table: &TableName) -> EngineResult<&HypertableState> {
        self.table(table)?;
        self.hypertables
            .get(&key(table))
            .ok_or_else(|| not_hypertable(table))
    }

    fn hypertable_mut(&mut self, table: &TableName) -> EngineResult<&mut HypertableState> {
        self.table(table)?;
        self.hypertables
            .get_mut(&key(table))
            .ok_or_else(|| not_hypertable(table))
    }

    fn require_column(&self, table: &TableName, column: &str) -> EngineResult<()> {
        let state = self.table(table)?;
        if state.columns.iter().any(|(name, _)| name == column) {
            Ok(())
        } else {
            Err(EngineError::database(
                "42703",
                format!("column \"{column}\" does not exist"),
            ))
        }
    }

    fn new_chunk(&mut self, table_key: &str) -> Option<TableName> {
        let ht = self.hypertables.get_mut(table_key)?;
        ht.chunks += 1;
        let name = format!("{CHUNK_SCHEMA}._hyper_{}_{}_chunk", ht.id, ht.chunks);
        self.chunks.insert(
            name.clone(),
            Chunk {
                hypertable: table_key.to_owned(),
                compressed: false,
            },
        );
        TableName::parse(&name).ok()
    }

    fn execute(&mut self, command: &Command) -> EngineResult<Vec<Row>> {
        match command {
            Command::CreateExtension => {
                if self.deny_extension {
                    return Err(EngineError::database(
                        "42501",
                        "permission denied to create extension \"timescaledb\"",
                    ));
                }
                self.extension_installed = true;
                Ok(Vec::new())
            }
            Command::HypertableExists { table } => {
                let exists = self.hypertables.contains_key(&key(table));
                Ok(vec![Row::new().with("is_hypertable", exists)])
            }
            Command::PrimaryKeyConstraint { table } => {
                let state = self.table(table)?;
                Ok(state
                    .primary_key
                    .iter()
                    .map(|(name, _)| Row::new().with("constraint_name", name.as_str()))
                    .collect())
            }
            Command::DropConstraint { table, constraint } => {
                let state = self
                    .tables
                    .get_mut(&key(table))
                    .ok_or_else(|| undefined_table(table))?;
                match &state.primary_key {
                    Some((name, _)) if name == constraint.as_str() => {
                        state.primary_key = None;
                        Ok(Vec::new())
                    }
                    _ => Err(EngineError::database(
                        "42704",
                        format!("constraint \"{constraint}\" of relation \"{table}\" does not exist"),
                    )),
                }
            }
            Command::CreateHypertable {
                table,
                column,
                chunk_time_interval,
                migrate_data,
            } => self.create_hypertable(table, column.as_str(), *chunk_time_interval, *migrate_data),
            Command::SetChunkTimeInterval { table, interval } => {
                self.hypertable_mut(table)?.chunk_interval = *interval;
                Ok(vec![Row::new().with("set_chunk_time_interval", Value::Null)])
            }
            Command::AddPolicy(call) => self.add_policy(call),
            Command::RemovePolicy {
                kind,
                table,
                if_exists,
            } => {
                self.hypertable(table)?;
                let table_key = key(table);
                let before = self.jobs.len();
                self.jobs
                    .retain(|job| !(job.kind == *kind && job.table == table_key));
                // The engine function returns void, with only a notice when
                // `if_exists` skips a missing policy.
                if self.jobs.len() == before && !*if_exists {
                    return Err(EngineError::database(
                        "42704",
                        format!("{kind} policy not found for hypertable \"{table}\""),
                    ));
                }
                Ok(vec![Row::new().with(kind.remove_function(), Value::Null)])
            }
            Command::EnableCompression {
                table,
                segment_by,
                order_by,
                chunk_time_interval,
            } => {
                self.hypertable(table)?;
                for column in segment_by.iter().chain(order_by.iter().map(|o| &o.column)) {
                    self.require_column(table, column.as_str())?;
                }
                let table_key = key(table);
                let any_compressed = self
                    .chunks
                    .values()
                    .any(|c| c.hypertable == table_key && c.compressed);
                if any_compressed {
                    return Err(EngineError::database(
                        "0A000",
                        "cannot change configuration on already compressed chunks",
                    ));
                }
                let ht = self.hypertable_mut(table)?;
                ht.compression = Some(CompressionState {
                    segment_by: segment_by.iter().map(ToString::to_string).collect(),
                    order_by: order_by.iter().map(|o| o.column.to_string()).collect(),
                    chunk_time_interval: *chunk_time_interval,
                });
                Ok(Vec::new())
            }
            Command::CompressChunk {
                chunk,
                if_not_compressed,
            } => self.set_compressed(chunk, true, *if_not_compressed),
            Command::DecompressChunk {
                chunk,
                if_compressed,
            } => self.set_compressed(chunk, false, *if_compressed),
            Command::CompressionStats { table } => {
                self.hypertable(table)?;
                let table_key = key(table);
                let (total, compressed) = self
                    .chunks
                    .values()
                    .filter(|c| c.hypertable == table_key)
                    .fold((0_i64, 0_i64), |(t, c), chunk| {
                        (t + 1, c + i64::from(chunk.compressed))
                    });
                let bytes = |per_chunk: i64| {
                    if compressed == 0 {
                        Value::Null
                    } else {
                        Value::Int(compressed * per_chunk)
                    }
                };
                Ok(vec![Row::new()
                    .with("total_chunks", total)
                    .with("number_compressed_chunks", compressed)
                    .with("before_compression_total_bytes", bytes(8192))
                    .with("after_compression_total_bytes", bytes(1024))
                    .with("node_name", Value::Null)])
            }
            Command::TableColumns { table } => Ok(self
                .tables
                .get(&key(table))
                .map(|state| {
                    state
                        .columns
                        .iter()
                        .map(|(name, ty)| {
                            Row::new()
                                .with("column_name", name.as_str())
                                .with("data_type", ty.as_str())
                        })
                        .collect()
                })
                .unwrap_or_default()),
            Command::ListJobs { table } => {
                let table_key = key(table);
                Ok(self
                    .jobs
                    .iter()
                    .filter(|job| job.table == table_key)
                    .map(|job| self.job_row(job))
                    .collect())
            }
            Command::Query(_) => Ok(self.query_results.pop_front().unwrap_or_default()),
        }
    }

    fn create_hypertable(
        &mut self,
        table: &TableName,
        column: &str,
        chunk_interval: Interval,
        migrate_data: bool,
    ) -> EngineResult<Vec<Row>> {
        let state = self.table(table)?.clone();
        let table_key = key(table);
        if self.hypertables.contains_key(&table_key) {
            return Err(EngineError::database(
                "TS110",
                format!("table \"{table}\" is already a hypertable"),
            ));
        }
        self.require_column(table, column)?;
        if let Some((_, pk_column)) = &state.primary_key {
            if pk_column != column {
                return Err(EngineError::database(
                    "TS103",
                    format!(
                        "cannot create a unique index without the column \"{column}\" \
                         (used in partitioning)"
                    ),
                ));
            }
        }
        if state.rows > 0 && !migrate_data {
            return Err(EngineError::database(
                "TS102",
                format!("table \"{table}\" is not empty"),
            ));
        }

        self.next_hypertable_id += 1;
        self.hypertables.insert(
            table_key.clone(),
            HypertableState {
                id: self.next_hypertable_id,
                column: column.to_owned(),
                chunk_interval,
                compression: None,
                chunks: 0,
            },
        );
        if state.rows > 0 {
            self.new_chunk(&table_key);
        }

        let schema = table.schema().map_or(DEFAULT_SCHEMA, |s| s.as_str());
        Ok(vec![Row::new().with(
            "create_hypertable",
            format!("({},{schema},{},t)", self.next_hypertable_id, table.name()),
        )])
    }

    fn add_policy(&mut self, call: &PolicyCall) -> EngineResult<Vec<Row>> {
        let ht = self.hypertable(&call.table)?.clone();
        let table_key = key(&call.table);

        let Some(threshold) = call.threshold else {
            let (after, before) = match call.kind {
                PolicyKind::Retention => ("drop_after", "drop_created_before"),
                PolicyKind::Compression => ("compress_after", "compress_created_before"),
            };
            return Err(EngineError::database(
                "22023",
                format!("invalid arguments: must specify either {after} or {before}"),
            ));
        };

        if call.kind == PolicyKind::Compression && ht.compression.is_none() {
            return Err(EngineError::database(
                "0A000",
                format!("compression not enabled on hypertable \"{}\"", call.table),
            ));
        }

        if let Some(existing) = self
            .jobs
            .iter()
            .find(|job| job.kind == call.kind && job.table == table_key)
        {
            if call.if_not_exists {
                return Ok(vec![Row::new().with("job_id", existing.id)]);
            }
            return Err(EngineError::database(
                "42710",
                format!(
                    "{} policy already exists for hypertable \"{}\"",
                    call.kind, call.table
                ),
            ));
        }

        let schedule_interval = match (call.schedule_interval, call.kind) {
            (Some(interval), _) => interval,
            (None, PolicyKind::Retention) => Interval::days(1),
            (None, PolicyKind::Compression) => divide_interval(ht.chunk_interval, 2)
                .map_err(|e| EngineError::database("22008", e.to_string()))?,
        };

        if self.next_job_id == 0 {
            self.next_job_id = FIRST_JOB_ID;
        }
        let id = self.next_job_id;
        self.next_job_id += 1;
        self.jobs.push(Job {
            id,
            kind: call.kind,
            table: table_key,
            threshold,
            schedule_interval,
        });
        Ok(vec![Row::new().with("job_id", id)])
    }

    fn set_compressed(
        &mut self,
        chunk_name: &TableName,
        compress: bool,
        tolerate: bool,
    ) -> EngineResult<Vec<Row>> {
        let column = if compress { "compressed" } else { "decompressed" };
        let chunk_key = key(chunk_name);
        let hypertable = self
            .chunks
            .get(&chunk_key)
            .map(|c| c.hypertable.clone())
            .ok_or_else(|| undefined_table(chunk_name))?;
        let enabled = self
            .hypertables
            .get(&hypertable)
            .is_some_and(|ht| ht.compression.is_some());
        if !enabled {
            return Err(EngineError::database(
                "0A000",
                format!("compression not enabled on \"{hypertable}\""),
            ));
        }

        let chunk = self
            .chunks
            .get_mut(&chunk_key)
            .ok_or_else(|| undefined_table(chunk_name))?;
        if chunk.compressed == compress {
            if tolerate {
                return Ok(vec![Row::new().with(column, false)]);
            }
            let state = if compress { "already compressed" } else { "not compressed" };
            return Err(EngineError::database(
                "55000",
                format!("chunk \"{chunk_name}\" is {state}"),
            ));
        }
        chunk.compressed = compress;
        Ok(vec![Row::new().with(column, true)])
    }

    fn job_row(&self, job: &Job) -> Row {
        let hypertable_id = self.hypertables.get(&job.table).map_or(0, |ht| ht.id);
        let (name, interval) = match (job.kind, job.threshold) {
            (PolicyKind::Retention, Threshold::After(i)) => ("drop_after", i),
            (PolicyKind::Retention, Threshold::CreatedBefore(i)) => ("drop_created_before", i),
            (PolicyKind::Compression, Threshold::After(i)) => ("compress_after", i),
            (PolicyKind::Compression, Threshold::CreatedBefore(i)) => {
                ("compress_created_before", i)
            }
        };
        let mut config = serde_json::Map::new();
        config.insert(name.to_owned(), serde_json::Value::String(interval.to_string()));
        config.insert("hypertable_id".to_owned(), hypertable_id.into());
        Row::new()
            .with("job_id", job.id)
            .with("proc_name", job.kind.proc_name())
            .with("schedule_interval", job.schedule_interval)
            .with("config", serde_json::Value::Object(config).to_string())
    }
}

/// In-memory TimescaleDB stand-in.
///
/// Unqualified table names resolve to the `public` schema.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    catalog: RwLock<Catalog>,
}

impl MemoryEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a plain table. `primary_key` names a single key column.
    pub fn create_table(&self, table: &TableName, columns: &[(&str, &str)], primary_key: Option<&str>) {
        let state = TableState {
            columns: columns
                .iter()
                .map(|(name, ty)| ((*name).to_owned(), (*ty).to_owned()))
                .collect(),
            primary_key: primary_key.map(|col| (pkey_name(table.name().as_str()), col.to_owned())),
            rows: 0,
        };
        self.write().tables.insert(key(table), state);
    }

    /// Create the plain base table for a declared schema.
    pub fn create_table_from_schema(&self, schema: &TableSchema, primary_key: Option<&str>) {
        let columns: Vec<(&str, &str)> = schema
            .columns
            .iter()
            .map(|c| (c.name.as_str(), sql_type_name(c.data_type)))
            .collect();
        self.create_table(&schema.table, &columns, primary_key);
    }

    /// Add a column to an existing table.
    pub fn add_column(&self, table: &TableName, name: &str, data_type: &str) {
        if let Some(state) = self.write().tables.get_mut(&key(table)) {
            state.columns.push((name.to_owned(), data_type.to_owned()));
        }
    }

    /// Drop a table and everything attached to it.
    pub fn drop_table(&self, table: &TableName) {
        let table_key = key(table);
        let mut catalog = self.write();
        catalog.tables.remove(&table_key);
        catalog.hypertables.remove(&table_key);
        catalog.jobs.retain(|job| job.table != table_key);
        catalog.chunks.retain(|_, c| c.hypertable != table_key);
    }

    /// Record `n` inserted rows.
    pub fn insert_rows(&self, table: &TableName, n: u64) {
        if let Some(state) = self.write().tables.get_mut(&key(table)) {
            state.rows += n;
        }
    }

    /// Create a new chunk on a hypertable and return its name.
    pub fn add_chunk(&self, table: &TableName) -> Option<TableName> {
        self.write().new_chunk(&key(table))
    }

    /// Make `CREATE EXTENSION` fail with insufficient privilege.
    pub fn deny_extension(&self) {
        self.write().deny_extension = true;
    }

    /// Whether `CREATE EXTENSION` has succeeded.
    #[must_use]
    pub fn extension_installed(&self) -> bool {
        self.read().extension_installed
    }

    /// Queue the rows returned by the next [`Command::Query`].
    pub fn push_query_result(&self, rows: Vec<Row>) {
        self.write().query_results.push_back(rows);
    }

    /// Every statement received so far, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<Statement> {
        self.read().statements.clone()
    }

    /// Whether the table has been converted.
    #[must_use]
    pub fn is_hypertable(&self, table: &TableName) -> bool {
        self.read().hypertables.contains_key(&key(table))
    }

    /// Partitioning column of a hypertable.
    #[must_use]
    pub fn partition_column(&self, table: &TableName) -> Option<String> {
        self.read().hypertables.get(&key(table)).map(|ht| ht.column.clone())
    }

    /// Chunk interval of a hypertable.
    #[must_use]
    pub fn chunk_interval(&self, table: &TableName) -> Option<Interval> {
        self.read().hypertables.get(&key(table)).map(|ht| ht.chunk_interval)
    }

    /// Primary key constraint name of a table.
    #[must_use]
    pub fn primary_key(&self, table: &TableName) -> Option<String> {
        self.read()
            .tables
            .get(&key(table))
            .and_then(|t| t.primary_key.as_ref().map(|(name, _)| name.clone()))
    }

    /// Compression `(segment_by, order_by)` columns of a hypertable.
    #[must_use]
    pub fn compression_columns(&self, table: &TableName) -> Option<(Vec<String>, Vec<String>)> {
        self.read()
            .hypertables
            .get(&key(table))
            .and_then(|ht| ht.compression.as_ref())
            .map(|c| (c.segment_by.clone(), c.order_by.clone()))
    }

    /// Compression chunk time interval of a hypertable.
    #[must_use]
    pub fn compression_chunk_interval(&self, table: &TableName) -> Option<Interval> {
        self.read()
            .hypertables
            .get(&key(table))
            .and_then(|ht| ht.compression.as_ref())
            .and_then(|c| c.chunk_time_interval)
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn run(&self, command: &Command) -> EngineResult<Vec<Row>> {
        let mut catalog = self.write();
        catalog.statements.push(command.to_statement());
        catalog.execute(command)
    }
}
