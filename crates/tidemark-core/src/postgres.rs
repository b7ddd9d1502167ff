//! PostgreSQL engine.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, Postgres, Row as _, Transaction, TypeInfo};
use tokio::sync::Mutex;

use crate::command::Command;
use crate::config::DatabaseConfig;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::interval::Interval;
use crate::statement::Statement;
use crate::value::{Row, Value};

/// Engine backed by a PostgreSQL connection pool with TimescaleDB installed.
#[derive(Clone)]
pub struct PgEngine {
    pool: PgPool,
}

impl PgEngine {
    /// Connect using the given database configuration.
    ///
    /// When `schema` is configured, every pooled connection sets it as the
    /// `search_path`, so unqualified tables resolve there.
    pub async fn connect(config: &DatabaseConfig) -> EngineResult<Self> {
        let mut options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));

        if let Some(schema) = config.schema.clone() {
            options = options.after_connect(move |conn, _meta| {
                let set = format!("SET search_path TO {}", schema.quoted());
                Box::pin(async move {
                    conn.execute(set.as_str()).await?;
                    Ok(())
                })
            });
        }

        let pool = options.connect(&config.url).await?;
        tracing::debug!(max_connections = config.max_connections, "connected to database");
        Ok(Self { pool })
    }

    /// Create an engine from an existing connection pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a transaction. Commands run through it share one connection.
    pub async fn begin(&self) -> EngineResult<PgTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PgTransaction {
            tx: Mutex::new(Some(tx)),
        })
    }
}

impl std::fmt::Debug for PgEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEngine")
            .field("size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Engine for PgEngine {
    async fn run(&self, command: &Command) -> EngineResult<Vec<Row>> {
        let statement = command.to_statement();
        tracing::debug!(command = command.name(), sql = %statement.sql, "executing");
        let rows = bind_all(&statement).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

/// A transaction scope on a [`PgEngine`].
///
/// Dropping it without calling [`commit`](Self::commit) rolls back.
pub struct PgTransaction {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PgTransaction {
    /// Commit the transaction.
    pub async fn commit(self) -> EngineResult<()> {
        match self.tx.into_inner() {
            Some(tx) => Ok(tx.commit().await?),
            None => Err(EngineError::Connection("transaction already finished".into())),
        }
    }

    /// Roll back the transaction.
    pub async fn rollback(self) -> EngineResult<()> {
        match self.tx.into_inner() {
            Some(tx) => Ok(tx.rollback().await?),
            None => Err(EngineError::Connection("transaction already finished".into())),
        }
    }
}

#[async_trait]
impl Engine for PgTransaction {
    async fn run(&self, command: &Command) -> EngineResult<Vec<Row>> {
        let statement = command.to_statement();
        tracing::debug!(command = command.name(), sql = %statement.sql, "executing in transaction");
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| EngineError::Connection("transaction already finished".into()))?;
        let rows = bind_all(&statement).fetch_all(&mut **tx).await?;
        rows.iter().map(decode_row).collect()
    }
}

fn bind_all(statement: &Statement) -> Query<'_, Postgres, PgArguments> {
    statement
        .params
        .iter()
        .fold(sqlx::query(&statement.sql), |query, value| match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Timestamp(ts) => query.bind(*ts),
            Value::Interval(interval) => query.bind(PgInterval {
                months: interval.month_part(),
                days: interval.day_part(),
                microseconds: interval.microsecond_part(),
            }),
            Value::IntArray(values) => query.bind(values.as_slice()),
            Value::FloatArray(values) => query.bind(values.as_slice()),
        })
}

fn decode_row(row: &PgRow) -> EngineResult<Row> {
    row.columns()
        .iter()
        .map(|column| {
            let value = decode_column(row, column.ordinal(), column.type_info().name())
                .map_err(|e| match e {
                    EngineError::Unsupported(type_name) => undecodable(column.name(), &type_name),
                    other => other,
                })?;
            Ok((column.name().to_owned(), value))
        })
        .collect()
}

/// Decode one column. Types without a [`Value`] mapping come back as
/// [`EngineError::Unsupported`] carrying the type name.
fn decode_column(row: &PgRow, index: usize, type_name: &str) -> EngineResult<Value> {
    let value: Value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.into(),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(i64::from).into(),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(i64::from).into(),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.into(),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(f64::from).into(),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.into(),
        "TEXT" | "VARCHAR" | "NAME" | "BPCHAR" => row.try_get::<Option<String>, _>(index)?.into(),
        "TIMESTAMPTZ" => row.try_get::<Option<DateTime<Utc>>, _>(index)?.into(),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|ts| ts.and_utc())
            .into(),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .map(|d| d.format("%Y-%m-%d").to_string())
            .into(),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map(|json| json.to_string())
            .into(),
        "INTERVAL" => row
            .try_get::<Option<PgInterval>, _>(index)?
            .map(|i| Interval::new(i.months, i.days, i.microseconds))
            .into(),
        "INT4[]" => row
            .try_get::<Option<Vec<i32>>, _>(index)?
            .map_or(Value::Null, |v| Value::IntArray(v.into_iter().map(i64::from).collect())),
        "INT8[]" => row
            .try_get::<Option<Vec<i64>>, _>(index)?
            .map_or(Value::Null, Value::IntArray),
        "FLOAT8[]" => row
            .try_get::<Option<Vec<f64>>, _>(index)?
            .map_or(Value::Null, Value::FloatArray),
        // Administrative functions return void or a status record
        // (create_hypertable); neither carries anything callers read.
        "VOID" | "RECORD" => Value::Null,
        other => return Err(EngineError::Unsupported(other.to_owned())),
    };
    Ok(value)
}

fn undecodable(column: &str, type_name: &str) -> EngineError {
    EngineError::Decode(format!(
        "column \"{column}\" has unsupported type {type_name}; \
         cast it in the query (e.g. ::double precision or ::text)"
    ))
}
