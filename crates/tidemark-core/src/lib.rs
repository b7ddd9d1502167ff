//! Core primitives for tidemark.
//!
//! This crate holds everything the migration, query and policy layers share:
//!
//! - [`Interval`] and [`normalize_interval`]: engine-compatible duration literals
//! - [`Ident`] and [`TableName`]: allow-listed SQL identifiers
//! - [`Expr`]: typed time-series expressions (`time_bucket`, `time_bucket_gapfill`,
//!   `histogram`, `first`/`last`, `lttb`)
//! - [`Command`] and [`StatementBuilder`]: parameterized administrative statements
//! - [`Engine`]: the seam to the storage engine, with [`PgEngine`] for
//!   PostgreSQL/TimescaleDB and [`MemoryEngine`] for tests
//!
//! # Feature flags
//!
//! - `memory` (default): in-memory engine
//! - `postgres` (default): PostgreSQL engine via sqlx
//! - `config` (default): figment-based configuration loading

#![forbid(unsafe_code)]

mod command;
mod config;
mod engine;
mod error;
mod expr;
mod ident;
mod interval;
mod schema;
mod statement;
mod value;

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "postgres")]
mod postgres;

pub use command::{Command, OrderBy, PolicyCall, PolicyKind, Threshold};
pub use config::{DatabaseConfig, MigrationConfig, MigrationStrategy, TidemarkConfig};
pub use engine::Engine;
pub use error::{
    CoreError, CoreResult, EngineError, EngineResult, SQLSTATE_INSUFFICIENT_PRIVILEGE,
};
pub use expr::{gapfill_width, Aggregate, Expr, SqlType, DEFAULT_GAPFILL_DATAPOINTS};
pub use ident::{Ident, TableName, MAX_IDENTIFIER_LEN};
pub use interval::{divide_interval, normalize_interval, Interval, IntervalInput};
pub use schema::{ColumnDef, ColumnKind, DataType, PartitionSpec, TableSchema};
pub use statement::{quote_literal, Cast, Statement, StatementBuilder};
pub use value::{Row, Value};

#[cfg(feature = "memory")]
pub use memory::MemoryEngine;

#[cfg(feature = "postgres")]
pub use postgres::{PgEngine, PgTransaction};
