//! Read-side query pipelines for tidemark hypertables.
//!
//! A [`Pipeline`] wraps a table with a partitioned column and exposes the
//! TimescaleDB read functions as composable calls:
//!
//! - [`Pipeline::bucket`]: `time_bucket` grouping with aggregate [`Annotations`]
//! - [`Pipeline::bucket_gapfill`]: `time_bucket_gapfill` over a closed range
//! - [`Pipeline::histogram`]: `histogram` counts with underflow/overflow slots
//! - [`Pipeline::downsample`]: `lttb` reduction
//!
//! # Example
//!
//! ```no_run
//! use tidemark_core::{ColumnDef, DataType, Expr, Ident, MemoryEngine, PartitionSpec, TableName, TableSchema};
//! use tidemark_query::{Annotations, Pipeline};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = TableSchema::new(TableName::parse("readings")?)
//!     .with_column(ColumnDef::partitioned(Ident::new("time")?, PartitionSpec::new("1 day")?))
//!     .with_column(ColumnDef::plain(Ident::new("temperature")?, DataType::Double));
//!
//! let readings = Pipeline::for_table(&schema)?;
//! let annotations = Annotations::new().with("avg_temp", Expr::avg(readings.column("temperature")?)?)?;
//! let hourly = readings.bucket("time", "1 hour", &annotations)?;
//!
//! let engine = MemoryEngine::new();
//! let records = hourly.to_plain_sequence(&engine, true).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod annotations;
mod error;
mod filter;
mod pipeline;

pub use annotations::{Annotations, BUCKET_COLUMN};
pub use error::{QueryError, QueryResult};
pub use filter::{Comparison, Filter};
pub use pipeline::{Pipeline, Record, DEFAULT_HISTOGRAM_BUCKETS};
