//! Retention and compression administration for TimescaleDB hypertables.
//!
//! [`PolicyManager`] adds and removes retention and compression policies,
//! enables compression with segment-by/order-by options, compresses and
//! decompresses individual chunks, and reads compression statistics and
//! scheduled jobs back from the catalog.
//!
//! Policy arguments are validated before anything reaches the engine: the
//! two threshold forms are mutually exclusive, durations are normalized, and
//! compression columns are checked against the table's catalog columns.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tidemark_core::{MemoryEngine, TableName};
//! use tidemark_policy::{CompressionSettings, PolicyManager, PolicyOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = PolicyManager::new(Arc::new(MemoryEngine::new()));
//! let readings = TableName::parse("readings")?;
//!
//! manager
//!     .enable_compression(&readings, &CompressionSettings::new().segment_by("device_id"))
//!     .await?;
//! let job_id = manager
//!     .add_compression_policy(&readings, &PolicyOptions::new().after("30 days").if_not_exists(true))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod compression;
mod error;
mod manager;
mod options;

pub use compression::{parse_order_by, CompressionSettings};
pub use error::{PolicyError, PolicyResult};
pub use manager::{PolicyJob, PolicyManager};
pub use options::PolicyOptions;
