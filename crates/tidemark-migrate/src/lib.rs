//! Schema migration for TimescaleDB hypertables.
//!
//! A table whose declared schema contains a partitioned column is converted
//! into a hypertable when it is created, or when the partitioned column is
//! added or declared later. Changing the column's chunk interval updates the
//! hypertable. The reverse transition is not supported.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tidemark_core::{ColumnDef, DataType, Ident, MemoryEngine, PartitionSpec, TableName, TableSchema};
//! use tidemark_migrate::{Migrator, SchemaRegistry, TableSchemaState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let migrator = Migrator::new(Arc::new(MemoryEngine::new()), Arc::new(SchemaRegistry::new()));
//! let schema = TableSchema::new(TableName::parse("readings")?)
//!     .with_column(ColumnDef::partitioned(Ident::new("time")?, PartitionSpec::new("1 day")?))
//!     .with_column(ColumnDef::plain(Ident::new("value")?, DataType::Double));
//!
//! migrator.on_table_create(&schema).await?;
//! assert_eq!(migrator.state(&schema.table)?, TableSchemaState::Hypertable);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod error;
mod migrator;
mod registry;

pub use error::{MigrationError, MigrationResult};
pub use migrator::Migrator;
pub use registry::{SchemaRegistry, TableSchemaState};
