//! Common test utilities for migration integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;

use tidemark_core::{
    ColumnDef, DataType, Ident, MemoryEngine, MigrationConfig, PartitionSpec, TableName,
    TableSchema,
};
use tidemark_migrate::{Migrator, SchemaRegistry};

/// Migrator wired to an in-memory engine.
pub struct TestMigrator {
    pub engine: Arc<MemoryEngine>,
    pub registry: Arc<SchemaRegistry>,
    pub migrator: Migrator,
}

impl TestMigrator {
    pub fn new() -> Self {
        Self::with_config(MigrationConfig::default())
    }

    pub fn with_config(config: MigrationConfig) -> Self {
        let engine = Arc::new(MemoryEngine::new());
        let registry = Arc::new(SchemaRegistry::new());
        let migrator = Migrator::new(engine.clone(), registry.clone()).with_config(config);
        Self {
            engine,
            registry,
            migrator,
        }
    }

    /// Create the base table in the engine, as the schema layer would before
    /// calling the hook.
    pub fn create_base_table(&self, schema: &TableSchema, primary_key: Option<&str>) {
        self.engine.create_table_from_schema(schema, primary_key);
    }

    /// Number of statements the engine has received.
    pub fn statement_count(&self) -> usize {
        self.engine.statements().len()
    }
}

pub fn ident(name: &str) -> Ident {
    Ident::new(name).unwrap()
}

pub fn table(name: &str) -> TableName {
    TableName::parse(name).unwrap()
}

pub fn time_column(chunk_interval: &str) -> ColumnDef {
    ColumnDef::partitioned(ident("time"), PartitionSpec::new(chunk_interval).unwrap())
}

/// `id bigint, time timestamptz (plain), value double precision`.
pub fn plain_readings(name: &str) -> TableSchema {
    TableSchema::new(table(name))
        .with_column(ColumnDef::plain(ident("id"), DataType::BigInt))
        .with_column(ColumnDef::plain(ident("time"), DataType::Timestamptz))
        .with_column(ColumnDef::plain(ident("value"), DataType::Double))
}

/// `id bigint, time timestamptz (partitioned), value double precision`.
pub fn partitioned_readings(name: &str, chunk_interval: &str) -> TableSchema {
    TableSchema::new(table(name))
        .with_column(ColumnDef::plain(ident("id"), DataType::BigInt))
        .with_column(time_column(chunk_interval))
        .with_column(ColumnDef::plain(ident("value"), DataType::Double))
}
