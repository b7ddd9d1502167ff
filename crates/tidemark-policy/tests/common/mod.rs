//! Common test utilities for policy integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;

use tidemark_core::{Command, Engine, Ident, Interval, MemoryEngine, TableName};
use tidemark_policy::PolicyManager;

/// Policy manager wired to an in-memory engine.
pub struct TestPolicies {
    pub engine: Arc<MemoryEngine>,
    pub manager: PolicyManager,
}

impl TestPolicies {
    pub fn new() -> Self {
        let engine = Arc::new(MemoryEngine::new());
        let manager = PolicyManager::new(engine.clone());
        Self { engine, manager }
    }

    /// Create `name (time timestamptz, device_id text, value double precision)`
    /// as a hypertable with one-day chunks.
    pub async fn hypertable(&self, name: &str) -> TableName {
        let table = table(name);
        self.engine.create_table(
            &table,
            &[
                ("time", "timestamp with time zone"),
                ("device_id", "text"),
                ("value", "double precision"),
            ],
            None,
        );
        self.engine
            .run(&Command::CreateHypertable {
                table: table.clone(),
                column: Ident::new("time").unwrap(),
                chunk_time_interval: Interval::days(1),
                migrate_data: false,
            })
            .await
            .unwrap();
        table
    }

    /// SQL of every statement the engine has received.
    pub fn sql(&self) -> Vec<String> {
        self.engine.statements().into_iter().map(|s| s.sql).collect()
    }
}

pub fn table(name: &str) -> TableName {
    TableName::parse(name).unwrap()
}
