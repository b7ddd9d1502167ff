//! Schema migration hooks.
//!
//! The [`Migrator`] is driven by schema lifecycle events (table created,
//! field added, field altered, table dropped) and issues the administrative
//! statements that keep a table's hypertable configuration in line with its
//! declared partitioned column.
//!
//! Precondition failures are fatal and never retried. Nothing is rolled back
//! on a partial conversion; run the hooks inside a transaction engine if
//! atomicity is needed.

use std::sync::Arc;

use tidemark_core::{
    ColumnDef, ColumnKind, Command, Engine, EngineError, Ident, Interval, MigrationConfig,
    MigrationStrategy, PartitionSpec, TableName, TableSchema, Value,
};

use crate::error::{MigrationError, MigrationResult};
use crate::registry::{SchemaRegistry, TableSchemaState};

/// Applies schema lifecycle events to the engine.
pub struct Migrator {
    engine: Arc<dyn Engine>,
    registry: Arc<SchemaRegistry>,
    config: MigrationConfig,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Migrator {
    /// Create a migrator with the default configuration.
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            engine,
            registry,
            config: MigrationConfig::default(),
        }
    }

    /// Replace the migration configuration.
    #[must_use]
    pub fn with_config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    /// The schema registry this migrator maintains.
    #[must_use]
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Install the TimescaleDB extension if it is missing.
    ///
    /// A role without the privilege to create extensions gets a warning and
    /// migration continues; the extension may already be installed.
    pub async fn prepare_extension(&self) -> MigrationResult<()> {
        match self.engine.run(&Command::CreateExtension).await {
            Ok(_) => {
                tracing::debug!("timescaledb extension ready");
                Ok(())
            }
            Err(e) if e.is_permission_denied() => {
                tracing::warn!(error = %e, "cannot create timescaledb extension, continuing");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Handle a newly created table.
    ///
    /// Converts the table on its first partitioned column without migrating
    /// data, then registers the schema as the engine now has it: when the
    /// conversion fails the table is registered plain. Declaring more than
    /// one partitioned column is a [`MigrationError::Definition`] error,
    /// raised after the conversion on the first; only the first stays
    /// partitioned in the registry.
    pub async fn on_table_create(&self, schema: &TableSchema) -> MigrationResult<()> {
        let mut partitioned = schema.partitioned_columns();
        let Some(first) = partitioned.next() else {
            tracing::debug!(table = %schema.table, "table has no partitioned column");
            self.registry.register(schema.clone());
            return Ok(());
        };
        let extra: Vec<String> = partitioned.map(|c| c.name.to_string()).collect();

        if let ColumnKind::Partitioned(spec) = &first.kind {
            match self
                .convert_to_hypertable(&schema.table, &first.name, spec, false)
                .await
            {
                Ok(()) => {}
                // The engine already partitions the table; keep the declaration.
                Err(e @ MigrationError::AlreadyHypertable(_)) => {
                    self.registry.register(schema.partitioned_by(Some(&first.name)));
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(table = %schema.table, error = %e, "conversion failed, table stays plain");
                    self.registry.register(schema.partitioned_by(None));
                    return Err(e);
                }
            }
        }
        self.registry.register(schema.partitioned_by(Some(&first.name)));

        if extra.is_empty() {
            Ok(())
        } else {
            Err(MigrationError::definition(format!(
                "{} declares more than one partitioned column: {} is used, {} ignored",
                schema.table,
                first.name,
                extra.join(", ")
            )))
        }
    }

    /// Handle a field added to an existing table.
    pub async fn on_field_add(&self, table: &TableName, field: &ColumnDef) -> MigrationResult<()> {
        let schema = self.registry.require(table)?;
        if schema.column(field.name.as_str()).is_some() {
            return Err(MigrationError::definition(format!(
                "column {} already exists on {table}",
                field.name
            )));
        }

        if let ColumnKind::Partitioned(spec) = &field.kind {
            if let Some(existing) = schema.partition_column() {
                return Err(MigrationError::definition(format!(
                    "{table} is already partitioned by {}, cannot add {}",
                    existing.name, field.name
                )));
            }
            self.check_strategy(table)?;
            self.convert_to_hypertable(table, &field.name, spec, true)
                .await?;
        }

        self.registry.add_column(table, field.clone())
    }

    /// Handle a field whose declaration changed from `old` to `new`.
    pub async fn on_field_alter(
        &self,
        table: &TableName,
        old: &ColumnDef,
        new: &ColumnDef,
    ) -> MigrationResult<()> {
        let schema = self.registry.require(table)?;

        match (&old.kind, &new.kind) {
            (ColumnKind::Plain, ColumnKind::Partitioned(spec)) => {
                if let Some(existing) = schema
                    .partitioned_columns()
                    .find(|c| c.name != old.name)
                {
                    return Err(MigrationError::definition(format!(
                        "{table} is already partitioned by {}, cannot partition by {}",
                        existing.name, new.name
                    )));
                }
                self.check_strategy(table)?;
                self.convert_to_hypertable(table, &new.name, spec, true)
                    .await?;
            }
            (ColumnKind::Partitioned(before), ColumnKind::Partitioned(after)) => {
                if before.chunk_interval == after.chunk_interval {
                    tracing::debug!(table = %table, column = %new.name, "chunk interval unchanged");
                } else {
                    self.set_chunk_interval(table, after.chunk_interval).await?;
                }
            }
            (ColumnKind::Partitioned(_), ColumnKind::Plain) => {
                return Err(MigrationError::unsupported(format!(
                    "cannot turn partitioned column {} of {table} back into a plain column",
                    old.name
                )));
            }
            (ColumnKind::Plain, ColumnKind::Plain) => {}
        }

        self.registry
            .replace_column(table, old.name.as_str(), new.clone())
    }

    /// Handle a dropped table.
    pub async fn on_table_drop(&self, table: &TableName) -> MigrationResult<()> {
        match self.registry.remove(table) {
            Some(_) => {
                tracing::debug!(table = %table, "table removed from registry");
                Ok(())
            }
            None => Err(MigrationError::UnknownTable(table.to_string())),
        }
    }

    /// Declared partitioning state of a table.
    pub fn state(&self, table: &TableName) -> MigrationResult<TableSchemaState> {
        Ok(TableSchemaState::of(&self.registry.require(table)?))
    }

    /// Convert `table` into a hypertable partitioned on `column`.
    ///
    /// Fails with [`MigrationError::AlreadyHypertable`] when the engine
    /// already lists the table. Unless `retain_primary_key` is set, the table's
    /// single-column primary key is dropped first.
    pub async fn convert_to_hypertable(
        &self,
        table: &TableName,
        column: &Ident,
        spec: &PartitionSpec,
        migrate_data: bool,
    ) -> MigrationResult<()> {
        if self.is_hypertable(table).await? {
            return Err(MigrationError::AlreadyHypertable(table.to_string()));
        }

        if !spec.retain_primary_key {
            self.drop_primary_key(table).await?;
        }

        tracing::info!(
            table = %table,
            column = %column,
            chunk_interval = %spec.chunk_interval,
            migrate_data,
            "converting table to hypertable"
        );
        self.engine
            .run(&Command::CreateHypertable {
                table: table.clone(),
                column: column.clone(),
                chunk_time_interval: spec.chunk_interval,
                migrate_data,
            })
            .await?;
        Ok(())
    }

    /// Change the chunk interval of an existing hypertable.
    pub async fn set_chunk_interval(&self, table: &TableName, interval: Interval) -> MigrationResult<()> {
        if !self.is_hypertable(table).await? {
            return Err(MigrationError::NotHypertable(table.to_string()));
        }
        tracing::info!(table = %table, chunk_interval = %interval, "updating chunk interval");
        self.engine
            .run(&Command::SetChunkTimeInterval {
                table: table.clone(),
                interval,
            })
            .await?;
        Ok(())
    }

    /// Whether the engine lists `table` as a hypertable.
    pub async fn is_hypertable(&self, table: &TableName) -> MigrationResult<bool> {
        let value = self
            .engine
            .fetch_scalar(&Command::HypertableExists {
                table: table.clone(),
            })
            .await?;
        match value {
            Value::Bool(exists) => Ok(exists),
            other => Err(EngineError::Decode(format!(
                "hypertable lookup returned {}, expected boolean",
                other.type_name()
            ))
            .into()),
        }
    }

    async fn drop_primary_key(&self, table: &TableName) -> MigrationResult<()> {
        let constraint = self
            .engine
            .fetch_scalar(&Command::PrimaryKeyConstraint {
                table: table.clone(),
            })
            .await?;
        let Some(name) = constraint.as_str() else {
            return Ok(());
        };
        let constraint = Ident::new(name)?;
        tracing::info!(table = %table, constraint = %constraint, "dropping primary key");
        self.engine
            .run(&Command::DropConstraint {
                table: table.clone(),
                constraint,
            })
            .await?;
        Ok(())
    }

    fn check_strategy(&self, table: &TableName) -> MigrationResult<()> {
        match self.config.strategy {
            MigrationStrategy::InPlace => Ok(()),
            MigrationStrategy::FreshTable => Err(MigrationError::unsupported(format!(
                "the {} strategy is not implemented (table {table})",
                MigrationStrategy::FreshTable
            ))),
        }
    }
}
