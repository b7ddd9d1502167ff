//! Registry of declared table schemas.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tidemark_core::{ColumnDef, TableName, TableSchema};

use crate::error::{MigrationError, MigrationResult};

/// Partitioning state of a table, derived from its declared schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSchemaState {
    /// No partitioned column.
    Plain,
    /// Declared with a partitioned column.
    Hypertable,
}

impl TableSchemaState {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Hypertable => "hypertable",
        }
    }

    /// Derive the state of a declared schema.
    #[must_use]
    pub fn of(schema: &TableSchema) -> Self {
        if schema.partition_column().is_some() {
            Self::Hypertable
        } else {
            Self::Plain
        }
    }
}

impl std::fmt::Display for TableSchemaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared schemas keyed by table name.
///
/// Internally synchronized; it does not serialize concurrent migrations of
/// the same table.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: RwLock<HashMap<TableName, TableSchema>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every schema, replacing existing entries for the same tables.
    pub fn load(&self, schemas: impl IntoIterator<Item = TableSchema>) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        for schema in schemas {
            tables.insert(schema.table.clone(), schema);
        }
    }

    /// Register a schema, returning the one it replaced.
    pub fn register(&self, schema: TableSchema) -> Option<TableSchema> {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(schema.table.clone(), schema)
    }

    /// Declared schema of a table.
    #[must_use]
    pub fn get(&self, table: &TableName) -> Option<TableSchema> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
    }

    /// Declared schema of a table, or [`MigrationError::UnknownTable`].
    pub fn require(&self, table: &TableName) -> MigrationResult<TableSchema> {
        self.get(table)
            .ok_or_else(|| MigrationError::UnknownTable(table.to_string()))
    }

    /// Append a column to a registered table.
    pub fn add_column(&self, table: &TableName, column: ColumnDef) -> MigrationResult<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let schema = tables
            .get_mut(table)
            .ok_or_else(|| MigrationError::UnknownTable(table.to_string()))?;
        if schema.column(column.name.as_str()).is_some() {
            return Err(MigrationError::definition(format!(
                "column {} already exists on {table}",
                column.name
            )));
        }
        schema.columns.push(column);
        Ok(())
    }

    /// Replace the column named `old` with `new`, keeping its position.
    pub fn replace_column(&self, table: &TableName, old: &str, new: ColumnDef) -> MigrationResult<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let schema = tables
            .get_mut(table)
            .ok_or_else(|| MigrationError::UnknownTable(table.to_string()))?;
        let slot = schema
            .columns
            .iter_mut()
            .find(|c| c.name.as_str() == old)
            .ok_or_else(|| MigrationError::definition(format!("column {old} not found on {table}")))?;
        *slot = new;
        Ok(())
    }

    /// Remove a table, returning its schema.
    pub fn remove(&self, table: &TableName) -> Option<TableSchema> {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(table)
    }

    /// Names of every registered table.
    #[must_use]
    pub fn tables(&self) -> Vec<TableName> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tidemark_core::{DataType, Ident, PartitionSpec};

    fn readings() -> TableSchema {
        TableSchema::new(TableName::parse("readings").unwrap())
            .with_column(ColumnDef::plain(Ident::new("value").unwrap(), DataType::Double))
    }

    #[test]
    fn register_and_get() {
        let registry = SchemaRegistry::new();
        assert!(registry.register(readings()).is_none());
        let table = TableName::parse("readings").unwrap();
        assert_eq!(registry.get(&table), Some(readings()));
        assert_eq!(TableSchemaState::of(&readings()), TableSchemaState::Plain);
        assert!(registry.register(readings()).is_some());
    }

    #[test]
    fn add_column_rejects_duplicates() {
        let registry = SchemaRegistry::new();
        registry.register(readings());
        let table = TableName::parse("readings").unwrap();

        let dup = ColumnDef::plain(Ident::new("value").unwrap(), DataType::Double);
        assert!(matches!(
            registry.add_column(&table, dup),
            Err(MigrationError::Definition(_))
        ));

        let time = ColumnDef::partitioned(Ident::new("time").unwrap(), PartitionSpec::new("1 day").unwrap());
        registry.add_column(&table, time).unwrap();
        assert_eq!(
            TableSchemaState::of(&registry.get(&table).unwrap()),
            TableSchemaState::Hypertable
        );
    }

    #[test]
    fn replace_column_keeps_position() {
        let registry = SchemaRegistry::new();
        registry.register(
            readings().with_column(ColumnDef::plain(Ident::new("note").unwrap(), DataType::Text)),
        );
        let table = TableName::parse("readings").unwrap();
        let renamed = ColumnDef::plain(Ident::new("reading").unwrap(), DataType::Double);
        registry.replace_column(&table, "value", renamed).unwrap();

        let schema = registry.get(&table).unwrap();
        assert_eq!(schema.columns[0].name.as_str(), "reading");
        assert_eq!(schema.columns[1].name.as_str(), "note");
    }

    #[test]
    fn unknown_table_errors() {
        let registry = SchemaRegistry::new();
        let table = TableName::parse("missing").unwrap();
        assert!(matches!(
            registry.require(&table),
            Err(MigrationError::UnknownTable(_))
        ));
        assert!(registry.remove(&table).is_none());
    }

    #[test]
    fn load_registers_many() {
        let registry = SchemaRegistry::new();
        registry.load([
            readings(),
            TableSchema::new(TableName::parse("events").unwrap()),
        ]);
        let mut names: Vec<String> = registry.tables().iter().map(ToString::to_string).collect();
        names.sort();
        assert_eq!(names, ["events", "readings"]);
    }
}
