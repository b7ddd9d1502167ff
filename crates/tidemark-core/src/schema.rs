//! Declared table schemas.
//!
//! A [`TableSchema`] is what the application declares, not what the catalog
//! reports. The partitioning key is a tagged column kind so consumers match
//! on it instead of probing column types at runtime.

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::expr::SqlType;
use crate::ident::{Ident, TableName};
use crate::interval::{normalize_interval, Interval, IntervalInput};

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// `timestamptz`
    Timestamptz,
    /// `integer`
    Integer,
    /// `bigint`
    BigInt,
    /// `double precision`
    Double,
    /// `text`
    Text,
    /// `boolean`
    Boolean,
}

impl DataType {
    /// Expression type of a column with this storage type.
    #[must_use]
    pub const fn sql_type(self) -> SqlType {
        match self {
            Self::Timestamptz => SqlType::TIMESTAMP,
            Self::Integer | Self::BigInt => SqlType::Integer,
            Self::Double => SqlType::Numeric,
            Self::Text => SqlType::Text,
            Self::Boolean => SqlType::Boolean,
        }
    }
}

/// Partitioning configuration of a hypertable's time column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    /// Time range covered by each chunk.
    pub chunk_interval: Interval,
    /// Keep the table's primary key when converting.
    #[serde(default)]
    pub retain_primary_key: bool,
}

impl PartitionSpec {
    /// A partition spec with the given chunk interval, dropping the primary key.
    pub fn new(chunk_interval: impl Into<IntervalInput>) -> CoreResult<Self> {
        Ok(Self {
            chunk_interval: normalize_interval(chunk_interval)?,
            retain_primary_key: false,
        })
    }

    /// Keep the primary key on conversion.
    #[must_use]
    pub fn retaining_primary_key(mut self) -> Self {
        self.retain_primary_key = true;
        self
    }
}

/// Role of a column in the table's partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnKind {
    /// Ordinary column.
    Plain,
    /// The hypertable's partitioning key.
    Partitioned(PartitionSpec),
}

impl ColumnKind {
    /// Partition spec, if partitioned.
    #[must_use]
    pub const fn partition(&self) -> Option<&PartitionSpec> {
        match self {
            Self::Plain => None,
            Self::Partitioned(spec) => Some(spec),
        }
    }
}

/// A declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: Ident,
    /// Storage type.
    pub data_type: DataType,
    /// Partitioning role.
    pub kind: ColumnKind,
}

impl ColumnDef {
    /// An ordinary column.
    #[must_use]
    pub fn plain(name: Ident, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            kind: ColumnKind::Plain,
        }
    }

    /// A partitioned `timestamptz` column.
    #[must_use]
    pub fn partitioned(name: Ident, spec: PartitionSpec) -> Self {
        Self {
            name,
            data_type: DataType::Timestamptz,
            kind: ColumnKind::Partitioned(spec),
        }
    }

    /// Partition spec, if this is the partitioning key.
    #[must_use]
    pub const fn partition(&self) -> Option<&PartitionSpec> {
        self.kind.partition()
    }

    /// Whether this column is a partitioning key.
    #[must_use]
    pub const fn is_partitioned(&self) -> bool {
        matches!(self.kind, ColumnKind::Partitioned(_))
    }
}

/// A declared table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub table: TableName,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// A table with no columns.
    #[must_use]
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            columns: Vec::new(),
        }
    }

    /// Append a column, builder style.
    #[must_use]
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Column named `name`.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.as_str() == name)
    }

    /// Partitioned columns in declaration order.
    pub fn partitioned_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.is_partitioned())
    }

    /// The first partitioned column.
    #[must_use]
    pub fn partition_column(&self) -> Option<&ColumnDef> {
        self.partitioned_columns().next()
    }

    /// A copy in which every column other than `key` is plain.
    ///
    /// `None` demotes all partitioned columns.
    #[must_use]
    pub fn partitioned_by(&self, key: Option<&Ident>) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                if c.is_partitioned() && Some(&c.name) != key {
                    ColumnDef::plain(c.name.clone(), c.data_type)
                } else {
                    c.clone()
                }
            })
            .collect();
        Self {
            table: self.table.clone(),
            columns,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ident(s: &str) -> Ident {
        Ident::new(s).unwrap()
    }

    #[test]
    fn partition_column_is_first_partitioned() {
        let schema = TableSchema::new(TableName::parse("readings").unwrap())
            .with_column(ColumnDef::plain(ident("id"), DataType::BigInt))
            .with_column(ColumnDef::partitioned(
                ident("time"),
                PartitionSpec::new("1 day").unwrap(),
            ))
            .with_column(ColumnDef::plain(ident("value"), DataType::Double));

        let partition = schema.partition_column().unwrap();
        assert_eq!(partition.name.as_str(), "time");
        assert_eq!(
            partition.partition().map(|p| p.chunk_interval),
            Some(Interval::days(1))
        );
        assert!(schema.column("value").unwrap().partition().is_none());
    }

    #[test]
    fn partitioned_by_demotes_other_keys() {
        let spec = PartitionSpec::new("1 day").unwrap();
        let schema = TableSchema::new(TableName::parse("readings").unwrap())
            .with_column(ColumnDef::partitioned(ident("time"), spec))
            .with_column(ColumnDef::partitioned(ident("recorded_at"), spec));

        let kept = schema.partitioned_by(Some(&ident("time")));
        assert_eq!(kept.partitioned_columns().count(), 1);
        assert_eq!(kept.partition_column().unwrap().name.as_str(), "time");
        let demoted = kept.column("recorded_at").unwrap();
        assert_eq!(demoted.kind, ColumnKind::Plain);
        assert_eq!(demoted.data_type, DataType::Timestamptz);

        assert!(schema.partitioned_by(None).partition_column().is_none());
    }

    #[test]
    fn schema_deserializes_from_toml() {
        let schema: TableSchema = toml::from_str(
            r#"
            table = "metrics.readings"

            [[columns]]
            name = "time"
            data_type = "timestamptz"
            kind = { kind = "partitioned", chunk_interval = "7 days", retain_primary_key = true }

            [[columns]]
            name = "value"
            data_type = "double"
            kind = { kind = "plain" }
            "#,
        )
        .unwrap();

        assert_eq!(schema.table.to_string(), "metrics.readings");
        let spec = schema.partition_column().unwrap().partition().unwrap();
        assert_eq!(spec.chunk_interval, Interval::days(7));
        assert!(spec.retain_primary_key);
    }
}
