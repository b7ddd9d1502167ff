//! Common test utilities for query pipeline tests.

#![allow(dead_code, clippy::unwrap_used)]

use chrono::{DateTime, TimeZone, Utc};
use tidemark_core::{ColumnDef, DataType, Ident, PartitionSpec, TableName, TableSchema};

pub fn ident(name: &str) -> Ident {
    Ident::new(name).unwrap()
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// `time timestamptz (partitioned), device text, temperature double precision, status integer`.
pub fn readings() -> TableSchema {
    readings_named("readings")
}

/// [`readings`] under another table name.
pub fn readings_named(name: &str) -> TableSchema {
    TableSchema::new(TableName::parse(name).unwrap())
        .with_column(ColumnDef::partitioned(
            ident("time"),
            PartitionSpec::new("1 day").unwrap(),
        ))
        .with_column(ColumnDef::plain(ident("device"), DataType::Text))
        .with_column(ColumnDef::plain(ident("temperature"), DataType::Double))
        .with_column(ColumnDef::plain(ident("status"), DataType::Integer))
}

/// Same columns without a partitioned column.
pub fn plain_readings() -> TableSchema {
    TableSchema::new(TableName::parse("plain_readings").unwrap())
        .with_column(ColumnDef::plain(ident("time"), DataType::Timestamptz))
        .with_column(ColumnDef::plain(ident("temperature"), DataType::Double))
}
