//! Integration tests for the hypertable migration lifecycle.

#![allow(clippy::unwrap_used)]

mod common;

use common::{ident, partitioned_readings, plain_readings, table, time_column, TestMigrator};
use tidemark_core::{
    ColumnDef, DataType, EngineError, Interval, MigrationConfig, MigrationStrategy, PartitionSpec,
};
use tidemark_migrate::{MigrationError, TableSchemaState};

#[tokio::test]
async fn create_with_partition_field_converts_and_drops_primary_key() {
    let t = TestMigrator::new();
    let schema = partitioned_readings("readings", "1 day");
    t.create_base_table(&schema, Some("id"));
    assert_eq!(t.engine.primary_key(&schema.table).as_deref(), Some("readings_pkey"));

    t.migrator.on_table_create(&schema).await.unwrap();

    assert!(t.engine.is_hypertable(&schema.table));
    assert_eq!(t.engine.chunk_interval(&schema.table), Some(Interval::days(1)));
    assert_eq!(t.engine.partition_column(&schema.table).as_deref(), Some("time"));
    assert!(t.engine.primary_key(&schema.table).is_none());
    assert_eq!(
        t.migrator.state(&schema.table).unwrap(),
        TableSchemaState::Hypertable
    );

    let sql: Vec<String> = t.engine.statements().into_iter().map(|s| s.sql).collect();
    assert!(sql[0].contains("timescaledb_information.hypertables"));
    assert!(sql[1].contains("pg_constraint"));
    assert!(sql[2].starts_with("ALTER TABLE \"readings\" DROP CONSTRAINT \"readings_pkey\""));
    assert!(sql[3].starts_with("SELECT create_hypertable("));
}

#[tokio::test]
async fn create_without_partition_field_stays_plain() {
    let t = TestMigrator::new();
    let schema = plain_readings("events");
    t.create_base_table(&schema, Some("id"));

    t.migrator.on_table_create(&schema).await.unwrap();

    assert!(!t.engine.is_hypertable(&schema.table));
    assert_eq!(t.statement_count(), 0);
    assert_eq!(t.migrator.state(&schema.table).unwrap(), TableSchemaState::Plain);
}

#[tokio::test]
async fn retained_primary_key_on_partition_column_is_kept() {
    let t = TestMigrator::new();
    let spec = PartitionSpec::new("7 days").unwrap().retaining_primary_key();
    let schema = tidemark_core::TableSchema::new(table("readings"))
        .with_column(ColumnDef::partitioned(ident("time"), spec))
        .with_column(ColumnDef::plain(ident("value"), DataType::Double));
    t.create_base_table(&schema, Some("time"));

    t.migrator.on_table_create(&schema).await.unwrap();

    assert!(t.engine.is_hypertable(&schema.table));
    assert_eq!(t.engine.primary_key(&schema.table).as_deref(), Some("readings_pkey"));
}

#[tokio::test]
async fn retained_incompatible_primary_key_surfaces_engine_error() {
    let t = TestMigrator::new();
    let spec = PartitionSpec::new("1 day").unwrap().retaining_primary_key();
    let schema = plain_readings("readings");
    let schema = tidemark_core::TableSchema {
        columns: vec![
            schema.columns[0].clone(),
            ColumnDef::partitioned(ident("time"), spec),
        ],
        ..schema
    };
    t.create_base_table(&schema, Some("id"));

    let err = t.migrator.on_table_create(&schema).await.unwrap_err();
    match err {
        MigrationError::Engine(EngineError::Database { code, .. }) => {
            assert_eq!(code.as_deref(), Some("TS103"));
        }
        other => panic!("expected engine error, got {other:?}"),
    }
    assert!(!t.engine.is_hypertable(&schema.table));
    assert_eq!(t.migrator.state(&schema.table).unwrap(), TableSchemaState::Plain);
    let registered = t.registry.get(&schema.table).unwrap();
    assert!(registered.column("time").unwrap().partition().is_none());
}

#[tokio::test]
async fn converting_twice_fails_with_already_hypertable() {
    let t = TestMigrator::new();
    let schema = partitioned_readings("readings", "1 day");
    t.create_base_table(&schema, None);
    t.migrator.on_table_create(&schema).await.unwrap();

    let spec = PartitionSpec::new("1 day").unwrap();
    let err = t
        .migrator
        .convert_to_hypertable(&schema.table, &ident("time"), &spec, false)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::AlreadyHypertable(name) if name == "readings"));
}

#[tokio::test]
async fn multiple_partition_fields_convert_on_first_then_fail() {
    let t = TestMigrator::new();
    let schema = partitioned_readings("readings", "1 day").with_column(ColumnDef::partitioned(
        ident("recorded_at"),
        PartitionSpec::new("1 hour").unwrap(),
    ));
    t.create_base_table(&schema, None);

    let err = t.migrator.on_table_create(&schema).await.unwrap_err();
    match err {
        MigrationError::Definition(msg) => assert!(msg.contains("recorded_at"), "{msg}"),
        other => panic!("expected definition error, got {other:?}"),
    }
    assert_eq!(t.engine.partition_column(&schema.table).as_deref(), Some("time"));
    assert_eq!(t.engine.chunk_interval(&schema.table), Some(Interval::days(1)));

    let registered = t.registry.get(&schema.table).unwrap();
    assert_eq!(registered.partition_column().unwrap().name.as_str(), "time");
    assert!(registered.column("recorded_at").unwrap().partition().is_none());
}

#[tokio::test]
async fn adding_partition_field_migrates_existing_rows() {
    let t = TestMigrator::new();
    let base = tidemark_core::TableSchema::new(table("readings"))
        .with_column(ColumnDef::plain(ident("value"), DataType::Double));
    t.create_base_table(&base, None);
    t.migrator.on_table_create(&base).await.unwrap();
    t.engine.insert_rows(&base.table, 100);
    t.engine
        .add_column(&base.table, "time", "timestamp with time zone");

    t.migrator
        .on_field_add(&base.table, &time_column("1 day"))
        .await
        .unwrap();

    assert!(t.engine.is_hypertable(&base.table));
    let create = t
        .engine
        .statements()
        .into_iter()
        .find(|s| s.sql.starts_with("SELECT create_hypertable("))
        .unwrap();
    assert_eq!(create.params[3], tidemark_core::Value::Bool(true));
    assert_eq!(
        t.migrator.state(&base.table).unwrap(),
        TableSchemaState::Hypertable
    );
}

#[tokio::test]
async fn adding_plain_field_only_updates_registry() {
    let t = TestMigrator::new();
    let schema = plain_readings("events");
    t.create_base_table(&schema, None);
    t.migrator.on_table_create(&schema).await.unwrap();

    let note = ColumnDef::plain(ident("note"), DataType::Text);
    t.migrator.on_field_add(&schema.table, &note).await.unwrap();

    assert_eq!(t.statement_count(), 0);
    assert!(t.registry.get(&schema.table).unwrap().column("note").is_some());
}

#[tokio::test]
async fn fresh_table_strategy_is_unsupported() {
    let t = TestMigrator::with_config(MigrationConfig {
        strategy: MigrationStrategy::FreshTable,
        ..MigrationConfig::default()
    });
    let base = tidemark_core::TableSchema::new(table("readings"))
        .with_column(ColumnDef::plain(ident("value"), DataType::Double));
    t.create_base_table(&base, None);
    t.migrator.on_table_create(&base).await.unwrap();

    let err = t
        .migrator
        .on_field_add(&base.table, &time_column("1 day"))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::UnsupportedMigration(_)));
    assert!(!t.engine.is_hypertable(&base.table));
    assert_eq!(t.migrator.state(&base.table).unwrap(), TableSchemaState::Plain);
}

#[tokio::test]
async fn second_partition_field_is_a_definition_error() {
    let t = TestMigrator::new();
    let schema = partitioned_readings("readings", "1 day");
    t.create_base_table(&schema, None);
    t.migrator.on_table_create(&schema).await.unwrap();

    let extra = ColumnDef::partitioned(ident("recorded_at"), PartitionSpec::new("1 hour").unwrap());
    let err = t.migrator.on_field_add(&schema.table, &extra).await.unwrap_err();
    assert!(matches!(err, MigrationError::Definition(_)));
}

#[tokio::test]
async fn altering_plain_field_to_partitioned_converts() {
    let t = TestMigrator::new();
    let schema = plain_readings("readings");
    t.create_base_table(&schema, Some("id"));
    t.migrator.on_table_create(&schema).await.unwrap();
    t.engine.insert_rows(&schema.table, 5);

    let old = ColumnDef::plain(ident("time"), DataType::Timestamptz);
    t.migrator
        .on_field_alter(&schema.table, &old, &time_column("12 hours"))
        .await
        .unwrap();

    assert!(t.engine.is_hypertable(&schema.table));
    assert_eq!(t.engine.chunk_interval(&schema.table), Some(Interval::hours(12)));
    assert!(t.engine.primary_key(&schema.table).is_none());
    assert_eq!(
        t.migrator.state(&schema.table).unwrap(),
        TableSchemaState::Hypertable
    );
}

#[tokio::test]
async fn altering_chunk_interval_updates_hypertable() {
    let t = TestMigrator::new();
    let schema = partitioned_readings("readings", "1 day");
    t.create_base_table(&schema, None);
    t.migrator.on_table_create(&schema).await.unwrap();

    t.migrator
        .on_field_alter(&schema.table, &time_column("1 day"), &time_column("2 days"))
        .await
        .unwrap();

    assert_eq!(t.engine.chunk_interval(&schema.table), Some(Interval::days(2)));
    let last = t.engine.statements().pop().unwrap();
    assert_eq!(
        last.sql,
        "SELECT set_chunk_time_interval($1::regclass, $2::interval)"
    );
    let registered = t.registry.get(&schema.table).unwrap();
    assert_eq!(
        registered
            .partition_column()
            .and_then(|c| c.partition())
            .map(|p| p.chunk_interval),
        Some(Interval::days(2))
    );
}

#[tokio::test]
async fn unchanged_chunk_interval_is_a_no_op() {
    let t = TestMigrator::new();
    let schema = partitioned_readings("readings", "1 day");
    t.create_base_table(&schema, None);
    t.migrator.on_table_create(&schema).await.unwrap();
    let before = t.statement_count();

    t.migrator
        .on_field_alter(&schema.table, &time_column("1 day"), &time_column("1 day"))
        .await
        .unwrap();

    assert_eq!(t.statement_count(), before);
}

#[tokio::test]
async fn altering_chunk_interval_of_plain_table_fails() {
    let t = TestMigrator::new();
    let schema = plain_readings("readings");
    t.create_base_table(&schema, None);
    t.migrator.on_table_create(&schema).await.unwrap();

    let err = t
        .migrator
        .on_field_alter(&schema.table, &time_column("1 day"), &time_column("2 days"))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::NotHypertable(_)));

    let err = t
        .migrator
        .set_chunk_interval(&schema.table, Interval::days(3))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::NotHypertable(_)));
}

#[tokio::test]
async fn partitioned_to_plain_is_unsupported() {
    let t = TestMigrator::new();
    let schema = partitioned_readings("readings", "1 day");
    t.create_base_table(&schema, None);
    t.migrator.on_table_create(&schema).await.unwrap();
    let before = t.statement_count();

    let plain = ColumnDef::plain(ident("time"), DataType::Timestamptz);
    let err = t
        .migrator
        .on_field_alter(&schema.table, &time_column("1 day"), &plain)
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::UnsupportedMigration(_)));
    assert_eq!(t.statement_count(), before);
    assert_eq!(
        t.migrator.state(&schema.table).unwrap(),
        TableSchemaState::Hypertable
    );
}

#[tokio::test]
async fn schema_qualified_table_checks_its_own_schema() {
    let t = TestMigrator::new();
    let schema = partitioned_readings("metrics.readings", "1 hour");
    t.create_base_table(&schema, None);

    t.migrator.on_table_create(&schema).await.unwrap();

    let lookup = &t.engine.statements()[0];
    assert!(lookup.sql.contains("to_regclass($1::text)"));
    assert_eq!(
        lookup.params[0],
        tidemark_core::Value::Text("\"metrics\".\"readings\"".into())
    );
    assert!(t.engine.is_hypertable(&schema.table));
}

#[tokio::test]
async fn prepare_extension_tolerates_missing_privilege() {
    let t = TestMigrator::new();
    t.engine.deny_extension();
    t.migrator.prepare_extension().await.unwrap();
    assert!(!t.engine.extension_installed());

    let ok = TestMigrator::new();
    ok.migrator.prepare_extension().await.unwrap();
    assert!(ok.engine.extension_installed());
}

#[tokio::test]
async fn drop_removes_table_from_registry() {
    let t = TestMigrator::new();
    let schema = partitioned_readings("readings", "1 day");
    t.create_base_table(&schema, None);
    t.migrator.on_table_create(&schema).await.unwrap();

    t.migrator.on_table_drop(&schema.table).await.unwrap();

    assert!(matches!(
        t.migrator.state(&schema.table),
        Err(MigrationError::UnknownTable(_))
    ));
    assert!(matches!(
        t.migrator.on_table_drop(&schema.table).await,
        Err(MigrationError::UnknownTable(_))
    ));
}

#[tokio::test]
async fn hooks_on_unregistered_table_fail() {
    let t = TestMigrator::new();
    let err = t
        .migrator
        .on_field_add(&table("ghost"), &time_column("1 day"))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::UnknownTable(_)));
}
