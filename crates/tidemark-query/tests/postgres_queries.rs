//! Query pipeline tests against a live TimescaleDB.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`. The
//! downsampling test also needs the `timescaledb_toolkit` extension.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{at, readings_named};
use tidemark_core::{Command, DatabaseConfig, Engine, Expr, PgEngine, Statement, Value};
use tidemark_query::Pipeline;

async fn engine() -> PgEngine {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    PgEngine::connect(&DatabaseConfig {
        url,
        ..DatabaseConfig::default()
    })
    .await
    .expect("failed to connect")
}

async fn raw(engine: &PgEngine, sql: &str) {
    engine
        .run(&Command::Query(Statement::raw(sql)))
        .await
        .unwrap();
}

async fn readings_table(engine: &PgEngine, name: &str) -> Pipeline {
    raw(engine, "CREATE EXTENSION IF NOT EXISTS timescaledb").await;
    raw(engine, &format!("DROP TABLE IF EXISTS {name}")).await;
    raw(
        engine,
        &format!(
            "CREATE TABLE {name} (time timestamptz NOT NULL, device text, \
             temperature double precision, status integer)"
        ),
    )
    .await;
    raw(engine, &format!("SELECT create_hypertable('{name}', 'time')")).await;
    Pipeline::for_table(&readings_named(name)).unwrap()
}

#[tokio::test]
#[ignore = "requires TimescaleDB (set DATABASE_URL)"]
async fn gapfill_returns_a_row_for_every_month() {
    let engine = engine().await;
    let p = readings_table(&engine, "tidemark_gapfill_scratch").await;
    raw(
        &engine,
        "INSERT INTO tidemark_gapfill_scratch (time, device, temperature) VALUES \
         ('2024-01-10T00:00:00Z', 'a', 20.0), ('2024-01-20T00:00:00Z', 'a', 22.0), \
         ('2024-03-15T00:00:00Z', 'a', 19.0)",
    )
    .await;

    let avg = Expr::avg(p.column("temperature").unwrap()).unwrap();
    let monthly = p
        .bucket_gapfill("time", Some("1 month".into()), at(2024, 1, 1), at(2024, 4, 1), Some(1))
        .unwrap()
        .annotate("avg_temp", avg)
        .unwrap();
    let records = monthly.to_plain_sequence(&engine, false).await.unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].get("bucket"), Some(&Value::Timestamp(at(2024, 3, 1))));
    assert_eq!(records[0].get("avg_temp"), Some(&Value::Float(19.0)));
    assert_eq!(records[1].get("bucket"), Some(&Value::Timestamp(at(2024, 2, 1))));
    assert_eq!(records[1].get("avg_temp"), Some(&Value::Null));
    assert_eq!(records[2].get("bucket"), Some(&Value::Timestamp(at(2024, 1, 1))));
    assert_eq!(records[2].get("avg_temp"), Some(&Value::Float(21.0)));

    raw(&engine, "DROP TABLE tidemark_gapfill_scratch").await;
}

#[tokio::test]
#[ignore = "requires TimescaleDB (set DATABASE_URL)"]
async fn histogram_counts_and_empty_input() {
    let engine = engine().await;
    let p = readings_table(&engine, "tidemark_histogram_scratch").await;

    let hist = p.histogram("temperature", 0.0, 100.0, 5).unwrap();
    assert_eq!(hist.fetch_histogram(&engine).await.unwrap(), vec![0; 7]);

    raw(
        &engine,
        "INSERT INTO tidemark_histogram_scratch (time, temperature) VALUES \
         (now(), -5), (now(), 10), (now(), 30), (now(), 35), (now(), 150)",
    )
    .await;
    assert_eq!(
        hist.fetch_histogram(&engine).await.unwrap(),
        vec![1, 1, 2, 0, 0, 0, 1]
    );

    raw(&engine, "DROP TABLE tidemark_histogram_scratch").await;
}

#[tokio::test]
#[ignore = "requires TimescaleDB (set DATABASE_URL)"]
async fn downsample_returns_at_most_target_points_in_time_order() {
    let engine = engine().await;
    raw(&engine, "CREATE EXTENSION IF NOT EXISTS timescaledb_toolkit").await;
    let p = readings_table(&engine, "tidemark_lttb_scratch").await;
    raw(
        &engine,
        "INSERT INTO tidemark_lttb_scratch (time, temperature) \
         SELECT '2024-01-01T00:00:00Z'::timestamptz + n * interval '1 minute', sin(n / 10.0) \
         FROM generate_series(0, 999) AS n",
    )
    .await;

    let records = p
        .downsample("time", "temperature", 20)
        .unwrap()
        .to_plain_sequence(&engine, false)
        .await
        .unwrap();

    assert!(!records.is_empty() && records.len() <= 20, "{} points", records.len());
    let times: Vec<_> = records
        .iter()
        .map(|r| match r.get("time") {
            Some(Value::Timestamp(ts)) => *ts,
            other => panic!("expected timestamp, got {other:?}"),
        })
        .collect();
    assert!(times.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(times[0], at(2024, 1, 1));

    raw(&engine, "DROP TABLE tidemark_lttb_scratch").await;
}
