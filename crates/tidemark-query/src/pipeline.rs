//! Immutable query pipelines over a hypertable.
//!
//! A [`Pipeline`] starts from a declared [`TableSchema`] and is shaped by
//! one of [`bucket`](Pipeline::bucket), [`bucket_gapfill`](Pipeline::bucket_gapfill),
//! [`histogram`](Pipeline::histogram) or [`downsample`](Pipeline::downsample).
//! Every method returns a new pipeline, so a pipeline can be kept and used
//! as the base of several queries.
//!
//! Numeric aggregates are cast to `double precision` and integer ones to
//! `bigint` so that results decode without arbitrary-precision numerics.

use chrono::{DateTime, Utc};
use tidemark_core::{
    gapfill_width, normalize_interval, Command, Engine, Expr, Ident, IntervalInput, Row, SqlType,
    Statement, StatementBuilder, TableName, TableSchema, Value,
};

use crate::annotations::{Annotations, BUCKET_COLUMN};
use crate::error::{QueryError, QueryResult};
use crate::filter::{Comparison, Filter};

/// Regular buckets used by [`Pipeline::histogram`] callers that have no preference.
pub const DEFAULT_HISTOGRAM_BUCKETS: u32 = 5;

/// One output record: column name → value in select-list order.
pub type Record = Row;

#[derive(Debug, Clone, PartialEq)]
enum Shape {
    /// Raw rows, or whole-table aggregates when annotated.
    Rows,
    /// `time_bucket` or `time_bucket_gapfill` grouping.
    Bucket(Expr),
    /// Single `histogram` aggregate.
    Histogram { expr: Expr, buckets: u32 },
    /// `lttb` timevector unnested into rows.
    Downsample { time: Ident, value: Ident, lttb: Expr },
}

/// A composable read query over one hypertable.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "pipelines do nothing until rendered or executed"]
pub struct Pipeline {
    table: TableName,
    columns: Vec<(Ident, SqlType)>,
    partition: Ident,
    shape: Shape,
    annotations: Annotations,
    filters: Vec<Filter>,
}

impl Pipeline {
    /// Start a pipeline over a table with a partitioned column.
    pub fn for_table(schema: &TableSchema) -> QueryResult<Self> {
        let partition = schema
            .partition_column()
            .ok_or_else(|| QueryError::NoPartitionField(schema.table.to_string()))?;
        Ok(Self {
            table: schema.table.clone(),
            columns: schema
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.data_type.sql_type()))
                .collect(),
            partition: partition.name.clone(),
            shape: Shape::Rows,
            annotations: Annotations::new(),
            filters: Vec::new(),
        })
    }

    /// Queried table.
    #[must_use]
    pub const fn table(&self) -> &TableName {
        &self.table
    }

    /// The table's partitioned column.
    #[must_use]
    pub const fn partition_field(&self) -> &Ident {
        &self.partition
    }

    /// Annotations attached so far.
    #[must_use]
    pub const fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// A column of the table as a typed expression, for building annotations.
    pub fn column(&self, name: &str) -> QueryResult<Expr> {
        let (ident, ty) = self.lookup(name)?;
        Ok(Expr::column(ident.clone(), *ty))
    }

    /// Group rows into `interval`-wide buckets of `field`.
    ///
    /// Yields `(bucket, ...annotations)` ordered by bucket, newest first.
    /// `annotations` are merged after any already attached.
    pub fn bucket(
        &self,
        field: &str,
        interval: impl Into<IntervalInput>,
        annotations: &Annotations,
    ) -> QueryResult<Self> {
        let width = normalize_interval(interval)?;
        let bucket = Expr::time_bucket(width, self.column(field)?)?;
        self.with_bucket(bucket, annotations)
    }

    /// Gap-filled buckets of `field` across `[start, end)`.
    ///
    /// The width is `interval`, divided by `datapoints` when both are
    /// given; without an interval the range is split into `datapoints`
    /// (default 240) buckets. The engine emits one row per bucket and NULL
    /// aggregates for empty ones. The range is also applied as a predicate.
    pub fn bucket_gapfill(
        &self,
        field: &str,
        interval: Option<IntervalInput>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        datapoints: Option<u32>,
    ) -> QueryResult<Self> {
        let interval = interval.map(normalize_interval).transpose()?;
        let width = gapfill_width(interval, datapoints, start, end)?;
        let (ident, _) = self.lookup(field)?;
        let ident = ident.clone();
        let bucket = Expr::time_bucket_gapfill(width, self.column(field)?, start, end)?;

        tracing::debug!(table = %self.table, field, width = %width, "gap-fill bucket width");

        let mut next = self.with_bucket(bucket, &Annotations::new())?;
        next.filters
            .push(Filter::new(ident.clone(), Comparison::Ge, start.into())?);
        next.filters
            .push(Filter::new(ident, Comparison::Lt, end.into())?);
        Ok(next)
    }

    /// Counts of `field` in `num_buckets` equal-width buckets over `[min, max)`.
    ///
    /// The result has `num_buckets + 2` slots: underflow first, overflow last.
    pub fn histogram(&self, field: &str, min: f64, max: f64, num_buckets: u32) -> QueryResult<Self> {
        self.require_unshaped("histogram")?;
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(QueryError::invalid_shape(format!(
                "histogram bounds must be finite with min < max, got [{min}, {max})"
            )));
        }
        if num_buckets == 0 {
            return Err(QueryError::invalid_shape("histogram needs at least one bucket"));
        }
        let expr = Expr::histogram(self.column(field)?, min, max, num_buckets)?;
        Ok(self.reshaped(Shape::Histogram {
            expr,
            buckets: num_buckets,
        }))
    }

    /// Reduce the series to at most `target_count` points with
    /// largest-triangle-three-buckets, in time order.
    pub fn downsample(&self, time_field: &str, value_field: &str, target_count: u32) -> QueryResult<Self> {
        self.require_unshaped("downsample")?;
        if target_count == 0 {
            return Err(QueryError::invalid_shape("downsample target must be positive"));
        }
        let lttb = Expr::lttb(self.column(time_field)?, self.column(value_field)?, target_count)?;
        let (time, _) = self.lookup(time_field)?;
        let (value, _) = self.lookup(value_field)?;
        Ok(self.reshaped(Shape::Downsample {
            time: time.clone(),
            value: value.clone(),
            lttb,
        }))
    }

    /// Attach an aggregate column.
    pub fn annotate(&self, name: &str, expr: Expr) -> QueryResult<Self> {
        if !matches!(self.shape, Shape::Rows | Shape::Bucket(_)) {
            return Err(QueryError::invalid_shape(
                "only row and bucket pipelines take annotations",
            ));
        }
        let mut next = self.clone();
        next.annotations.insert(name, expr)?;
        Ok(next)
    }

    /// Keep rows where `column <op> value`.
    pub fn filter(&self, column: &str, op: Comparison, value: impl Into<Value>) -> QueryResult<Self> {
        let (ident, _) = self.lookup(column)?;
        let filter = Filter::new(ident.clone(), op, value.into())?;
        let mut next = self.clone();
        next.filters.push(filter);
        Ok(next)
    }

    /// Keep rows whose partitioned column falls in `[start, end)`.
    pub fn time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResult<Self> {
        if end <= start {
            return Err(QueryError::invalid_shape(format!(
                "time range end {end} must be after start {start}"
            )));
        }
        let field = self.partition.as_str().to_owned();
        self.filter(&field, Comparison::Ge, start)?
            .filter(&field, Comparison::Lt, end)
    }

    /// Render the parameterized statement.
    #[must_use]
    pub fn statement(&self) -> Statement {
        let mut b = StatementBuilder::new();
        match &self.shape {
            Shape::Rows => {
                b.push_sql("SELECT ");
                if self.annotations.is_empty() {
                    b.push_sql("*");
                } else {
                    b.push_separated(self.annotations.iter(), ", ", |b, (name, expr)| {
                        push_aggregate(b, expr);
                        b.push_sql(" AS ").push_ident(name);
                    });
                }
                self.push_from(&mut b);
                if self.annotations.is_empty() {
                    b.push_sql(" ORDER BY ")
                        .push_ident(&self.partition)
                        .push_sql(" DESC");
                }
            }
            Shape::Bucket(bucket) => {
                b.push_sql("SELECT ");
                bucket.render(&mut b);
                b.push_sql(r#" AS "bucket""#);
                for (name, expr) in self.annotations.iter() {
                    b.push_sql(", ");
                    push_aggregate(&mut b, expr);
                    b.push_sql(" AS ").push_ident(name);
                }
                self.push_from(&mut b);
                b.push_sql(" GROUP BY 1 ORDER BY 1 DESC");
            }
            Shape::Histogram { expr, .. } => {
                b.push_sql("SELECT ");
                expr.render(&mut b);
                b.push_sql(r#" AS "histogram""#);
                self.push_from(&mut b);
            }
            Shape::Downsample { time, value, lttb } => {
                b.push_sql(r#"SELECT u."time" AS "#)
                    .push_ident(time)
                    .push_sql(r#", u."value" AS "#)
                    .push_ident(value)
                    .push_sql(" FROM unnest((SELECT ");
                lttb.render(&mut b);
                self.push_from(&mut b);
                b.push_sql(")) AS u ORDER BY 1");
            }
        }
        b.build()
    }

    /// Run the pipeline and return its records in order.
    ///
    /// With `normalize_timestamps`, `bucket` values become RFC 3339 strings.
    pub async fn to_plain_sequence(
        &self,
        engine: &dyn Engine,
        normalize_timestamps: bool,
    ) -> QueryResult<Vec<Record>> {
        let statement = self.statement();
        tracing::debug!(
            table = %self.table,
            params = statement.params.len(),
            "running query pipeline"
        );
        let mut records = engine.run(&Command::Query(statement)).await?;
        if normalize_timestamps {
            for record in &mut records {
                normalize_bucket(record);
            }
        }
        Ok(records)
    }

    /// Run a histogram pipeline and return its `num_buckets + 2` counts.
    ///
    /// No matching rows yields all zeros.
    pub async fn fetch_histogram(&self, engine: &dyn Engine) -> QueryResult<Vec<i64>> {
        let Shape::Histogram { buckets, .. } = &self.shape else {
            return Err(QueryError::invalid_shape(
                "fetch_histogram needs a histogram pipeline",
            ));
        };
        let expected = *buckets as usize + 2;
        let records = self.to_plain_sequence(engine, false).await?;
        let value = records
            .first()
            .and_then(|r| r.get_index(0))
            .cloned()
            .unwrap_or(Value::Null);
        match value {
            Value::Null => Ok(vec![0; expected]),
            Value::IntArray(counts) if counts.len() == expected => Ok(counts),
            Value::IntArray(counts) => Err(QueryError::unexpected(format!(
                "histogram returned {} buckets, expected {expected}",
                counts.len()
            ))),
            other => Err(QueryError::unexpected(format!(
                "histogram returned {}, expected an integer array",
                other.type_name()
            ))),
        }
    }

    fn lookup(&self, name: &str) -> QueryResult<&(Ident, SqlType)> {
        self.columns
            .iter()
            .find(|(ident, _)| ident.as_str() == name)
            .ok_or_else(|| QueryError::UnknownColumn {
                table: self.table.to_string(),
                column: name.to_owned(),
            })
    }

    fn require_unshaped(&self, op: &str) -> QueryResult<()> {
        if self.shape != Shape::Rows || !self.annotations.is_empty() {
            return Err(QueryError::invalid_shape(format!(
                "{op} needs a pipeline without buckets or annotations"
            )));
        }
        Ok(())
    }

    fn with_bucket(&self, bucket: Expr, annotations: &Annotations) -> QueryResult<Self> {
        if !matches!(self.shape, Shape::Rows | Shape::Bucket(_)) {
            return Err(QueryError::invalid_shape(
                "cannot bucket a histogram or downsampled pipeline",
            ));
        }
        let annotations = self.annotations.merge(annotations)?;
        let mut next = self.reshaped(Shape::Bucket(bucket));
        next.annotations = annotations;
        Ok(next)
    }

    fn reshaped(&self, shape: Shape) -> Self {
        Self {
            shape,
            ..self.clone()
        }
    }

    fn push_from(&self, b: &mut StatementBuilder) {
        b.push_sql(" FROM ").push_table(&self.table);
        if !self.filters.is_empty() {
            b.push_sql(" WHERE ");
            b.push_separated(&self.filters, " AND ", |b, filter| filter.render(b));
        }
    }
}

fn push_aggregate(b: &mut StatementBuilder, expr: &Expr) {
    let cast = match expr.sql_type() {
        SqlType::Numeric => Some("double precision"),
        SqlType::Integer => Some("bigint"),
        _ => None,
    };
    match cast {
        Some(cast) => {
            b.push_sql("(");
            expr.render(b);
            b.push_sql(")::").push_sql(cast);
        }
        None => expr.render(b),
    }
}

fn normalize_bucket(record: &mut Record) {
    if let Some(value) = record.get_mut(BUCKET_COLUMN) {
        if let Value::Timestamp(ts) = *value {
            *value = Value::Text(ts.to_rfc3339());
        }
    }
}
