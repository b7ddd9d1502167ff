//! Typed query expressions for time-series functions.
//!
//! Expressions form a tree that renders into a [`StatementBuilder`]. Every
//! node reports its [`SqlType`], and the constructors refuse nestings the
//! engine would reject, such as bucketing an aggregate result or averaging
//! a timestamp.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::ident::Ident;
use crate::interval::{divide_interval, Interval};
use crate::statement::{Cast, StatementBuilder};
use crate::value::Value;

/// Datapoints used to derive a gap-fill width when none is given.
pub const DEFAULT_GAPFILL_DATAPOINTS: u32 = 240;

/// Type of an expression's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// Timestamp; `bucket` is set when the value is a bucket start.
    Timestamp {
        /// Width of the bucket that produced this value.
        bucket: Option<Interval>,
    },
    /// Floating point or numeric.
    Numeric,
    /// Integer.
    Integer,
    /// Integer array.
    IntegerArray,
    /// Text.
    Text,
    /// Boolean.
    Boolean,
    /// Interval.
    Interval,
    /// Opaque engine type, e.g. a timevector.
    Unknown,
}

impl SqlType {
    /// A plain (unbucketed) timestamp.
    pub const TIMESTAMP: Self = Self::Timestamp { bucket: None };

    /// Short name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Timestamp { .. } => "timestamp",
            Self::Numeric => "numeric",
            Self::Integer => "integer",
            Self::IntegerArray => "integer[]",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Interval => "interval",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the type is a timestamp, bucketed or not.
    #[must_use]
    pub const fn is_timestamp(self) -> bool {
        matches!(self, Self::Timestamp { .. })
    }

    /// Whether arithmetic aggregates accept this type.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Numeric | Self::Integer)
    }

    /// Whether values of this type have a total order.
    #[must_use]
    pub const fn is_orderable(self) -> bool {
        matches!(
            self,
            Self::Timestamp { .. } | Self::Numeric | Self::Integer | Self::Text | Self::Interval
        )
    }

    /// Bucket width carried by a bucketed timestamp.
    #[must_use]
    pub const fn bucket_width(self) -> Option<Interval> {
        match self {
            Self::Timestamp { bucket } => bucket,
            _ => None,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    /// `avg(x)`
    Avg(Box<Expr>),
    /// `count(x)`
    Count(Box<Expr>),
    /// `count(*)`
    CountAll,
    /// `sum(x)`
    Sum(Box<Expr>),
    /// `min(x)`
    Min(Box<Expr>),
    /// `max(x)`
    Max(Box<Expr>),
    /// `first(value, order)`: value at the smallest `order` in the group.
    First {
        /// Returned value.
        value: Box<Expr>,
        /// Ordering expression.
        order: Box<Expr>,
    },
    /// `last(value, order)`: value at the largest `order` in the group.
    Last {
        /// Returned value.
        value: Box<Expr>,
        /// Ordering expression.
        order: Box<Expr>,
    },
    /// `histogram(value, min, max, buckets)`
    Histogram {
        /// Measured value.
        value: Box<Expr>,
        /// Lower bound of the first regular bucket.
        min: f64,
        /// Upper bound of the last regular bucket.
        max: f64,
        /// Number of regular buckets.
        buckets: u32,
    },
}

impl Aggregate {
    /// SQL function name.
    #[must_use]
    pub const fn function(&self) -> &'static str {
        match self {
            Self::Avg(_) => "avg",
            Self::Count(_) | Self::CountAll => "count",
            Self::Sum(_) => "sum",
            Self::Min(_) => "min",
            Self::Max(_) => "max",
            Self::First { .. } => "first",
            Self::Last { .. } => "last",
            Self::Histogram { .. } => "histogram",
        }
    }

    fn sql_type(&self) -> SqlType {
        match self {
            Self::Avg(_) => SqlType::Numeric,
            Self::Count(_) | Self::CountAll => SqlType::Integer,
            Self::Sum(e) | Self::Min(e) | Self::Max(e) => e.sql_type(),
            Self::First { value, .. } | Self::Last { value, .. } => value.sql_type(),
            Self::Histogram { .. } => SqlType::IntegerArray,
        }
    }

    fn render(&self, b: &mut StatementBuilder) {
        b.push_sql(self.function()).push_sql("(");
        match self {
            Self::CountAll => {
                b.push_sql("*");
            }
            Self::Avg(e) | Self::Count(e) | Self::Sum(e) | Self::Min(e) | Self::Max(e) => {
                e.render(b);
            }
            Self::First { value, order } | Self::Last { value, order } => {
                value.render(b);
                b.push_sql(", ");
                order.render(b);
            }
            Self::Histogram {
                value,
                min,
                max,
                buckets,
            } => {
                value.render(b);
                b.push_sql(", ")
                    .push_bind_cast(*min, Cast::Double)
                    .push_sql(", ")
                    .push_bind_cast(*max, Cast::Double)
                    .push_sql(", ")
                    .push_bind_cast(*buckets, Cast::Integer);
            }
        }
        b.push_sql(")");
    }
}

/// A query expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Table column with its declared type.
    Column {
        /// Column name.
        name: Ident,
        /// Declared type.
        ty: SqlType,
    },
    /// Bound value.
    Value(Value),
    /// Bound interval.
    Interval(Interval),
    /// `time_bucket(width, source)`
    TimeBucket {
        /// Bucket width.
        width: Interval,
        /// Timestamp being bucketed.
        source: Box<Expr>,
    },
    /// `time_bucket_gapfill(width, source, start, end)`
    TimeBucketGapfill {
        /// Bucket width.
        width: Interval,
        /// Timestamp being bucketed.
        source: Box<Expr>,
        /// Inclusive range start.
        start: DateTime<Utc>,
        /// Exclusive range end.
        end: DateTime<Utc>,
    },
    /// Aggregate function call.
    Aggregate(Aggregate),
    /// `lttb(time, value, count)` producing a timevector.
    Lttb {
        /// Time column.
        time: Box<Expr>,
        /// Value column.
        value: Box<Expr>,
        /// Target number of points.
        count: u32,
    },
}

fn mismatch(context: &'static str, expected: &'static str, found: SqlType) -> CoreError {
    CoreError::TypeMismatch {
        context,
        expected,
        found: found.name(),
    }
}

fn require_plain(context: &'static str, expr: &Expr) -> CoreResult<()> {
    if expr.is_aggregate() {
        return Err(CoreError::TypeMismatch {
            context,
            expected: "non-aggregate expression",
            found: "aggregate",
        });
    }
    Ok(())
}

impl Expr {
    /// A column reference.
    #[must_use]
    pub fn column(name: Ident, ty: SqlType) -> Self {
        Self::Column { name, ty }
    }

    /// A bound value.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// `time_bucket(width, source)`. The source must be a timestamp; a
    /// bucketed timestamp may be bucketed again.
    pub fn time_bucket(width: Interval, source: Self) -> CoreResult<Self> {
        if !source.sql_type().is_timestamp() {
            return Err(mismatch("time_bucket", "timestamp", source.sql_type()));
        }
        if width.is_zero() {
            return Err(CoreError::invalid_interval("bucket width must be non-zero"));
        }
        Ok(Self::TimeBucket {
            width,
            source: Box::new(source),
        })
    }

    /// `time_bucket_gapfill(width, source, start, end)` over `[start, end)`.
    pub fn time_bucket_gapfill(
        width: Interval,
        source: Self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CoreResult<Self> {
        if !source.sql_type().is_timestamp() {
            return Err(mismatch("time_bucket_gapfill", "timestamp", source.sql_type()));
        }
        if width.is_zero() {
            return Err(CoreError::invalid_interval("bucket width must be non-zero"));
        }
        Ok(Self::TimeBucketGapfill {
            width,
            source: Box::new(source),
            start,
            end,
        })
    }

    /// `avg(x)` over a numeric expression.
    pub fn avg(expr: Self) -> CoreResult<Self> {
        Self::numeric_aggregate("avg", expr, Aggregate::Avg)
    }

    /// `sum(x)` over a numeric expression.
    pub fn sum(expr: Self) -> CoreResult<Self> {
        Self::numeric_aggregate("sum", expr, Aggregate::Sum)
    }

    /// `count(x)`.
    pub fn count(expr: Self) -> CoreResult<Self> {
        require_plain("count", &expr)?;
        Ok(Self::Aggregate(Aggregate::Count(Box::new(expr))))
    }

    /// `count(*)`.
    #[must_use]
    pub fn count_all() -> Self {
        Self::Aggregate(Aggregate::CountAll)
    }

    /// `min(x)` over an orderable expression.
    pub fn min(expr: Self) -> CoreResult<Self> {
        Self::ordered_aggregate("min", expr, Aggregate::Min)
    }

    /// `max(x)` over an orderable expression.
    pub fn max(expr: Self) -> CoreResult<Self> {
        Self::ordered_aggregate("max", expr, Aggregate::Max)
    }

    /// `first(value, order)`.
    pub fn first(value: Self, order: Self) -> CoreResult<Self> {
        Self::check_first_last("first", &value, &order)?;
        Ok(Self::Aggregate(Aggregate::First {
            value: Box::new(value),
            order: Box::new(order),
        }))
    }

    /// `last(value, order)`.
    pub fn last(value: Self, order: Self) -> CoreResult<Self> {
        Self::check_first_last("last", &value, &order)?;
        Ok(Self::Aggregate(Aggregate::Last {
            value: Box::new(value),
            order: Box::new(order),
        }))
    }

    /// `histogram(value, min, max, buckets)`.
    pub fn histogram(value: Self, min: f64, max: f64, buckets: u32) -> CoreResult<Self> {
        require_plain("histogram", &value)?;
        if !value.sql_type().is_numeric() {
            return Err(mismatch("histogram", "numeric", value.sql_type()));
        }
        Ok(Self::Aggregate(Aggregate::Histogram {
            value: Box::new(value),
            min,
            max,
            buckets,
        }))
    }

    /// `lttb(time, value, count)`.
    pub fn lttb(time: Self, value: Self, count: u32) -> CoreResult<Self> {
        require_plain("lttb", &time)?;
        require_plain("lttb", &value)?;
        if !time.sql_type().is_timestamp() {
            return Err(mismatch("lttb", "timestamp", time.sql_type()));
        }
        if !value.sql_type().is_numeric() {
            return Err(mismatch("lttb", "numeric", value.sql_type()));
        }
        Ok(Self::Lttb {
            time: Box::new(time),
            value: Box::new(value),
            count,
        })
    }

    fn numeric_aggregate(
        context: &'static str,
        expr: Self,
        wrap: fn(Box<Self>) -> Aggregate,
    ) -> CoreResult<Self> {
        require_plain(context, &expr)?;
        if !expr.sql_type().is_numeric() {
            return Err(mismatch(context, "numeric", expr.sql_type()));
        }
        Ok(Self::Aggregate(wrap(Box::new(expr))))
    }

    fn ordered_aggregate(
        context: &'static str,
        expr: Self,
        wrap: fn(Box<Self>) -> Aggregate,
    ) -> CoreResult<Self> {
        require_plain(context, &expr)?;
        if !expr.sql_type().is_orderable() {
            return Err(mismatch(context, "orderable value", expr.sql_type()));
        }
        Ok(Self::Aggregate(wrap(Box::new(expr))))
    }

    fn check_first_last(context: &'static str, value: &Self, order: &Self) -> CoreResult<()> {
        require_plain(context, value)?;
        require_plain(context, order)?;
        if !order.sql_type().is_orderable() {
            return Err(mismatch(context, "orderable value", order.sql_type()));
        }
        Ok(())
    }

    /// Output type of the expression.
    #[must_use]
    pub fn sql_type(&self) -> SqlType {
        match self {
            Self::Column { ty, .. } => *ty,
            Self::Value(value) => match value {
                Value::Null => SqlType::Unknown,
                Value::Bool(_) => SqlType::Boolean,
                Value::Int(_) => SqlType::Integer,
                Value::Float(_) => SqlType::Numeric,
                Value::Text(_) => SqlType::Text,
                Value::Timestamp(_) => SqlType::TIMESTAMP,
                Value::Interval(_) => SqlType::Interval,
                Value::IntArray(_) => SqlType::IntegerArray,
                Value::FloatArray(_) => SqlType::Unknown,
            },
            Self::Interval(_) => SqlType::Interval,
            Self::TimeBucket { width, .. } | Self::TimeBucketGapfill { width, .. } => {
                SqlType::Timestamp {
                    bucket: Some(*width),
                }
            }
            Self::Aggregate(agg) => agg.sql_type(),
            Self::Lttb { .. } => SqlType::Unknown,
        }
    }

    /// Whether the expression is an aggregate (and so needs grouping).
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate(_) | Self::Lttb { .. })
    }

    /// Render into `b`, binding every value.
    pub fn render(&self, b: &mut StatementBuilder) {
        match self {
            Self::Column { name, .. } => {
                b.push_ident(name);
            }
            Self::Value(value) => {
                b.push_bind(value.clone());
            }
            Self::Interval(interval) => {
                b.push_bind_cast(*interval, Cast::Interval);
            }
            Self::TimeBucket { width, source } => {
                b.push_sql("time_bucket(")
                    .push_bind_cast(*width, Cast::Interval)
                    .push_sql(", ");
                source.render(b);
                b.push_sql(")");
            }
            Self::TimeBucketGapfill {
                width,
                source,
                start,
                end,
            } => {
                b.push_sql("time_bucket_gapfill(")
                    .push_bind_cast(*width, Cast::Interval)
                    .push_sql(", ");
                source.render(b);
                b.push_sql(", ")
                    .push_bind_cast(*start, Cast::Timestamptz)
                    .push_sql(", ")
                    .push_bind_cast(*end, Cast::Timestamptz)
                    .push_sql(")");
            }
            Self::Aggregate(agg) => agg.render(b),
            Self::Lttb { time, value, count } => {
                b.push_sql("lttb(");
                time.render(b);
                b.push_sql(", ");
                value.render(b);
                b.push_sql("::double precision, ")
                    .push_bind_cast(*count, Cast::Integer)
                    .push_sql(")");
            }
        }
    }
}

/// Resolve the bucket width of a gap-filled series.
///
/// | interval | datapoints | width |
/// |---|---|---|
/// | given | none | interval |
/// | given | n | interval / n |
/// | none | n | (end - start) / n |
/// | none | none | (end - start) / 240 |
pub fn gapfill_width(
    interval: Option<Interval>,
    datapoints: Option<u32>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> CoreResult<Interval> {
    if end <= start {
        return Err(CoreError::invalid_interval(format!(
            "gap-fill range end {end} must be after start {start}"
        )));
    }
    let width = match (interval, datapoints) {
        (Some(interval), None) => interval,
        (Some(interval), Some(n)) => divide_interval(interval, n)?,
        (None, n) => divide_interval(
            Interval::between(start, end)?,
            n.unwrap_or(DEFAULT_GAPFILL_DATAPOINTS),
        )?,
    };
    if width.is_zero() {
        return Err(CoreError::invalid_interval("gap-fill width rounds to zero"));
    }
    Ok(width)
}
