//! Interval literals in the engine's `(months, days, microseconds)` form.
//!
//! Every duration handed to an administrative call or embedded in a query
//! function goes through [`normalize_interval`], which accepts unit strings
//! (`"1 day"`, `"2 hours 30 minutes"`, `"90s"`, `"01:30:00"`), numeric
//! seconds and structured durations, and produces an [`Interval`]. The
//! `Display` output of an [`Interval`] is its canonical literal, and parsing
//! a canonical literal yields the same value, so canonicalization is
//! idempotent.
//!
//! Fractional units cascade the way PostgreSQL does: a fraction of a year
//! becomes months, a fraction of a month becomes days (30 per month), and a
//! fraction of a day becomes microseconds. Rounding only ever happens at
//! microsecond precision.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, CoreResult};

/// Days the engine assumes per month when carrying fractions.
pub const DAYS_PER_MONTH: i64 = 30;
/// Months per year.
pub const MONTHS_PER_YEAR: i64 = 12;

const MICROS_PER_MILLI: i64 = 1_000;
const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;
const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;

// Fraction digits beyond this are below microsecond precision for every unit.
const MAX_FRACTION_DIGITS: u32 = 15;

/// A time interval as the engine stores it.
///
/// Months and days are kept separate from the sub-day part because their
/// length depends on the calendar; the engine never folds hours into days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interval {
    months: i32,
    days: i32,
    microseconds: i64,
}

impl Interval {
    /// The zero-length interval.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Build an interval from its raw components.
    #[must_use]
    pub const fn new(months: i32, days: i32, microseconds: i64) -> Self {
        Self {
            months,
            days,
            microseconds,
        }
    }

    /// An interval of whole months.
    #[must_use]
    pub const fn months(months: i32) -> Self {
        Self::new(months, 0, 0)
    }

    /// An interval of whole days.
    #[must_use]
    pub const fn days(days: i32) -> Self {
        Self::new(0, days, 0)
    }

    /// An interval of whole hours.
    #[must_use]
    pub const fn hours(hours: i64) -> Self {
        Self::new(0, 0, hours * MICROS_PER_HOUR)
    }

    /// An interval of whole seconds.
    #[must_use]
    pub const fn seconds(seconds: i64) -> Self {
        Self::new(0, 0, seconds * MICROS_PER_SECOND)
    }

    /// The span between two instants, kept entirely in microseconds.
    pub fn between(
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> CoreResult<Self> {
        let micros = (end - start)
            .num_microseconds()
            .ok_or_else(|| CoreError::invalid_interval("time range is too wide"))?;
        Ok(Self::new(0, 0, micros))
    }

    /// Month component.
    #[must_use]
    pub const fn month_part(&self) -> i32 {
        self.months
    }

    /// Day component.
    #[must_use]
    pub const fn day_part(&self) -> i32 {
        self.days
    }

    /// Sub-day component in microseconds.
    #[must_use]
    pub const fn microsecond_part(&self) -> i64 {
        self.microseconds
    }

    /// Whether every component is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.months == 0 && self.days == 0 && self.microseconds == 0
    }

    /// Approximate length in microseconds (30-day months, 24-hour days).
    #[must_use]
    pub fn approx_micros(&self) -> i128 {
        let days = i128::from(self.months) * i128::from(DAYS_PER_MONTH) + i128::from(self.days);
        days * i128::from(MICROS_PER_DAY) + i128::from(self.microseconds)
    }

    fn from_wide(months: i128, days: i128, microseconds: i128) -> CoreResult<Self> {
        let out_of_range = || CoreError::invalid_interval("interval out of range");
        Ok(Self {
            months: i32::try_from(months).map_err(|_| out_of_range())?,
            days: i32::try_from(days).map_err(|_| out_of_range())?,
            microseconds: i64::try_from(microseconds).map_err(|_| out_of_range())?,
        })
    }
}

/// A duration in any of the forms accepted by [`normalize_interval`].
#[derive(Debug, Clone, PartialEq)]
pub enum IntervalInput {
    /// Unit string such as `"1 day"` or `"01:30:00"`.
    Literal(String),
    /// Number of seconds.
    Seconds(f64),
    /// Standard library duration.
    Duration(std::time::Duration),
    /// Signed chrono duration.
    Delta(chrono::TimeDelta),
    /// Already-normalized interval.
    Interval(Interval),
}

impl From<&str> for IntervalInput {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_owned())
    }
}

impl From<String> for IntervalInput {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

impl From<&String> for IntervalInput {
    fn from(value: &String) -> Self {
        Self::Literal(value.clone())
    }
}

impl From<f64> for IntervalInput {
    fn from(value: f64) -> Self {
        Self::Seconds(value)
    }
}

impl From<i64> for IntervalInput {
    fn from(value: i64) -> Self {
        Self::Seconds(value as f64)
    }
}

impl From<std::time::Duration> for IntervalInput {
    fn from(value: std::time::Duration) -> Self {
        Self::Duration(value)
    }
}

impl From<chrono::TimeDelta> for IntervalInput {
    fn from(value: chrono::TimeDelta) -> Self {
        Self::Delta(value)
    }
}

impl From<Interval> for IntervalInput {
    fn from(value: Interval) -> Self {
        Self::Interval(value)
    }
}

/// Normalize any accepted duration form into an [`Interval`].
///
/// Fails with [`CoreError::InvalidInterval`] when the input cannot be parsed
/// as a duration or does not fit the engine's interval range.
pub fn normalize_interval(value: impl Into<IntervalInput>) -> CoreResult<Interval> {
    match value.into() {
        IntervalInput::Literal(text) => text.parse(),
        IntervalInput::Seconds(secs) => {
            if !secs.is_finite() {
                return Err(CoreError::invalid_interval(format!("{secs} seconds")));
            }
            let micros = (secs * 1e6).round();
            if micros.abs() >= i64::MAX as f64 {
                return Err(CoreError::invalid_interval("interval out of range"));
            }
            Ok(Interval::new(0, 0, micros as i64))
        }
        IntervalInput::Duration(duration) => {
            let micros = i64::try_from(duration.as_micros())
                .map_err(|_| CoreError::invalid_interval("interval out of range"))?;
            Ok(Interval::new(0, 0, micros))
        }
        IntervalInput::Delta(delta) => {
            let micros = delta
                .num_microseconds()
                .ok_or_else(|| CoreError::invalid_interval("interval out of range"))?;
            Ok(Interval::new(0, 0, micros))
        }
        IntervalInput::Interval(interval) => Ok(interval),
    }
}

/// Divide an interval by `n` with the engine's carry semantics.
///
/// The month remainder is carried into days at 30 days per month and the day
/// remainder into microseconds, so `1 month / 240` is exactly `3 hours`.
/// Only the final microsecond value is rounded.
pub fn divide_interval(interval: Interval, n: u32) -> CoreResult<Interval> {
    if n == 0 {
        return Err(CoreError::invalid_interval("division of interval by zero"));
    }
    let n = i128::from(n);

    let months = i128::from(interval.months);
    let days = i128::from(interval.days) + (months % n) * i128::from(DAYS_PER_MONTH);
    let micros = i128::from(interval.microseconds) + (days % n) * i128::from(MICROS_PER_DAY);

    Interval::from_wide(months / n, days / n, div_round(micros, n))
}

/// Divide rounding half away from zero. `d` must be positive.
fn div_round(n: i128, d: i128) -> i128 {
    let q = n / d;
    let r = n % d;
    if 2 * r.abs() >= d {
        q + n.signum()
    } else {
        q
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Microsecond,
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
    Decade,
    Century,
    Millennium,
}

impl Unit {
    fn parse(word: &str) -> Option<Self> {
        let unit = match word.to_ascii_lowercase().as_str() {
            "us" | "usec" | "usecs" | "microsecond" | "microseconds" => Self::Microsecond,
            "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => Self::Millisecond,
            "s" | "sec" | "secs" | "second" | "seconds" => Self::Second,
            "m" | "min" | "mins" | "minute" | "minutes" => Self::Minute,
            "h" | "hr" | "hrs" | "hour" | "hours" => Self::Hour,
            "d" | "day" | "days" => Self::Day,
            "w" | "week" | "weeks" => Self::Week,
            "mon" | "mons" | "month" | "months" => Self::Month,
            "y" | "yr" | "yrs" | "year" | "years" => Self::Year,
            "decade" | "decades" => Self::Decade,
            "century" | "centuries" => Self::Century,
            "millennium" | "millennia" | "millenniums" => Self::Millennium,
            _ => return None,
        };
        Some(unit)
    }
}

/// A signed decimal `mantissa / 10^scale`.
#[derive(Debug, Clone, Copy)]
struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    fn parse(text: &str) -> Option<Self> {
        let (negative, digits) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        let frac_part = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS as usize)];
        let mut mantissa: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            mantissa = mantissa
                .checked_mul(10)?
                .checked_add(i128::from(b - b'0'))?;
        }
        let scale = u32::try_from(frac_part.len()).ok()?;
        Some(Self {
            mantissa: if negative { -mantissa } else { mantissa },
            scale,
        })
    }

    fn denominator(self) -> i128 {
        10_i128.pow(self.scale)
    }
}

/// Accumulates parsed components with room to spare before range checking.
#[derive(Debug, Default)]
struct Accumulator {
    months: i128,
    days: i128,
    micros: i128,
}

impl Accumulator {
    /// Add `value` of `unit`; `None` when an intermediate leaves `i128`.
    fn add(&mut self, value: Decimal, unit: Unit) -> Option<()> {
        let den = value.denominator();
        let n = value.mantissa;
        let years = |per_year: i128| n.checked_mul(per_year * i128::from(MONTHS_PER_YEAR));
        match unit {
            Unit::Microsecond => self.add_micros(n, 1, den),
            Unit::Millisecond => self.add_micros(n, MICROS_PER_MILLI, den),
            Unit::Second => self.add_micros(n, MICROS_PER_SECOND, den),
            Unit::Minute => self.add_micros(n, MICROS_PER_MINUTE, den),
            Unit::Hour => self.add_micros(n, MICROS_PER_HOUR, den),
            Unit::Day => self.add_days(n, den),
            Unit::Week => self.add_days(n.checked_mul(7)?, den),
            Unit::Month => self.add_months(n, den),
            Unit::Year => self.add_months(years(1)?, den),
            Unit::Decade => self.add_months(years(10)?, den),
            Unit::Century => self.add_months(years(100)?, den),
            Unit::Millennium => self.add_months(years(1000)?, den),
        }
    }

    fn add_micros(&mut self, n: i128, per_unit: i64, den: i128) -> Option<()> {
        let micros = div_round(n.checked_mul(i128::from(per_unit))?, den);
        self.micros = self.micros.checked_add(micros)?;
        Some(())
    }

    fn add_days(&mut self, n: i128, den: i128) -> Option<()> {
        self.days = self.days.checked_add(n / den)?;
        self.add_micros(n % den, MICROS_PER_DAY, den)
    }

    fn add_months(&mut self, n: i128, den: i128) -> Option<()> {
        self.months = self.months.checked_add(n / den)?;
        self.add_days((n % den) * i128::from(DAYS_PER_MONTH), den)
    }

    fn negate(&mut self) {
        self.months = -self.months;
        self.days = -self.days;
        self.micros = -self.micros;
    }
}

fn parse_clock(token: &str, input: &str) -> CoreResult<i128> {
    let invalid = || CoreError::invalid_interval(format!("{input:?}: bad time field {token:?}"));
    let (negative, body) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };

    let fields: Vec<&str> = body.split(':').collect();
    if fields.len() < 2 || fields.len() > 3 {
        return Err(invalid());
    }
    let whole = |s: &str| -> CoreResult<i128> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        s.parse::<i128>().map_err(|_| invalid())
    };

    let hours = whole(fields[0])?;
    let minutes = whole(fields[1])?;
    let seconds = match fields.get(2) {
        Some(s) => {
            let dec = Decimal::parse(s).filter(|d| d.mantissa >= 0).ok_or_else(invalid)?;
            let micros = dec
                .mantissa
                .checked_mul(i128::from(MICROS_PER_SECOND))
                .ok_or_else(invalid)?;
            div_round(micros, dec.denominator())
        }
        None => 0,
    };

    let micros = hours
        .checked_mul(i128::from(MICROS_PER_HOUR))
        .and_then(|h| h.checked_add(minutes.checked_mul(i128::from(MICROS_PER_MINUTE))?))
        .and_then(|hm| hm.checked_add(seconds))
        .ok_or_else(invalid)?;
    Ok(if negative { -micros } else { micros })
}

/// Split `"90s"` into `("90", "s")`; the unit may be empty.
fn split_number(token: &str) -> (&str, &str) {
    let end = token
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || ((c == '-' || c == '+') && i == 0)))
        .map_or(token.len(), |(i, _)| i);
    token.split_at(end)
}

fn out_of_range(input: &str) -> CoreError {
    CoreError::invalid_interval(format!("{input:?}: interval out of range"))
}

fn parse_interval(input: &str) -> CoreResult<Interval> {
    let text = input.trim();
    let text = text.strip_prefix('@').unwrap_or(text).trim();
    if text.is_empty() {
        return Err(CoreError::invalid_interval("empty interval literal"));
    }

    let mut tokens: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    let ago = tokens
        .last()
        .is_some_and(|t| t.eq_ignore_ascii_case("ago"));
    if ago {
        tokens.pop();
    }

    let mut acc = Accumulator::default();
    let mut seen_any = false;
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        if token.contains(':') {
            acc.micros = acc
                .micros
                .checked_add(parse_clock(token, input)?)
                .ok_or_else(|| out_of_range(input))?;
            seen_any = true;
            continue;
        }

        let (number, unit) = split_number(token);
        let value = Decimal::parse(number).ok_or_else(|| {
            CoreError::invalid_interval(format!("{input:?}: expected a number, found {token:?}"))
        })?;

        let unit = if unit.is_empty() {
            match iter.peek() {
                Some(next) if Unit::parse(next).is_some() => iter.next().and_then(Unit::parse),
                // A lone number is a count of seconds.
                None if !seen_any => Some(Unit::Second),
                _ => None,
            }
        } else {
            Unit::parse(unit)
        };
        let unit = unit.ok_or_else(|| {
            CoreError::invalid_interval(format!("{input:?}: missing or unknown unit after {number}"))
        })?;

        acc.add(value, unit).ok_or_else(|| out_of_range(input))?;
        seen_any = true;
    }

    if !seen_any {
        return Err(CoreError::invalid_interval(format!("{input:?}: no quantities")));
    }
    if ago {
        acc.negate();
    }
    Interval::from_wide(acc.months, acc.days, acc.micros)
}

impl FromStr for Interval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_interval(s)
    }
}

fn write_unit(out: &mut Vec<String>, value: i64, unit: &str) {
    if value == 0 {
        return;
    }
    let plural = if value.unsigned_abs() == 1 { "" } else { "s" };
    out.push(format!("{value} {unit}{plural}"));
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0 seconds");
        }

        let mut parts = Vec::new();
        let months = i64::from(self.months);
        write_unit(&mut parts, months / MONTHS_PER_YEAR, "year");
        write_unit(&mut parts, months % MONTHS_PER_YEAR, "month");
        write_unit(&mut parts, i64::from(self.days), "day");

        let sign = if self.microseconds < 0 { "-" } else { "" };
        let abs = self.microseconds.unsigned_abs();
        let per_hour = MICROS_PER_HOUR.unsigned_abs();
        let per_minute = MICROS_PER_MINUTE.unsigned_abs();
        let per_second = MICROS_PER_SECOND.unsigned_abs();

        let hours = abs / per_hour;
        let minutes = abs % per_hour / per_minute;
        let seconds = abs % per_minute / per_second;
        let micros = abs % per_second;

        for (value, unit) in [(hours, "hour"), (minutes, "minute")] {
            if value > 0 {
                let plural = if value == 1 { "" } else { "s" };
                parts.push(format!("{sign}{value} {unit}{plural}"));
            }
        }
        if micros > 0 {
            let frac = format!("{micros:06}");
            parts.push(format!(
                "{sign}{seconds}.{} seconds",
                frac.trim_end_matches('0')
            ));
        } else if seconds > 0 {
            let plural = if seconds == 1 { "" } else { "s" };
            parts.push(format!("{sign}{seconds} second{plural}"));
        }

        f.write_str(&parts.join(" "))
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IntervalVisitor;

        impl Visitor<'_> for IntervalVisitor {
            type Value = Interval;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an interval literal or a number of seconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Interval, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Interval, E> {
                normalize_interval(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Interval, E> {
                normalize_interval(v as f64).map_err(E::custom)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Interval, E> {
                normalize_interval(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(IntervalVisitor)
    }
}
