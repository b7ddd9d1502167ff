//! Compression settings for `ALTER TABLE ... SET (timescaledb.compress ...)`.

use tidemark_core::{normalize_interval, CoreError, Ident, Interval, IntervalInput, OrderBy};

use crate::error::PolicyResult;

/// Storage options applied when enabling compression.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use]
pub struct CompressionSettings {
    segment_by: Vec<String>,
    order_by: Vec<String>,
    chunk_time_interval: Option<IntervalInput>,
    if_not_exists: bool,
}

/// Settings after validation, ready to embed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidatedSettings {
    pub segment_by: Vec<Ident>,
    pub order_by: Vec<OrderBy>,
    pub chunk_time_interval: Option<Interval>,
}

impl CompressionSettings {
    /// Compression with engine defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `compress_segmentby` column.
    pub fn segment_by(mut self, column: impl Into<String>) -> Self {
        self.segment_by.push(column.into());
        self
    }

    /// Add a `compress_orderby` entry such as `"time DESC"` or
    /// `"value NULLS FIRST"`.
    pub fn order_by(mut self, entry: impl Into<String>) -> Self {
        self.order_by.push(entry.into());
        self
    }

    /// Set `compress_chunk_time_interval`.
    pub fn chunk_time_interval(mut self, interval: impl Into<IntervalInput>) -> Self {
        self.chunk_time_interval = Some(interval.into());
        self
    }

    /// Report `false` instead of failing when chunks are already compressed.
    pub const fn if_not_exists(mut self, if_not_exists: bool) -> Self {
        self.if_not_exists = if_not_exists;
        self
    }

    /// Whether an "already compressed" rejection is tolerated.
    #[must_use]
    pub const fn tolerates_existing(&self) -> bool {
        self.if_not_exists
    }

    pub(crate) fn validate(&self) -> PolicyResult<ValidatedSettings> {
        let segment_by = self
            .segment_by
            .iter()
            .map(Ident::new)
            .collect::<Result<Vec<_>, _>>()?;
        let order_by = self
            .order_by
            .iter()
            .map(|entry| parse_order_by(entry))
            .collect::<Result<Vec<_>, _>>()?;
        let chunk_time_interval = self
            .chunk_time_interval
            .clone()
            .map(normalize_interval)
            .transpose()?;
        Ok(ValidatedSettings {
            segment_by,
            order_by,
            chunk_time_interval,
        })
    }
}

/// Parse `column [ASC | DESC] [NULLS FIRST | NULLS LAST]`.
///
/// Keywords are case-insensitive. Anything else is rejected so the entry can
/// be embedded in a storage option.
pub fn parse_order_by(entry: &str) -> PolicyResult<OrderBy> {
    let invalid = || CoreError::invalid_identifier(entry);
    let mut words = entry.split_whitespace();
    let column = Ident::new(words.next().ok_or_else(invalid)?)?;
    let mut order = OrderBy::asc(column);

    let rest: Vec<String> = words.map(str::to_ascii_uppercase).collect();
    let mut rest = rest.iter().map(String::as_str).peekable();
    match rest.peek() {
        Some(&"ASC") => {
            rest.next();
        }
        Some(&"DESC") => {
            order.desc = true;
            rest.next();
        }
        _ => {}
    }
    match (rest.next(), rest.next()) {
        (None, _) => {}
        (Some("NULLS"), Some("FIRST")) => order.nulls_first = Some(true),
        (Some("NULLS"), Some("LAST")) => order.nulls_first = Some(false),
        _ => return Err(invalid().into()),
    }
    if rest.next().is_some() {
        return Err(invalid().into());
    }
    Ok(order)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::PolicyError;
    use proptest::prelude::*;

    #[test]
    fn parses_order_by_entries() {
        let time = Ident::new("time").unwrap();
        assert_eq!(parse_order_by("time").unwrap(), OrderBy::asc(time.clone()));
        assert_eq!(parse_order_by("time desc").unwrap(), OrderBy::desc(time.clone()));
        assert_eq!(
            parse_order_by("time ASC NULLS LAST").unwrap(),
            OrderBy {
                column: time.clone(),
                desc: false,
                nulls_first: Some(false),
            }
        );
        assert_eq!(
            parse_order_by("  time   DESC nulls first ").unwrap(),
            OrderBy {
                column: time,
                desc: true,
                nulls_first: Some(true),
            }
        );
    }

    #[test]
    fn rejects_malformed_order_by() {
        for entry in ["", "time sideways", "time DESC NULLS", "time NULLS FIRST DESC", "t'; DROP"] {
            assert!(
                matches!(parse_order_by(entry), Err(PolicyError::Core(_))),
                "{entry:?} should be rejected"
            );
        }
    }

    #[test]
    fn validate_normalizes_interval() {
        let validated = CompressionSettings::new()
            .segment_by("device_id")
            .order_by("time DESC")
            .chunk_time_interval("24 hours")
            .validate()
            .unwrap();
        assert_eq!(validated.segment_by, vec![Ident::new("device_id").unwrap()]);
        assert_eq!(validated.chunk_time_interval, Some(Interval::hours(24)));
    }

    proptest! {
        #[test]
        fn order_by_never_accepts_quotes(entry in ".*['\"].*") {
            prop_assert!(parse_order_by(&entry).is_err());
        }
    }
}
