//! Policy arguments.

use chrono::{DateTime, Utc};
use tidemark_core::{normalize_interval, IntervalInput, PolicyCall, PolicyKind, TableName, Threshold};

use crate::error::{PolicyError, PolicyResult};

/// Arguments shared by `add_retention_policy` and `add_compression_policy`.
///
/// Durations are kept as given and normalized when the policy is added, so
/// an unparseable duration fails the add call rather than the builder.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use]
pub struct PolicyOptions {
    after: Option<IntervalInput>,
    created_before: Option<IntervalInput>,
    schedule_interval: Option<IntervalInput>,
    initial_start: Option<DateTime<Utc>>,
    timezone: Option<String>,
    if_not_exists: bool,
}

impl PolicyOptions {
    /// No threshold, engine defaults for everything else.
    pub fn new() -> Self {
        Self::default()
    }

    /// Act on chunks whose time range ends more than `interval` ago
    /// (`drop_after` / `compress_after`).
    pub fn after(mut self, interval: impl Into<IntervalInput>) -> Self {
        self.after = Some(interval.into());
        self
    }

    /// Act on chunks created more than `interval` ago
    /// (`drop_created_before` / `compress_created_before`).
    pub fn created_before(mut self, interval: impl Into<IntervalInput>) -> Self {
        self.created_before = Some(interval.into());
        self
    }

    /// How often the policy job runs.
    pub fn schedule_interval(mut self, interval: impl Into<IntervalInput>) -> Self {
        self.schedule_interval = Some(interval.into());
        self
    }

    /// When the job first runs.
    pub const fn initial_start(mut self, start: DateTime<Utc>) -> Self {
        self.initial_start = Some(start);
        self
    }

    /// Timezone used to schedule the job.
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Return the existing job instead of failing when one is scheduled.
    pub const fn if_not_exists(mut self, if_not_exists: bool) -> Self {
        self.if_not_exists = if_not_exists;
        self
    }

    /// Validate and normalize into engine call arguments.
    ///
    /// Both thresholds is a [`PolicyError::ConflictingThreshold`]. Neither
    /// is left for the engine to reject.
    pub fn to_call(&self, kind: PolicyKind, table: &TableName) -> PolicyResult<PolicyCall> {
        let threshold = match (&self.after, &self.created_before) {
            (Some(_), Some(_)) => {
                return Err(PolicyError::ConflictingThreshold {
                    kind,
                    after: kind.after_arg(),
                    created_before: kind.created_before_arg(),
                })
            }
            (Some(after), None) => Some(Threshold::After(normalize_interval(after.clone())?)),
            (None, Some(before)) => Some(Threshold::CreatedBefore(normalize_interval(
                before.clone(),
            )?)),
            (None, None) => None,
        };
        let schedule_interval = self
            .schedule_interval
            .clone()
            .map(normalize_interval)
            .transpose()?;

        Ok(PolicyCall {
            kind,
            table: table.clone(),
            threshold,
            schedule_interval,
            initial_start: self.initial_start,
            timezone: self.timezone.clone(),
            if_not_exists: self.if_not_exists,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tidemark_core::{CoreError, Interval};

    fn readings() -> TableName {
        TableName::parse("readings").unwrap()
    }

    #[test]
    fn normalizes_durations() {
        let call = PolicyOptions::new()
            .after(30 * 86_400_i64)
            .schedule_interval(std::time::Duration::from_secs(3600))
            .timezone("Europe/London")
            .if_not_exists(true)
            .to_call(PolicyKind::Compression, &readings())
            .unwrap();
        assert_eq!(call.threshold, Some(Threshold::After(Interval::hours(720))));
        assert_eq!(call.schedule_interval, Some(Interval::hours(1)));
        assert_eq!(call.timezone.as_deref(), Some("Europe/London"));
        assert!(call.if_not_exists);
    }

    #[test]
    fn both_thresholds_conflict() {
        let err = PolicyOptions::new()
            .after("7 days")
            .created_before("7 days")
            .to_call(PolicyKind::Retention, &readings())
            .unwrap_err();
        assert!(matches!(
            err,
            PolicyError::ConflictingThreshold {
                after: "drop_after",
                created_before: "drop_created_before",
                ..
            }
        ));
    }

    #[test]
    fn neither_threshold_is_passed_through() {
        let call = PolicyOptions::new()
            .to_call(PolicyKind::Retention, &readings())
            .unwrap();
        assert_eq!(call.threshold, None);
    }

    #[test]
    fn bad_duration_fails_at_call_time() {
        let options = PolicyOptions::new().created_before("a fortnight");
        assert!(matches!(
            options.to_call(PolicyKind::Retention, &readings()),
            Err(PolicyError::Core(CoreError::InvalidInterval(_)))
        ));
    }
}
