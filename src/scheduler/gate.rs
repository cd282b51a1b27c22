//! Time-window gate for one domain loop.

use chrono::{DateTime, Datelike, Duration, Local, Timelike, Weekday};

use crate::models::ScheduleConfig;

/// Why a loop iteration did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OutsideWindow,
    /// Snapshot younger than `min_snapshot_age_hours`
    TooFresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Run,
    /// Outside the normal window, but the snapshot is stale
    StaleOverride,
    Skip(SkipReason),
}

fn in_window(weekdays_only: bool, hours: &[u32], now: &DateTime<Local>) -> bool {
    if weekdays_only && matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    hours.is_empty() || hours.contains(&now.hour())
}

fn hours(h: f64) -> Duration {
    Duration::milliseconds((h * 3_600_000.0) as i64)
}

/// Decide whether the loop should run now.
///
/// `snapshot_age` is `None` when the domain has never been saved, which
/// counts as infinitely stale.
pub fn evaluate(
    schedule: &ScheduleConfig,
    now: DateTime<Local>,
    snapshot_age: Option<Duration>,
) -> GateDecision {
    if in_window(schedule.weekdays_only, &schedule.hours, &now) {
        let fresh = schedule
            .min_snapshot_age_hours
            .zip(snapshot_age)
            .is_some_and(|(min, age)| age < hours(min));
        return if fresh {
            GateDecision::Skip(SkipReason::TooFresh)
        } else {
            GateDecision::Run
        };
    }

    let stale = schedule
        .stale_after_hours
        .is_some_and(|limit| snapshot_age.is_none_or(|age| age > hours(limit)));
    if stale
        && in_window(
            schedule.override_weekdays_only,
            &schedule.override_hours,
            &now,
        )
    {
        return GateDecision::StaleOverride;
    }

    GateDecision::Skip(SkipReason::OutsideWindow)
}
