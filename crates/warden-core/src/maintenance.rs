//! Shared pieces of the periodic sweeps: retention validation, cutoff
//! arithmetic and the ticker every `spawn_*` task runs on.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::{Interval, MissedTickBehavior};

use warden_contracts::error::{WardenError, WardenResult};

/// Longest accepted retention window (about a century).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Shortest period a sweep task ticks at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Reject retention windows outside `0..=MAX_RETENTION_DAYS`.
///
/// `field` names the offending setting in the error, e.g. `risk.retention_days`.
pub fn validate_retention_days(field: &str, days: i64) -> WardenResult<()> {
    if (0..=MAX_RETENTION_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(WardenError::ConfigError {
            reason: format!(
                "{} must be between 0 and {}, got {}",
                field, MAX_RETENTION_DAYS, days
            ),
        })
    }
}

/// Reject a zero sweep interval.
pub fn validate_sweep_interval(field: &str, every: Duration) -> WardenResult<()> {
    if every.is_zero() {
        return Err(WardenError::ConfigError {
            reason: format!("{} must be greater than zero", field),
        });
    }
    Ok(())
}

/// The instant `days` before `now`. Saturates at the earliest representable
/// time instead of overflowing, so nothing is pruned.
pub fn retention_cutoff(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    TimeDelta::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Interval for a sweep task. Zero periods are raised to
/// `MIN_SWEEP_INTERVAL`; missed ticks are delayed rather than burst.
pub fn sweep_ticker(every: Duration) -> Interval {
    let mut ticker = tokio::time::interval(every.max(MIN_SWEEP_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
