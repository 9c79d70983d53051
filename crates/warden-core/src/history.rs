//! Per-agent, timestamped, bounded history log.
//!
//! The outer map is only write-locked to create or drop a key. Each key's
//! series has its own mutex, so appends for one agent are serialized while
//! appends for different agents proceed independently, and a retention sweep
//! holds at most one series lock at a time. Locks are always taken map first,
//! then series.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};

use warden_contracts::{
    adherence::TaskAdherenceMetrics,
    history::{Trend, TrendSummary},
    risk::RiskScore,
};

/// A value that contributes a number to rolling averages.
pub trait Scored {
    fn score(&self) -> f64;
}

impl Scored for RiskScore {
    fn score(&self) -> f64 {
        self.overall
    }
}

impl Scored for TaskAdherenceMetrics {
    fn score(&self) -> f64 {
        self.overall_score
    }
}

/// One timestamped entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamped<T> {
    pub at: DateTime<Utc>,
    pub value: T,
}

type Series<T> = Arc<Mutex<VecDeque<Timestamped<T>>>>;

/// Per-key timestamped series with optional per-key bound.
pub struct TimeSeriesLog<T> {
    series: RwLock<HashMap<String, Series<T>>>,
    /// Oldest entries are dropped once a key holds this many.
    max_entries: Option<usize>,
}

impl<T> Default for TimeSeriesLog<T> {
    fn default() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            max_entries: None,
        }
    }
}

impl<T: Clone> TimeSeriesLog<T> {
    /// An unbounded log.
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that keeps at most `max_entries` per key.
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            max_entries: Some(max_entries.max(1)),
        }
    }

    /// Append `value` stamped now.
    pub fn append(&self, key: &str, value: T) {
        self.append_at(key, Utc::now(), value);
    }

    /// Append with an explicit timestamp. Entries are kept in append order.
    ///
    /// The series is locked while the map guard is still held, so a sweep
    /// cannot drop the key between lookup and push.
    pub fn append_at(&self, key: &str, at: DateTime<Utc>, value: T) {
        let entry = Timestamped { at, value };
        {
            let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(series) = map.get(key) {
                self.push(&mut series.lock().unwrap_or_else(PoisonError::into_inner), entry);
                return;
            }
        }
        let mut map = self.series.write().unwrap_or_else(PoisonError::into_inner);
        let series = map.entry(key.to_string()).or_default();
        self.push(&mut series.lock().unwrap_or_else(PoisonError::into_inner), entry);
    }

    /// All entries for `key`, oldest first.
    pub fn entries(&self, key: &str) -> Vec<Timestamped<T>> {
        match self.existing(key) {
            Some(series) => series
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// The `n` most recent values for `key`, oldest first.
    pub fn latest(&self, key: &str, n: usize) -> Vec<T> {
        let Some(series) = self.existing(key) else {
            return Vec::new();
        };
        let entries = series.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).map(|e| e.value.clone()).collect()
    }

    /// Number of entries held for `key`.
    pub fn len(&self, key: &str) -> usize {
        self.existing(key)
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    /// Every key currently holding entries.
    pub fn keys(&self) -> Vec<String> {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Drop every entry older than `cutoff`; keys left empty are removed.
    /// Returns the number of entries dropped.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let snapshot: Vec<(String, Series<T>)> = self
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, s)| (k.clone(), Arc::clone(s)))
            .collect();

        let mut removed = 0;
        let mut emptied = Vec::new();
        for (key, series) in snapshot {
            let mut entries = series.lock().unwrap_or_else(PoisonError::into_inner);
            let before = entries.len();
            entries.retain(|e| e.at >= cutoff);
            removed += before - entries.len();
            if entries.is_empty() {
                emptied.push(key);
            }
        }

        if !emptied.is_empty() {
            let mut map = self.series.write().unwrap_or_else(PoisonError::into_inner);
            for key in emptied {
                // Appends lock their series under the map guard, so an empty
                // series seen here has no append in flight.
                let still_empty = map.get(&key).is_some_and(|s| {
                    s.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
                });
                if still_empty {
                    map.remove(&key);
                }
            }
        }
        removed
    }

    /// Drop `key` and all its entries.
    pub fn remove(&self, key: &str) -> bool {
        self.series
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    fn existing(&self, key: &str) -> Option<Series<T>> {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn push(&self, entries: &mut VecDeque<Timestamped<T>>, entry: Timestamped<T>) {
        entries.push_back(entry);
        if let Some(max) = self.max_entries {
            while entries.len() > max {
                entries.pop_front();
            }
        }
    }
}

impl<T: Clone + Scored> TimeSeriesLog<T> {
    /// Mean score over the last 7, 30 and 90 days before `now`.
    pub fn rolling_averages(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> (Option<f64>, Option<f64>, Option<f64>) {
        let entries = self.entries(key);
        let window = |days: i64| {
            let from = now - Duration::days(days);
            let scores: Vec<f64> = entries
                .iter()
                .filter(|e| e.at >= from && e.at <= now)
                .map(|e| e.value.score())
                .collect();
            if scores.is_empty() {
                None
            } else {
                Some(scores.iter().sum::<f64>() / scores.len() as f64)
            }
        };
        (window(7), window(30), window(90))
    }

    /// Rolling averages plus the 7-day vs 30-day trend label.
    pub fn summary(&self, key: &str, now: DateTime<Utc>, higher_is_better: bool) -> TrendSummary {
        let (average_7d, average_30d, average_90d) = self.rolling_averages(key, now);
        TrendSummary {
            average_7d,
            average_30d,
            average_90d,
            trend: Trend::from_averages(average_7d, average_30d, higher_is_better),
        }
    }
}
