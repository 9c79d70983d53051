//! Rolling-average trend summaries for per-agent score histories.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Half-width of the band inside which a 7-day vs 30-day difference counts as stable.
pub const TREND_HYSTERESIS: f64 = 5.0;

/// Direction of a score series over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

impl Trend {
    /// Compare a short-window average against a long-window average.
    ///
    /// `higher_is_better` is false for risk (lower risk is an improvement) and
    /// true for adherence. Missing averages yield `Stable`.
    pub fn from_averages(short: Option<f64>, long: Option<f64>, higher_is_better: bool) -> Trend {
        let (Some(short), Some(long)) = (short, long) else {
            return Trend::Stable;
        };
        let delta = if higher_is_better { short - long } else { long - short };
        if delta > TREND_HYSTERESIS {
            Trend::Improving
        } else if delta < -TREND_HYSTERESIS {
            Trend::Degrading
        } else {
            Trend::Stable
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Improving => f.write_str("improving"),
            Trend::Stable => f.write_str("stable"),
            Trend::Degrading => f.write_str("degrading"),
        }
    }
}

/// 7/30/90-day rolling averages plus the derived trend label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub average_7d: Option<f64>,
    pub average_30d: Option<f64>,
    pub average_90d: Option<f64>,
    pub trend: Trend,
}
