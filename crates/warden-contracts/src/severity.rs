//! Severity scale shared by policies, violations, risk scores and detections.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered severity: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Weight of an open item of this severity when computing compliance scores.
    pub fn compliance_weight(self) -> f64 {
        match self {
            Severity::Low => 1.0,
            Severity::Medium => 5.0,
            Severity::High => 10.0,
            Severity::Critical => 25.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
