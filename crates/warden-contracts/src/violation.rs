//! Recorded policy violations.
//!
//! Violations form the audit trail of failed evaluations and are retained
//! indefinitely. Their status changes only through explicit transitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{context::PolicyContext, policy::EnforcementAction, severity::Severity};

/// Review state of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStatus {
    Open,
    Acknowledged,
    Resolved,
    FalsePositive,
}

impl ViolationStatus {
    /// Resolved and false-positive are terminal.
    pub fn can_transition_to(self, next: ViolationStatus) -> bool {
        matches!(
            (self, next),
            (ViolationStatus::Open, ViolationStatus::Acknowledged)
                | (ViolationStatus::Open, ViolationStatus::Resolved)
                | (ViolationStatus::Open, ViolationStatus::FalsePositive)
                | (ViolationStatus::Acknowledged, ViolationStatus::Resolved)
                | (ViolationStatus::Acknowledged, ViolationStatus::FalsePositive)
        )
    }

    /// Whether the violation still counts against compliance.
    pub fn is_open(self) -> bool {
        matches!(self, ViolationStatus::Open | ViolationStatus::Acknowledged)
    }
}

impl fmt::Display for ViolationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationStatus::Open => "open",
            ViolationStatus::Acknowledged => "acknowledged",
            ViolationStatus::Resolved => "resolved",
            ViolationStatus::FalsePositive => "false_positive",
        };
        f.write_str(s)
    }
}

/// A failed policy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub id: String,
    pub policy_id: String,
    pub policy_name: String,
    pub policy_version: u32,
    pub agent_id: String,
    pub user_id: String,
    pub severity: Severity,
    pub action: EnforcementAction,
    pub messages: Vec<String>,
    pub status: ViolationStatus,
    pub detected_at: DateTime<Utc>,
    /// The evaluated context, sufficient to reproduce the decision.
    pub context: PolicyContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

/// Query filter for the violation log. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ViolationFilter {
    pub agent_id: Option<String>,
    pub policy_id: Option<String>,
    pub status: Option<ViolationStatus>,
    pub min_severity: Option<Severity>,
}

impl ViolationFilter {
    /// Whether `v` satisfies every filter that is set.
    pub fn matches(&self, v: &PolicyViolation) -> bool {
        self.agent_id.as_ref().map_or(true, |a| *a == v.agent_id)
            && self.policy_id.as_ref().map_or(true, |p| *p == v.policy_id)
            && self.status.map_or(true, |s| s == v.status)
            && self.min_severity.map_or(true, |s| v.severity >= s)
    }
}

/// Everything one `evaluate_all` call produced: a result per enabled policy
/// and the violations recorded for the failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationBatch {
    pub results: Vec<crate::policy::PolicyEvaluationResult>,
    pub violations: Vec<PolicyViolation>,
}

impl EvaluationBatch {
    /// Results whose conditions failed (errored evaluations excluded).
    pub fn failures(&self) -> impl Iterator<Item = &crate::policy::PolicyEvaluationResult> {
        self.results.iter().filter(|r| r.is_violation())
    }
}
