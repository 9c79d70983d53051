//! Decision records written to the audit trail.
//!
//! One `DecisionRecord` is produced per governed request, whatever the
//! verdict. The audit writer appends it; records are never modified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::{EnforcementAction, PolicyEvaluationResult};

/// Condensed per-policy outcome kept in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    pub policy_id: String,
    pub policy_version: u32,
    pub passed: bool,
    pub action: EnforcementAction,
    #[serde(default)]
    pub errored: bool,
}

impl From<&PolicyEvaluationResult> for PolicyOutcome {
    fn from(r: &PolicyEvaluationResult) -> Self {
        Self {
            policy_id: r.policy_id.clone(),
            policy_version: r.policy_version,
            passed: r.passed,
            action: r.action,
            errored: r.error.is_some(),
        }
    }
}

/// What the audit trail stores for one governed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub request_id: String,
    pub agent_id: String,
    pub user_id: String,
    /// Most restrictive action among the outcomes.
    pub verdict: EnforcementAction,
    pub outcomes: Vec<PolicyOutcome>,
    pub violation_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
}
