//! Notification events published to external logging/alerting subscribers.
//!
//! Events describe what happened without carrying raw PII or secrets.

use serde::{Deserialize, Serialize};

use crate::{
    injection::AttackType, pii::PiiType, policy::EnforcementAction, severity::Severity,
};

/// Notifications published to `EventSink` subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GovernanceEvent {
    PolicyViolationDetected {
        violation_id: String,
        policy_id: String,
        agent_id: String,
        severity: Severity,
        action: EnforcementAction,
    },
    PiiDetected {
        types: Vec<PiiType>,
        detection_count: usize,
        risk_score: u32,
    },
    InjectionBlocked {
        attack_type: Option<AttackType>,
        severity: Severity,
        matched_patterns: Vec<String>,
    },
    DriftDetected {
        agent_id: String,
        task_id: String,
        adherence_score: f64,
        severity: Severity,
    },
    CredentialRotated {
        agent_id: String,
        old_credential_id: String,
        new_credential_id: String,
    },
    CredentialRevoked {
        agent_id: String,
        credential_id: String,
    },
    AgentRevoked {
        agent_id: String,
        credentials_revoked: usize,
    },
}

impl GovernanceEvent {
    /// Stable snake_case name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            GovernanceEvent::PolicyViolationDetected { .. } => "policy_violation_detected",
            GovernanceEvent::PiiDetected { .. } => "pii_detected",
            GovernanceEvent::InjectionBlocked { .. } => "injection_blocked",
            GovernanceEvent::DriftDetected { .. } => "drift_detected",
            GovernanceEvent::CredentialRotated { .. } => "credential_rotated",
            GovernanceEvent::CredentialRevoked { .. } => "credential_revoked",
            GovernanceEvent::AgentRevoked { .. } => "agent_revoked",
        }
    }
}
