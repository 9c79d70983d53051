//! The violation log.
//!
//! Violations are retained indefinitely. Status moves only forward:
//! `open → acknowledged → resolved | false_positive`, or straight from
//! `open` to either terminal state.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use tracing::info;

use warden_contracts::{
    error::{WardenError, WardenResult},
    severity::Severity,
    violation::{PolicyViolation, ViolationFilter, ViolationStatus},
};

/// Every recorded violation, indexed by id.
#[derive(Default)]
pub struct ViolationLog {
    entries: RwLock<HashMap<String, PolicyViolation>>,
}

impl ViolationLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new violation.
    pub fn record(&self, violation: PolicyViolation) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(violation.id.clone(), violation);
    }

    /// The violation with `violation_id`.
    pub fn get(&self, violation_id: &str) -> WardenResult<PolicyViolation> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(violation_id)
            .cloned()
            .ok_or_else(|| WardenError::ViolationNotFound {
                violation_id: violation_id.to_string(),
            })
    }

    /// Matching violations, oldest first.
    pub fn query(&self, filter: &ViolationFilter) -> Vec<PolicyViolation> {
        let mut found: Vec<PolicyViolation> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|v| filter.matches(v))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.detected_at.cmp(&b.detected_at).then(a.id.cmp(&b.id)));
        found
    }

    /// Move an open violation to acknowledged.
    pub fn acknowledge(&self, violation_id: &str) -> WardenResult<PolicyViolation> {
        self.transition(violation_id, ViolationStatus::Acknowledged, None, None)
    }

    /// Close a violation as resolved.
    pub fn resolve(
        &self,
        violation_id: &str,
        resolved_by: &str,
        notes: Option<String>,
    ) -> WardenResult<PolicyViolation> {
        self.transition(
            violation_id,
            ViolationStatus::Resolved,
            Some(resolved_by),
            notes,
        )
    }

    /// Close a violation as a false positive.
    pub fn mark_false_positive(
        &self,
        violation_id: &str,
        resolved_by: &str,
        notes: Option<String>,
    ) -> WardenResult<PolicyViolation> {
        self.transition(
            violation_id,
            ViolationStatus::FalsePositive,
            Some(resolved_by),
            notes,
        )
    }

    /// Open and acknowledged violations per severity.
    pub fn open_counts(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for v in self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|v| v.status.is_open())
        {
            *counts.entry(v.severity).or_insert(0) += 1;
        }
        counts
    }

    /// Number of violations recorded.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn transition(
        &self,
        violation_id: &str,
        next: ViolationStatus,
        resolved_by: Option<&str>,
        notes: Option<String>,
    ) -> WardenResult<PolicyViolation> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let violation =
            entries
                .get_mut(violation_id)
                .ok_or_else(|| WardenError::ViolationNotFound {
                    violation_id: violation_id.to_string(),
                })?;

        if !violation.status.can_transition_to(next) {
            return Err(WardenError::InvalidTransition {
                entity: "violation".to_string(),
                from: violation.status.to_string(),
                to: next.to_string(),
            });
        }

        violation.status = next;
        if !next.is_open() {
            violation.resolved_at = Some(Utc::now());
            violation.resolved_by = resolved_by.map(str::to_string);
            violation.resolution_notes = notes;
        }

        info!(
            violation_id = %violation_id,
            policy_id = %violation.policy_id,
            status = %next,
            "violation status changed"
        );
        Ok(violation.clone())
    }
}

#[cfg(test)]
mod tests {
    use warden_contracts::{context::PolicyContext, policy::EnforcementAction};

    use super::*;

    fn violation(id: &str, agent: &str, severity: Severity) -> PolicyViolation {
        PolicyViolation {
            id: id.into(),
            policy_id: "p".into(),
            policy_name: "P".into(),
            policy_version: 1,
            agent_id: agent.into(),
            user_id: "user".into(),
            severity,
            action: EnforcementAction::Block,
            messages: vec!["failed".into()],
            status: ViolationStatus::Open,
            detected_at: Utc::now(),
            context: PolicyContext::new(agent, "user"),
            resolved_at: None,
            resolved_by: None,
            resolution_notes: None,
        }
    }

    #[test]
    fn resolve_sets_resolution_fields() {
        let log = ViolationLog::new();
        log.record(violation("v1", "a", Severity::High));

        let resolved = log.resolve("v1", "ops", Some("patched".into())).unwrap();
        assert_eq!(resolved.status, ViolationStatus::Resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("ops"));
        assert!(resolved.resolved_at.is_some());
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let log = ViolationLog::new();
        log.record(violation("v1", "a", Severity::High));
        log.mark_false_positive("v1", "ops", None).unwrap();

        let err = log.resolve("v1", "ops", None).unwrap_err();
        assert!(matches!(err, WardenError::InvalidTransition { .. }));
    }

    #[test]
    fn acknowledge_then_resolve() {
        let log = ViolationLog::new();
        log.record(violation("v1", "a", Severity::Low));
        let acked = log.acknowledge("v1").unwrap();
        assert_eq!(acked.status, ViolationStatus::Acknowledged);
        assert!(acked.resolved_at.is_none());
        assert!(log.resolve("v1", "ops", None).is_ok());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let log = ViolationLog::new();
        assert!(matches!(
            log.acknowledge("missing"),
            Err(WardenError::ViolationNotFound { .. })
        ));
    }

    #[test]
    fn query_filters_by_agent_and_severity() {
        let log = ViolationLog::new();
        log.record(violation("v1", "a", Severity::Low));
        log.record(violation("v2", "a", Severity::Critical));
        log.record(violation("v3", "b", Severity::Critical));

        let filter = ViolationFilter {
            agent_id: Some("a".into()),
            min_severity: Some(Severity::High),
            ..Default::default()
        };
        let found = log.query(&filter);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "v2");

        assert_eq!(log.open_counts().get(&Severity::Critical), Some(&2));
    }
}
