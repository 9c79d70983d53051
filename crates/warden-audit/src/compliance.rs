//! Compliance snapshots over the violation log.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use warden_contracts::{
    severity::Severity,
    violation::{PolicyViolation, ViolationFilter, ViolationStatus},
};
use warden_core::maintenance;
use warden_policy::PolicyEngine;

/// Snapshots kept in memory; older ones are dropped first.
const MAX_SNAPSHOTS: usize = 365;

/// Score deducted per open violation.
pub fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 25.0,
        Severity::High => 10.0,
        Severity::Medium => 5.0,
        Severity::Low => 1.0,
    }
}

/// `100 - Σ weight(open violation)`, floored at 0. Resolved and
/// false-positive violations cost nothing.
pub fn compliance_score(violations: &[PolicyViolation]) -> f64 {
    let penalty: f64 = violations
        .iter()
        .filter(|v| v.status.is_open())
        .map(|v| severity_weight(v.severity))
        .sum();
    (100.0 - penalty).max(0.0)
}

/// Point-in-time compliance posture of one policy engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSnapshot {
    pub taken_at: DateTime<Utc>,
    pub compliance_score: f64,
    pub enabled_policies: usize,
    pub total_violations: usize,
    pub open_violations: usize,
    pub open_by_severity: BTreeMap<Severity, usize>,
    pub resolved: usize,
    pub false_positives: usize,
}

impl ComplianceSnapshot {
    /// Summarize `violations` as of `taken_at`.
    pub fn from_violations(
        violations: &[PolicyViolation],
        enabled_policies: usize,
        taken_at: DateTime<Utc>,
    ) -> Self {
        let mut open_by_severity = BTreeMap::new();
        let mut resolved = 0;
        let mut false_positives = 0;
        for v in violations {
            match v.status {
                ViolationStatus::Open | ViolationStatus::Acknowledged => {
                    *open_by_severity.entry(v.severity).or_insert(0) += 1;
                }
                ViolationStatus::Resolved => resolved += 1,
                ViolationStatus::FalsePositive => false_positives += 1,
            }
        }
        Self {
            taken_at,
            compliance_score: compliance_score(violations),
            enabled_policies,
            total_violations: violations.len(),
            open_violations: open_by_severity.values().sum(),
            open_by_severity,
            resolved,
            false_positives,
        }
    }
}

/// Takes and keeps compliance snapshots of one policy engine.
pub struct ComplianceAuditor {
    engine: Arc<PolicyEngine>,
    snapshots: Mutex<VecDeque<ComplianceSnapshot>>,
}

impl ComplianceAuditor {
    /// An auditor over `engine` with an empty snapshot history.
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self {
            engine,
            snapshots: Mutex::new(VecDeque::new()),
        }
    }

    /// Take and retain a snapshot now.
    pub fn snapshot(&self) -> ComplianceSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Take and retain a snapshot stamped `now`. The oldest snapshot is
    /// dropped beyond `MAX_SNAPSHOTS`.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> ComplianceSnapshot {
        let violations = self.engine.query_violations(&ViolationFilter::default());
        let enabled = self
            .engine
            .list_policies()
            .iter()
            .filter(|p| p.enabled)
            .count();
        let snapshot = ComplianceSnapshot::from_violations(&violations, enabled, now);

        info!(
            score = snapshot.compliance_score,
            open = snapshot.open_violations,
            "compliance snapshot taken"
        );
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        if snapshots.len() == MAX_SNAPSHOTS {
            snapshots.pop_front();
        }
        snapshots.push_back(snapshot.clone());
        snapshot
    }

    /// Stored snapshots, oldest first.
    pub fn history(&self) -> Vec<ComplianceSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// The most recent snapshot, if any was taken.
    pub fn latest(&self) -> Option<ComplianceSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    /// Take a snapshot every `every` until the auditor is dropped.
    pub fn spawn_scheduled(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let auditor = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = maintenance::sweep_ticker(every);
            loop {
                ticker.tick().await;
                let Some(auditor) = auditor.upgrade() else {
                    debug!("compliance auditor dropped, stopping schedule");
                    break;
                };
                auditor.snapshot();
            }
        })
    }
}
