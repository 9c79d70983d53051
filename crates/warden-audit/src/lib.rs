//! # warden-audit
//!
//! The decision audit trail and the reporting surface above it.
//!
//! ## Overview
//!
//! Every governed request produces one `DecisionRecord`. `InMemoryAuditTrail`
//! links each record to the previous one through a SHA-256 hash, starting
//! from a genesis sentinel of 64 zeros, so editing any stored record is
//! detected by `verify_integrity`.
//!
//! `ComplianceAuditor` turns the violation log into a compliance score
//! (100 minus a weight per open violation: critical 25, high 10, medium 5,
//! low 1). `JsonReporter` implements `GovernanceReporter` for the JSON format.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_audit::InMemoryAuditTrail;
//! use warden_core::GovernancePipeline;
//!
//! let trail = Arc::new(InMemoryAuditTrail::new("prod"));
//! let pipeline = GovernancePipeline::new(engine, trail.clone());
//! pipeline.evaluate(request).await?;
//! assert!(trail.verify_integrity());
//! ```

pub mod chain;
pub mod compliance;
pub mod entry;
pub mod report;
pub mod trail;

pub use chain::{hash_entry, verify_chain};
pub use compliance::{compliance_score, ComplianceAuditor, ComplianceSnapshot};
pub use entry::{AuditEntry, AuditExport};
pub use report::{GovernanceReporter, JsonReporter};
pub use trail::InMemoryAuditTrail;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use serde_json::json;

    use warden_contracts::{
        config::PolicyEngineConfig,
        context::{AccessType, DataAccess, DataClassification, PolicyContext},
        decision::DecisionRecord,
        error::WardenError,
        policy::{ConditionField, EnforcementAction, Operator, Policy, PolicyCategory},
        report::{ReportFormat, ReportRequest, ReportType},
        severity::Severity,
    };
    use warden_core::{
        traits::{AuditWriter, PolicyEvaluator},
        CollectingSink, GovernancePipeline, GovernanceRequest,
    };
    use warden_policy::PolicyEngine;

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn record(request_id: &str, agent_id: &str, verdict: EnforcementAction) -> DecisionRecord {
        DecisionRecord {
            request_id: request_id.to_string(),
            agent_id: agent_id.to_string(),
            user_id: "user-1".to_string(),
            verdict,
            outcomes: Vec::new(),
            violation_ids: Vec::new(),
            risk_score: Some(12.5),
            timestamp: Utc::now(),
        }
    }

    fn trail_with(n: usize) -> InMemoryAuditTrail {
        let trail = InMemoryAuditTrail::new("trail-1");
        for i in 0..n {
            trail
                .write(&record(&format!("req-{i}"), "agent-1", EnforcementAction::Allow))
                .unwrap();
        }
        trail
    }

    fn blocking_engine() -> Arc<PolicyEngine> {
        let engine = PolicyEngine::new(
            PolicyEngineConfig {
                load_default_templates: false,
                ..Default::default()
            },
            Arc::new(CollectingSink::new()),
        )
        .unwrap();
        engine
            .add_policy(
                Policy::new(
                    "no-restricted-deletion",
                    "No Data Deletion of Restricted Data",
                    PolicyCategory::DataProtection,
                    Severity::Critical,
                    EnforcementAction::Block,
                )
                .with_condition(
                    ConditionField::DataAccessOperations,
                    Operator::NotIn,
                    json!(["restricted:delete"]),
                ),
            )
            .unwrap();
        Arc::new(engine)
    }

    fn restricted_delete(agent_id: &str) -> PolicyContext {
        PolicyContext::new(agent_id, "user-1").with_data_access(DataAccess::new(
            "customers",
            DataClassification::Restricted,
            AccessType::Delete,
        ))
    }

    fn request(report_type: ReportType, format: ReportFormat) -> ReportRequest {
        let now = Utc::now();
        ReportRequest {
            report_type,
            format,
            agent_id: None,
            period_start: now - Duration::hours(1),
            period_end: now + Duration::hours(1),
        }
    }

    // ── Hash chain ────────────────────────────────────────────────────────────

    #[test]
    fn sequential_writes_form_a_valid_chain() {
        let trail = trail_with(3);
        assert_eq!(trail.len(), 3);
        assert!(trail.verify_integrity());
    }

    #[test]
    fn first_entry_links_to_genesis() {
        let log = trail_with(2).export_log();
        assert_eq!(log.entries[0].prev_hash, AuditEntry::GENESIS_HASH);
        assert_eq!(log.entries[1].prev_hash, log.entries[0].this_hash);
        assert_eq!(log.terminal_hash, log.entries[1].this_hash);
        assert!(verify_chain(&log.entries));
    }

    #[test]
    fn tampered_record_is_detected() {
        let trail = trail_with(3);
        {
            let mut state = trail.state.lock().unwrap();
            state.entries[1].record.verdict = EnforcementAction::Block;
        }
        assert!(!trail.verify_integrity());
        assert_eq!(chain::first_break(&trail.export_log().entries), Some(1));
    }

    #[test]
    fn removed_entry_is_detected() {
        let mut entries = trail_with(3).export_log().entries;
        entries.remove(1);
        assert!(!verify_chain(&entries));
    }

    #[test]
    fn empty_trail_is_valid() {
        let trail = InMemoryAuditTrail::new("empty");
        assert!(trail.is_empty());
        assert!(trail.verify_integrity());
        assert_eq!(trail.export_log().terminal_hash, "");
    }

    #[test]
    fn hash_depends_on_trail_id() {
        let r = record("req-1", "agent-1", EnforcementAction::Allow);
        let a = hash_entry("a", 0, &r, AuditEntry::GENESIS_HASH).unwrap();
        let b = hash_entry("b", 0, &r, AuditEntry::GENESIS_HASH).unwrap();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn records_between_filters_by_agent_and_period() {
        let trail = InMemoryAuditTrail::new("t");
        trail
            .write(&record("r1", "agent-1", EnforcementAction::Allow))
            .unwrap();
        trail
            .write(&record("r2", "agent-2", EnforcementAction::Block))
            .unwrap();
        let now = Utc::now();
        let hour = Duration::hours(1);

        assert_eq!(trail.records_between(now - hour, now + hour, None).len(), 2);
        let one = trail.records_between(now - hour, now + hour, Some("agent-2"));
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].request_id, "r2");
        assert!(trail.records_between(now + hour, now + hour * 2, None).is_empty());
    }

    // ── Pipeline integration ──────────────────────────────────────────────────

    #[tokio::test]
    async fn pipeline_writes_one_chained_record_per_request() {
        let engine = blocking_engine();
        let trail = Arc::new(InMemoryAuditTrail::new("pipeline"));
        let pipeline = GovernancePipeline::new(engine.clone(), trail.clone());

        let blocked = pipeline
            .evaluate(GovernanceRequest::new(restricted_delete("agent-1")))
            .await
            .unwrap();
        let allowed = pipeline
            .evaluate(GovernanceRequest::new(PolicyContext::new("agent-2", "user-1")))
            .await
            .unwrap();

        assert_eq!(blocked.verdict, EnforcementAction::Block);
        assert_eq!(allowed.verdict, EnforcementAction::Allow);
        let log = trail.export_log();
        assert_eq!(log.entries.len(), 2);
        assert_eq!(log.entries[0].record.violation_ids.len(), 1);
        assert!(trail.verify_integrity());
    }

    // ── Compliance ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn snapshot_deducts_open_violation_weights() {
        let engine = blocking_engine();
        engine.evaluate_all(&restricted_delete("agent-1")).await;
        engine.evaluate_all(&restricted_delete("agent-2")).await;

        let auditor = ComplianceAuditor::new(engine.clone());
        let snapshot = auditor.snapshot();
        assert_eq!(snapshot.compliance_score, 50.0);
        assert_eq!(snapshot.open_violations, 2);
        assert_eq!(snapshot.open_by_severity.get(&Severity::Critical), Some(&2));
        assert_eq!(snapshot.enabled_policies, 1);

        let open = engine.query_violations(&Default::default());
        engine
            .resolve_violation(&open[0].id, "ops", Some("restored from backup".into()))
            .unwrap();
        let after = auditor.snapshot();
        assert_eq!(after.compliance_score, 75.0);
        assert_eq!(after.resolved, 1);
        assert_eq!(auditor.history().len(), 2);
        assert_eq!(auditor.latest(), Some(after));
    }

    #[test]
    fn score_floors_at_zero() {
        let snapshot = ComplianceSnapshot::from_violations(&[], 0, Utc::now());
        assert_eq!(snapshot.compliance_score, 100.0);
        assert_eq!(compliance::severity_weight(Severity::Low), 1.0);
        assert_eq!(compliance::severity_weight(Severity::High), 10.0);
    }

    #[tokio::test]
    async fn many_critical_violations_floor_at_zero() {
        let engine = blocking_engine();
        for i in 0..5 {
            engine
                .evaluate_all(&restricted_delete(&format!("agent-{i}")))
                .await;
        }
        let snapshot = ComplianceAuditor::new(engine).snapshot();
        assert_eq!(snapshot.compliance_score, 0.0);
    }

    #[tokio::test]
    async fn scheduled_snapshots_stop_when_auditor_is_dropped() {
        let auditor = Arc::new(ComplianceAuditor::new(blocking_engine()));
        let handle = auditor.spawn_scheduled(std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!auditor.history().is_empty());

        drop(auditor);
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("schedule should stop")
            .unwrap();
    }

    // ── Reports ───────────────────────────────────────────────────────────────

    fn reporter(engine: Arc<PolicyEngine>, trail: Arc<InMemoryAuditTrail>) -> JsonReporter {
        let auditor = Arc::new(ComplianceAuditor::new(engine.clone()));
        JsonReporter::new(engine, trail, auditor)
    }

    #[test]
    fn non_json_formats_are_unsupported() {
        let r = reporter(blocking_engine(), Arc::new(InMemoryAuditTrail::new("t")));
        for format in [ReportFormat::Html, ReportFormat::Pdf, ReportFormat::Csv] {
            let err = r
                .generate(&request(ReportType::ComplianceStatus, format))
                .unwrap_err();
            assert!(matches!(err, WardenError::UnsupportedReportFormat { .. }));
        }
    }

    #[test]
    fn inverted_period_is_rejected() {
        let r = reporter(blocking_engine(), Arc::new(InMemoryAuditTrail::new("t")));
        let mut req = request(ReportType::AgentActivity, ReportFormat::Json);
        std::mem::swap(&mut req.period_start, &mut req.period_end);
        assert!(matches!(
            r.generate(&req),
            Err(WardenError::ConfigError { .. })
        ));
    }

    #[tokio::test]
    async fn reports_aggregate_decisions_and_violations() {
        let engine = blocking_engine();
        let trail = Arc::new(InMemoryAuditTrail::new("reports"));
        let pipeline = GovernancePipeline::new(engine.clone(), trail.clone());
        pipeline
            .evaluate(GovernanceRequest::new(restricted_delete("agent-1")))
            .await
            .unwrap();
        pipeline
            .evaluate(GovernanceRequest::new(PolicyContext::new("agent-1", "user-1")))
            .await
            .unwrap();
        let r = reporter(engine, trail);

        let activity = r
            .generate(&request(ReportType::AgentActivity, ReportFormat::Json))
            .unwrap();
        assert_eq!(activity.content["decisions"], 2);
        assert_eq!(activity.content["agents"][0]["verdicts"]["block"], 1);

        let violations = r
            .generate(&request(ReportType::PolicyViolations, ReportFormat::Json))
            .unwrap();
        assert_eq!(violations.content["total"], 1);
        assert_eq!(violations.content["by_severity"]["critical"], 1);

        let status = r
            .generate(&request(ReportType::ComplianceStatus, ReportFormat::Json))
            .unwrap();
        assert_eq!(status.content["snapshot"]["compliance_score"], 75.0);
        assert_eq!(status.content["audit_chain_intact"], true);

        let summary = r
            .generate(&request(ReportType::ExecutiveSummary, ReportFormat::Json))
            .unwrap();
        assert_eq!(summary.content["decisions_stopped"], 1);
        assert_eq!(summary.report_type, ReportType::ExecutiveSummary);
    }
}
