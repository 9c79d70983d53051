//! Governance reports.
//!
//! `GovernanceReporter` is the outward reporting seam. `JsonReporter`
//! aggregates the policy engine, the audit trail and, when attached, the
//! risk evaluator and the two scanners into a JSON document. Rendering to
//! HTML, PDF or CSV belongs to the embedding system.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use warden_contracts::{
    decision::DecisionRecord,
    error::{WardenError, WardenResult},
    policy::EnforcementAction,
    report::{GovernanceReport, ReportFormat, ReportRequest, ReportType},
    severity::Severity,
    violation::{PolicyViolation, ViolationFilter},
};
use warden_pii::PiiDetector;
use warden_policy::PolicyEngine;
use warden_risk::RiskEvaluator;
use warden_shield::PromptShield;

use crate::{
    compliance::{ComplianceAuditor, ComplianceSnapshot},
    trail::InMemoryAuditTrail,
};

/// Renders governance reports from the audit trail and live components.
pub trait GovernanceReporter: Send + Sync {
    fn formats(&self) -> &[ReportFormat];

    fn generate(&self, request: &ReportRequest) -> WardenResult<GovernanceReport>;
}

/// Reporter that renders every report type as JSON.
pub struct JsonReporter {
    engine: Arc<PolicyEngine>,
    trail: Arc<InMemoryAuditTrail>,
    auditor: Arc<ComplianceAuditor>,
    risk: Option<Arc<RiskEvaluator>>,
    pii: Option<Arc<PiiDetector>>,
    shield: Option<Arc<PromptShield>>,
}

impl JsonReporter {
    /// A reporter over the policy engine, audit trail and compliance auditor.
    /// Risk, PII and shield figures are empty until attached.
    pub fn new(
        engine: Arc<PolicyEngine>,
        trail: Arc<InMemoryAuditTrail>,
        auditor: Arc<ComplianceAuditor>,
    ) -> Self {
        Self {
            engine,
            trail,
            auditor,
            risk: None,
            pii: None,
            shield: None,
        }
    }

    /// Include per-agent risk trends in risk-assessment reports.
    pub fn with_risk(mut self, risk: Arc<RiskEvaluator>) -> Self {
        self.risk = Some(risk);
        self
    }

    /// Include PII detection counts in exposure reports.
    pub fn with_pii(mut self, pii: Arc<PiiDetector>) -> Self {
        self.pii = Some(pii);
        self
    }

    /// Include injection counts in security-incident reports.
    pub fn with_shield(mut self, shield: Arc<PromptShield>) -> Self {
        self.shield = Some(shield);
        self
    }

    fn violations_in(&self, request: &ReportRequest) -> Vec<PolicyViolation> {
        let filter = ViolationFilter {
            agent_id: request.agent_id.clone(),
            ..Default::default()
        };
        self.engine
            .query_violations(&filter)
            .into_iter()
            .filter(|v| v.detected_at >= request.period_start && v.detected_at < request.period_end)
            .collect()
    }

    fn decisions_in(&self, request: &ReportRequest) -> Vec<DecisionRecord> {
        self.trail.records_between(
            request.period_start,
            request.period_end,
            request.agent_id.as_deref(),
        )
    }

    // ── Sections ─────────────────────────────────────────────────────────────

    fn compliance_status(&self) -> Value {
        let snapshot = self.auditor.snapshot();
        json!({
            "snapshot": snapshot,
            "trend": compliance_trend(&self.auditor.history()),
            "audit_chain_intact": self.trail.verify_integrity(),
        })
    }

    fn policy_violations(&self, request: &ReportRequest) -> Value {
        let violations = self.violations_in(request);
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_policy: BTreeMap<String, usize> = BTreeMap::new();
        for v in &violations {
            *by_status.entry(v.status.to_string()).or_insert(0) += 1;
            *by_policy.entry(v.policy_id.clone()).or_insert(0) += 1;
        }
        json!({
            "total": violations.len(),
            "by_severity": count_by_severity(&violations),
            "by_status": by_status,
            "by_policy": by_policy,
            "violations": violations.iter().map(violation_summary).collect::<Vec<_>>(),
        })
    }

    fn risk_assessment(&self, request: &ReportRequest) -> Value {
        let Some(risk) = &self.risk else {
            return json!({ "agents": [] });
        };
        let agents: Vec<Value> = self
            .agents_in(request)
            .into_iter()
            .map(|agent_id| {
                let history = risk.get_evaluation_history(&agent_id);
                let in_period: Vec<_> = history
                    .evaluations
                    .iter()
                    .filter(|s| {
                        s.evaluated_at >= request.period_start && s.evaluated_at < request.period_end
                    })
                    .collect();
                let peak = in_period.iter().map(|s| s.severity).max();
                json!({
                    "agent_id": agent_id,
                    "evaluations": in_period.len(),
                    "latest": in_period.last(),
                    "peak_severity": peak,
                    "summary": history.summary,
                })
            })
            .collect();
        json!({ "agents": agents })
    }

    fn agent_activity(&self, request: &ReportRequest) -> Value {
        let decisions = self.decisions_in(request);
        let mut per_agent: BTreeMap<&str, BTreeMap<String, usize>> = BTreeMap::new();
        for d in &decisions {
            *per_agent
                .entry(d.agent_id.as_str())
                .or_default()
                .entry(d.verdict.to_string())
                .or_insert(0) += 1;
        }
        let agents: Vec<Value> = per_agent
            .into_iter()
            .map(|(agent_id, verdicts)| {
                json!({
                    "agent_id": agent_id,
                    "decisions": verdicts.values().sum::<usize>(),
                    "verdicts": verdicts,
                })
            })
            .collect();
        json!({
            "decisions": decisions.len(),
            "agents": agents,
        })
    }

    fn pii_exposure(&self, request: &ReportRequest) -> Value {
        let pii_violations = self
            .violations_in(request)
            .into_iter()
            .filter(|v| v.context.touches_pii())
            .count();
        json!({
            "scanner": self.pii.as_ref().map(|p| p.stats()),
            "violations_touching_pii": pii_violations,
        })
    }

    fn security_incidents(&self, request: &ReportRequest) -> Value {
        let incidents: Vec<Value> = self
            .violations_in(request)
            .iter()
            .filter(|v| v.severity >= Severity::High)
            .map(violation_summary)
            .collect();
        let blocked = self
            .decisions_in(request)
            .iter()
            .filter(|d| d.verdict == EnforcementAction::Block)
            .count();
        json!({
            "injection_shield": self.shield.as_ref().map(|s| s.stats()),
            "blocked_decisions": blocked,
            "high_severity_violations": incidents,
        })
    }

    fn executive_summary(&self, request: &ReportRequest) -> Value {
        let snapshot = self.auditor.snapshot();
        let decisions = self.decisions_in(request);
        let stopped = decisions
            .iter()
            .filter(|d| !d.verdict.permits_execution())
            .count();
        json!({
            "compliance_score": snapshot.compliance_score,
            "open_violations": snapshot.open_violations,
            "open_critical": snapshot.open_by_severity.get(&Severity::Critical).copied().unwrap_or(0),
            "decisions": decisions.len(),
            "decisions_stopped": stopped,
            "new_violations": self.violations_in(request).len(),
            "engine": self.engine.stats(),
        })
    }

    /// The requested agent, or every agent seen in the period's decisions.
    fn agents_in(&self, request: &ReportRequest) -> Vec<String> {
        if let Some(agent_id) = &request.agent_id {
            return vec![agent_id.clone()];
        }
        self.decisions_in(request)
            .into_iter()
            .map(|d| d.agent_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl GovernanceReporter for JsonReporter {
    fn formats(&self) -> &[ReportFormat] {
        &[ReportFormat::Json]
    }

    fn generate(&self, request: &ReportRequest) -> WardenResult<GovernanceReport> {
        if !self.formats().contains(&request.format) {
            return Err(WardenError::UnsupportedReportFormat {
                format: request.format.to_string(),
            });
        }
        if request.period_end < request.period_start {
            return Err(WardenError::ConfigError {
                reason: format!(
                    "report period ends ({}) before it starts ({})",
                    request.period_end, request.period_start
                ),
            });
        }

        let content = match request.report_type {
            ReportType::ComplianceStatus => self.compliance_status(),
            ReportType::PolicyViolations => self.policy_violations(request),
            ReportType::RiskAssessment => self.risk_assessment(request),
            ReportType::AgentActivity => self.agent_activity(request),
            ReportType::PiiExposure => self.pii_exposure(request),
            ReportType::SecurityIncidents => self.security_incidents(request),
            ReportType::ExecutiveSummary => self.executive_summary(request),
        };

        let report = GovernanceReport {
            id: uuid::Uuid::new_v4().to_string(),
            report_type: request.report_type,
            format: request.format,
            generated_at: Utc::now(),
            period_start: request.period_start,
            period_end: request.period_end,
            content,
        };
        info!(report_id = %report.id, report_type = ?report.report_type, "report generated");
        Ok(report)
    }
}

fn count_by_severity(violations: &[PolicyViolation]) -> BTreeMap<Severity, usize> {
    let mut counts = BTreeMap::new();
    for v in violations {
        *counts.entry(v.severity).or_insert(0) += 1;
    }
    counts
}

fn violation_summary(v: &PolicyViolation) -> Value {
    json!({
        "id": v.id,
        "policy_id": v.policy_id,
        "agent_id": v.agent_id,
        "severity": v.severity,
        "action": v.action,
        "status": v.status,
        "detected_at": v.detected_at,
        "messages": v.messages,
    })
}

/// Score change between the two most recent snapshots.
fn compliance_trend(history: &[ComplianceSnapshot]) -> Option<f64> {
    match history {
        [.., previous, latest] => Some(latest.compliance_score - previous.compliance_score),
        _ => None,
    }
}
