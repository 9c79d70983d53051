//! The governance pipeline: one governed request, end to end.
//!
//! Stages run in a fixed order:
//!
//!   Text scan (PII + injection) → Risk → Adherence → Policy → Audit
//!
//! Scanner and scorer outputs are attached to the context before the policy
//! engine runs, so conditions can read them. Exactly one `DecisionRecord` is
//! written per request, whatever the verdict; a failed write fails the request.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use warden_contracts::{
    adherence::ExecutionContext,
    context::PolicyContext,
    decision::{DecisionRecord, PolicyOutcome},
    error::WardenResult,
    injection::PromptInjectionResult,
    pii::PiiDetectionResult,
    policy::{EnforcementAction, PolicyEvaluationResult},
    violation::PolicyViolation,
};

use crate::traits::{
    AdherenceMonitor, AuditWriter, InjectionScanner, PiiScanner, PolicyEvaluator, RiskAssessor,
};

/// A pending agent action plus, optionally, what the agent did so far.
#[derive(Debug, Clone)]
pub struct GovernanceRequest {
    pub context: PolicyContext,
    /// Enables the adherence stage when present.
    pub execution: Option<ExecutionContext>,
}

impl GovernanceRequest {
    /// A request with no execution to score.
    pub fn new(context: PolicyContext) -> Self {
        Self {
            context,
            execution: None,
        }
    }

    /// Score task adherence for this execution.
    pub fn with_execution(mut self, execution: ExecutionContext) -> Self {
        self.execution = Some(execution);
        self
    }
}

/// Everything the pipeline decided for one request.
#[derive(Debug, Clone)]
pub struct GovernanceDecision {
    /// The evaluated context with every attachment filled in.
    pub context: PolicyContext,
    pub results: Vec<PolicyEvaluationResult>,
    pub violations: Vec<PolicyViolation>,
    /// Most restrictive action among failed results; `Allow` when none failed.
    pub verdict: EnforcementAction,
    pub record: DecisionRecord,
}

impl GovernanceDecision {
    /// `false` for `block` and `require_approval`.
    pub fn permits_execution(&self) -> bool {
        self.verdict.permits_execution()
    }
}

/// Runs scanners, risk, adherence and policies for one request and audits
/// the outcome.
pub struct GovernancePipeline {
    policy: Arc<dyn PolicyEvaluator>,
    audit: Arc<dyn AuditWriter>,
    pii: Option<Arc<dyn PiiScanner>>,
    shield: Option<Arc<dyn InjectionScanner>>,
    risk: Option<Arc<dyn RiskAssessor>>,
    adherence: Option<Arc<dyn AdherenceMonitor>>,
}

impl GovernancePipeline {
    /// A pipeline that only evaluates policies and audits. Add the scanners
    /// and scorers with the `with_*` methods; stages without a component are
    /// skipped.
    pub fn new(policy: Arc<dyn PolicyEvaluator>, audit: Arc<dyn AuditWriter>) -> Self {
        Self {
            policy,
            audit,
            pii: None,
            shield: None,
            risk: None,
            adherence: None,
        }
    }

    /// Scan text inputs for PII.
    pub fn with_pii_scanner(mut self, pii: Arc<dyn PiiScanner>) -> Self {
        self.pii = Some(pii);
        self
    }

    /// Scan text inputs for prompt injection.
    pub fn with_injection_scanner(mut self, shield: Arc<dyn InjectionScanner>) -> Self {
        self.shield = Some(shield);
        self
    }

    /// Attach a risk score to every context.
    pub fn with_risk_assessor(mut self, risk: Arc<dyn RiskAssessor>) -> Self {
        self.risk = Some(risk);
        self
    }

    /// Score adherence for requests that carry an execution.
    pub fn with_adherence_monitor(mut self, adherence: Arc<dyn AdherenceMonitor>) -> Self {
        self.adherence = Some(adherence);
        self
    }

    /// Run every stage for one request.
    ///
    /// # Errors
    ///
    /// `SpecificationNotFound` when an execution is supplied for a task with
    /// no registered specification, and any error from the audit writer.
    /// Policy failures are not errors; they are reflected in `verdict`.
    pub async fn evaluate(&self, request: GovernanceRequest) -> WardenResult<GovernanceDecision> {
        let GovernanceRequest {
            mut context,
            execution,
        } = request;

        debug!(
            request_id = %context.request_id,
            agent_id = %context.agent_id,
            text_inputs = context.text_inputs.len(),
            "governance pipeline starting"
        );

        // ── Stage 1: text scanning ───────────────────────────────────────────
        if !context.text_inputs.is_empty() {
            if let Some(pii) = &self.pii {
                let mut combined = PiiDetectionResult::clean();
                for text in context.text_inputs.values() {
                    combined.absorb(&pii.scan(text));
                }
                context.attachments.pii = Some(combined);
            }
            if let Some(shield) = &self.shield {
                let combined = context
                    .text_inputs
                    .values()
                    .map(|text| shield.analyze(text))
                    .fold(PromptInjectionResult::default(), |acc, r| acc.most_severe(r));
                context.attachments.injection = Some(combined);
            }
        }

        // ── Stage 2: risk ────────────────────────────────────────────────────
        //
        // Runs after scanning so PII exposure can account for the scan.
        if let Some(risk) = &self.risk {
            context.attachments.risk = Some(risk.evaluate_risk(&context));
        }

        // ── Stage 3: adherence ───────────────────────────────────────────────
        if let (Some(adherence), Some(execution)) = (&self.adherence, &execution) {
            context.attachments.adherence = Some(adherence.evaluate(execution)?);
        }

        // ── Stage 4: policy evaluation ───────────────────────────────────────
        let batch = self.policy.evaluate_all(&context).await;
        let verdict = EnforcementAction::most_restrictive(
            batch.results.iter().filter(|r| !r.passed).map(|r| r.action),
        );

        // ── Stage 5: audit ───────────────────────────────────────────────────
        let record = DecisionRecord {
            request_id: context.request_id.clone(),
            agent_id: context.agent_id.clone(),
            user_id: context.user_id.clone(),
            verdict,
            outcomes: batch.results.iter().map(PolicyOutcome::from).collect(),
            violation_ids: batch.violations.iter().map(|v| v.id.clone()).collect(),
            risk_score: context.attachments.risk.as_ref().map(|r| r.overall),
            timestamp: Utc::now(),
        };
        self.audit.write(&record)?;

        if verdict.permits_execution() {
            info!(
                request_id = %context.request_id,
                agent_id = %context.agent_id,
                verdict = %verdict,
                policies = batch.results.len(),
                "request permitted"
            );
        } else {
            warn!(
                request_id = %context.request_id,
                agent_id = %context.agent_id,
                verdict = %verdict,
                violations = batch.violations.len(),
                "request stopped by policy"
            );
        }

        Ok(GovernanceDecision {
            context,
            results: batch.results,
            violations: batch.violations,
            verdict,
            record,
        })
    }
}
