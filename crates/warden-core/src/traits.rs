//! Seam traits between the governance components.
//!
//! Each evaluated component sits behind one trait so the pipeline, the
//! policy engine and the embedding application depend on behavior rather
//! than concrete types:
//!
//! - `PiiScanner`, `InjectionScanner`: leaf text classifiers
//! - `RiskAssessor`, `AdherenceMonitor`: leaf scorers with their own history
//! - `PolicyEvaluator`: the aggregator, async because each policy runs under
//!   a timeout
//! - `PermissionChecker`: identity lookups consumed by permission conditions
//! - `EventSink`, `AuditWriter`: outbound notification and record sinks
//!
//! Implementations must be `Send + Sync`; every component is shared across
//! concurrent evaluation tasks behind an `Arc`.

use async_trait::async_trait;

use warden_contracts::{
    adherence::{ExecutionContext, TaskAdherenceMetrics},
    context::PolicyContext,
    decision::DecisionRecord,
    error::WardenResult,
    event::GovernanceEvent,
    injection::PromptInjectionResult,
    pii::PiiDetectionResult,
    risk::RiskScore,
    violation::EvaluationBatch,
};

/// Evaluates the policy catalog against a request context.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluate every enabled policy and return one result per policy plus
    /// the violations recorded for failed ones.
    ///
    /// Never fails as a whole: per-policy errors and timeouts are folded into
    /// `warn` results.
    async fn evaluate_all(&self, ctx: &PolicyContext) -> EvaluationBatch;
}

/// Classifies free text for personally identifiable information.
pub trait PiiScanner: Send + Sync {
    fn scan(&self, text: &str) -> PiiDetectionResult;
}

/// Classifies free text for prompt-injection attacks.
pub trait InjectionScanner: Send + Sync {
    fn analyze(&self, input: &str) -> PromptInjectionResult;
}

/// Computes a composite risk score and appends it to the agent's history.
pub trait RiskAssessor: Send + Sync {
    fn evaluate_risk(&self, ctx: &PolicyContext) -> RiskScore;
}

/// Compares an execution against its registered task specification.
pub trait AdherenceMonitor: Send + Sync {
    /// Returns `SpecificationNotFound` when no specification is registered
    /// for `execution.task_id`.
    fn evaluate(&self, execution: &ExecutionContext) -> WardenResult<TaskAdherenceMetrics>;
}

/// Answers whether an agent may perform `action` on `resource`.
///
/// Reads must not block on writes for unrelated agents.
pub trait PermissionChecker: Send + Sync {
    fn has_permission(&self, agent_id: &str, resource: &str, action: &str) -> bool;
}

/// Receives governance notifications.
///
/// Delivery is synchronous and best-effort from the publisher's view: a sink
/// must not fail the operation that published the event.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &GovernanceEvent);
}

/// The append-only decision record sink.
///
/// Every governed request produces exactly one `DecisionRecord`. A failed
/// write is fatal to the request: the pipeline returns `AuditWriteFailed`.
pub trait AuditWriter: Send + Sync {
    fn write(&self, record: &DecisionRecord) -> WardenResult<()>;
}
