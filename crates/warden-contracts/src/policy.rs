//! Policy, condition and evaluation-result types.
//!
//! A policy is an ordered list of conditions combined with AND semantics: it
//! passes only if every condition holds. Condition kinds and operators are
//! closed enums so the evaluator's dispatch is checked for exhaustiveness.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::severity::Severity;

/// Grouping used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCategory {
    DataProtection,
    AccessControl,
    Security,
    Compliance,
    CostControl,
    Operational,
    Ethics,
}

/// What the caller must do when a policy fails.
///
/// `Block` means refuse the action; `RequireApproval` means pause for human
/// sign-off. `Allow`, `Warn` and `AutoRemediate` let the action proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementAction {
    Allow,
    Warn,
    Block,
    RequireApproval,
    AutoRemediate,
}

impl EnforcementAction {
    /// Restrictiveness rank: block > require_approval > auto_remediate > warn > allow.
    pub fn rank(self) -> u8 {
        match self {
            EnforcementAction::Allow => 0,
            EnforcementAction::Warn => 1,
            EnforcementAction::AutoRemediate => 2,
            EnforcementAction::RequireApproval => 3,
            EnforcementAction::Block => 4,
        }
    }

    /// The most restrictive action in `actions`, or `Allow` when empty.
    pub fn most_restrictive<I>(actions: I) -> EnforcementAction
    where
        I: IntoIterator<Item = EnforcementAction>,
    {
        actions
            .into_iter()
            .max_by_key(|a| a.rank())
            .unwrap_or(EnforcementAction::Allow)
    }

    /// Whether the underlying agent action may proceed without a human.
    pub fn permits_execution(self) -> bool {
        !matches!(
            self,
            EnforcementAction::Block | EnforcementAction::RequireApproval
        )
    }

    /// Snake-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            EnforcementAction::Allow => "allow",
            EnforcementAction::Warn => "warn",
            EnforcementAction::Block => "block",
            EnforcementAction::RequireApproval => "require_approval",
            EnforcementAction::AutoRemediate => "auto_remediate",
        }
    }
}

impl fmt::Display for EnforcementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The context field a condition reads.
///
/// Serialized with a `type` tag, e.g. `type = "data_access_operations"` or
/// `type = "metadata", path = "workflow.env"` in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionField {
    /// Full data-access descriptors as JSON objects.
    DataAccess,
    DataClassifications,
    DataAccessTypes,
    /// `"<classification>:<access_type>"` strings.
    DataAccessOperations,
    /// Endpoints of all API calls.
    ApiCall,
    ExternalApiCalls,
    UnauthenticatedApiCalls,
    /// True if any access is flagged PII or an attached scan found PII.
    PiiDetection,
    PiiTypes,
    RiskScore,
    RiskSeverity,
    AdherenceScore,
    DriftDetected,
    InjectionDetected,
    InjectionSeverity,
    EstimatedCost,
    EstimatedDuration,
    RequestedActions,
    AgentId,
    UserId,
    /// True if every requested `resource:action` is granted to the agent.
    Permission,
    /// Dotted path into the free-form metadata map.
    Metadata { path: String },
    /// A caller-registered extractor.
    Custom { name: String },
}

impl fmt::Display for ConditionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionField::DataAccess => "data_access",
            ConditionField::DataClassifications => "data_classifications",
            ConditionField::DataAccessTypes => "data_access_types",
            ConditionField::DataAccessOperations => "data_access_operations",
            ConditionField::ApiCall => "api_call",
            ConditionField::ExternalApiCalls => "external_api_calls",
            ConditionField::UnauthenticatedApiCalls => "unauthenticated_api_calls",
            ConditionField::PiiDetection => "pii_detection",
            ConditionField::PiiTypes => "pii_types",
            ConditionField::RiskScore => "risk_score",
            ConditionField::RiskSeverity => "risk_severity",
            ConditionField::AdherenceScore => "adherence_score",
            ConditionField::DriftDetected => "drift_detected",
            ConditionField::InjectionDetected => "injection_detected",
            ConditionField::InjectionSeverity => "injection_severity",
            ConditionField::EstimatedCost => "estimated_cost",
            ConditionField::EstimatedDuration => "estimated_duration",
            ConditionField::RequestedActions => "requested_actions",
            ConditionField::AgentId => "agent_id",
            ConditionField::UserId => "user_id",
            ConditionField::Permission => "permission",
            ConditionField::Metadata { path } => return write!(f, "metadata.{path}"),
            ConditionField::Custom { name } => return write!(f, "custom:{name}"),
        };
        f.write_str(s)
    }
}

/// Comparison applied between an extracted field and a condition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
    Matches,
    In,
    NotIn,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Equals => "equals",
            Operator::Contains => "contains",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
            Operator::Matches => "matches",
            Operator::In => "in",
            Operator::NotIn => "not_in",
        };
        f.write_str(s)
    }
}

/// One predicate of a policy. It holds when `operator` applied to the
/// extracted field and `value` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCondition {
    #[serde(flatten)]
    pub field: ConditionField,
    pub operator: Operator,
    pub value: Value,
}

impl PolicyCondition {
    /// A condition comparing `field` to `value` with `operator`.
    pub fn new(field: ConditionField, operator: Operator, value: Value) -> Self {
        Self {
            field,
            operator,
            value,
        }
    }
}

impl fmt::Display for PolicyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// A governance rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: PolicyCategory,
    pub severity: Severity,
    pub action: EnforcementAction,
    /// AND-composed. An empty list always passes.
    #[serde(default)]
    pub conditions: Vec<PolicyCondition>,
    /// Remediation steps surfaced as recommendations when the policy fails.
    #[serde(default)]
    pub remediation: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

impl Policy {
    /// An enabled, version 1 policy with no conditions, so it always passes
    /// until conditions are added.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: PolicyCategory,
        severity: Severity,
        action: EnforcementAction,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category,
            severity,
            action,
            conditions: Vec::new(),
            remediation: Vec::new(),
            enabled: true,
            version: 1,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a condition. All conditions must hold for the policy to pass.
    pub fn with_condition(mut self, field: ConditionField, operator: Operator, value: Value) -> Self {
        self.conditions
            .push(PolicyCondition::new(field, operator, value));
        self
    }

    /// Add a remediation step reported with violations.
    pub fn with_remediation(mut self, step: impl Into<String>) -> Self {
        self.remediation.push(step.into());
        self
    }

    /// Start the policy disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Outcome of one policy against one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluationResult {
    pub policy_id: String,
    pub policy_name: String,
    pub policy_version: u32,
    pub passed: bool,
    /// `Allow` when passed, the policy's action when a condition failed,
    /// `Warn` when evaluation errored or timed out.
    pub action: EnforcementAction,
    pub severity: Severity,
    /// Message of the failing condition; evaluation stops at the first failure.
    pub violations: Vec<String>,
    pub recommendations: Vec<String>,
    pub duration_us: u64,
    pub evaluated_at: DateTime<Utc>,
    /// Set when the evaluation errored or timed out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PolicyEvaluationResult {
    /// A condition failed (as opposed to the evaluation itself erroring).
    pub fn is_violation(&self) -> bool {
        !self.passed && self.error.is_none()
    }
}
