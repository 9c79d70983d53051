//! The request context evaluated by every governance component.
//!
//! A `PolicyContext` describes one pending agent action. The caller builds it
//! fresh per request, runs the detectors and scorers, stores their results in
//! `attachments`, and hands it to the policy engine. It is never persisted
//! as-is; violations keep a snapshot of it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    adherence::TaskAdherenceMetrics, injection::PromptInjectionResult, pii::PiiDetectionResult,
    risk::RiskScore,
};

/// Sensitivity class of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

impl DataClassification {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            DataClassification::Public => "public",
            DataClassification::Internal => "internal",
            DataClassification::Confidential => "confidential",
            DataClassification::Restricted => "restricted",
        }
    }
}

impl fmt::Display for DataClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a data source is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    Read,
    Write,
    Delete,
}

impl AccessType {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            AccessType::Read => "read",
            AccessType::Write => "write",
            AccessType::Delete => "delete",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One data source the action will touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataAccess {
    pub source: String,
    pub classification: DataClassification,
    pub access_type: AccessType,
    #[serde(default)]
    pub contains_pii: bool,
    /// Region the data is stored in, compared against the residency requirement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl DataAccess {
    /// A descriptor for `source` with no PII flag or region.
    pub fn new(
        source: impl Into<String>,
        classification: DataClassification,
        access_type: AccessType,
    ) -> Self {
        Self {
            source: source.into(),
            classification,
            access_type,
            contains_pii: false,
            region: None,
        }
    }

    /// Mark the source as holding PII.
    pub fn with_pii(mut self) -> Self {
        self.contains_pii = true;
        self
    }

    /// Region the data resides in, for residency checks.
    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// `"<classification>:<access_type>"`, e.g. `"restricted:delete"`.
    pub fn operation(&self) -> String {
        format!("{}:{}", self.classification, self.access_type)
    }
}

/// One API call the action will make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub external: bool,
    /// Whether the call carries authentication. Unauthenticated external calls
    /// are penalized by the risk evaluator.
    #[serde(default)]
    pub auth_required: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

impl ApiCall {
    /// An internal, authenticated call to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: default_method(),
            external: false,
            auth_required: true,
        }
    }

    /// Mark the call as leaving the organization.
    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }

    /// Mark the call as made without authentication.
    pub fn unauthenticated(mut self) -> Self {
        self.auth_required = false;
        self
    }
}

/// Regulatory envelope of the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceContext {
    /// Frameworks the workflow must satisfy (e.g. "gdpr", "hipaa").
    #[serde(default)]
    pub required_frameworks: Vec<String>,
    /// Frameworks the deployment is actually certified for.
    #[serde(default)]
    pub active_frameworks: Vec<String>,
    /// Region all data must reside in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_residency: Option<String>,
}

/// Ethical-impact flags of the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthicsContext {
    #[serde(default)]
    pub high_impact_domain: bool,
    #[serde(default = "default_true")]
    pub explainable: bool,
    /// Measured bias in `[0.0, 1.0]`, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_score: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl Default for EthicsContext {
    fn default() -> Self {
        Self {
            high_impact_domain: false,
            explainable: true,
            bias_score: None,
        }
    }
}

/// Results of the detectors and scorers, attached before policy evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextAttachments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pii: Option<PiiDetectionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection: Option<PromptInjectionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adherence: Option<TaskAdherenceMetrics>,
}

/// Everything the governance core needs to judge one pending agent action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyContext {
    /// Unique per request; excluded from cache fingerprints.
    pub request_id: String,
    pub agent_id: String,
    pub user_id: String,
    /// Actions in `resource:action` form, e.g. `"customers:delete"`.
    #[serde(default)]
    pub requested_actions: Vec<String>,
    #[serde(default)]
    pub data_access: Vec<DataAccess>,
    #[serde(default)]
    pub api_calls: Vec<ApiCall>,
    /// Permission keys the action asks to exercise.
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_ms: Option<u64>,
    /// Number of workflow nodes involved, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ComplianceContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ethics: Option<EthicsContext>,
    /// Free-text fields (prompts, user messages) to scan for PII and injection.
    #[serde(default)]
    pub text_inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub attachments: ContextAttachments,
    pub timestamp: DateTime<Utc>,
}

impl PolicyContext {
    /// An empty context for `agent_id` acting on behalf of `user_id`.
    pub fn new(agent_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            user_id: user_id.into(),
            requested_actions: Vec::new(),
            data_access: Vec::new(),
            api_calls: Vec::new(),
            permissions: Vec::new(),
            estimated_cost: None,
            estimated_duration_ms: None,
            node_count: None,
            compliance: None,
            ethics: None,
            text_inputs: BTreeMap::new(),
            metadata: Map::new(),
            attachments: ContextAttachments::default(),
            timestamp: Utc::now(),
        }
    }

    /// Add a requested action, as `resource:action`.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.requested_actions.push(action.into());
        self
    }

    /// Add a data-access descriptor.
    pub fn with_data_access(mut self, access: DataAccess) -> Self {
        self.data_access.push(access);
        self
    }

    /// Add an API-call descriptor.
    pub fn with_api_call(mut self, call: ApiCall) -> Self {
        self.api_calls.push(call);
        self
    }

    /// Add a permission key the agent holds.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Estimated cost of the action.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.estimated_cost = Some(cost);
        self
    }

    /// Estimated duration of the action in milliseconds.
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.estimated_duration_ms = Some(duration_ms);
        self
    }

    /// Residency and framework requirements.
    pub fn with_compliance(mut self, compliance: ComplianceContext) -> Self {
        self.compliance = Some(compliance);
        self
    }

    /// Ethical-impact inputs.
    pub fn with_ethics(mut self, ethics: EthicsContext) -> Self {
        self.ethics = Some(ethics);
        self
    }

    /// Free text to scan for PII and injection, keyed by field name.
    pub fn with_text_input(mut self, field: impl Into<String>, text: impl Into<String>) -> Self {
        self.text_inputs.insert(field.into(), text.into());
        self
    }

    /// Set a metadata value, readable by `metadata { path }` conditions.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// True when any data access is flagged as PII or an attached scan found PII.
    pub fn touches_pii(&self) -> bool {
        self.data_access.iter().any(|a| a.contains_pii)
            || self.attachments.pii.as_ref().is_some_and(|p| p.contains_pii)
    }
}
