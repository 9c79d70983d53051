//! Risk score types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{history::TrendSummary, severity::Severity};

/// The ten independent factors that make up a composite risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    DataAccess,
    ExternalApi,
    Permission,
    ExecutionHistory,
    Complexity,
    PiiExposure,
    Compliance,
    Cost,
    Performance,
    Ethical,
}

impl RiskFactor {
    pub const ALL: [RiskFactor; 10] = [
        RiskFactor::DataAccess,
        RiskFactor::ExternalApi,
        RiskFactor::Permission,
        RiskFactor::ExecutionHistory,
        RiskFactor::Complexity,
        RiskFactor::PiiExposure,
        RiskFactor::Compliance,
        RiskFactor::Cost,
        RiskFactor::Performance,
        RiskFactor::Ethical,
    ];

    /// Snake-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            RiskFactor::DataAccess => "data_access",
            RiskFactor::ExternalApi => "external_api",
            RiskFactor::Permission => "permission",
            RiskFactor::ExecutionHistory => "execution_history",
            RiskFactor::Complexity => "complexity",
            RiskFactor::PiiExposure => "pii_exposure",
            RiskFactor::Compliance => "compliance",
            RiskFactor::Cost => "cost",
            RiskFactor::Performance => "performance",
            RiskFactor::Ethical => "ethical",
        }
    }
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One 0–100 sub-score per `RiskFactor`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub data_access: f64,
    pub external_api: f64,
    pub permission: f64,
    pub execution_history: f64,
    pub complexity: f64,
    pub pii_exposure: f64,
    pub compliance: f64,
    pub cost: f64,
    pub performance: f64,
    pub ethical: f64,
}

impl RiskFactors {
    /// Score of `factor`.
    pub fn get(&self, factor: RiskFactor) -> f64 {
        match factor {
            RiskFactor::DataAccess => self.data_access,
            RiskFactor::ExternalApi => self.external_api,
            RiskFactor::Permission => self.permission,
            RiskFactor::ExecutionHistory => self.execution_history,
            RiskFactor::Complexity => self.complexity,
            RiskFactor::PiiExposure => self.pii_exposure,
            RiskFactor::Compliance => self.compliance,
            RiskFactor::Cost => self.cost,
            RiskFactor::Performance => self.performance,
            RiskFactor::Ethical => self.ethical,
        }
    }
}

/// Risk of one pending agent action at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub agent_id: String,
    /// Weighted composite in `[0, 100]`.
    pub overall: f64,
    pub factors: RiskFactors,
    pub severity: Severity,
    /// Starts at 100 and is reduced for every missing input.
    pub confidence: f64,
    pub recommendations: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

/// One completed agent execution, as reported by the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

/// Aggregate view over an agent's execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total: usize,
    pub failures: usize,
    pub success_rate: f64,
    pub mean_duration_ms: f64,
    /// Most frequent error types, most frequent first.
    pub top_errors: Vec<(String, usize)>,
}

/// Stored evaluations for one agent plus rolling-average trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskHistory {
    pub agent_id: String,
    pub evaluations: Vec<RiskScore>,
    pub summary: TrendSummary,
}
