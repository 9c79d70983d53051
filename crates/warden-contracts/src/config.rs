//! TOML configuration schema.
//!
//! Every section and field has a default, so an empty document yields the
//! stock configuration:
//!
//! ```toml
//! [policy]
//! evaluation_timeout_ms = 100
//! max_concurrent_evaluations = 100
//!
//! [risk.weights]
//! data_access = 0.15
//! # ...remaining factors; the ten weights must sum to 1.0
//!
//! [shield]
//! max_input_length = 10000
//! ```
//!
//! Semantic validation (e.g. weights summing to 1.0) happens when the owning
//! component is constructed, not here.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::{WardenError, WardenResult},
    pii::{MaskingStrategy, PiiType},
    risk::RiskFactor,
    severity::Severity,
};

/// Root of the governance TOML document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub policy: PolicyEngineConfig,
    pub risk: RiskConfig,
    pub pii: PiiConfig,
    pub shield: ShieldConfig,
    pub adherence: AdherenceConfig,
    pub identity: IdentityConfig,
}

impl GovernanceConfig {
    /// Parse `s` as a TOML governance configuration.
    ///
    /// Returns `WardenError::ConfigError` if the TOML is malformed or does not
    /// match the schema.
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        toml::from_str(s).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to parse governance TOML: {}", e),
        })
    }

    /// Read and parse the TOML file at `path`.
    pub fn from_file(path: &Path) -> WardenResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}

/// `[policy]`: evaluation limits and result caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyEngineConfig {
    /// Hard per-policy evaluation budget.
    pub evaluation_timeout_ms: u64,
    /// Maximum policies evaluated simultaneously for one context.
    pub max_concurrent_evaluations: usize,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    /// Load the embedded template catalog at construction.
    pub load_default_templates: bool,
}

impl Default for PolicyEngineConfig {
    fn default() -> Self {
        Self {
            evaluation_timeout_ms: 100,
            max_concurrent_evaluations: 100,
            cache_enabled: true,
            cache_ttl_secs: 300,
            load_default_templates: true,
        }
    }
}

/// Weight of each risk factor in the composite score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
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

impl RiskWeights {
    /// Weight of `factor`.
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

    /// Sum of all ten weights.
    pub fn sum(&self) -> f64 {
        RiskFactor::ALL.iter().map(|f| self.get(*f)).sum()
    }
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            data_access: 0.15,
            external_api: 0.10,
            permission: 0.10,
            execution_history: 0.10,
            complexity: 0.05,
            pii_exposure: 0.15,
            compliance: 0.10,
            cost: 0.08,
            performance: 0.07,
            ethical: 0.10,
        }
    }
}

/// Upper bounds (exclusive) of the low/medium/high buckets; anything above
/// `high` is critical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl RiskThresholds {
    /// Severity bucket for an overall score.
    pub fn bucket(&self, score: f64) -> Severity {
        if score < self.low {
            Severity::Low
        } else if score < self.medium {
            Severity::Medium
        } else if score < self.high {
            Severity::High
        } else {
            Severity::Critical
        }
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 25.0,
            medium: 50.0,
            high: 75.0,
        }
    }
}

/// `[risk]`: factor weights, severity thresholds and retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub weights: RiskWeights,
    pub thresholds: RiskThresholds,
    /// Evaluations and execution records older than this are swept.
    pub retention_days: i64,
    /// Most recent execution records considered by the history factor.
    pub history_window: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            thresholds: RiskThresholds::default(),
            retention_days: 90,
            history_window: 100,
        }
    }
}

/// `[pii]`: rule selection, confidence floor and masking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PiiConfig {
    /// Detections below this confidence are discarded.
    pub min_confidence: f64,
    /// Replace detected spans with bracketed type tags in the result.
    pub auto_redact: bool,
    /// Overrides every rule's own masking strategy when set.
    pub masking_strategy: Option<MaskingStrategy>,
    pub enabled_types: Vec<PiiType>,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            auto_redact: false,
            masking_strategy: None,
            enabled_types: PiiType::ALL.to_vec(),
        }
    }
}

/// `[shield]`: input limits, sanitization and the blocking threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    /// Inputs longer than this many characters are flagged and truncated.
    pub max_input_length: usize,
    /// Replace matched spans with a placeholder in the result.
    pub sanitize: bool,
    /// Minimum severity at which an injection is reported as blocked.
    pub block_severity: Severity,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            max_input_length: 10_000,
            sanitize: true,
            block_severity: Severity::High,
        }
    }
}

/// `[adherence]`: drift threshold and history retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdherenceConfig {
    /// Overall adherence below this score is drift.
    pub drift_threshold: f64,
    pub retention_days: i64,
}

impl Default for AdherenceConfig {
    fn default() -> Self {
        Self {
            drift_threshold: 70.0,
            retention_days: 90,
        }
    }
}

/// `[identity]`: credential lifetime and the expiry sweep period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Lifetime of credentials issued without an explicit TTL.
    pub default_credential_ttl_hours: i64,
    pub sweep_interval_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            default_credential_ttl_hours: 720,
            sweep_interval_secs: 3600,
        }
    }
}
