//! Error types for the Warden governance core.
//!
//! All fallible operations return `WardenResult<T>`. Variants follow four
//! classes: configuration errors (fatal, surfaced immediately), evaluation
//! errors (recovered locally by the policy engine and downgraded to `warn`
//! results), not-found errors, and illegal state transitions.

use thiserror::Error;

/// The unified error type for the Warden crates.
#[derive(Debug, Error)]
pub enum WardenError {
    /// A required configuration value is missing or invalid.
    ///
    /// Raised at construction time (e.g. risk weights that do not sum to 1.0)
    /// and never silently defaulted.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A policy condition could not be evaluated against the context.
    #[error("evaluation of policy '{policy_id}' failed: {reason}")]
    EvaluationFailed { policy_id: String, reason: String },

    /// A policy evaluation exceeded its time budget.
    #[error("evaluation of policy '{policy_id}' timed out after {timeout_ms} ms")]
    EvaluationTimeout { policy_id: String, timeout_ms: u64 },

    #[error("policy '{policy_id}' not found")]
    PolicyNotFound { policy_id: String },

    #[error("violation '{violation_id}' not found")]
    ViolationNotFound { violation_id: String },

    #[error("agent '{agent_id}' not found")]
    AgentNotFound { agent_id: String },

    #[error("credential '{credential_id}' not found")]
    CredentialNotFound { credential_id: String },

    #[error("task specification '{task_id}' not found")]
    SpecificationNotFound { task_id: String },

    /// An entity with the same identifier is already registered.
    #[error("{entity} '{id}' already exists")]
    DuplicateEntity { entity: String, id: String },

    /// A lifecycle transition that the entity's state machine forbids.
    #[error("invalid {entity} transition from '{from}' to '{to}'")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// The requested report format has no renderer in the core.
    #[error("report format '{format}' is not supported")]
    UnsupportedReportFormat { format: String },

    /// The audit trail could not record a decision.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },
}

/// Convenience alias used throughout the Warden crates.
pub type WardenResult<T> = Result<T, WardenError>;
