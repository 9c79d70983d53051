//! Task specification and adherence measurement types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{history::TrendSummary, severity::Severity};

/// The envelope an agent is expected to stay within for one task type.
///
/// Supplied once per task type by the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpecification {
    pub task_id: String,
    #[serde(default)]
    pub description: String,
    /// Phrases expected to appear in the agent's outputs.
    #[serde(default)]
    pub goals: Vec<String>,
    /// Keywords an action must mention to count as in scope.
    #[serde(default)]
    pub scope: Vec<String>,
    /// Free-text constraints, checked by keyword rules (e.g. "no external api").
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub expected_outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
}

impl TaskSpecification {
    /// A specification with no goals, scope, constraints or time limit.
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            description: String::new(),
            goals: Vec::new(),
            scope: Vec::new(),
            constraints: Vec::new(),
            expected_outputs: Vec::new(),
            max_duration_ms: None,
        }
    }
}

/// What an agent actually did while executing a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub agent_id: String,
    pub task_id: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    pub duration_ms: u64,
}

/// Which adherence check a `TaskViolation` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskViolationKind {
    ScopeDrift,
    GoalMisalignment,
    ConstraintViolation,
    OutputQuality,
    TimeOverrun,
}

impl fmt::Display for TaskViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskViolationKind::ScopeDrift => "scope_drift",
            TaskViolationKind::GoalMisalignment => "goal_misalignment",
            TaskViolationKind::ConstraintViolation => "constraint_violation",
            TaskViolationKind::OutputQuality => "output_quality",
            TaskViolationKind::TimeOverrun => "time_overrun",
        };
        f.write_str(s)
    }
}

/// A single deviation from the task envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskViolation {
    pub kind: TaskViolationKind,
    pub severity: Severity,
    pub description: String,
    /// The offending actions, missing goals, or similar supporting detail.
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// The five 0–100 adherence sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdherenceScores {
    pub scope: f64,
    pub goal: f64,
    pub constraint: f64,
    pub output: f64,
    pub time: f64,
}

/// One adherence measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAdherenceMetrics {
    pub agent_id: String,
    pub task_id: String,
    /// Weighted composite in `[0, 100]`.
    pub overall_score: f64,
    pub scores: AdherenceScores,
    pub drift_detected: bool,
    /// Present only when drift was detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_severity: Option<Severity>,
    pub violations: Vec<TaskViolation>,
    pub evaluated_at: DateTime<Utc>,
}

/// Stored adherence measurements for one agent with their trend summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdherenceHistory {
    pub agent_id: String,
    pub evaluations: Vec<TaskAdherenceMetrics>,
    pub summary: TrendSummary,
}
