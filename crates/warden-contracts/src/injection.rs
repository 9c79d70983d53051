//! Prompt-injection analysis result types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// The eight prompt-injection attack categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackType {
    InstructionOverride,
    ContextManipulation,
    RoleConfusion,
    GoalHijacking,
    DataExfiltration,
    PrivilegeEscalation,
    SystemPromptLeak,
    Jailbreak,
}

impl AttackType {
    /// Snake-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            AttackType::InstructionOverride => "instruction_override",
            AttackType::ContextManipulation => "context_manipulation",
            AttackType::RoleConfusion => "role_confusion",
            AttackType::GoalHijacking => "goal_hijacking",
            AttackType::DataExfiltration => "data_exfiltration",
            AttackType::PrivilegeEscalation => "privilege_escalation",
            AttackType::SystemPromptLeak => "system_prompt_leak",
            AttackType::Jailbreak => "jailbreak",
        }
    }
}

impl fmt::Display for AttackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of analyzing one input for prompt injection.
///
/// `is_injection` is set only by pattern matches (including the oversized
/// input rule). The heuristic score can raise `confidence` on its own but
/// never flips `is_injection`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptInjectionResult {
    pub is_injection: bool,
    /// Combined confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Category of the first matching rule, in rule-table order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<AttackType>,
    /// Every category with at least one matching rule, in first-seen order.
    #[serde(default)]
    pub detected_types: Vec<AttackType>,
    /// Maximum severity across matches; `None` when nothing matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub matched_patterns: Vec<String>,
    /// Heuristic suspicion in `[0.0, 1.0]`.
    pub heuristic_score: f64,
    /// The input was longer than the configured maximum and was truncated.
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitized_text: Option<String>,
}

impl PromptInjectionResult {
    /// Keep whichever of two results is the more serious finding.
    pub fn most_severe(self, other: PromptInjectionResult) -> PromptInjectionResult {
        let rank = |r: &PromptInjectionResult| (r.is_injection, r.severity, ordered(r.confidence));
        if rank(&other) > rank(&self) {
            other
        } else {
            self
        }
    }
}

fn ordered(confidence: f64) -> u64 {
    (confidence.clamp(0.0, 1.0) * 1_000_000.0) as u64
}
