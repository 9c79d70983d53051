//! The five adherence sub-scores.
//!
//! Each scorer returns a score in `[0, 100]` and at most one violation.
//! Keyword matching is case-insensitive substring matching throughout.

use warden_contracts::{
    adherence::{ExecutionContext, TaskSpecification, TaskViolation, TaskViolationKind},
    severity::Severity,
};

// ── Weights and limits ───────────────────────────────────────────────────────

pub const SCOPE_WEIGHT: f64 = 0.25;
pub const GOAL_WEIGHT: f64 = 0.25;
pub const CONSTRAINT_WEIGHT: f64 = 0.20;
pub const OUTPUT_WEIGHT: f64 = 0.20;
pub const TIME_WEIGHT: f64 = 0.10;

/// Output quality below this score is a violation.
pub const OUTPUT_QUALITY_MIN: f64 = 60.0;

pub type SubScore = (f64, Option<TaskViolation>);

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn ratio(matched: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        100.0 * matched as f64 / total as f64
    }
}

// ── Scope ────────────────────────────────────────────────────────────────────

/// Share of actions that mention at least one scope keyword.
///
/// Every unmatched action is listed as evidence of scope drift. An empty
/// scope declares no restriction.
pub fn scope(spec: &TaskSpecification, exec: &ExecutionContext) -> SubScore {
    if spec.scope.is_empty() {
        return (100.0, None);
    }
    let unmatched: Vec<String> = exec
        .actions
        .iter()
        .filter(|action| !spec.scope.iter().any(|kw| contains_ci(action, kw)))
        .cloned()
        .collect();
    let score = ratio(exec.actions.len() - unmatched.len(), exec.actions.len());
    if unmatched.is_empty() {
        return (score, None);
    }
    let severity = if score < 50.0 {
        Severity::High
    } else {
        Severity::Medium
    };
    let violation = TaskViolation {
        kind: TaskViolationKind::ScopeDrift,
        severity,
        description: format!(
            "{} of {} actions fall outside the declared scope",
            unmatched.len(),
            exec.actions.len()
        ),
        evidence: unmatched,
    };
    (score, Some(violation))
}

// ── Goals ────────────────────────────────────────────────────────────────────

/// Share of declared goals found in the outputs.
pub fn goal(spec: &TaskSpecification, exec: &ExecutionContext) -> SubScore {
    let missing: Vec<String> = spec
        .goals
        .iter()
        .filter(|g| !exec.outputs.iter().any(|out| contains_ci(out, g)))
        .cloned()
        .collect();
    let score = ratio(spec.goals.len() - missing.len(), spec.goals.len());
    if missing.is_empty() {
        return (score, None);
    }
    let severity = if score < 50.0 {
        Severity::High
    } else {
        Severity::Medium
    };
    let violation = TaskViolation {
        kind: TaskViolationKind::GoalMisalignment,
        severity,
        description: format!("{} of {} goals not reflected in outputs", missing.len(), spec.goals.len()),
        evidence: missing,
    };
    (score, Some(violation))
}

// ── Constraints ──────────────────────────────────────────────────────────────

/// A keyword rule: a constraint mentioning any `trigger` is violated by any
/// action (or output, when `check_outputs`) mentioning any `forbidden` term.
struct ConstraintRule {
    triggers: &'static [&'static str],
    forbidden: &'static [&'static str],
    check_outputs: bool,
}

const CONSTRAINT_RULES: &[ConstraintRule] = &[
    ConstraintRule {
        triggers: &["no external api", "no api", "no third-party"],
        forbidden: &["api", "http"],
        check_outputs: false,
    },
    ConstraintRule {
        triggers: &["read only", "read-only", "no write", "no modification"],
        forbidden: &["write", "update", "delete", "create", "insert", "modify"],
        check_outputs: false,
    },
    ConstraintRule {
        triggers: &["no delete", "no deletion", "never delete"],
        forbidden: &["delete", "remove", "drop", "purge"],
        check_outputs: false,
    },
    ConstraintRule {
        triggers: &["no network", "offline"],
        forbidden: &["http", "fetch", "download", "upload", "network"],
        check_outputs: false,
    },
    ConstraintRule {
        triggers: &["no pii", "no personal data"],
        forbidden: &["ssn", "email", "phone", "credit card", "passport", "pii"],
        check_outputs: true,
    },
];

/// Actions or outputs that break `constraint`; empty when the constraint
/// holds or no rule understands it.
fn offending(constraint: &str, exec: &ExecutionContext) -> Vec<String> {
    let constraint = constraint.to_lowercase();
    let Some(rule) = CONSTRAINT_RULES
        .iter()
        .find(|r| r.triggers.iter().any(|t| constraint.contains(t)))
    else {
        return Vec::new();
    };
    let mentions = |text: &&String| rule.forbidden.iter().any(|f| contains_ci(text, f));
    let mut found: Vec<String> = exec.actions.iter().filter(mentions).cloned().collect();
    if rule.check_outputs {
        found.extend(exec.outputs.iter().filter(mentions).cloned());
    }
    found
}

/// Share of constraints honored. Any broken constraint is critical.
pub fn constraint(spec: &TaskSpecification, exec: &ExecutionContext) -> SubScore {
    let mut broken = Vec::new();
    let mut evidence = Vec::new();
    for c in &spec.constraints {
        let hits = offending(c, exec);
        if !hits.is_empty() {
            broken.push(c.clone());
            evidence.extend(hits);
        }
    }
    let score = ratio(spec.constraints.len() - broken.len(), spec.constraints.len());
    if broken.is_empty() {
        return (score, None);
    }
    let violation = TaskViolation {
        kind: TaskViolationKind::ConstraintViolation,
        severity: Severity::Critical,
        description: format!("constraints violated: {}", broken.join("; ")),
        evidence,
    };
    (score, Some(violation))
}

// ── Outputs ──────────────────────────────────────────────────────────────────

/// Share of expected outputs produced. Below 60 is a medium violation.
pub fn output(spec: &TaskSpecification, exec: &ExecutionContext) -> SubScore {
    let missing: Vec<String> = spec
        .expected_outputs
        .iter()
        .filter(|e| !exec.outputs.iter().any(|out| contains_ci(out, e)))
        .cloned()
        .collect();
    let score = ratio(
        spec.expected_outputs.len() - missing.len(),
        spec.expected_outputs.len(),
    );
    if score >= OUTPUT_QUALITY_MIN {
        return (score, None);
    }
    let violation = TaskViolation {
        kind: TaskViolationKind::OutputQuality,
        severity: Severity::Medium,
        description: format!(
            "only {:.0}% of expected outputs produced",
            score
        ),
        evidence: missing,
    };
    (score, Some(violation))
}

// ── Time ─────────────────────────────────────────────────────────────────────

/// 100 within the limit, then a linear penalty reaching 0 at twice the limit.
pub fn time(spec: &TaskSpecification, exec: &ExecutionContext) -> SubScore {
    let Some(max) = spec.max_duration_ms.filter(|m| *m > 0) else {
        return (100.0, None);
    };
    if exec.duration_ms <= max {
        return (100.0, None);
    }
    let overage_ms = exec.duration_ms - max;
    let score = (100.0 - 100.0 * overage_ms as f64 / max as f64).max(0.0);
    let overage_minutes = overage_ms as f64 / 60_000.0;
    let severity = if overage_ms > max {
        Severity::High
    } else {
        Severity::Medium
    };
    let violation = TaskViolation {
        kind: TaskViolationKind::TimeOverrun,
        severity,
        description: format!("exceeded maximum duration by {:.1} minutes", overage_minutes),
        evidence: vec![format!("overage_minutes={:.2}", overage_minutes)],
    };
    (score, Some(violation))
}

/// Drift severity for a drifting overall score.
pub fn drift_severity(overall: f64) -> Severity {
    if overall >= 50.0 {
        Severity::Low
    } else if overall >= 30.0 {
        Severity::Medium
    } else if overall >= 10.0 {
        Severity::High
    } else {
        Severity::Critical
    }
}
