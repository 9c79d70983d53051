//! The ten risk sub-scores.
//!
//! Each scorer is a pure function of the request context (and, for
//! execution history, the agent's recent records) and returns a value in
//! `[0, 100]`.

use std::collections::HashMap;

use warden_contracts::{
    context::{AccessType, DataClassification, PolicyContext},
    risk::{ExecutionRecord, RiskFactors},
};

/// Permission or action substrings that mark a high-risk capability.
const HIGH_RISK_KEYWORDS: &[&str] = &[
    "admin", "delete", "drop", "execute", "root", "sudo", "grant", "transfer", "*",
];

/// An error type seen this many times in the window counts as a recurring pattern.
const RECURRING_ERROR_MIN: usize = 3;

/// All ten factor scores for `ctx` given the agent's recent executions.
pub fn score_all(ctx: &PolicyContext, history: &[ExecutionRecord]) -> RiskFactors {
    RiskFactors {
        data_access: data_access(ctx),
        external_api: external_api(ctx),
        permission: permission(ctx),
        execution_history: execution_history(history),
        complexity: complexity(ctx),
        pii_exposure: pii_exposure(ctx),
        compliance: compliance(ctx),
        cost: cost(ctx.estimated_cost),
        performance: performance(ctx.estimated_duration_ms),
        ethical: ethical(ctx),
    }
}

fn classification_base(c: DataClassification) -> f64 {
    match c {
        DataClassification::Public => 5.0,
        DataClassification::Internal => 20.0,
        DataClassification::Confidential => 50.0,
        DataClassification::Restricted => 80.0,
    }
}

fn access_multiplier(a: AccessType) -> f64 {
    match a {
        AccessType::Read => 1.0,
        AccessType::Write => 1.5,
        AccessType::Delete => 2.0,
    }
}

/// Riskiest single access, plus 5 per additional source.
pub fn data_access(ctx: &PolicyContext) -> f64 {
    let riskiest = ctx
        .data_access
        .iter()
        .map(|a| classification_base(a.classification) * access_multiplier(a.access_type))
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |m| m.max(s))));
    match riskiest {
        Some(max) => (max + 5.0 * (ctx.data_access.len() - 1) as f64).min(100.0),
        None => 0.0,
    }
}

/// 15 per external call, 5 per internal one, plus 25 per unauthenticated
/// external call.
pub fn external_api(ctx: &PolicyContext) -> f64 {
    let mut score = 0.0;
    for call in &ctx.api_calls {
        score += if call.external { 15.0 } else { 5.0 };
        if call.external && !call.auth_required {
            score += 25.0;
        }
    }
    f64::min(score, 100.0)
}

/// 10 per held permission plus 25 per high-risk permission or action.
pub fn permission(ctx: &PolicyContext) -> f64 {
    let is_high_risk = |key: &String| {
        let key = key.to_ascii_lowercase();
        HIGH_RISK_KEYWORDS.iter().any(|kw| key.contains(kw))
    };
    let high_risk = ctx
        .permissions
        .iter()
        .chain(ctx.requested_actions.iter())
        .filter(|k| is_high_risk(*k))
        .count();
    (10.0 * ctx.permissions.len() as f64 + 25.0 * high_risk as f64).min(100.0)
}

/// Failure rate over the window, plus 20 when one error type recurs.
///
/// An agent with no history scores a neutral 20.
pub fn execution_history(records: &[ExecutionRecord]) -> f64 {
    if records.is_empty() {
        return 20.0;
    }
    let failures = records.iter().filter(|r| !r.success).count();
    let mut score = 80.0 * failures as f64 / records.len() as f64;

    let mut by_type: HashMap<&str, usize> = HashMap::new();
    for kind in records.iter().filter_map(|r| r.error_type.as_deref()) {
        *by_type.entry(kind).or_default() += 1;
    }
    if by_type.values().any(|n| *n >= RECURRING_ERROR_MIN) {
        score += 20.0;
    }
    score.min(100.0)
}

/// 5 per action, data source and API call, plus 2 per workflow node.
pub fn complexity(ctx: &PolicyContext) -> f64 {
    let parts = ctx.requested_actions.len() + ctx.data_access.len() + ctx.api_calls.len();
    let nodes = ctx.node_count.unwrap_or(0) as f64;
    (5.0 * parts as f64 + 2.0 * nodes).min(100.0)
}

/// PII-flagged accesses weighted by access type and classification, never
/// below the risk score of an attached PII scan.
pub fn pii_exposure(ctx: &PolicyContext) -> f64 {
    let flagged: f64 = ctx
        .data_access
        .iter()
        .filter(|a| a.contains_pii)
        .map(|a| {
            let bonus = match a.classification {
                DataClassification::Confidential => 10.0,
                DataClassification::Restricted => 20.0,
                _ => 0.0,
            };
            30.0 * access_multiplier(a.access_type) + bonus
        })
        .sum();
    let scanned = ctx
        .attachments
        .pii
        .as_ref()
        .map_or(0.0, |p| f64::from(p.risk_score));
    flagged.max(scanned).min(100.0)
}

/// 25 per residency mismatch plus 20 per missing required framework.
pub fn compliance(ctx: &PolicyContext) -> f64 {
    let Some(c) = &ctx.compliance else {
        return 0.0;
    };
    let residency_mismatches = match &c.data_residency {
        Some(required) => ctx
            .data_access
            .iter()
            .filter(|a| a.region.as_ref().is_some_and(|r| !r.eq_ignore_ascii_case(required)))
            .count(),
        None => 0,
    };
    let missing = c
        .required_frameworks
        .iter()
        .filter(|req| {
            !c.active_frameworks
                .iter()
                .any(|active| active.eq_ignore_ascii_case(req))
        })
        .count();
    (25.0 * residency_mismatches as f64 + 20.0 * missing as f64).min(100.0)
}

/// Banded by estimated cost. No estimate scores 0.
pub fn cost(estimated: Option<f64>) -> f64 {
    match estimated {
        None => 0.0,
        Some(c) if c < 1.0 => 5.0,
        Some(c) if c < 10.0 => 20.0,
        Some(c) if c < 100.0 => 50.0,
        Some(c) if c < 1000.0 => 75.0,
        Some(_) => 100.0,
    }
}

/// Banded by estimated duration. No estimate scores 0.
pub fn performance(duration_ms: Option<u64>) -> f64 {
    match duration_ms {
        None => 0.0,
        Some(d) if d < 1_000 => 5.0,
        Some(d) if d < 10_000 => 20.0,
        Some(d) if d < 60_000 => 40.0,
        Some(d) if d < 300_000 => 70.0,
        Some(_) => 90.0,
    }
}

/// High-impact domains, missing explainability and bias.
pub fn ethical(ctx: &PolicyContext) -> f64 {
    let Some(e) = &ctx.ethics else {
        return 0.0;
    };
    let mut score = 0.0;
    if e.high_impact_domain {
        score += 40.0;
    }
    if !e.explainable {
        score += 30.0;
    }
    if let Some(bias) = e.bias_score {
        score += 30.0 * bias.clamp(0.0, 1.0);
    }
    f64::min(score, 100.0)
}

#[cfg(test)]
mod tests {
    use warden_contracts::context::{ApiCall, ComplianceContext, DataAccess, EthicsContext};

    use super::*;

    fn record(success: bool, error: Option<&str>) -> ExecutionRecord {
        ExecutionRecord {
            success,
            duration_ms: 100,
            error_type: error.map(str::to_string),
        }
    }

    #[test]
    fn restricted_delete_saturates_data_access() {
        let ctx = PolicyContext::new("a", "u").with_data_access(DataAccess::new(
            "customers",
            DataClassification::Restricted,
            AccessType::Delete,
        ));
        assert_eq!(data_access(&ctx), 100.0);
    }

    #[test]
    fn additional_sources_add_to_riskiest() {
        let ctx = PolicyContext::new("a", "u")
            .with_data_access(DataAccess::new("x", DataClassification::Internal, AccessType::Read))
            .with_data_access(DataAccess::new("y", DataClassification::Public, AccessType::Read));
        assert_eq!(data_access(&ctx), 25.0);
    }

    #[test]
    fn unauthenticated_external_calls_are_penalised() {
        let authed = PolicyContext::new("a", "u").with_api_call(ApiCall::new("https://x").external());
        let open = PolicyContext::new("a", "u")
            .with_api_call(ApiCall::new("https://x").external().unauthenticated());
        assert_eq!(external_api(&authed), 15.0);
        assert_eq!(external_api(&open), 40.0);
    }

    #[test]
    fn high_risk_keywords_raise_permission_risk() {
        let ctx = PolicyContext::new("a", "u")
            .with_permission("reports:read")
            .with_permission("users:admin");
        assert_eq!(permission(&ctx), 45.0);
    }

    #[test]
    fn history_combines_failure_rate_and_recurring_errors() {
        assert_eq!(execution_history(&[]), 20.0);

        let records = vec![
            record(false, Some("timeout")),
            record(false, Some("timeout")),
            record(false, Some("timeout")),
            record(true, None),
        ];
        assert_eq!(execution_history(&records), 80.0);
    }

    #[test]
    fn pii_exposure_never_below_attached_scan() {
        let mut ctx = PolicyContext::new("a", "u");
        ctx.attachments.pii = Some(warden_contracts::pii::PiiDetectionResult {
            contains_pii: true,
            risk_score: 60,
            ..Default::default()
        });
        assert_eq!(pii_exposure(&ctx), 60.0);

        let flagged = ctx.with_data_access(
            DataAccess::new("patients", DataClassification::Restricted, AccessType::Write).with_pii(),
        );
        assert_eq!(pii_exposure(&flagged), 65.0);
    }

    #[test]
    fn compliance_counts_residency_and_framework_gaps() {
        let ctx = PolicyContext::new("a", "u")
            .with_data_access(
                DataAccess::new("x", DataClassification::Internal, AccessType::Read).in_region("us"),
            )
            .with_compliance(ComplianceContext {
                required_frameworks: vec!["gdpr".into(), "hipaa".into()],
                active_frameworks: vec!["GDPR".into()],
                data_residency: Some("eu".into()),
            });
        assert_eq!(compliance(&ctx), 45.0);
    }

    #[test]
    fn cost_and_duration_bands() {
        assert_eq!(cost(None), 0.0);
        assert_eq!(cost(Some(0.5)), 5.0);
        assert_eq!(cost(Some(99.0)), 50.0);
        assert_eq!(cost(Some(5_000.0)), 100.0);
        assert_eq!(performance(Some(500)), 5.0);
        assert_eq!(performance(Some(120_000)), 70.0);
        assert_eq!(performance(Some(600_000)), 90.0);
    }

    #[test]
    fn ethical_flags_accumulate() {
        let ctx = PolicyContext::new("a", "u").with_ethics(EthicsContext {
            high_impact_domain: true,
            explainable: false,
            bias_score: Some(0.5),
        });
        assert_eq!(ethical(&ctx), 85.0);
    }
}
