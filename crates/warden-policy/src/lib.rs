//! # warden-policy
//!
//! The policy engine of the Warden governance core.
//!
//! ## Overview
//!
//! [`PolicyEngine`] holds the policy catalog, evaluates every enabled policy
//! against a [`PolicyContext`](warden_contracts::context::PolicyContext) and
//! records a violation for each failed policy. It implements
//! [`PolicyEvaluator`](warden_core::traits::PolicyEvaluator).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_contracts::config::PolicyEngineConfig;
//! use warden_core::{traits::PolicyEvaluator, NoopSink};
//! use warden_policy::PolicyEngine;
//!
//! let engine = PolicyEngine::new(PolicyEngineConfig::default(), Arc::new(NoopSink))?;
//! let batch = engine.evaluate_all(&ctx).await;
//! ```
//!
//! ## Conditions
//!
//! A policy passes only if every condition holds. A policy with no
//! conditions always passes. Conditions that cannot be evaluated, and
//! evaluations that exceed the timeout, produce a `warn` result instead of
//! failing the batch.

pub mod cache;
pub mod condition;
pub mod engine;
pub mod template;
pub mod violation;

pub use cache::{CacheStats, EvaluationCache};
pub use condition::{ConditionEvaluator, CustomExtractor};
pub use engine::{EngineStats, PolicyEngine};
pub use template::PolicyCatalog;
pub use violation::ViolationLog;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use warden_contracts::{
        config::PolicyEngineConfig,
        context::{AccessType, DataAccess, DataClassification, PolicyContext},
        error::WardenError,
        policy::{ConditionField, EnforcementAction, Operator, Policy, PolicyCategory},
        severity::Severity,
        violation::{ViolationFilter, ViolationStatus},
    };
    use warden_core::{traits::PolicyEvaluator, CollectingSink};

    use crate::{PolicyCatalog, PolicyEngine};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn bare_config() -> PolicyEngineConfig {
        PolicyEngineConfig {
            load_default_templates: false,
            ..Default::default()
        }
    }

    fn engine_with(policies: Vec<Policy>) -> (PolicyEngine, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let engine = PolicyEngine::new(bare_config(), sink.clone()).unwrap();
        for p in policies {
            engine.add_policy(p).unwrap();
        }
        (engine, sink)
    }

    fn no_restricted_deletion() -> Policy {
        Policy::new(
            "no-restricted-deletion",
            "No Data Deletion of Restricted Data",
            PolicyCategory::DataProtection,
            Severity::Critical,
            EnforcementAction::Block,
        )
        .with_condition(
            ConditionField::DataAccessOperations,
            Operator::NotIn,
            json!(["restricted:delete"]),
        )
        .with_remediation("Route the deletion to a human operator")
    }

    fn cost_limit(limit: f64) -> Policy {
        Policy::new(
            "cost-limit",
            "Cost limit",
            PolicyCategory::CostControl,
            Severity::Medium,
            EnforcementAction::RequireApproval,
        )
        .with_condition(ConditionField::EstimatedCost, Operator::LessThan, json!(limit))
    }

    fn restricted_delete_ctx() -> PolicyContext {
        PolicyContext::new("agent-1", "user-1").with_data_access(DataAccess::new(
            "customers",
            DataClassification::Restricted,
            AccessType::Delete,
        ))
    }

    // ── Scenario: restricted deletion ────────────────────────────────────────

    #[tokio::test]
    async fn restricted_delete_is_blocked_with_one_open_violation() {
        let (engine, sink) = engine_with(vec![no_restricted_deletion()]);

        let batch = engine.evaluate_all(&restricted_delete_ctx()).await;

        assert_eq!(batch.results.len(), 1);
        let result = &batch.results[0];
        assert!(!result.passed);
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.action, EnforcementAction::Block);
        assert_eq!(
            result.recommendations,
            vec!["Route the deletion to a human operator".to_string()]
        );

        assert_eq!(batch.violations.len(), 1);
        let open = engine.query_violations(&ViolationFilter {
            status: Some(ViolationStatus::Open),
            ..Default::default()
        });
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].policy_id, "no-restricted-deletion");
        assert_eq!(open[0].context.data_access.len(), 1);

        assert_eq!(sink.of_kind("policy_violation_detected").len(), 1);
    }

    #[tokio::test]
    async fn default_templates_block_restricted_delete() {
        let engine = PolicyEngine::new(
            PolicyEngineConfig::default(),
            Arc::new(CollectingSink::new()),
        )
        .unwrap();

        let batch = engine.evaluate_all(&restricted_delete_ctx()).await;
        let deletion = batch
            .results
            .iter()
            .find(|r| r.policy_id == "no-restricted-deletion")
            .unwrap();
        assert!(!deletion.passed);
        assert_eq!(deletion.severity, Severity::Critical);
        assert_eq!(batch.violations.len(), 1);
    }

    // ── Property: zero conditions always pass ────────────────────────────────

    #[tokio::test]
    async fn policy_without_conditions_passes() {
        let empty = Policy::new(
            "empty",
            "Empty",
            PolicyCategory::Operational,
            Severity::Critical,
            EnforcementAction::Block,
        );
        let (engine, _) = engine_with(vec![empty]);
        let batch = engine.evaluate_all(&restricted_delete_ctx()).await;
        assert!(batch.results[0].passed);
        assert_eq!(batch.results[0].action, EnforcementAction::Allow);
        assert!(batch.violations.is_empty());
    }

    // ── Property: cache ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn repeated_context_is_served_identically_from_cache() {
        let (engine, _) = engine_with(vec![cost_limit(100.0)]);
        let ctx = PolicyContext::new("agent-1", "user-1").with_cost(10.0);

        let first = engine.evaluate_all(&ctx).await;
        let second = engine.evaluate_all(&ctx).await;

        assert!(first.results[0].passed);
        assert_eq!(first.results, second.results);
        let stats = engine.stats();
        assert_eq!(stats.cache.hits, 1);
        assert_eq!(stats.cache.misses, 1);
    }

    #[tokio::test]
    async fn update_invalidates_cache_and_bumps_version() {
        let (engine, _) = engine_with(vec![cost_limit(100.0)]);
        let ctx = PolicyContext::new("agent-1", "user-1").with_cost(50.0);

        assert!(engine.evaluate_all(&ctx).await.results[0].passed);

        let updated = engine.update_policy(cost_limit(20.0)).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(engine.stats().cache.entries, 0);

        let after = engine.evaluate_all(&ctx).await;
        assert!(!after.results[0].passed);
        assert_eq!(after.results[0].policy_version, 2);
    }

    #[tokio::test]
    async fn failing_results_are_never_cached() {
        let (engine, _) = engine_with(vec![no_restricted_deletion()]);
        let ctx = restricted_delete_ctx();

        engine.evaluate_all(&ctx).await;
        let second = engine.evaluate_all(&ctx).await;

        // Each failure records its own violation.
        assert_eq!(second.violations.len(), 1);
        assert_eq!(engine.stats().violations_recorded, 2);
        assert_eq!(engine.stats().cache.hits, 0);
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let sink = Arc::new(CollectingSink::new());
        let engine = PolicyEngine::new(
            PolicyEngineConfig {
                cache_enabled: false,
                ..bare_config()
            },
            sink,
        )
        .unwrap();
        engine.add_policy(cost_limit(100.0)).unwrap();
        let ctx = PolicyContext::new("agent-1", "user-1");
        engine.evaluate_all(&ctx).await;
        engine.evaluate_all(&ctx).await;
        assert_eq!(engine.stats().cache.hits, 0);
        assert_eq!(engine.stats().cache.entries, 0);
    }

    // ── Failure semantics ────────────────────────────────────────────────────

    #[tokio::test]
    async fn slow_condition_times_out_as_warn() {
        let engine = PolicyEngine::new(
            PolicyEngineConfig {
                evaluation_timeout_ms: 20,
                ..bare_config()
            },
            Arc::new(CollectingSink::new()),
        )
        .unwrap();
        engine.register_extractor(
            "slow",
            Box::new(|_: &PolicyContext| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(json!(1))
            }),
        );
        engine
            .add_policy(
                Policy::new(
                    "slow",
                    "Slow",
                    PolicyCategory::Operational,
                    Severity::Critical,
                    EnforcementAction::Block,
                )
                .with_condition(
                    ConditionField::Custom {
                        name: "slow".into(),
                    },
                    Operator::Equals,
                    json!(1),
                ),
            )
            .unwrap();
        engine.add_policy(cost_limit(100.0)).unwrap();

        let batch = engine
            .evaluate_all(&PolicyContext::new("agent-1", "user-1"))
            .await;

        let slow = &batch.results[0];
        assert!(!slow.passed);
        assert_eq!(slow.action, EnforcementAction::Warn);
        assert_eq!(slow.severity, Severity::Medium);
        assert!(slow.error.as_deref().unwrap().contains("timed out"));
        // The rest of the batch is unaffected.
        assert!(batch.results[1].passed);
        assert!(batch.violations.is_empty());
        assert_eq!(engine.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn extraction_error_is_warn_without_violation() {
        let risky = Policy::new(
            "high-risk-approval",
            "High risk",
            PolicyCategory::Operational,
            Severity::High,
            EnforcementAction::RequireApproval,
        )
        .with_condition(ConditionField::RiskScore, Operator::LessThan, json!(75));
        let (engine, sink) = engine_with(vec![risky]);

        // No risk score attached.
        let batch = engine
            .evaluate_all(&PolicyContext::new("agent-1", "user-1"))
            .await;

        let r = &batch.results[0];
        assert_eq!(r.action, EnforcementAction::Warn);
        assert!(r.error.is_some());
        assert!(!r.is_violation());
        assert!(batch.violations.is_empty());
        assert!(sink.events().is_empty());
        assert_eq!(engine.stats().errors, 1);
    }

    #[tokio::test]
    async fn batches_respect_concurrency_limit() {
        let engine = PolicyEngine::new(
            PolicyEngineConfig {
                max_concurrent_evaluations: 2,
                ..bare_config()
            },
            Arc::new(CollectingSink::new()),
        )
        .unwrap();
        for i in 0..5 {
            let mut p = cost_limit(100.0);
            p.id = format!("cost-{i}");
            engine.add_policy(p).unwrap();
        }
        let batch = engine
            .evaluate_all(&PolicyContext::new("agent-1", "user-1"))
            .await;
        let ids: Vec<&str> = batch.results.iter().map(|r| r.policy_id.as_str()).collect();
        assert_eq!(ids, vec!["cost-0", "cost-1", "cost-2", "cost-3", "cost-4"]);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let result = PolicyEngine::new(
            PolicyEngineConfig {
                max_concurrent_evaluations: 0,
                ..bare_config()
            },
            Arc::new(CollectingSink::new()),
        );
        assert!(matches!(result, Err(WardenError::ConfigError { .. })));
    }

    // ── Catalog mutators ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn disabled_policies_are_skipped_until_enabled() {
        let (engine, _) = engine_with(vec![no_restricted_deletion()]);
        engine.disable_policy("no-restricted-deletion").unwrap();
        assert!(engine
            .evaluate_all(&restricted_delete_ctx())
            .await
            .results
            .is_empty());

        engine.enable_policy("no-restricted-deletion").unwrap();
        assert_eq!(
            engine.evaluate_all(&restricted_delete_ctx()).await.results.len(),
            1
        );
    }

    #[tokio::test]
    async fn removed_policy_is_retired_not_deleted() {
        let (engine, _) = engine_with(vec![no_restricted_deletion()]);
        let batch = engine.evaluate_all(&restricted_delete_ctx()).await;
        let violation_id = batch.violations[0].id.clone();

        engine.remove_policy("no-restricted-deletion").unwrap();

        assert!(engine
            .evaluate_all(&restricted_delete_ctx())
            .await
            .results
            .is_empty());
        // Still resolvable for audit, and its violation can still be resolved.
        assert!(engine.get_policy("no-restricted-deletion").is_ok());
        assert!(engine.list_policies().is_empty());
        engine
            .resolve_violation(&violation_id, "ops", Some("data restored".into()))
            .unwrap();
        // The id stays reserved.
        assert!(matches!(
            engine.add_policy(no_restricted_deletion()),
            Err(WardenError::DuplicateEntity { .. })
        ));
    }

    #[tokio::test]
    async fn evaluate_policy_by_id() {
        let (engine, _) = engine_with(vec![no_restricted_deletion()]);
        let result = engine
            .evaluate_policy("no-restricted-deletion", &restricted_delete_ctx())
            .await
            .unwrap();
        assert!(!result.passed);

        let err = engine
            .evaluate_policy("missing", &restricted_delete_ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::PolicyNotFound { .. }));
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let (engine, _) = engine_with(Vec::new());
        assert!(matches!(
            engine.update_policy(cost_limit(1.0)),
            Err(WardenError::PolicyNotFound { .. })
        ));
        assert!(engine.remove_policy("nope").is_err());
        assert!(engine.enable_policy("nope").is_err());
        assert!(matches!(
            engine.resolve_violation("nope", "ops", None),
            Err(WardenError::ViolationNotFound { .. })
        ));
    }

    // ── Violations ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn false_positive_closes_violation() {
        let (engine, _) = engine_with(vec![no_restricted_deletion()]);
        let batch = engine.evaluate_all(&restricted_delete_ctx()).await;
        let id = &batch.violations[0].id;

        let closed = engine
            .mark_false_positive(id, "analyst", Some("test fixture".into()))
            .unwrap();
        assert_eq!(closed.status, ViolationStatus::FalsePositive);
        assert_eq!(engine.stats().open_violations, 0);
        assert!(matches!(
            engine.acknowledge_violation(id),
            Err(WardenError::InvalidTransition { .. })
        ));
    }

    // ── Loading ──────────────────────────────────────────────────────────────

    #[test]
    fn catalog_with_bad_regex_is_rejected_on_load() {
        let (engine, _) = engine_with(Vec::new());
        let catalog = PolicyCatalog::from_toml_str(
            r#"
            [[policies]]
            id = "bad"
            name = "Bad"
            category = "security"
            severity = "low"
            action = "warn"

            [[policies.conditions]]
            type = "agent_id"
            operator = "matches"
            value = "(["
            "#,
        )
        .unwrap();
        assert!(matches!(
            engine.load_catalog(catalog),
            Err(WardenError::ConfigError { .. })
        ));
    }
}
