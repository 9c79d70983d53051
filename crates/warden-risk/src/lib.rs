//! # warden-risk
//!
//! Weighted multi-factor risk scoring for pending agent actions.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_risk::RiskEvaluator;
//! use warden_contracts::config::RiskConfig;
//!
//! let evaluator = RiskEvaluator::new(RiskConfig::default())?;
//! let score = evaluator.evaluate(&ctx);
//! if score.severity >= Severity::High {
//!     // escalate
//! }
//! ```

pub mod evaluator;
pub mod factors;

pub use evaluator::{RiskEvaluator, WEIGHT_EPSILON};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use warden_contracts::{
        config::{RiskConfig, RiskWeights},
        context::{AccessType, ApiCall, DataAccess, DataClassification, PolicyContext},
        error::WardenError,
        history::Trend,
        severity::Severity,
    };
    use warden_core::traits::RiskAssessor;

    use super::*;

    fn evaluator() -> RiskEvaluator {
        RiskEvaluator::new(RiskConfig::default()).unwrap()
    }

    fn with_weights(weights: RiskWeights) -> Result<RiskEvaluator, WardenError> {
        RiskEvaluator::new(RiskConfig {
            weights,
            ..Default::default()
        })
    }

    fn full_context() -> PolicyContext {
        PolicyContext::new("agent-1", "user-1")
            .with_data_access(DataAccess::new(
                "reports",
                DataClassification::Internal,
                AccessType::Read,
            ))
            .with_api_call(ApiCall::new("https://internal/api"))
            .with_cost(2.0)
            .with_duration_ms(500)
    }

    // ── Weight validation ────────────────────────────────────────────────────

    #[test]
    fn default_weights_are_accepted() {
        assert!(RiskEvaluator::new(RiskConfig::default()).is_ok());
    }

    #[test]
    fn construction_succeeds_iff_weights_sum_to_one() {
        let cases = [
            (0.0, true),
            (WEIGHT_EPSILON / 2.0, true),
            (-WEIGHT_EPSILON / 2.0, true),
            (0.01, false),
            (-0.01, false),
            (0.5, false),
        ];
        for (delta, ok) in cases {
            let mut weights = RiskWeights::default();
            weights.data_access += delta;
            assert_eq!(
                with_weights(weights).is_ok(),
                ok,
                "weight sum {} should be {}",
                weights.sum(),
                if ok { "accepted" } else { "rejected" }
            );
        }
    }

    #[test]
    fn invalid_weights_are_config_errors() {
        let weights = RiskWeights {
            cost: 0.5,
            ..Default::default()
        };
        let err = with_weights(weights).err().unwrap();
        assert!(matches!(err, WardenError::ConfigError { .. }));
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn negative_weight_is_rejected_even_when_sum_is_one() {
        let weights = RiskWeights {
            data_access: 0.35,
            cost: -0.12,
            ..Default::default()
        };
        assert!((weights.sum() - 1.0).abs() < WEIGHT_EPSILON);
        assert!(with_weights(weights).is_err());
    }

    #[test]
    fn descending_thresholds_are_rejected() {
        let mut config = RiskConfig::default();
        config.thresholds.medium = 10.0;
        assert!(RiskEvaluator::new(config).is_err());
    }

    #[test]
    fn retention_outside_bounds_is_rejected() {
        for retention_days in [-1, 36_501, 1_000_000_000] {
            let result = RiskEvaluator::new(RiskConfig {
                retention_days,
                ..Default::default()
            });
            assert!(
                matches!(result, Err(WardenError::ConfigError { .. })),
                "retention_days {} accepted",
                retention_days
            );
        }
    }

    #[test]
    fn longest_retention_sweeps_without_overflow() {
        let evaluator = RiskEvaluator::new(RiskConfig {
            retention_days: warden_core::maintenance::MAX_RETENTION_DAYS,
            ..Default::default()
        })
        .unwrap();
        evaluator.evaluate(&full_context());
        assert_eq!(evaluator.sweep(), 0);
        assert_eq!(evaluator.get_evaluation_history("agent-1").evaluations.len(), 1);
    }

    // ── Scoring ──────────────────────────────────────────────────────────────

    #[test]
    fn empty_context_loses_at_least_35_confidence() {
        let score = evaluator().evaluate(&PolicyContext::new("agent-1", "user-1"));
        assert!(score.confidence <= 65.0, "confidence {}", score.confidence);
    }

    #[test]
    fn complete_inputs_keep_more_confidence() {
        let evaluator = evaluator();
        for _ in 0..5 {
            evaluator.record_execution("agent-1", true, 100, None);
        }
        let score = evaluator.evaluate(&full_context());
        assert_eq!(score.confidence, 100.0);
    }

    #[test]
    fn overall_is_weighted_sum_of_factors() {
        let evaluator = evaluator();
        let score = evaluator.evaluate(&full_context());
        let weights = RiskWeights::default();
        let expected: f64 = warden_contracts::risk::RiskFactor::ALL
            .iter()
            .map(|f| score.factors.get(*f) * weights.get(*f))
            .sum();
        assert!((score.overall - expected).abs() < 1e-9);
        assert_eq!(score.severity, Severity::Low);
    }

    #[test]
    fn high_factors_produce_recommendations() {
        let ctx = PolicyContext::new("agent-1", "user-1")
            .with_data_access(
                DataAccess::new("patients", DataClassification::Restricted, AccessType::Delete)
                    .with_pii(),
            )
            .with_cost(5_000.0);
        let score = evaluator().evaluate(&ctx);
        assert!(score
            .recommendations
            .iter()
            .any(|r| r.contains("Mask or tokenize PII")));
        assert!(score.recommendations.iter().any(|r| r.contains("budget")));
    }

    #[test]
    fn critical_overall_recommends_immediate_review() {
        let config = RiskConfig {
            weights: RiskWeights {
                data_access: 1.0,
                external_api: 0.0,
                permission: 0.0,
                execution_history: 0.0,
                complexity: 0.0,
                pii_exposure: 0.0,
                compliance: 0.0,
                cost: 0.0,
                performance: 0.0,
                ethical: 0.0,
            },
            ..Default::default()
        };
        let evaluator = RiskEvaluator::new(config).unwrap();
        let ctx = PolicyContext::new("agent-1", "user-1").with_data_access(DataAccess::new(
            "customers",
            DataClassification::Restricted,
            AccessType::Delete,
        ));
        let score = evaluator.evaluate(&ctx);
        assert_eq!(score.overall, 100.0);
        assert_eq!(score.severity, Severity::Critical);
        assert!(score.recommendations[0].starts_with("Immediate review"));
    }

    #[test]
    fn failures_raise_history_factor() {
        let evaluator = evaluator();
        let before = evaluator.evaluate(&full_context()).factors.execution_history;
        for _ in 0..4 {
            evaluator.record_execution("agent-1", false, 100, Some("timeout"));
        }
        let after = evaluator.evaluate(&full_context()).factors.execution_history;
        assert!(after > before);
        assert_eq!(after, 100.0);
    }

    // ── History ──────────────────────────────────────────────────────────────

    #[test]
    fn evaluations_accumulate_per_agent() {
        let evaluator = evaluator();
        evaluator.evaluate_risk(&full_context());
        evaluator.evaluate_risk(&full_context());
        evaluator.evaluate_risk(&PolicyContext::new("agent-2", "user-1"));

        let history = evaluator.get_evaluation_history("agent-1");
        assert_eq!(history.evaluations.len(), 2);
        assert!(history.summary.average_7d.is_some());
        assert_eq!(history.summary.trend, Trend::Stable);
        assert!(evaluator
            .get_evaluation_history("unknown")
            .evaluations
            .is_empty());
    }

    #[test]
    fn execution_stats_rank_errors() {
        let evaluator = evaluator();
        evaluator.record_execution("a", true, 100, None);
        evaluator.record_execution("a", false, 300, Some("timeout"));
        evaluator.record_execution("a", false, 200, Some("timeout"));
        evaluator.record_execution("a", false, 200, Some("auth"));

        let stats = evaluator.get_execution_stats("a");
        assert_eq!(stats.total, 4);
        assert_eq!(stats.failures, 3);
        assert!((stats.success_rate - 0.25).abs() < 1e-9);
        assert!((stats.mean_duration_ms - 200.0).abs() < 1e-9);
        assert_eq!(stats.top_errors[0], ("timeout".to_string(), 2));
    }

    #[test]
    fn execution_log_is_bounded_by_window() {
        let evaluator = RiskEvaluator::new(RiskConfig {
            history_window: 3,
            ..Default::default()
        })
        .unwrap();
        for _ in 0..10 {
            evaluator.record_execution("a", true, 1, None);
        }
        assert_eq!(evaluator.get_execution_stats("a").total, 3);
    }

    #[test]
    fn sweep_drops_entries_outside_retention() {
        let evaluator = evaluator();
        evaluator.evaluate(&full_context());
        evaluator.record_execution("agent-1", true, 1, None);

        assert_eq!(evaluator.sweep_at(Utc::now()), 0);
        let later = Utc::now() + chrono::Duration::days(91);
        assert_eq!(evaluator.sweep_at(later), 2);
        assert!(evaluator
            .get_evaluation_history("agent-1")
            .evaluations
            .is_empty());
    }

    #[tokio::test]
    async fn maintenance_task_sweeps_and_stops_when_dropped() {
        let evaluator = Arc::new(
            RiskEvaluator::new(RiskConfig {
                retention_days: 0,
                ..Default::default()
            })
            .unwrap(),
        );
        evaluator.evaluate(&full_context());

        let handle = evaluator.spawn_maintenance(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(evaluator
            .get_evaluation_history("agent-1")
            .evaluations
            .is_empty());

        drop(evaluator);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("maintenance task should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn zero_interval_maintenance_keeps_running() {
        let evaluator = Arc::new(evaluator());
        let handle = evaluator.spawn_maintenance(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished(), "sweeper must not panic on a zero period");

        drop(evaluator);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("maintenance task should stop")
            .unwrap();
    }
}
