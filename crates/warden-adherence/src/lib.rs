//! # warden-adherence
//!
//! Measures how closely an agent's execution matches its declared task
//! envelope and flags behavioral drift.
//!
//! Five sub-scores (scope, goals, constraints, outputs, time) are combined
//! with fixed weights 0.25/0.25/0.20/0.20/0.10. An overall score below the
//! configured threshold is drift, published as a `DriftDetected` event.

pub mod monitor;
pub mod scoring;

pub use monitor::TaskAdherenceMonitor;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use warden_contracts::{
        adherence::{ExecutionContext, TaskSpecification, TaskViolationKind},
        config::AdherenceConfig,
        error::WardenError,
        history::Trend,
        severity::Severity,
    };
    use warden_core::{traits::AdherenceMonitor, CollectingSink};

    use super::*;

    fn monitor() -> (TaskAdherenceMonitor, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let monitor = TaskAdherenceMonitor::new(AdherenceConfig::default(), sink.clone()).unwrap();
        (monitor, sink)
    }

    fn read_only_spec() -> TaskSpecification {
        let mut spec = TaskSpecification::new("report");
        spec.scope = vec!["read".into()];
        spec
    }

    fn execution(actions: &[&str], outputs: &[&str]) -> ExecutionContext {
        ExecutionContext {
            agent_id: "agent-1".into(),
            task_id: "report".into(),
            actions: actions.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            duration_ms: 1_000,
        }
    }

    // ── Scope drift ──────────────────────────────────────────────────────────

    #[test]
    fn delete_outside_read_scope_is_scope_drift() {
        let (m, sink) = monitor();
        m.register_specification(read_only_spec());

        let metrics = m
            .evaluate(&execution(&["read_invoices", "delete_invoices"], &[]))
            .unwrap();

        assert!(metrics.scores.scope < 100.0);
        let drift = metrics
            .violations
            .iter()
            .find(|v| v.kind == TaskViolationKind::ScopeDrift)
            .unwrap();
        assert_eq!(drift.evidence, vec!["delete_invoices"]);

        // 0.25 × 50 + 75 stays above the threshold
        assert!((metrics.overall_score - 87.5).abs() < 1e-9);
        assert!(!metrics.drift_detected);
        assert_eq!(metrics.drift_severity, None);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn low_overall_adherence_sets_drift() {
        let (m, sink) = monitor();
        let mut spec = read_only_spec();
        spec.goals = vec!["invoice total".into()];
        spec.expected_outputs = vec!["csv export".into()];
        m.register_specification(spec);

        let metrics = m
            .evaluate(&execution(&["read_invoices", "delete_invoices"], &["done"]))
            .unwrap();

        // 12.5 + 0 + 20 + 0 + 10
        assert!((metrics.overall_score - 42.5).abs() < 1e-9);
        assert!(metrics.drift_detected);
        assert_eq!(metrics.drift_severity, Some(Severity::Medium));
        assert!(metrics
            .violations
            .iter()
            .any(|v| v.kind == TaskViolationKind::ScopeDrift));
        assert_eq!(sink.of_kind("drift_detected").len(), 1);
    }

    #[test]
    fn fully_adherent_execution_scores_100() {
        let (m, _) = monitor();
        let mut spec = read_only_spec();
        spec.goals = vec!["total".into()];
        spec.expected_outputs = vec!["summary".into()];
        spec.constraints = vec!["no external api".into()];
        spec.max_duration_ms = Some(5_000);
        m.register_specification(spec);

        let metrics = m
            .evaluate(&execution(&["read_ledger"], &["summary: total 42"]))
            .unwrap();
        assert_eq!(metrics.overall_score, 100.0);
        assert!(metrics.violations.is_empty());
    }

    // ── Specifications ───────────────────────────────────────────────────────

    #[test]
    fn unknown_task_is_not_found() {
        let (m, _) = monitor();
        let err = m.evaluate(&execution(&["read"], &[])).unwrap_err();
        assert!(matches!(err, WardenError::SpecificationNotFound { .. }));
    }

    #[test]
    fn specifications_can_be_replaced_and_removed() {
        let (m, _) = monitor();
        m.register_specification(read_only_spec());
        let mut wider = read_only_spec();
        wider.scope.push("delete".into());
        m.register_specification(wider);
        assert_eq!(m.get_specification("report").unwrap().scope.len(), 2);

        m.remove_specification("report").unwrap();
        assert!(m.get_specification("report").is_err());
        assert!(matches!(
            m.remove_specification("report"),
            Err(WardenError::SpecificationNotFound { .. })
        ));
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let config = AdherenceConfig {
            drift_threshold: 140.0,
            ..Default::default()
        };
        assert!(TaskAdherenceMonitor::new(config, Arc::new(CollectingSink::new())).is_err());
    }

    #[test]
    fn retention_outside_bounds_is_rejected() {
        for retention_days in [-1, 36_501, 1_000_000_000] {
            let config = AdherenceConfig {
                retention_days,
                ..Default::default()
            };
            assert!(
                matches!(
                    TaskAdherenceMonitor::new(config, Arc::new(CollectingSink::new())),
                    Err(WardenError::ConfigError { .. })
                ),
                "retention_days {} accepted",
                retention_days
            );
        }
    }

    // ── History ──────────────────────────────────────────────────────────────

    #[test]
    fn history_accumulates_and_prunes() {
        let (m, _) = monitor();
        m.register_specification(read_only_spec());
        let monitor: &dyn AdherenceMonitor = &m;
        monitor.evaluate(&execution(&["read_a"], &[])).unwrap();
        monitor.evaluate(&execution(&["read_b"], &[])).unwrap();

        let history = m.get_adherence_history("agent-1");
        assert_eq!(history.evaluations.len(), 2);
        assert_eq!(history.summary.average_7d, Some(100.0));
        assert_eq!(history.summary.trend, Trend::Stable);

        assert_eq!(m.prune_history(), 0);
        let later = Utc::now() + chrono::Duration::days(91);
        assert_eq!(m.prune_history_at(later), 2);
        assert!(m.get_adherence_history("agent-1").evaluations.is_empty());
    }

    #[tokio::test]
    async fn maintenance_task_prunes_and_stops_when_dropped() {
        let config = AdherenceConfig {
            retention_days: 0,
            ..Default::default()
        };
        let m = Arc::new(TaskAdherenceMonitor::new(config, Arc::new(CollectingSink::new())).unwrap());
        m.register_specification(read_only_spec());
        m.evaluate(&execution(&["read_a"], &[])).unwrap();

        let handle = m.spawn_maintenance(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(m.get_adherence_history("agent-1").evaluations.is_empty());

        drop(m);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("maintenance task should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn zero_interval_maintenance_keeps_running() {
        let (m, _) = monitor();
        let m = Arc::new(m);
        let handle = m.spawn_maintenance(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        drop(m);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("maintenance task should stop")
            .unwrap();
    }
}
