//! The task adherence monitor.
//!
//! Holds one `TaskSpecification` per task id and a per-agent history of
//! adherence measurements.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use warden_contracts::{
    adherence::{
        AdherenceHistory, AdherenceScores, ExecutionContext, TaskAdherenceMetrics,
        TaskSpecification,
    },
    config::AdherenceConfig,
    error::{WardenError, WardenResult},
    event::GovernanceEvent,
};
use warden_core::{
    maintenance,
    traits::{AdherenceMonitor, EventSink},
    TimeSeriesLog,
};

use crate::scoring;

/// Scores executions against registered task specifications and keeps a
/// per-agent adherence history.
pub struct TaskAdherenceMonitor {
    config: AdherenceConfig,
    specifications: RwLock<HashMap<String, TaskSpecification>>,
    history: TimeSeriesLog<TaskAdherenceMetrics>,
    events: Arc<dyn EventSink>,
}

impl TaskAdherenceMonitor {
    /// Returns `ConfigError` unless `drift_threshold` is within `[0, 100]`
    /// and `retention_days` is within `0..=MAX_RETENTION_DAYS`.
    pub fn new(config: AdherenceConfig, events: Arc<dyn EventSink>) -> WardenResult<Self> {
        if !(0.0..=100.0).contains(&config.drift_threshold) {
            return Err(WardenError::ConfigError {
                reason: format!(
                    "drift_threshold must be within 0..=100, got {}",
                    config.drift_threshold
                ),
            });
        }
        maintenance::validate_retention_days("adherence.retention_days", config.retention_days)?;
        Ok(Self {
            config,
            specifications: RwLock::new(HashMap::new()),
            history: TimeSeriesLog::new(),
            events,
        })
    }

    /// Register or replace the specification for `spec.task_id`.
    pub fn register_specification(&self, spec: TaskSpecification) {
        info!(task_id = %spec.task_id, "task specification registered");
        self.specifications
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(spec.task_id.clone(), spec);
    }

    /// The specification registered for `task_id`.
    pub fn get_specification(&self, task_id: &str) -> WardenResult<TaskSpecification> {
        self.specifications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
            .ok_or_else(|| WardenError::SpecificationNotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Unregister and return the specification for `task_id`.
    pub fn remove_specification(&self, task_id: &str) -> WardenResult<TaskSpecification> {
        let removed = self
            .specifications
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id)
            .ok_or_else(|| WardenError::SpecificationNotFound {
                task_id: task_id.to_string(),
            })?;
        info!(task_id = %task_id, "task specification removed");
        Ok(removed)
    }

    /// Score `execution` against its task specification and append the
    /// result to the agent's history.
    pub fn evaluate(&self, execution: &ExecutionContext) -> WardenResult<TaskAdherenceMetrics> {
        let spec = self.get_specification(&execution.task_id)?;

        let (scope, v_scope) = scoring::scope(&spec, execution);
        let (goal, v_goal) = scoring::goal(&spec, execution);
        let (constraint, v_constraint) = scoring::constraint(&spec, execution);
        let (output, v_output) = scoring::output(&spec, execution);
        let (time, v_time) = scoring::time(&spec, execution);

        let overall = (scope * scoring::SCOPE_WEIGHT
            + goal * scoring::GOAL_WEIGHT
            + constraint * scoring::CONSTRAINT_WEIGHT
            + output * scoring::OUTPUT_WEIGHT
            + time * scoring::TIME_WEIGHT)
            .clamp(0.0, 100.0);
        let drift_detected = overall < self.config.drift_threshold;

        let metrics = TaskAdherenceMetrics {
            agent_id: execution.agent_id.clone(),
            task_id: execution.task_id.clone(),
            overall_score: overall,
            scores: AdherenceScores {
                scope,
                goal,
                constraint,
                output,
                time,
            },
            drift_detected,
            drift_severity: drift_detected.then(|| scoring::drift_severity(overall)),
            violations: [v_scope, v_goal, v_constraint, v_output, v_time]
                .into_iter()
                .flatten()
                .collect(),
            evaluated_at: Utc::now(),
        };

        if let Some(severity) = metrics.drift_severity {
            warn!(
                agent_id = %metrics.agent_id,
                task_id = %metrics.task_id,
                adherence = metrics.overall_score,
                severity = %severity,
                "task drift detected"
            );
            self.events.publish(&GovernanceEvent::DriftDetected {
                agent_id: metrics.agent_id.clone(),
                task_id: metrics.task_id.clone(),
                adherence_score: metrics.overall_score,
                severity,
            });
        } else {
            debug!(
                agent_id = %metrics.agent_id,
                task_id = %metrics.task_id,
                adherence = metrics.overall_score,
                "adherence evaluated"
            );
        }

        self.history
            .append_at(&metrics.agent_id, metrics.evaluated_at, metrics.clone());
        Ok(metrics)
    }

    /// Stored measurements for `agent_id` with 7/30/90-day averages. Higher
    /// adherence counts as improving.
    pub fn get_adherence_history(&self, agent_id: &str) -> AdherenceHistory {
        self.history_at(agent_id, Utc::now())
    }

    /// `get_adherence_history` with rolling windows ending at `now`.
    pub fn history_at(&self, agent_id: &str, now: DateTime<Utc>) -> AdherenceHistory {
        AdherenceHistory {
            agent_id: agent_id.to_string(),
            evaluations: self
                .history
                .entries(agent_id)
                .into_iter()
                .map(|e| e.value)
                .collect(),
            summary: self.history.summary(agent_id, now, true),
        }
    }

    /// Drop measurements older than the retention window.
    pub fn prune_history(&self) -> usize {
        self.prune_history_at(Utc::now())
    }

    /// `prune_history` against the window ending at `now`.
    pub fn prune_history_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = maintenance::retention_cutoff(now, self.config.retention_days);
        let removed = self.history.prune_older_than(cutoff);
        if removed > 0 {
            info!(removed, retention_days = self.config.retention_days, "adherence history pruned");
        }
        removed
    }

    /// Run `prune_history` every `every` until the monitor is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let monitor = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = maintenance::sweep_ticker(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    debug!("adherence monitor dropped, stopping maintenance");
                    break;
                };
                monitor.prune_history();
            }
        })
    }
}

impl AdherenceMonitor for TaskAdherenceMonitor {
    fn evaluate(&self, execution: &ExecutionContext) -> WardenResult<TaskAdherenceMetrics> {
        TaskAdherenceMonitor::evaluate(self, execution)
    }
}
