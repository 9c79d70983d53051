//! The risk evaluator.
//!
//! Combines the ten factor scores into a weighted composite, derives a
//! severity bucket, a confidence and recommendations, and keeps two
//! per-agent logs: every evaluation (for trends) and the most recent
//! execution records (for the history factor).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use warden_contracts::{
    config::RiskConfig,
    context::PolicyContext,
    error::{WardenError, WardenResult},
    risk::{ExecutionRecord, ExecutionStats, RiskFactor, RiskFactors, RiskHistory, RiskScore},
};
use warden_core::{maintenance, traits::RiskAssessor, TimeSeriesLog};

use crate::factors;

/// Allowed distance of the weight sum from 1.0.
pub const WEIGHT_EPSILON: f64 = 1e-3;

/// Fewer execution records than this count as thin history.
const THIN_HISTORY: usize = 5;

const CONFIDENCE_FLOOR: f64 = 10.0;

/// Factor scores above this trigger the factor's recommendation.
const FACTOR_ALERT: f64 = 70.0;

/// Overall scores above this trigger the immediate-review recommendation.
const OVERALL_ALERT: f64 = 75.0;

const TOP_ERRORS: usize = 5;

/// Ten-factor risk scoring with per-agent evaluation and execution history.
pub struct RiskEvaluator {
    config: RiskConfig,
    evaluations: TimeSeriesLog<RiskScore>,
    executions: TimeSeriesLog<ExecutionRecord>,
}

impl RiskEvaluator {
    /// Create an evaluator.
    ///
    /// Returns `WardenError::ConfigError` if any weight is negative or not
    /// finite, if the weights do not sum to 1.0, or if the severity
    /// thresholds are not ascending, or if `retention_days` is outside
    /// `0..=MAX_RETENTION_DAYS`.
    pub fn new(config: RiskConfig) -> WardenResult<Self> {
        validate(&config)?;
        let executions = TimeSeriesLog::bounded(config.history_window);
        Ok(Self {
            config,
            evaluations: TimeSeriesLog::new(),
            executions,
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Score `ctx` and append the result to the agent's history.
    pub fn evaluate(&self, ctx: &PolicyContext) -> RiskScore {
        let history = self
            .executions
            .latest(&ctx.agent_id, self.config.history_window);
        let factors = factors::score_all(ctx, &history);

        let weights = &self.config.weights;
        let overall = RiskFactor::ALL
            .iter()
            .map(|f| factors.get(*f) * weights.get(*f))
            .sum::<f64>()
            .clamp(0.0, 100.0);

        let score = RiskScore {
            agent_id: ctx.agent_id.clone(),
            overall,
            factors,
            severity: self.config.thresholds.bucket(overall),
            confidence: confidence(ctx, history.len()),
            recommendations: recommendations(&factors, overall),
            evaluated_at: Utc::now(),
        };

        debug!(
            agent_id = %ctx.agent_id,
            overall = score.overall,
            severity = %score.severity,
            confidence = score.confidence,
            "risk evaluated"
        );
        self.evaluations
            .append_at(&ctx.agent_id, score.evaluated_at, score.clone());
        score
    }

    /// Append one completed execution to the agent's bounded log.
    pub fn record_execution(
        &self,
        agent_id: &str,
        success: bool,
        duration_ms: u64,
        error_type: Option<&str>,
    ) {
        self.executions.append(
            agent_id,
            ExecutionRecord {
                success,
                duration_ms,
                error_type: error_type.map(str::to_string),
            },
        );
    }

    /// Stored evaluations for `agent_id`, oldest first, with 7/30/90-day
    /// averages. Lower risk counts as improving.
    pub fn get_evaluation_history(&self, agent_id: &str) -> RiskHistory {
        self.history_at(agent_id, Utc::now())
    }

    /// `get_evaluation_history` with rolling windows ending at `now`.
    pub fn history_at(&self, agent_id: &str, now: DateTime<Utc>) -> RiskHistory {
        RiskHistory {
            agent_id: agent_id.to_string(),
            evaluations: self
                .evaluations
                .entries(agent_id)
                .into_iter()
                .map(|e| e.value)
                .collect(),
            summary: self.evaluations.summary(agent_id, now, false),
        }
    }

    /// Success rate, mean duration and most frequent error types over the
    /// execution log.
    pub fn get_execution_stats(&self, agent_id: &str) -> ExecutionStats {
        let records = self
            .executions
            .latest(agent_id, self.config.history_window);
        let total = records.len();
        let failures = records.iter().filter(|r| !r.success).count();

        let mut by_type: HashMap<String, usize> = HashMap::new();
        for kind in records.iter().filter_map(|r| r.error_type.clone()) {
            *by_type.entry(kind).or_default() += 1;
        }
        let mut top_errors: Vec<(String, usize)> = by_type.into_iter().collect();
        top_errors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_errors.truncate(TOP_ERRORS);

        ExecutionStats {
            total,
            failures,
            success_rate: if total == 0 {
                0.0
            } else {
                (total - failures) as f64 / total as f64
            },
            mean_duration_ms: if total == 0 {
                0.0
            } else {
                records.iter().map(|r| r.duration_ms as f64).sum::<f64>() / total as f64
            },
            top_errors,
        }
    }

    /// Drop evaluations and execution records older than the retention window.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// `sweep` against the retention window ending at `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = maintenance::retention_cutoff(now, self.config.retention_days);
        let removed =
            self.evaluations.prune_older_than(cutoff) + self.executions.prune_older_than(cutoff);
        if removed > 0 {
            info!(removed, retention_days = self.config.retention_days, "risk history swept");
        }
        removed
    }

    /// Run `sweep` every `every` on the current tokio runtime.
    ///
    /// The task holds only a weak reference and ends once the evaluator is
    /// dropped.
    pub fn spawn_maintenance(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let evaluator = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = maintenance::sweep_ticker(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(evaluator) = evaluator.upgrade() else {
                    debug!("risk evaluator dropped, stopping maintenance");
                    break;
                };
                evaluator.sweep();
            }
        })
    }
}

impl RiskAssessor for RiskEvaluator {
    fn evaluate_risk(&self, ctx: &PolicyContext) -> RiskScore {
        self.evaluate(ctx)
    }
}

fn validate(config: &RiskConfig) -> WardenResult<()> {
    maintenance::validate_retention_days("risk.retention_days", config.retention_days)?;
    for factor in RiskFactor::ALL {
        let w = config.weights.get(factor);
        if !w.is_finite() || w < 0.0 {
            return Err(WardenError::ConfigError {
                reason: format!("risk weight '{}' must be a non-negative number, got {}", factor, w),
            });
        }
    }
    let sum = config.weights.sum();
    if (sum - 1.0).abs() >= WEIGHT_EPSILON {
        return Err(WardenError::ConfigError {
            reason: format!("risk weights must sum to 1.0, got {:.4}", sum),
        });
    }
    let t = &config.thresholds;
    if !(t.low < t.medium && t.medium < t.high) {
        return Err(WardenError::ConfigError {
            reason: format!(
                "risk thresholds must ascend, got low={} medium={} high={}",
                t.low, t.medium, t.high
            ),
        });
    }
    Ok(())
}

fn confidence(ctx: &PolicyContext, history_len: usize) -> f64 {
    let mut confidence: f64 = 100.0;
    if ctx.estimated_cost.is_none() {
        confidence -= 15.0;
    }
    if ctx.estimated_duration_ms.is_none() {
        confidence -= 15.0;
    }
    if ctx.data_access.is_empty() {
        confidence -= 10.0;
    }
    if history_len < THIN_HISTORY {
        confidence -= 10.0;
    }
    confidence.max(CONFIDENCE_FLOOR)
}

fn advice(factor: RiskFactor) -> &'static str {
    match factor {
        RiskFactor::DataAccess => "Restrict access to sensitive data sources or lower the access level",
        RiskFactor::ExternalApi => "Reduce external API calls and require authentication on each",
        RiskFactor::Permission => "Apply least privilege and drop unneeded high-risk permissions",
        RiskFactor::ExecutionHistory => "Investigate recent failures before running this agent again",
        RiskFactor::Complexity => "Split the workflow into smaller, separately governed steps",
        RiskFactor::PiiExposure => "Mask or tokenize PII before processing",
        RiskFactor::Compliance => "Resolve data-residency and framework gaps before proceeding",
        RiskFactor::Cost => "Set a budget cap or require approval at this cost level",
        RiskFactor::Performance => "Add timeouts or break the action into shorter steps",
        RiskFactor::Ethical => "Add human review and an explanation for high-impact decisions",
    }
}

fn recommendations(factors: &RiskFactors, overall: f64) -> Vec<String> {
    let mut out = Vec::new();
    if overall > OVERALL_ALERT {
        out.push("Immediate review required: overall risk is critical".to_string());
    }
    out.extend(
        RiskFactor::ALL
            .iter()
            .filter(|f| factors.get(**f) > FACTOR_ALERT)
            .map(|f| advice(*f).to_string()),
    );
    out
}
