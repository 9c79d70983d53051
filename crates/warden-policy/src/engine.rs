//! The policy engine.
//!
//! Evaluation algorithm for one context:
//!
//! 1. Snapshot the enabled policies.
//! 2. Evaluate them in batches of at most `max_concurrent_evaluations`.
//! 3. Per policy:
//!    a. Return the cached result if a live passing entry exists.
//!    b. Otherwise evaluate the conditions on the blocking pool, raced
//!       against the per-policy timeout.
//!    c. Pass → `allow` result, cached.
//!       Fail → the policy's action and severity, plus a recorded violation
//!       and a `PolicyViolationDetected` event. Never cached.
//!       Error or timeout → `warn` result with `error` set. No violation,
//!       never cached.
//!
//! The engine never combines per-policy actions into one verdict.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use warden_contracts::{
    config::PolicyEngineConfig,
    context::PolicyContext,
    error::{WardenError, WardenResult},
    event::GovernanceEvent,
    policy::{EnforcementAction, Policy, PolicyEvaluationResult},
    severity::Severity,
    violation::{EvaluationBatch, PolicyViolation, ViolationFilter, ViolationStatus},
};
use warden_core::traits::{EventSink, PermissionChecker, PolicyEvaluator};

use crate::{
    cache::{CacheStats, EvaluationCache},
    condition::{ConditionEvaluator, CustomExtractor},
    template::PolicyCatalog,
    violation::ViolationLog,
};

/// Active policies in insertion order, plus soft-removed ones kept for audit.
#[derive(Default)]
struct Catalog {
    active: Vec<Arc<Policy>>,
    retired: Vec<Arc<Policy>>,
}

impl Catalog {
    fn position(&self, policy_id: &str) -> Option<usize> {
        self.active.iter().position(|p| p.id == policy_id)
    }
}

/// Engine counters. Cache numbers are measured, not estimated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngineStats {
    pub policies: usize,
    pub enabled_policies: usize,
    pub retired_policies: usize,
    pub evaluations: u64,
    pub violations_recorded: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub open_violations: usize,
    pub cache: CacheStats,
}

/// Policy catalog, evaluator, result cache and violation log.
pub struct PolicyEngine {
    config: PolicyEngineConfig,
    catalog: RwLock<Catalog>,
    evaluator: Arc<ConditionEvaluator>,
    cache: EvaluationCache,
    violations: ViolationLog,
    events: Arc<dyn EventSink>,
    evaluations: AtomicU64,
    violations_recorded: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
}

enum Outcome {
    Passed,
    Failed(String),
    Errored(WardenError),
}

impl PolicyEngine {
    /// Build an engine, loading the embedded templates when
    /// `config.load_default_templates` is set.
    pub fn new(config: PolicyEngineConfig, events: Arc<dyn EventSink>) -> WardenResult<Self> {
        if config.max_concurrent_evaluations == 0 {
            return Err(WardenError::ConfigError {
                reason: "max_concurrent_evaluations must be at least 1".to_string(),
            });
        }
        let engine = Self {
            cache: EvaluationCache::new(Duration::from_secs(config.cache_ttl_secs)),
            config,
            catalog: RwLock::new(Catalog::default()),
            evaluator: Arc::new(ConditionEvaluator::new()),
            violations: ViolationLog::new(),
            events,
            evaluations: AtomicU64::new(0),
            violations_recorded: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        };
        if engine.config.load_default_templates {
            engine.load_catalog(PolicyCatalog::default_templates()?)?;
        }
        Ok(engine)
    }

    /// Add every policy of `catalog`, stopping at the first invalid one.
    pub fn load_catalog(&self, catalog: PolicyCatalog) -> WardenResult<usize> {
        let count = catalog.len();
        for policy in catalog.policies {
            self.add_policy(policy)?;
        }
        Ok(count)
    }

    /// Checker consulted by `permission` conditions.
    pub fn set_permission_checker(&self, checker: Arc<dyn PermissionChecker>) {
        self.evaluator.set_permission_checker(checker);
    }

    /// Register an extractor for `custom { name }` conditions.
    ///
    /// Extractors run on the blocking pool under the per-policy timeout.
    pub fn register_extractor(&self, name: impl Into<String>, extractor: CustomExtractor) {
        self.evaluator.register_extractor(name, extractor);
    }

    // ── Catalog ──────────────────────────────────────────────────────────────

    /// Add a new policy.
    ///
    /// Returns `DuplicateEntity` if the id is used by an active or retired
    /// policy, and `ConfigError` if a condition is malformed.
    pub fn add_policy(&self, policy: Policy) -> WardenResult<()> {
        self.evaluator.validate(&policy)?;
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        if catalog.position(&policy.id).is_some() || catalog.retired.iter().any(|p| p.id == policy.id)
        {
            return Err(WardenError::DuplicateEntity {
                entity: "policy".to_string(),
                id: policy.id,
            });
        }
        info!(
            policy_id = %policy.id,
            severity = %policy.severity,
            action = %policy.action,
            conditions = policy.conditions.len(),
            "policy added"
        );
        catalog.active.push(Arc::new(policy));
        Ok(())
    }

    /// Replace a policy's definition, bumping its version and dropping its
    /// cache entries.
    pub fn update_policy(&self, mut policy: Policy) -> WardenResult<Policy> {
        self.evaluator.validate(&policy)?;
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        let idx = catalog
            .position(&policy.id)
            .ok_or_else(|| WardenError::PolicyNotFound {
                policy_id: policy.id.clone(),
            })?;
        let previous = &catalog.active[idx];
        policy.version = previous.version + 1;
        policy.created_at = previous.created_at;
        policy.updated_at = Utc::now();

        // Invalidate while holding the catalog lock so no evaluation can
        // observe the new version alongside an old cache entry.
        self.cache.invalidate_policy(&policy.id);
        info!(policy_id = %policy.id, version = policy.version, "policy updated");
        catalog.active[idx] = Arc::new(policy.clone());
        Ok(policy)
    }

    /// Soft-remove a policy: it stops being evaluated but stays resolvable
    /// through `get_policy` for violation audit.
    pub fn remove_policy(&self, policy_id: &str) -> WardenResult<()> {
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        let idx = catalog
            .position(policy_id)
            .ok_or_else(|| WardenError::PolicyNotFound {
                policy_id: policy_id.to_string(),
            })?;
        let removed = catalog.active.remove(idx);
        catalog.retired.push(removed);
        self.cache.invalidate_policy(policy_id);
        info!(policy_id = %policy_id, "policy retired");
        Ok(())
    }

    /// Include the policy in evaluation again. Invalidates its cached results.
    pub fn enable_policy(&self, policy_id: &str) -> WardenResult<()> {
        self.set_enabled(policy_id, true)
    }

    /// Exclude the policy from evaluation. Invalidates its cached results.
    pub fn disable_policy(&self, policy_id: &str) -> WardenResult<()> {
        self.set_enabled(policy_id, false)
    }

    fn set_enabled(&self, policy_id: &str, enabled: bool) -> WardenResult<()> {
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        let idx = catalog
            .position(policy_id)
            .ok_or_else(|| WardenError::PolicyNotFound {
                policy_id: policy_id.to_string(),
            })?;
        let mut policy = (*catalog.active[idx]).clone();
        policy.enabled = enabled;
        policy.updated_at = Utc::now();
        catalog.active[idx] = Arc::new(policy);
        self.cache.invalidate_policy(policy_id);
        info!(policy_id = %policy_id, enabled, "policy toggled");
        Ok(())
    }

    /// Look up an active or retired policy.
    pub fn get_policy(&self, policy_id: &str) -> WardenResult<Policy> {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        catalog
            .active
            .iter()
            .chain(catalog.retired.iter())
            .find(|p| p.id == policy_id)
            .map(|p| (**p).clone())
            .ok_or_else(|| WardenError::PolicyNotFound {
                policy_id: policy_id.to_string(),
            })
    }

    /// Active policies (enabled or not), in insertion order.
    pub fn list_policies(&self) -> Vec<Policy> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .iter()
            .map(|p| (**p).clone())
            .collect()
    }

    // ── Evaluation ───────────────────────────────────────────────────────────

    /// Evaluate one active policy by id, whether or not it is enabled.
    pub async fn evaluate_policy(
        &self,
        policy_id: &str,
        ctx: &PolicyContext,
    ) -> WardenResult<PolicyEvaluationResult> {
        let policy = {
            let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
            catalog
                .active
                .iter()
                .find(|p| p.id == policy_id)
                .cloned()
                .ok_or_else(|| WardenError::PolicyNotFound {
                    policy_id: policy_id.to_string(),
                })?
        };
        let (result, _) = self.evaluate_one(policy, Arc::new(ctx.clone())).await;
        Ok(result)
    }

    async fn evaluate_one(
        &self,
        policy: Arc<Policy>,
        ctx: Arc<PolicyContext>,
    ) -> (PolicyEvaluationResult, Option<PolicyViolation>) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let fingerprint = if self.config.cache_enabled {
            let fp = EvaluationCache::fingerprint(&policy, &ctx);
            if let Some(hit) = self.cache.get(&policy.id, &fp) {
                debug!(policy_id = %policy.id, agent_id = %ctx.agent_id, "cache hit");
                return (hit, None);
            }
            Some(fp)
        } else {
            None
        };

        let started = Instant::now();
        let outcome = self.run_with_timeout(Arc::clone(&policy), Arc::clone(&ctx)).await;
        let duration_us = started.elapsed().as_micros() as u64;

        let mut result = PolicyEvaluationResult {
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            policy_version: policy.version,
            passed: true,
            action: EnforcementAction::Allow,
            severity: policy.severity,
            violations: Vec::new(),
            recommendations: Vec::new(),
            duration_us,
            evaluated_at: Utc::now(),
            error: None,
        };

        match outcome {
            Outcome::Passed => {
                debug!(
                    policy_id = %policy.id,
                    agent_id = %ctx.agent_id,
                    duration_us,
                    "policy passed"
                );
                if let Some(fp) = fingerprint {
                    self.cache.insert(&policy.id, fp, &result);
                }
                (result, None)
            }
            Outcome::Failed(message) => {
                result.passed = false;
                result.action = policy.action;
                result.violations = vec![message];
                result.recommendations = policy.remediation.clone();
                let violation = self.record_violation(&policy, &ctx, &result);
                (result, Some(violation))
            }
            Outcome::Errored(err) => {
                if matches!(err, WardenError::EvaluationTimeout { .. }) {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                }
                warn!(
                    policy_id = %policy.id,
                    agent_id = %ctx.agent_id,
                    error = %err,
                    "policy evaluation downgraded to warn"
                );
                result.passed = false;
                result.action = EnforcementAction::Warn;
                result.severity = Severity::Medium;
                result.error = Some(err.to_string());
                (result, None)
            }
        }
    }

    async fn run_with_timeout(&self, policy: Arc<Policy>, ctx: Arc<PolicyContext>) -> Outcome {
        let timeout_ms = self.config.evaluation_timeout_ms;
        let evaluator = Arc::clone(&self.evaluator);
        let policy_id = policy.id.clone();

        // The blocking task cannot be aborted; on timeout its result is dropped.
        let task = tokio::task::spawn_blocking(move || evaluator.evaluate(&policy, &ctx));

        match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
            Ok(Ok(Ok(None))) => Outcome::Passed,
            Ok(Ok(Ok(Some(message)))) => Outcome::Failed(message),
            Ok(Ok(Err(err))) => Outcome::Errored(err),
            Ok(Err(join_err)) => Outcome::Errored(WardenError::EvaluationFailed {
                policy_id,
                reason: format!("evaluation task failed: {}", join_err),
            }),
            Err(_) => Outcome::Errored(WardenError::EvaluationTimeout {
                policy_id,
                timeout_ms,
            }),
        }
    }

    fn record_violation(
        &self,
        policy: &Policy,
        ctx: &PolicyContext,
        result: &PolicyEvaluationResult,
    ) -> PolicyViolation {
        let violation = PolicyViolation {
            id: uuid::Uuid::new_v4().to_string(),
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            policy_version: policy.version,
            agent_id: ctx.agent_id.clone(),
            user_id: ctx.user_id.clone(),
            severity: policy.severity,
            action: policy.action,
            messages: result.violations.clone(),
            status: ViolationStatus::Open,
            detected_at: result.evaluated_at,
            context: ctx.clone(),
            resolved_at: None,
            resolved_by: None,
            resolution_notes: None,
        };
        self.violations.record(violation.clone());
        self.violations_recorded.fetch_add(1, Ordering::Relaxed);

        warn!(
            violation_id = %violation.id,
            policy_id = %policy.id,
            agent_id = %ctx.agent_id,
            severity = %policy.severity,
            action = %policy.action,
            "policy violation recorded"
        );
        self.events.publish(&GovernanceEvent::PolicyViolationDetected {
            violation_id: violation.id.clone(),
            policy_id: policy.id.clone(),
            agent_id: ctx.agent_id.clone(),
            severity: policy.severity,
            action: policy.action,
        });
        violation
    }

    // ── Violations ───────────────────────────────────────────────────────────

    /// The violation with `violation_id`.
    pub fn get_violation(&self, violation_id: &str) -> WardenResult<PolicyViolation> {
        self.violations.get(violation_id)
    }

    /// Violations matching `filter`, oldest first.
    pub fn query_violations(&self, filter: &ViolationFilter) -> Vec<PolicyViolation> {
        self.violations.query(filter)
    }

    /// Move an open violation to acknowledged.
    pub fn acknowledge_violation(&self, violation_id: &str) -> WardenResult<PolicyViolation> {
        self.violations.acknowledge(violation_id)
    }

    /// Close a violation as resolved by `resolved_by`.
    pub fn resolve_violation(
        &self,
        violation_id: &str,
        resolved_by: &str,
        notes: Option<String>,
    ) -> WardenResult<PolicyViolation> {
        self.violations.resolve(violation_id, resolved_by, notes)
    }

    /// Close a violation as a false positive.
    pub fn mark_false_positive(
        &self,
        violation_id: &str,
        resolved_by: &str,
        notes: Option<String>,
    ) -> WardenResult<PolicyViolation> {
        self.violations
            .mark_false_positive(violation_id, resolved_by, notes)
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    /// Drop expired cache entries. Returns how many were dropped.
    pub fn purge_expired_cache(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Catalog sizes, evaluation counts and cache counters.
    pub fn stats(&self) -> EngineStats {
        let (policies, enabled_policies, retired_policies) = {
            let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
            (
                catalog.active.len(),
                catalog.active.iter().filter(|p| p.enabled).count(),
                catalog.retired.len(),
            )
        };
        EngineStats {
            policies,
            enabled_policies,
            retired_policies,
            evaluations: self.evaluations.load(Ordering::Relaxed),
            violations_recorded: self.violations_recorded.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            open_violations: self.violations.open_counts().values().sum(),
            cache: self.cache.stats(),
        }
    }
}

#[async_trait]
impl PolicyEvaluator for PolicyEngine {
    async fn evaluate_all(&self, ctx: &PolicyContext) -> EvaluationBatch {
        let enabled: Vec<Arc<Policy>> = self
            .catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .iter()
            .filter(|p| p.enabled)
            .cloned()
            .collect();

        debug!(
            request_id = %ctx.request_id,
            agent_id = %ctx.agent_id,
            policies = enabled.len(),
            "evaluating policies"
        );

        let ctx = Arc::new(ctx.clone());
        let mut batch = EvaluationBatch::default();
        for chunk in enabled.chunks(self.config.max_concurrent_evaluations) {
            let outcomes = join_all(
                chunk
                    .iter()
                    .map(|policy| self.evaluate_one(Arc::clone(policy), Arc::clone(&ctx))),
            )
            .await;
            for (result, violation) in outcomes {
                batch.results.push(result);
                batch.violations.extend(violation);
            }
        }
        batch
    }
}
