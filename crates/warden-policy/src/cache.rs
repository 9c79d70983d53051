//! Evaluation cache for passing results.
//!
//! Entries are grouped per policy id so that updating, removing, enabling or
//! disabling a policy drops exactly that policy's entries. Only passing
//! results are ever inserted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use warden_contracts::{
    context::PolicyContext,
    policy::{Policy, PolicyEvaluationResult},
};

#[derive(Debug, Clone)]
struct CachedResult {
    result: PolicyEvaluationResult,
    inserted_at: Instant,
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0 before any lookup.
    pub hit_rate: f64,
}

/// Passing results keyed by evaluation fingerprint, grouped per policy.
pub struct EvaluationCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, HashMap<String, CachedResult>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EvaluationCache {
    /// An empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// SHA-256 fingerprint of everything a policy evaluation reads.
    ///
    /// Covers the policy id and version, agent, user, sorted requested
    /// actions, and a canonical digest of the remaining inputs. Request id and
    /// timestamps are excluded so identical requests share an entry.
    pub fn fingerprint(policy: &Policy, ctx: &PolicyContext) -> String {
        let mut actions: Vec<&str> = ctx.requested_actions.iter().map(String::as_str).collect();
        actions.sort_unstable();

        let attached = &ctx.attachments;
        // serde_json maps are key-sorted, so this rendering is canonical.
        let remaining = json!({
            "data_access": ctx.data_access,
            "api_calls": ctx.api_calls,
            "permissions": ctx.permissions,
            "estimated_cost": ctx.estimated_cost,
            "estimated_duration_ms": ctx.estimated_duration_ms,
            "node_count": ctx.node_count,
            "compliance": ctx.compliance,
            "ethics": ctx.ethics,
            "metadata": ctx.metadata,
            "pii": attached.pii.as_ref().map(|p| json!({
                "contains_pii": p.contains_pii,
                "types": p.types,
                "risk_score": p.risk_score,
            })),
            "injection": attached.injection.as_ref().map(|i| json!({
                "is_injection": i.is_injection,
                "severity": i.severity,
            })),
            "risk": attached.risk.as_ref().map(|r| json!({
                "overall": r.overall,
                "severity": r.severity,
            })),
            "adherence": attached.adherence.as_ref().map(|a| json!({
                "overall_score": a.overall_score,
                "drift_detected": a.drift_detected,
            })),
        });

        let mut hasher = Sha256::new();
        hasher.update(policy.id.as_bytes());
        hasher.update(b"\x00");
        hasher.update(policy.version.to_le_bytes());
        hasher.update(ctx.agent_id.as_bytes());
        hasher.update(b"\x00");
        hasher.update(ctx.user_id.as_bytes());
        hasher.update(b"\x00");
        for action in actions {
            hasher.update(action.as_bytes());
            hasher.update(b"\x00");
        }
        hasher.update(remaining.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up a live entry, counting a hit or a miss.
    pub fn get(&self, policy_id: &str, fingerprint: &str) -> Option<PolicyEvaluationResult> {
        let found = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(policy_id)
            .and_then(|by_fp| by_fp.get(fingerprint))
            .filter(|c| c.inserted_at.elapsed() < self.ttl)
            .map(|c| c.result.clone());

        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Store a passing result. Failing results are ignored.
    pub fn insert(&self, policy_id: &str, fingerprint: String, result: &PolicyEvaluationResult) {
        if !result.passed {
            return;
        }
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(policy_id.to_string())
            .or_default()
            .insert(
                fingerprint,
                CachedResult {
                    result: result.clone(),
                    inserted_at: Instant::now(),
                },
            );
    }

    /// Drop every entry for `policy_id`. Returns how many were dropped.
    pub fn invalidate_policy(&self, policy_id: &str) -> usize {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(policy_id)
            .map(|by_fp| by_fp.len())
            .unwrap_or(0)
    }

    /// Drop entries older than the TTL.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        for by_fp in entries.values_mut() {
            let before = by_fp.len();
            by_fp.retain(|_, c| c.inserted_at.elapsed() < self.ttl);
            removed += before - by_fp.len();
        }
        entries.retain(|_, by_fp| !by_fp.is_empty());
        removed
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Hit, miss and size counters.
    pub fn stats(&self) -> CacheStats {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashMap::len)
            .sum();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}
