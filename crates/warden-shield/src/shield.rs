//! The prompt-injection shield.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};

use warden_contracts::{
    config::ShieldConfig,
    event::GovernanceEvent,
    injection::{AttackType, PromptInjectionResult},
    severity::Severity,
};
use warden_core::traits::{EventSink, InjectionScanner};

use crate::rules::{HEURISTICS, RULES};

/// Replacement for every matched span when sanitizing.
pub const FILTERED: &str = "[FILTERED]";

/// Pattern name reported for inputs over the length limit.
pub const OVERSIZED_INPUT: &str = "oversized_input";

/// Extra confidence per matching rule beyond the first.
const PER_EXTRA_MATCH: f64 = 0.05;

/// Counters since construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShieldStats {
    pub analyzed: u64,
    pub injections: u64,
    /// Injections at or above the configured block severity.
    pub blocked: u64,
    pub by_type: BTreeMap<AttackType, u64>,
}

/// Pattern and heuristic prompt-injection detection.
pub struct PromptShield {
    config: ShieldConfig,
    events: Arc<dyn EventSink>,
    stats: Mutex<ShieldStats>,
}

impl PromptShield {
    /// A shield over the fixed rule table.
    pub fn new(config: ShieldConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            events,
            stats: Mutex::new(ShieldStats::default()),
        }
    }

    /// Scan `input` for injection attempts. Publishes `InjectionBlocked` when
    /// the result reaches `block_severity`.
    pub fn analyze(&self, input: &str) -> PromptInjectionResult {
        let (text, truncated) = truncate_chars(input, self.config.max_input_length);

        let mut matched_patterns = Vec::new();
        let mut detected_types: Vec<AttackType> = Vec::new();
        let mut severity: Option<Severity> = None;
        let mut spans: Vec<Range<usize>> = Vec::new();

        if truncated {
            matched_patterns.push(OVERSIZED_INPUT.to_string());
            detected_types.push(AttackType::ContextManipulation);
            severity = Some(Severity::Critical);
        }

        for rule in RULES.iter() {
            let mut hit = false;
            for m in rule.pattern.find_iter(text) {
                hit = true;
                spans.push(m.range());
            }
            if !hit {
                continue;
            }
            matched_patterns.push(rule.name.to_string());
            if !detected_types.contains(&rule.attack_type) {
                detected_types.push(rule.attack_type);
            }
            severity = severity.max(Some(rule.severity));
        }

        let is_injection = !matched_patterns.is_empty();
        let heuristic_score = heuristic_score(text);
        let pattern_confidence = severity.map_or(0.0, |s| {
            base_confidence(s) + PER_EXTRA_MATCH * (matched_patterns.len() - 1) as f64
        });
        let confidence = pattern_confidence.max(heuristic_score).min(1.0);

        let sanitized_text = (self.config.sanitize && is_injection).then(|| sanitize(text, spans));

        let result = PromptInjectionResult {
            is_injection,
            confidence,
            attack_type: detected_types.first().copied(),
            detected_types,
            severity,
            matched_patterns,
            heuristic_score,
            truncated,
            sanitized_text,
        };
        self.record(&result);
        result
    }

    /// Whether `result` is an injection at or above the configured block severity.
    pub fn should_block(&self, result: &PromptInjectionResult) -> bool {
        result.is_injection
            && result
                .severity
                .is_some_and(|s| s >= self.config.block_severity)
    }

    /// Analysis, detection and block counters since construction.
    pub fn stats(&self) -> ShieldStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, result: &PromptInjectionResult) {
        let blocked = self.should_block(result);
        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.analyzed += 1;
            if result.is_injection {
                stats.injections += 1;
                for ty in &result.detected_types {
                    *stats.by_type.entry(*ty).or_default() += 1;
                }
            }
            if blocked {
                stats.blocked += 1;
            }
        }

        if !result.is_injection {
            debug!(heuristic_score = result.heuristic_score, "input clean");
            return;
        }
        let severity = result.severity.unwrap_or(Severity::Low);
        warn!(
            attack_type = ?result.attack_type,
            severity = %severity,
            patterns = ?result.matched_patterns,
            blocked,
            "prompt injection detected"
        );
        if blocked {
            self.events.publish(&GovernanceEvent::InjectionBlocked {
                attack_type: result.attack_type,
                severity,
                matched_patterns: result.matched_patterns.clone(),
            });
        }
    }
}

impl InjectionScanner for PromptShield {
    fn analyze(&self, input: &str) -> PromptInjectionResult {
        PromptShield::analyze(self, input)
    }
}

fn base_confidence(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 0.5,
        Severity::Medium => 0.7,
        Severity::High => 0.85,
        Severity::Critical => 0.95,
    }
}

/// Weighted vocabulary hits, capped per group, in `[0, 1]`.
pub fn heuristic_score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let total: f64 = HEURISTICS
        .iter()
        .map(|group| {
            let hits = group.terms.iter().filter(|t| lower.contains(*t)).count();
            (group.weight * hits as f64).min(group.cap)
        })
        .sum();
    total.min(1.0)
}

/// The first `max` characters of `input`, and whether anything was cut.
fn truncate_chars(input: &str, max: usize) -> (&str, bool) {
    match input.char_indices().nth(max) {
        Some((byte, _)) => (&input[..byte], true),
        None => (input, false),
    }
}

/// Replace every span with `FILTERED`; overlapping spans are merged first.
fn sanitize(text: &str, mut spans: Vec<Range<usize>>) -> String {
    spans.sort_by_key(|r| r.start);
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in merged {
        out.push_str(&text[cursor..span.start]);
        out.push_str(FILTERED);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}
