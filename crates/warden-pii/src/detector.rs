//! The PII detector.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use warden_contracts::{
    config::PiiConfig,
    event::GovernanceEvent,
    pii::{PiiDetection, PiiDetectionResult, PiiType},
};
use warden_core::traits::{EventSink, PiiScanner};

use crate::{
    mask::mask,
    rules::{PiiRule, RULES},
};

/// Counters since construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PiiStats {
    /// Strings scanned, including each string leaf of a structured value.
    pub scans: u64,
    pub detections: u64,
    pub by_type: BTreeMap<PiiType, u64>,
}

/// Regex-based PII detection, masking and redaction.
pub struct PiiDetector {
    config: PiiConfig,
    rules: Vec<&'static PiiRule>,
    events: Arc<dyn EventSink>,
    stats: Mutex<PiiStats>,
}

impl PiiDetector {
    /// A detector using the rules enabled in `config`.
    pub fn new(config: PiiConfig, events: Arc<dyn EventSink>) -> Self {
        let rules = RULES
            .iter()
            .filter(|r| config.enabled_types.contains(&r.pii_type))
            .collect();
        Self {
            config,
            rules,
            events,
            stats: Mutex::new(PiiStats::default()),
        }
    }

    /// Scan one string.
    ///
    /// Publishes `PiiDetected` when anything is found.
    pub fn detect(&self, text: &str) -> PiiDetectionResult {
        let result = self.scan_text(text);
        self.count(std::slice::from_ref(&result));
        if result.contains_pii {
            self.notify(&result);
        }
        result
    }

    /// Walk a structured value and scan every string and number leaf.
    ///
    /// Keys are field paths such as `customer.contacts[1].email`; a scalar
    /// root is reported under the empty path. Only leaves containing PII are
    /// returned. One `PiiDetected` event covers the whole value.
    pub fn detect_in_object(&self, value: &Value) -> BTreeMap<String, PiiDetectionResult> {
        let mut leaves = Vec::new();
        collect_leaves(value, String::new(), &mut leaves);

        let scanned: Vec<(String, PiiDetectionResult)> = leaves
            .into_iter()
            .map(|(path, text)| {
                let result = self.scan_text(&text);
                (path, result)
            })
            .collect();

        let results: Vec<PiiDetectionResult> = scanned.iter().map(|(_, r)| r.clone()).collect();
        self.count(&results);

        let found: BTreeMap<String, PiiDetectionResult> = scanned
            .into_iter()
            .filter(|(_, r)| r.contains_pii)
            .collect();

        if !found.is_empty() {
            let mut combined = PiiDetectionResult::clean();
            for result in found.values() {
                combined.absorb(result);
            }
            self.notify(&combined);
        }
        found
    }

    /// `text` with every detected span replaced by its type tag.
    pub fn redact(&self, text: &str) -> String {
        let detections = self.find(text);
        redact_spans(text, &detections)
    }

    /// Scan and detection counters since construction.
    pub fn stats(&self) -> PiiStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn scan_text(&self, text: &str) -> PiiDetectionResult {
        let detections = self.find(text);
        if detections.is_empty() {
            return PiiDetectionResult::clean();
        }

        let types: BTreeSet<PiiType> = detections.iter().map(|d| d.pii_type).collect();
        let sensitive = types.iter().filter(|t| t.is_sensitive()).count() as u32;
        let risk_score = (10 * detections.len() as u32 + 20 * sensitive).min(100);
        let redacted_text = self
            .config
            .auto_redact
            .then(|| redact_spans(text, &detections));

        PiiDetectionResult {
            contains_pii: true,
            types,
            detections,
            risk_score,
            redacted_text,
        }
    }

    /// Non-overlapping detections in offset order.
    fn find(&self, text: &str) -> Vec<PiiDetection> {
        let mut candidates = Vec::new();
        for rule in &self.rules {
            if rule.confidence < self.config.min_confidence {
                continue;
            }
            for caps in rule.pattern.captures_iter(text) {
                let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                if rule.validator.is_some_and(|valid| !valid(m.as_str())) {
                    continue;
                }
                let strategy = self.config.masking_strategy.unwrap_or(rule.masking);
                candidates.push(PiiDetection {
                    pii_type: rule.pii_type,
                    start: m.start(),
                    end: m.end(),
                    confidence: rule.confidence,
                    masked_value: mask(m.as_str(), rule.pii_type, strategy),
                });
            }
        }

        // Earlier span wins; on equal starts the more confident rule wins.
        candidates.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(b.confidence.total_cmp(&a.confidence))
        });
        let mut kept: Vec<PiiDetection> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if kept.last().is_some_and(|last| candidate.start < last.end) {
                continue;
            }
            kept.push(candidate);
        }
        kept
    }

    fn count(&self, results: &[PiiDetectionResult]) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        for result in results {
            stats.scans += 1;
            stats.detections += result.detections.len() as u64;
            for d in &result.detections {
                *stats.by_type.entry(d.pii_type).or_default() += 1;
            }
        }
    }

    fn notify(&self, result: &PiiDetectionResult) {
        debug!(
            detections = result.detections.len(),
            risk_score = result.risk_score,
            "pii detected"
        );
        self.events.publish(&GovernanceEvent::PiiDetected {
            types: result.types.iter().copied().collect(),
            detection_count: result.detections.len(),
            risk_score: result.risk_score,
        });
    }
}

impl PiiScanner for PiiDetector {
    fn scan(&self, text: &str) -> PiiDetectionResult {
        self.detect(text)
    }
}

/// Replace spans back to front so earlier offsets stay valid.
fn redact_spans(text: &str, detections: &[PiiDetection]) -> String {
    let mut out = text.to_string();
    let mut ordered: Vec<&PiiDetection> = detections.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));
    for d in ordered {
        out.replace_range(d.start..d.end, &d.pii_type.redaction_tag());
    }
    out
}

fn collect_leaves(value: &Value, path: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::String(s) => out.push((path, s.clone())),
        Value::Number(n) => out.push((path, n.to_string())),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_leaves(item, format!("{}[{}]", path, i), out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                collect_leaves(item, child, out);
            }
        }
        Value::Bool(_) | Value::Null => {}
    }
}
