//! # warden-pii
//!
//! Detection of personally identifiable information in free text and
//! structured values, with per-type masking and optional redaction.
//!
//! Fourteen typed rules, each a regex plus an optional validator (Luhn for
//! cards, mod-97 for IBANs, range checks for SSNs and IPv4). Overlapping
//! matches keep the earlier span, then the more confident rule.

pub mod detector;
pub mod mask;
pub mod rules;
pub mod validate;

pub use detector::{PiiDetector, PiiStats};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use warden_contracts::{
        config::PiiConfig,
        event::GovernanceEvent,
        pii::{MaskingStrategy, PiiType},
    };
    use warden_core::CollectingSink;

    use super::*;

    const MIXED: &str = "Reach me at jane.doe@example.com or 555-123-4567. \
                         SSN 123-45-6789, card 4532015112830366, host 192.168.1.20.";

    fn detector() -> (PiiDetector, Arc<CollectingSink>) {
        with_config(PiiConfig::default())
    }

    fn with_config(config: PiiConfig) -> (PiiDetector, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        (PiiDetector::new(config, sink.clone()), sink)
    }

    // ── Detection ────────────────────────────────────────────────────────────

    #[test]
    fn luhn_gates_credit_cards() {
        let (d, _) = detector();
        let valid = d.detect("card 4532015112830366");
        assert!(valid.types.contains(&PiiType::CreditCard));

        let invalid = d.detect("card 4532015112830367");
        assert!(!invalid.types.contains(&PiiType::CreditCard));
    }

    #[test]
    fn card_next_to_another_number_is_still_found() {
        let (d, _) = detector();
        for text in [
            "Pay 4532015112830366 100 dollars",
            "Pay 100 4532015112830366 now",
            "Pay 4532 0151 1283 0366 100 dollars",
        ] {
            let result = d.detect(text);
            let card = result
                .detections
                .iter()
                .find(|det| det.pii_type == PiiType::CreditCard)
                .unwrap_or_else(|| panic!("no card in {:?}", text));
            let digits: String = text[card.start..card.end]
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect();
            assert_eq!(digits, "4532015112830366");
            assert!(!d.redact(text).contains("0366"));
        }
    }

    #[test]
    fn mixed_text_finds_every_type() {
        let (d, _) = detector();
        let result = d.detect(MIXED);
        assert_eq!(
            result.types.iter().copied().collect::<Vec<_>>(),
            vec![
                PiiType::Email,
                PiiType::Phone,
                PiiType::Ssn,
                PiiType::CreditCard,
                PiiType::IpAddress,
            ]
        );
        assert_eq!(result.detections.len(), 5);
        // 5 detections, 2 sensitive types
        assert_eq!(result.risk_score, 90);
        assert!(result.redacted_text.is_none());
    }

    #[test]
    fn spans_point_at_the_value() {
        let (d, _) = detector();
        let text = "email: jane@example.com";
        let result = d.detect(text);
        let hit = &result.detections[0];
        assert_eq!(&text[hit.start..hit.end], "jane@example.com");
        assert_eq!(hit.masked_value, "j***@example.com");
    }

    #[test]
    fn keyword_rules_report_only_the_captured_value() {
        let (d, _) = detector();
        let text = "Passport no. X1234567 on file";
        let result = d.detect(text);
        let hit = &result.detections[0];
        assert_eq!(hit.pii_type, PiiType::Passport);
        assert_eq!(&text[hit.start..hit.end], "X1234567");
        assert_eq!(hit.masked_value, "********");
    }

    #[test]
    fn overlapping_match_keeps_more_confident_rule() {
        let (d, _) = detector();
        let result = d.detect("account number 4532015112830366");
        assert_eq!(result.detections.len(), 1);
        assert_eq!(result.detections[0].pii_type, PiiType::CreditCard);
    }

    #[test]
    fn clean_text_is_not_an_error() {
        let (d, sink) = detector();
        let result = d.detect("The quarterly report is ready.");
        assert!(!result.contains_pii);
        assert_eq!(result.risk_score, 0);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn min_confidence_and_enabled_types_filter_rules() {
        let (strict, _) = with_config(PiiConfig {
            min_confidence: 0.9,
            ..Default::default()
        });
        // IP rule confidence is 0.7
        assert!(!strict.detect("host 192.168.1.20").contains_pii);

        let (email_only, _) = with_config(PiiConfig {
            enabled_types: vec![PiiType::Email],
            ..Default::default()
        });
        let result = email_only.detect(MIXED);
        assert_eq!(result.detections.len(), 1);
    }

    #[test]
    fn masking_override_applies_to_all_rules() {
        let (d, _) = with_config(PiiConfig {
            masking_strategy: Some(MaskingStrategy::Hash),
            ..Default::default()
        });
        let result = d.detect("jane@example.com");
        assert!(result.detections[0].masked_value.starts_with("[hash:email:"));
    }

    // ── Redaction ────────────────────────────────────────────────────────────

    #[test]
    fn auto_redact_replaces_spans_with_tags() {
        let (d, _) = with_config(PiiConfig {
            auto_redact: true,
            ..Default::default()
        });
        let result = d.detect(MIXED);
        assert_eq!(
            result.redacted_text.as_deref(),
            Some(
                "Reach me at [EMAIL] or [PHONE]. \
                 SSN [SSN], card [CREDIT_CARD], host [IP_ADDRESS]."
            )
        );
    }

    #[test]
    fn detection_is_idempotent_over_redacted_output() {
        let (d, _) = detector();
        let first = d.detect(MIXED);
        assert!(first.contains_pii);

        let redacted = d.redact(MIXED);
        let second = d.detect(&redacted);
        for ty in &first.types {
            assert!(!second.types.contains(ty), "{ty} detected after redaction");
        }
        assert_eq!(d.redact(&redacted), redacted);
    }

    #[test]
    fn masked_values_do_not_rescan() {
        let (d, _) = detector();
        let first = d.detect(MIXED);
        let masked: Vec<&str> = first
            .detections
            .iter()
            .map(|det| det.masked_value.as_str())
            .collect();
        let second = d.detect(&masked.join(" "));
        for ty in [PiiType::Email, PiiType::Phone, PiiType::Ssn, PiiType::CreditCard] {
            assert!(!second.types.contains(&ty), "{ty} detected in masked output");
        }
    }

    // ── Structured values ────────────────────────────────────────────────────

    #[test]
    fn detect_in_object_reports_field_paths() {
        let (d, sink) = detector();
        let value = json!({
            "customer": {
                "name": "Jane",
                "contacts": [
                    { "email": "jane@example.com" },
                    { "phone": "555-123-4567" }
                ]
            },
            "note": "nothing here",
            "card": 4532015112830366u64
        });

        let found = d.detect_in_object(&value);
        let paths: Vec<&str> = found.keys().map(String::as_str).collect();
        assert_eq!(
            paths,
            vec!["card", "customer.contacts[0].email", "customer.contacts[1].phone"]
        );
        assert!(found["card"].types.contains(&PiiType::CreditCard));

        // one event for the whole value
        let events = sink.of_kind("pii_detected");
        assert_eq!(events.len(), 1);
        match &events[0] {
            GovernanceEvent::PiiDetected {
                detection_count, ..
            } => assert_eq!(*detection_count, 3),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn scalar_root_uses_empty_path() {
        let (d, _) = detector();
        let found = d.detect_in_object(&json!("jane@example.com"));
        assert!(found.contains_key(""));
    }

    // ── Stats and events ─────────────────────────────────────────────────────

    #[test]
    fn stats_count_scans_and_types() {
        let (d, sink) = detector();
        d.detect(MIXED);
        d.detect("no pii");
        d.detect("jane@example.com");

        let stats = d.stats();
        assert_eq!(stats.scans, 3);
        assert_eq!(stats.detections, 6);
        assert_eq!(stats.by_type.get(&PiiType::Email), Some(&2));
        assert_eq!(sink.of_kind("pii_detected").len(), 2);
    }
}
