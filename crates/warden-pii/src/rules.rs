//! The fixed PII rule table.
//!
//! One rule per `PiiType`. Keyword-anchored rules (passport, licence, bank
//! account, medical record, biometric) capture the value in group 1 so the
//! reported span covers only the sensitive part.

use once_cell::sync::Lazy;
use regex::Regex;

use warden_contracts::pii::{MaskingStrategy, PiiType};

use crate::validate;

/// One typed detection rule.
pub struct PiiRule {
    pub pii_type: PiiType,
    pub pattern: Regex,
    pub validator: Option<fn(&str) -> bool>,
    pub confidence: f64,
    pub masking: MaskingStrategy,
}

fn rule(
    pii_type: PiiType,
    pattern: &str,
    validator: Option<fn(&str) -> bool>,
    confidence: f64,
    masking: MaskingStrategy,
) -> PiiRule {
    PiiRule {
        pii_type,
        // Patterns are constants covered by tests.
        pattern: Regex::new(pattern).expect("built-in PII pattern must compile"),
        validator,
        confidence,
        masking,
    }
}

pub static RULES: Lazy<Vec<PiiRule>> = Lazy::new(|| {
    use MaskingStrategy::{Full, Hash, Partial};
    vec![
        rule(
            PiiType::Email,
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            None,
            0.95,
            Partial,
        ),
        rule(
            PiiType::Phone,
            r"(?:\+?1[-.\s]?)?\(?\b\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b",
            None,
            0.85,
            Partial,
        ),
        rule(
            PiiType::Ssn,
            r"\b\d{3}-\d{2}-\d{4}\b",
            Some(validate::ssn),
            0.9,
            Partial,
        ),
        rule(
            PiiType::CreditCard,
            // Contiguous digits, 4-4-4-(1..4) groups, or the 4-6-5 Amex layout.
            // Separated groups never run on into a neighbouring number.
            r"\b(?:\d{13,19}|\d{4}[ -]\d{4}[ -]\d{4}[ -]\d{1,4}|\d{4}[ -]\d{6}[ -]\d{5})\b",
            Some(validate::luhn),
            0.95,
            Partial,
        ),
        rule(
            PiiType::Passport,
            r"(?i)\bpassport(?:\s+(?:no\.?|number|#))?[:\s#]*([A-Z0-9]{6,9})\b",
            Some(validate::has_digit),
            0.8,
            Full,
        ),
        rule(
            PiiType::DriversLicense,
            r"(?i)\b(?:driver'?s?\s+licen[cs]e|DL)(?:\s+(?:no\.?|number|#))?[:\s#]*([A-Z0-9]{5,15})\b",
            Some(validate::has_digit),
            0.75,
            Full,
        ),
        rule(
            PiiType::IpAddress,
            r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
            Some(validate::ipv4),
            0.7,
            Hash,
        ),
        rule(
            PiiType::MacAddress,
            r"\b(?:[0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}\b",
            None,
            0.8,
            Partial,
        ),
        rule(
            PiiType::BankAccount,
            r"(?i)\b(?:bank\s+)?(?:account|acct)(?:\s+(?:no\.?|number|#))?[:\s#]*(\d{8,17})\b",
            None,
            0.7,
            Partial,
        ),
        rule(
            PiiType::Iban,
            r"\b[A-Z]{2}\d{2}(?:\s?[A-Z0-9]{4}){2,7}(?:\s?[A-Z0-9]{1,3})?\b",
            Some(validate::iban),
            0.9,
            Partial,
        ),
        rule(PiiType::TaxId, r"\b\d{2}-\d{7}\b", None, 0.75, Full),
        rule(
            PiiType::NationalId,
            r"\b[A-CEGHJ-PR-TW-Z]{2}\s?\d{2}\s?\d{2}\s?\d{2}\s?[A-D]\b",
            None,
            0.8,
            Full,
        ),
        rule(
            PiiType::MedicalRecord,
            r"(?i)\b(?:MRN|medical\s+record(?:\s+(?:no\.?|number|#))?)[:\s#]*([A-Z0-9-]{6,12})\b",
            Some(validate::has_digit),
            0.8,
            Full,
        ),
        rule(
            PiiType::Biometric,
            r"(?i)\b(?:fingerprint|retina|iris|facial|voiceprint)[\s_-]*(?:scan|template|hash|id)?[:\s]+([A-Za-z0-9+/=]{16,})",
            Some(validate::has_digit),
            0.7,
            Hash,
        ),
    ]
});
