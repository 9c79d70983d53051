//! PII detection result types.
//!
//! Detections never carry the raw matched value, only its byte span in the
//! scanned text and a masked rendering, so results can be logged and attached
//! to policy contexts without re-exposing the data they describe.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The fourteen categories of personally identifiable information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    Passport,
    DriversLicense,
    IpAddress,
    MacAddress,
    BankAccount,
    Iban,
    TaxId,
    NationalId,
    MedicalRecord,
    Biometric,
}

impl PiiType {
    pub const ALL: [PiiType; 14] = [
        PiiType::Email,
        PiiType::Phone,
        PiiType::Ssn,
        PiiType::CreditCard,
        PiiType::Passport,
        PiiType::DriversLicense,
        PiiType::IpAddress,
        PiiType::MacAddress,
        PiiType::BankAccount,
        PiiType::Iban,
        PiiType::TaxId,
        PiiType::NationalId,
        PiiType::MedicalRecord,
        PiiType::Biometric,
    ];

    /// Snake-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            PiiType::Email => "email",
            PiiType::Phone => "phone",
            PiiType::Ssn => "ssn",
            PiiType::CreditCard => "credit_card",
            PiiType::Passport => "passport",
            PiiType::DriversLicense => "drivers_license",
            PiiType::IpAddress => "ip_address",
            PiiType::MacAddress => "mac_address",
            PiiType::BankAccount => "bank_account",
            PiiType::Iban => "iban",
            PiiType::TaxId => "tax_id",
            PiiType::NationalId => "national_id",
            PiiType::MedicalRecord => "medical_record",
            PiiType::Biometric => "biometric",
        }
    }

    /// The bracketed tag written in place of a redacted span, e.g. `[CREDIT_CARD]`.
    pub fn redaction_tag(self) -> String {
        format!("[{}]", self.as_str().to_ascii_uppercase())
    }

    /// Types whose exposure carries extra weight in the result risk score.
    pub fn is_sensitive(self) -> bool {
        matches!(
            self,
            PiiType::Ssn
                | PiiType::CreditCard
                | PiiType::Passport
                | PiiType::MedicalRecord
                | PiiType::Biometric
        )
    }
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a detected value is rendered in `PiiDetection::masked_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskingStrategy {
    /// Every character replaced with `*`.
    Full,
    /// Type-aware partial reveal (last four digits, first character plus domain, ...).
    Partial,
    /// Deterministic opaque token derived from a SHA-256 digest of the value.
    Hash,
}

/// One PII match inside a scanned string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiDetection {
    pub pii_type: PiiType,
    /// Byte offset of the first matched byte.
    pub start: usize,
    /// Byte offset one past the last matched byte.
    pub end: usize,
    /// Rule confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    pub masked_value: String,
}

/// Outcome of scanning one string for PII.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PiiDetectionResult {
    pub contains_pii: bool,
    pub types: BTreeSet<PiiType>,
    pub detections: Vec<PiiDetection>,
    /// `min(100, 10 × detections + 20 × distinct sensitive types)`.
    pub risk_score: u32,
    /// Present only when auto-redaction is enabled and PII was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacted_text: Option<String>,
}

impl PiiDetectionResult {
    /// A result with no detections.
    pub fn clean() -> Self {
        Self::default()
    }

    /// Fold another scan into this one (used when several text fields of a
    /// single request are scanned). Offsets stay relative to their own field.
    pub fn absorb(&mut self, other: &PiiDetectionResult) {
        self.contains_pii |= other.contains_pii;
        self.types.extend(other.types.iter().copied());
        self.detections.extend(other.detections.iter().cloned());
        self.risk_score = self.risk_score.max(other.risk_score);
    }
}
