//! Rendering of detected values for `PiiDetection::masked_value`.

use sha2::{Digest, Sha256};

use warden_contracts::pii::{MaskingStrategy, PiiType};

/// Alphanumerics left visible by partial masking.
const REVEAL: usize = 4;

/// Mask `value` of type `pii_type` with `strategy`.
pub fn mask(value: &str, pii_type: PiiType, strategy: MaskingStrategy) -> String {
    match strategy {
        MaskingStrategy::Full => "*".repeat(value.chars().count()),
        MaskingStrategy::Partial => partial(value, pii_type),
        MaskingStrategy::Hash => hash_token(value, pii_type),
    }
}

/// `[hash:<type>:<first 8 hex of SHA-256>]`; equal values give equal tokens.
pub fn hash_token(value: &str, pii_type: PiiType) -> String {
    let digest = hex::encode(Sha256::digest(value.as_bytes()));
    format!("[hash:{}:{}]", pii_type, &digest[..8])
}

fn partial(value: &str, pii_type: PiiType) -> String {
    if pii_type == PiiType::Email {
        if let Some((local, domain)) = value.split_once('@') {
            let first: String = local.chars().take(1).collect();
            return format!("{}***@{}", first, domain);
        }
    }

    // Reveal the trailing alphanumerics, keep separators in place.
    let total = value.chars().filter(|c| c.is_alphanumeric()).count();
    let hidden = if total > REVEAL { total - REVEAL } else { total };
    let mut seen = 0;
    value
        .chars()
        .map(|c| {
            if !c.is_alphanumeric() {
                return c;
            }
            seen += 1;
            if seen <= hidden {
                '*'
            } else {
                c
            }
        })
        .collect()
}
