//! Hash-chain primitives.
//!
//! Hash input, in order:
//!   1. trail id as UTF-8
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 (64 hex chars)
//!   4. compact JSON of the decision record

use sha2::{Digest, Sha256};

use warden_contracts::{
    decision::DecisionRecord,
    error::{WardenError, WardenResult},
};

use crate::entry::AuditEntry;

/// Lowercase hex SHA-256 of one entry's content.
pub fn hash_entry(
    trail_id: &str,
    sequence: u64,
    record: &DecisionRecord,
    prev_hash: &str,
) -> WardenResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| WardenError::AuditWriteFailed {
        reason: format!("decision record '{}' is not serializable: {}", record.request_id, e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(trail_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);
    Ok(hex::encode(hasher.finalize()))
}

/// Index of the first entry that breaks the chain, or `None` if the chain
/// is intact.
///
/// An entry breaks the chain when its `prev_hash` does not link to the
/// previous entry (or genesis), its sequence is out of place, or its stored
/// hash differs from the recomputed one.
pub fn first_break(entries: &[AuditEntry]) -> Option<usize> {
    let mut expected_prev = AuditEntry::GENESIS_HASH;
    for (idx, entry) in entries.iter().enumerate() {
        if entry.sequence != idx as u64 || entry.prev_hash != expected_prev {
            return Some(idx);
        }
        match hash_entry(&entry.trail_id, entry.sequence, &entry.record, &entry.prev_hash) {
            Ok(hash) if hash == entry.this_hash => {}
            _ => return Some(idx),
        }
        expected_prev = entry.this_hash.as_str();
    }
    None
}

/// Whether the chain is intact. An empty chain is.
pub fn verify_chain(entries: &[AuditEntry]) -> bool {
    first_break(entries).is_none()
}
