//! Audit trail entry and export types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_contracts::decision::DecisionRecord;

/// One decision record linked into the hash chain.
///
/// `this_hash` commits to the trail id, the sequence number, `prev_hash` and
/// the record itself, so editing any of them breaks verification from this
/// entry onward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the trail, starting at 0.
    pub sequence: u64,
    pub trail_id: String,
    pub record: DecisionRecord,
    /// `this_hash` of the previous entry, or `GENESIS_HASH` for the first.
    pub prev_hash: String,
    pub this_hash: String,
}

impl AuditEntry {
    /// `prev_hash` of the first entry in every trail: 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// A point-in-time copy of a trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExport {
    pub trail_id: String,
    pub entries: Vec<AuditEntry>,
    pub exported_at: DateTime<Utc>,
    /// `this_hash` of the last entry; empty when the trail is empty.
    pub terminal_hash: String,
}
