//! In-memory `AuditWriter`.
//!
//! Entries live in a `Vec` behind a `Mutex`. The pipeline writes one
//! decision record per governed request; reports and compliance snapshots
//! read them back.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use warden_contracts::{decision::DecisionRecord, error::WardenResult};
use warden_core::traits::AuditWriter;

use crate::{
    chain::{first_break, hash_entry},
    entry::{AuditEntry, AuditExport},
};

pub(crate) struct TrailState {
    pub(crate) entries: Vec<AuditEntry>,
    pub(crate) last_hash: String,
}

/// Append-only, hash-chained log of decision records held in memory.
pub struct InMemoryAuditTrail {
    trail_id: String,
    pub(crate) state: Mutex<TrailState>,
}

impl InMemoryAuditTrail {
    /// An empty trail. `trail_id` is mixed into every entry hash.
    pub fn new(trail_id: impl Into<String>) -> Self {
        Self {
            trail_id: trail_id.into(),
            state: Mutex::new(TrailState {
                entries: Vec::new(),
                last_hash: AuditEntry::GENESIS_HASH.to_string(),
            }),
        }
    }

    /// The id mixed into every entry hash.
    pub fn trail_id(&self) -> &str {
        &self.trail_id
    }

    /// Number of entries written.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recompute every hash and check every link.
    pub fn verify_integrity(&self) -> bool {
        match first_break(&self.lock().entries) {
            None => true,
            Some(idx) => {
                error!(trail_id = %self.trail_id, sequence = idx, "audit chain broken");
                false
            }
        }
    }

    /// A copy of every entry with the current terminal hash.
    pub fn export_log(&self) -> AuditExport {
        let state = self.lock();
        AuditExport {
            trail_id: self.trail_id.clone(),
            entries: state.entries.clone(),
            exported_at: Utc::now(),
            terminal_hash: state
                .entries
                .last()
                .map(|e| e.this_hash.clone())
                .unwrap_or_default(),
        }
    }

    /// Records with `start <= timestamp < end`, optionally for one agent,
    /// in write order.
    pub fn records_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        agent_id: Option<&str>,
    ) -> Vec<DecisionRecord> {
        self.lock()
            .entries
            .iter()
            .map(|e| &e.record)
            .filter(|r| r.timestamp >= start && r.timestamp < end)
            .filter(|r| agent_id.map_or(true, |a| r.agent_id == a))
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrailState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AuditWriter for InMemoryAuditTrail {
    fn write(&self, record: &DecisionRecord) -> WardenResult<()> {
        let mut state = self.lock();
        let sequence = state.entries.len() as u64;
        let prev_hash = state.last_hash.clone();
        let this_hash = hash_entry(&self.trail_id, sequence, record, &prev_hash)?;

        debug!(
            trail_id = %self.trail_id,
            sequence,
            request_id = %record.request_id,
            verdict = ?record.verdict,
            "decision recorded"
        );
        state.entries.push(AuditEntry {
            sequence,
            trail_id: self.trail_id.clone(),
            record: record.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        state.last_hash = this_hash;
        Ok(())
    }
}
