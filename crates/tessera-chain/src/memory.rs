//! In-memory implementation of `AuditStore`.
//!
//! `MemoryAuditStore` keeps blocks and pending entries in a `StoreState`
//! behind one `Mutex`, so every read is a consistent snapshot and a block
//! insert (block plus the sealing of its entries) is atomic.
//!
//! `StoreState` also carries the compare-and-swap rule shared with the
//! file-backed store.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard};

use tessera_contracts::{
    block::{AuditChainBlock, GENESIS_HASH},
    entry::{EnhancedAuditLogEntry, EntryId},
    error::{LedgerError, LedgerResult},
};
use tessera_core::traits::AuditStore;

// ── Shared store state ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    /// Sealed blocks, ordered by height.
    pub(crate) blocks: Vec<AuditChainBlock>,

    /// Unsealed entries, in insertion order.
    pub(crate) pending: Vec<EnhancedAuditLogEntry>,
}

impl StoreState {
    pub(crate) fn check_entry(&self, entry: &EnhancedAuditLogEntry) -> LedgerResult<()> {
        if entry.is_sealed() {
            return Err(LedgerError::storage(format!(
                "entry {} is already sealed; entries are inserted while pending",
                entry.id()
            )));
        }
        if self.pending.iter().any(|p| p.id() == entry.id()) {
            return Err(LedgerError::storage(format!("entry {} already exists", entry.id())));
        }
        Ok(())
    }

    /// The compare-and-swap rule: `block` must extend the current tip.
    pub(crate) fn check_block(&self, block: &AuditChainBlock) -> LedgerResult<()> {
        let (expected_height, expected_previous) = match self.blocks.last() {
            Some(last) => (last.height + 1, last.hash.as_str()),
            None => (0, GENESIS_HASH),
        };
        if block.height != expected_height || block.previous_hash != expected_previous {
            return Err(LedgerError::SealConflict {
                attempted_height: block.height,
                head_height: self.blocks.last().map(|b| b.height).unwrap_or(0),
            });
        }
        Ok(())
    }

    pub(crate) fn apply_entry(&mut self, entry: EnhancedAuditLogEntry) {
        self.pending.push(entry);
    }

    /// Append `block` and retire its entries from the pending set.
    pub(crate) fn apply_block(&mut self, block: AuditChainBlock) {
        let sealed: HashSet<&EntryId> = block.entries.iter().map(|e| e.id()).collect();
        self.pending.retain(|p| !sealed.contains(p.id()));
        self.blocks.push(block);
    }

    pub(crate) fn entries_in(&self, heights: Option<&RangeInclusive<u64>>) -> Vec<EnhancedAuditLogEntry> {
        self.blocks
            .iter()
            .filter(|b| heights.map_or(true, |h| h.contains(&b.height)))
            .flat_map(|b| b.entries.iter().cloned())
            .collect()
    }
}

pub(crate) fn lock_state<T>(mutex: &Mutex<T>) -> LedgerResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| LedgerError::storage(format!("audit store lock poisoned: {}", e)))
}

// ── Public store ──────────────────────────────────────────────────────────────

/// A volatile, append-only audit store.
///
/// Suitable for tests and for processes that export the chain elsewhere.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    pub(crate) state: Mutex<StoreState>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for MemoryAuditStore {
    fn insert_entry(&self, entry: &EnhancedAuditLogEntry) -> LedgerResult<()> {
        let mut state = lock_state(&self.state)?;
        state.check_entry(entry)?;
        state.apply_entry(entry.clone());
        Ok(())
    }

    fn insert_block(&self, block: &AuditChainBlock) -> LedgerResult<()> {
        let mut state = lock_state(&self.state)?;
        state.check_block(block)?;
        state.apply_block(block.clone());
        Ok(())
    }

    fn fetch_entries(&self, heights: Option<RangeInclusive<u64>>) -> LedgerResult<Vec<EnhancedAuditLogEntry>> {
        Ok(lock_state(&self.state)?.entries_in(heights.as_ref()))
    }

    fn fetch_pending_entries(&self) -> LedgerResult<Vec<EnhancedAuditLogEntry>> {
        Ok(lock_state(&self.state)?.pending.clone())
    }

    fn fetch_latest_block(&self) -> LedgerResult<Option<AuditChainBlock>> {
        Ok(lock_state(&self.state)?.blocks.last().cloned())
    }

    fn fetch_all_blocks(&self) -> LedgerResult<Vec<AuditChainBlock>> {
        Ok(lock_state(&self.state)?.blocks.clone())
    }
}
