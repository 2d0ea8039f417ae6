//! Core trait definitions for the Tessera audit chain.
//!
//! These three traits define the seams of the system:
//!
//! - `AuditStore`: trusted sink (entries and blocks are append-only)
//! - `AuditRecorder`: trusted writer (every entry authenticated on entry)
//! - `AnomalyDetector`: pure analysis over entries already verified
//!
//! Implementations must be `Send + Sync` so a single chain service can be
//! shared across concurrent request handlers.

use std::ops::RangeInclusive;

use chrono::Duration;

use tessera_contracts::{
    anomaly::{AnomalyFinding, TimeWindow},
    block::AuditChainBlock,
    entry::{EnhancedAuditLogEntry, EntryFields},
    error::LedgerResult,
};

/// The persistent, append-only store behind an audit chain.
///
/// A failed write surfaces as `LedgerError::Storage`; it is never dropped.
pub trait AuditStore: Send + Sync {
    /// Persist one pending (unsealed) entry.
    fn insert_entry(&self, entry: &EnhancedAuditLogEntry) -> LedgerResult<()>;

    /// Persist a sealed block together with its stamped entries.
    ///
    /// This is the chain's compare-and-swap point.  The store MUST reject the
    /// block with `LedgerError::SealConflict` unless `block.height` is exactly
    /// one above its latest block and `block.previous_hash` equals that
    /// block's hash (or, for an empty store, the block is a height-0 genesis
    /// block).  On success the block and the sealing of its entries become
    /// visible atomically.
    fn insert_block(&self, block: &AuditChainBlock) -> LedgerResult<()>;

    /// Entries of every sealed block whose height falls in `heights`, or of
    /// every sealed block when `heights` is `None`, ordered by height and
    /// then insertion order.
    fn fetch_entries(&self, heights: Option<RangeInclusive<u64>>) -> LedgerResult<Vec<EnhancedAuditLogEntry>>;

    /// Entries inserted but not yet sealed, in insertion order.
    fn fetch_pending_entries(&self) -> LedgerResult<Vec<EnhancedAuditLogEntry>>;

    /// The block with the greatest height, if any.
    fn fetch_latest_block(&self) -> LedgerResult<Option<AuditChainBlock>>;

    /// Every block ordered by height, read as one consistent snapshot.
    fn fetch_all_blocks(&self) -> LedgerResult<Vec<AuditChainBlock>>;
}

/// The basic recorder capability: turn caller fields into an authenticated
/// entry.
pub trait AuditRecorder: Send + Sync {
    /// Validate, authenticate and buffer one event.
    ///
    /// Returns `LedgerError::Validation` for missing or malformed required
    /// fields; in that case nothing is buffered or persisted.
    fn record_entry(&self, fields: EntryFields) -> LedgerResult<EnhancedAuditLogEntry>;
}

/// Behavioral analysis over verified entries.
///
/// Implementations must be deterministic: the same entries, window and
/// tenant filter always produce the same findings in the same order.
pub trait AnomalyDetector: Send + Sync {
    /// How far before `window.start` the caller should include entries so
    /// the detector can compute its baselines.
    fn lookback(&self) -> Duration {
        Duration::zero()
    }

    /// Scan `entries` and return findings for activity inside `window`.
    ///
    /// `entries` may include the lookback period preceding the window and
    /// may span tenants; `tenant` restricts which activity is reported on.
    fn detect(
        &self,
        entries: &[EnhancedAuditLogEntry],
        window: &TimeWindow,
        tenant: Option<&str>,
    ) -> LedgerResult<Vec<AnomalyFinding>>;
}
