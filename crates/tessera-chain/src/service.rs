//! The chain-aware audit service.
//!
//! `AuditChain` owns the only mutable chain state in the system: the pending
//! buffer, the hash of the last pending entry, and the chain head.  All three
//! live in one `ChainState` behind one `Mutex`, so
//!
//! - two recorders can never link to the same previous entry hash, and
//! - two seals can never claim the same height from this instance.
//!
//! Across instances sharing a store, the store's compare-and-swap on
//! `insert_block` is the arbiter; a losing seal re-reads the head and
//! retries up to `ChainConfig::seal_retry_limit` times.
//!
//! Verification, queries and anomaly detection read a snapshot from the
//! store and never take the chain lock.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use tessera_contracts::{
    anomaly::{AnomalyFinding, Severity, TimeWindow},
    block::{AuditChainBlock, ChainHead, SEQUENCE_START_HASH},
    entry::{AuditEventType, EnhancedAuditLogEntry, EntryFields, RESULT_FAILURE},
    error::{LedgerError, LedgerResult},
    query::{ComplianceReport, EntryQuery},
    verify::VerificationReport,
};
use tessera_core::traits::{AnomalyDetector, AuditRecorder, AuditStore};

use crate::{
    config::ChainConfig, hashing::ChainKey, recorder::EntryRecorder, sealer::ChainBlockSealer,
    verifier::ChainVerifier,
};

/// The anomaly type reported when the chain itself fails verification.
pub const INTEGRITY_VIOLATION_ANOMALY: &str = "audit_chain_integrity_violation";

// ── Internal mutable state ────────────────────────────────────────────────────

struct ChainState {
    head: ChainHead,
    /// Entries recorded since the last seal, in order.
    pending: Vec<EnhancedAuditLogEntry>,
    /// `entry_hash` of the last pending entry, or `SEQUENCE_START_HASH`.
    last_entry_hash: String,
}

// ── Public service ────────────────────────────────────────────────────────────

/// A tamper-evident audit chain over an `AuditStore`.
pub struct AuditChain {
    store: Arc<dyn AuditStore>,
    recorder: EntryRecorder,
    verifier: ChainVerifier,
    detector: Box<dyn AnomalyDetector>,
    config: ChainConfig,
    state: Mutex<ChainState>,
}

impl AuditChain {
    /// Open the chain stored in `store`.
    ///
    /// An empty store gets a genesis block.  Otherwise the head is taken from
    /// the latest block and the pending buffer is restored from the store's
    /// unsealed entries.
    pub fn open(
        store: Arc<dyn AuditStore>,
        key: ChainKey,
        config: ChainConfig,
        detector: Box<dyn AnomalyDetector>,
    ) -> LedgerResult<Self> {
        let head = match store.fetch_latest_block()? {
            Some(block) => block.head(),
            None => {
                let genesis = ChainBlockSealer::genesis(Utc::now());
                match store.insert_block(&genesis) {
                    Ok(()) => {
                        info!(hash = %genesis.hash, "genesis block sealed");
                        genesis.head()
                    }
                    // Another instance sealed genesis first.
                    Err(LedgerError::SealConflict { .. }) => store
                        .fetch_latest_block()?
                        .map(|b| b.head())
                        .ok_or_else(|| LedgerError::storage("store reported a conflict but has no blocks"))?,
                    Err(e) => return Err(e),
                }
            }
        };

        let pending = store.fetch_pending_entries()?;
        let last_entry_hash = pending
            .last()
            .map(|e| e.entry_hash().to_string())
            .unwrap_or_else(|| SEQUENCE_START_HASH.to_string());

        info!(
            height = head.height,
            head = %head.hash,
            pending = pending.len(),
            "audit chain opened"
        );

        Ok(Self {
            store,
            recorder: EntryRecorder::new(key.clone(), config.max_field_len),
            verifier: ChainVerifier::new(key),
            detector,
            config,
            state: Mutex::new(ChainState {
                head,
                pending,
                last_entry_hash,
            }),
        })
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, ChainState>> {
        self.state
            .lock()
            .map_err(|e| LedgerError::storage(format!("chain state lock poisoned: {}", e)))
    }

    /// The current chain head.
    pub fn head(&self) -> LedgerResult<ChainHead> {
        Ok(self.lock()?.head.clone())
    }

    /// Number of entries waiting for the next seal.
    pub fn pending_count(&self) -> LedgerResult<usize> {
        Ok(self.lock()?.pending.len())
    }

    /// Validate, authenticate, persist and buffer one event.
    ///
    /// The entry links to the previous pending entry.  If validation or the
    /// store write fails, neither the buffer nor the link advances.
    pub fn record_entry(&self, fields: EntryFields) -> LedgerResult<EnhancedAuditLogEntry> {
        let mut state = self.lock()?;

        let entry = self.recorder.build(fields, &state.last_entry_hash)?;
        self.store.insert_entry(&entry)?;

        state.last_entry_hash = entry.entry_hash().to_string();
        state.pending.push(entry.clone());

        debug!(
            entry_id = %entry.id(),
            event_type = %entry.entry.event_type,
            pending = state.pending.len(),
            "audit entry recorded"
        );
        Ok(entry)
    }

    /// Seal every pending entry into the next block.
    ///
    /// Returns `EmptySeal` when nothing is pending; no height is consumed.
    /// The head advances and the buffer clears only after the store accepted
    /// the block.  A store failure leaves both untouched.
    pub fn seal_block(&self) -> LedgerResult<AuditChainBlock> {
        let mut state = self.lock()?;
        if state.pending.is_empty() {
            return Err(LedgerError::EmptySeal);
        }

        let mut retries = 0;
        loop {
            let block = ChainBlockSealer::assemble(
                state.head.height + 1,
                &state.head.hash,
                state.pending.clone(),
                Utc::now(),
            );

            match self.store.insert_block(&block) {
                Ok(()) => {
                    state.head = block.head();
                    state.pending.clear();
                    state.last_entry_hash = SEQUENCE_START_HASH.to_string();
                    info!(
                        height = block.height,
                        hash = %block.hash,
                        merkle_root = %block.merkle_root,
                        entries = block.entries.len(),
                        "audit block sealed"
                    );
                    return Ok(block);
                }
                Err(LedgerError::SealConflict { attempted_height, head_height })
                    if retries < self.config.seal_retry_limit =>
                {
                    retries += 1;
                    warn!(attempted_height, head_height, retries, "seal lost a race; refreshing head");
                    state.head = self
                        .store
                        .fetch_latest_block()?
                        .map(|b| b.head())
                        .ok_or_else(|| LedgerError::storage("store reported a conflict but has no blocks"))?;
                }
                Err(e) => {
                    warn!(error = %e, pending = state.pending.len(), "audit block seal failed");
                    return Err(e);
                }
            }
        }
    }

    /// Verify the whole persisted chain.
    pub fn verify_chain(&self) -> LedgerResult<VerificationReport> {
        let blocks = self.store.fetch_all_blocks()?;
        let report = self.verifier.verify(&blocks);
        info!(
            valid = report.is_valid,
            blocks = report.blocks_checked,
            entries = report.entries_checked,
            violations = report.violations.len(),
            "audit chain verified"
        );
        Ok(report)
    }

    /// Entries matching `query`, ordered by block height and then insertion
    /// order, with pending entries (if requested) last.
    pub fn query_entries(&self, query: &EntryQuery) -> LedgerResult<Vec<EnhancedAuditLogEntry>> {
        let mut entries = self.store.fetch_entries(query.block_heights.clone())?;
        if query.include_pending && query.block_heights.is_none() {
            entries.extend(self.store.fetch_pending_entries()?);
        }

        let matched = entries
            .into_iter()
            .filter(|e| query.matches(e))
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(matched)
    }

    /// Entries from blocks that pass verification, restricted to `window`,
    /// plus the report they were certified by.  Both come from one snapshot.
    fn verified_entries(&self, window: &TimeWindow) -> LedgerResult<(Vec<EnhancedAuditLogEntry>, VerificationReport)> {
        let blocks = self.store.fetch_all_blocks()?;
        let report = self.verifier.verify(&blocks);
        let entries = blocks
            .into_iter()
            .filter(|b| report.is_block_valid(b.height))
            .flat_map(|b| b.entries)
            .filter(|e| window.contains(e.entry.timestamp))
            .collect();
        Ok((entries, report))
    }

    /// Scan verified entries for behavioral outliers in `window`.
    ///
    /// Entries in invalid blocks, and pending entries, are never analysed.
    /// If the chain itself fails verification a `Critical` finding leads the
    /// result.
    pub fn detect_anomalies(&self, window: &TimeWindow, tenant: Option<&str>) -> LedgerResult<Vec<AnomalyFinding>> {
        let start = window
            .start
            .checked_sub_signed(self.detector.lookback())
            .ok_or_else(|| LedgerError::validation("window", "window start minus detector lookback is out of range"))?;
        let extended = TimeWindow::new(start, window.end);
        let (entries, report) = self.verified_entries(&extended)?;

        let mut findings = Vec::new();
        if !report.is_valid {
            findings.push(AnomalyFinding {
                anomaly_type: INTEGRITY_VIOLATION_ANOMALY.to_string(),
                severity: Severity::Critical,
                description: format!(
                    "audit chain integrity violation in block(s) {:?}; {} entr(ies) affected",
                    report.invalid_block_heights,
                    report.invalid_entry_ids.len()
                ),
                affected_user_id: None,
                affected_tenant_id: tenant.map(str::to_string),
                affected_ip_address: None,
                timestamp: window.end,
            });
        }
        findings.extend(self.detector.detect(&entries, window, tenant)?);

        info!(
            findings = findings.len(),
            entries = entries.len(),
            chain_valid = report.is_valid,
            "anomaly detection complete"
        );
        Ok(findings)
    }

    /// Aggregate counts over verified entries in `window`.
    pub fn compliance_report(&self, window: &TimeWindow, tenant: Option<&str>) -> LedgerResult<ComplianceReport> {
        let (entries, report) = self.verified_entries(window)?;
        let scoped: Vec<_> = entries
            .iter()
            .filter(|e| tenant.is_none() || e.entry.tenant_id.as_deref() == tenant)
            .collect();

        Ok(ComplianceReport {
            generated_at: Utc::now(),
            period: *window,
            tenant_id: tenant.map(str::to_string),
            total_events: scoped.len(),
            failed_operations: scoped.iter().filter(|e| e.entry.result == RESULT_FAILURE).count(),
            security_incidents: scoped
                .iter()
                .filter(|e| AuditEventType::is_security_incident(&e.entry.event_type))
                .count(),
            gdpr_requests: scoped
                .iter()
                .filter(|e| AuditEventType::is_gdpr_request(&e.entry.event_type))
                .count(),
            chain_valid: report.is_valid,
        })
    }
}

impl AuditRecorder for AuditChain {
    fn record_entry(&self, fields: EntryFields) -> LedgerResult<EnhancedAuditLogEntry> {
        AuditChain::record_entry(self, fields)
    }
}
