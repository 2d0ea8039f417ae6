//! Full-chain verification.
//!
//! `ChainVerifier` walks a snapshot of blocks from height 0 upward and
//! recomputes everything that can be recomputed:
//!
//! 1. **Height**: block `i` must be at height `i`.
//! 2. **Block linkage**: `previous_hash` must equal the prior block's
//!    RECOMPUTED hash (not its stored one), so a forged link is caught even
//!    if the forger also rewrote the stored hash.
//! 3. **Merkle root**: recomputed from the stored entry hashes.
//! 4. **Block hash**: recomputed from the header fields.
//! 5. Per entry: authentication tag under the key, entry hash, linkage to
//!    the previous entry in the block, and the block stamp.
//!
//! The walk never stops early.  Every violation is recorded and the report
//! lists every affected block height and entry ID.

use tracing::{debug, warn};

use tessera_contracts::{
    block::{AuditChainBlock, GENESIS_HASH, SEQUENCE_START_HASH},
    entry::EntryId,
    verify::{IntegrityViolation, VerificationReport, ViolationKind},
};

use crate::{
    hashing::{compute_block_hash, compute_entry_hash, verify_auth_tag, ChainKey},
    merkle,
};

pub struct ChainVerifier {
    key: ChainKey,
}

impl ChainVerifier {
    pub fn new(key: ChainKey) -> Self {
        Self { key }
    }

    /// Verify `blocks`, which must be the whole chain ordered by height.
    ///
    /// An empty slice is trivially valid.
    pub fn verify(&self, blocks: &[AuditChainBlock]) -> VerificationReport {
        let mut report = VerificationReport {
            blocks_checked: blocks.len(),
            ..VerificationReport::default()
        };
        let mut expected_previous = GENESIS_HASH.to_string();

        for (index, block) in blocks.iter().enumerate() {
            let mut found: Vec<(Option<EntryId>, ViolationKind)> = Vec::new();

            if block.height != index as u64 {
                found.push((None, ViolationKind::HeightGap));
            }
            if block.previous_hash != expected_previous {
                found.push((None, ViolationKind::BrokenBlockLink));
            }

            let leaves: Vec<&str> = block.entries.iter().map(|e| e.entry_hash()).collect();
            if merkle::compute_root(&leaves) != block.merkle_root {
                found.push((None, ViolationKind::MerkleRootMismatch));
            }

            let recomputed_hash =
                compute_block_hash(block.height, &block.previous_hash, &block.merkle_root, &block.timestamp);
            if recomputed_hash != block.hash {
                found.push((None, ViolationKind::BlockHashMismatch));
            }

            let mut expected_entry_previous = SEQUENCE_START_HASH.to_string();
            for entry in &block.entries {
                report.entries_checked += 1;
                let id = || Some(entry.id().clone());

                if !verify_auth_tag(&self.key, &entry.entry) {
                    found.push((id(), ViolationKind::AuthTagMismatch));
                }

                let recomputed_entry_hash =
                    compute_entry_hash(&entry.entry.auth_tag, &entry.previous_entry_hash);
                if recomputed_entry_hash != entry.entry.entry_hash {
                    found.push((id(), ViolationKind::EntryHashMismatch));
                }
                if entry.previous_entry_hash != expected_entry_previous {
                    found.push((id(), ViolationKind::BrokenEntryLink));
                }
                if entry.block_height != Some(block.height) || entry.block_hash.as_deref() != Some(block.hash.as_str()) {
                    found.push((id(), ViolationKind::BlockStampMismatch));
                }

                expected_entry_previous = recomputed_entry_hash;
            }

            if found.is_empty() {
                debug!(height = block.height, entries = block.entries.len(), "block verified");
            } else {
                report.invalid_block_heights.push(block.height);
                for (entry_id, kind) in found {
                    warn!(
                        height = block.height,
                        entry_id = %entry_id.as_ref().map(ToString::to_string).unwrap_or_default(),
                        violation = %kind,
                        "audit chain integrity violation"
                    );
                    if let Some(entry_id) = &entry_id {
                        if !report.invalid_entry_ids.contains(entry_id) {
                            report.invalid_entry_ids.push(entry_id.clone());
                        }
                    }
                    report.violations.push(IntegrityViolation {
                        block_height: block.height,
                        entry_id,
                        kind,
                    });
                }
            }

            expected_previous = recomputed_hash;
        }

        report.invalid_block_heights.sort_unstable();
        report.invalid_block_heights.dedup();
        report.is_valid = report.violations.is_empty();
        report
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tessera_contracts::entry::{EnhancedAuditLogEntry, EntryFields, MetadataValue};

    use super::*;
    use crate::{recorder::EntryRecorder, sealer::ChainBlockSealer};

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn key() -> ChainKey {
        ChainKey::from_bytes(b"verifier-key".to_vec()).unwrap()
    }

    fn entries(recorder: &EntryRecorder, count: usize) -> Vec<EnhancedAuditLogEntry> {
        let mut prev = SEQUENCE_START_HASH.to_string();
        (0..count)
            .map(|i| {
                let entry = recorder
                    .build(
                        EntryFields::new("data_read", "read", "success")
                            .user(format!("user-{i}"))
                            .meta("seq", i as i64),
                        &prev,
                    )
                    .unwrap();
                prev = entry.entry_hash().to_string();
                entry
            })
            .collect()
    }

    /// Genesis plus `blocks` sealed blocks of `per_block` entries each.
    fn make_chain(blocks: usize, per_block: usize) -> Vec<AuditChainBlock> {
        let recorder = EntryRecorder::new(key(), 256);
        let mut chain = vec![ChainBlockSealer::genesis(Utc::now())];
        for height in 1..=blocks as u64 {
            let prev = chain.last().unwrap().hash.clone();
            chain.push(ChainBlockSealer::assemble(height, &prev, entries(&recorder, per_block), Utc::now()));
        }
        chain
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[test]
    fn untouched_chain_is_valid() {
        let chain = make_chain(3, 4);
        let report = ChainVerifier::new(key()).verify(&chain);
        assert!(report.is_valid);
        assert!(report.invalid_block_heights.is_empty());
        assert!(report.invalid_entry_ids.is_empty());
        assert_eq!(report.blocks_checked, 4);
        assert_eq!(report.entries_checked, 12);
    }

    #[test]
    fn empty_chain_is_valid() {
        assert!(ChainVerifier::new(key()).verify(&[]).is_valid);
    }

    #[test]
    fn edited_entry_field_flags_only_that_entry() {
        let mut chain = make_chain(2, 3);
        chain[1].entries[1].entry.result = "failure".to_string();
        let target = chain[1].entries[1].id().clone();

        let report = ChainVerifier::new(key()).verify(&chain);
        assert!(!report.is_valid);
        assert_eq!(report.invalid_block_heights, vec![1]);
        assert_eq!(report.invalid_entry_ids, vec![target]);
    }

    #[test]
    fn edited_metadata_is_detected() {
        let mut chain = make_chain(1, 2);
        chain[1].entries[0]
            .entry
            .metadata
            .insert("seq".to_string(), MetadataValue::Integer(99));
        let report = ChainVerifier::new(key()).verify(&chain);
        assert_eq!(report.invalid_block_heights, vec![1]);
        assert_eq!(report.invalid_entry_ids, vec![chain[1].entries[0].id().clone()]);
    }

    #[test]
    fn removed_entry_breaks_merkle_root_and_linkage() {
        let mut chain = make_chain(1, 3);
        chain[1].entries.remove(1);
        let report = ChainVerifier::new(key()).verify(&chain);
        assert_eq!(report.invalid_block_heights, vec![1]);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::MerkleRootMismatch));
        assert!(report.violations.iter().any(|v| v.kind == ViolationKind::BrokenEntryLink));
    }

    /// Rewriting a block's timestamp invalidates its hash and, through the
    /// recomputed-hash linkage rule, the link from the next block.
    #[test]
    fn forged_block_header_breaks_next_link() {
        let mut chain = make_chain(3, 1);
        chain[1].timestamp = chain[1].timestamp + chrono::Duration::seconds(1);
        let report = ChainVerifier::new(key()).verify(&chain);
        assert_eq!(report.invalid_block_heights, vec![1, 2]);
        assert!(report.invalid_entry_ids.is_empty());
    }

    /// Rewriting both the stored hash and the header still breaks the link.
    #[test]
    fn recomputed_hash_is_used_for_linkage() {
        let mut chain = make_chain(2, 1);
        chain[1].timestamp = chain[1].timestamp + chrono::Duration::seconds(1);
        chain[1].hash = "f".repeat(64);
        let report = ChainVerifier::new(key()).verify(&chain);
        assert!(report.invalid_block_heights.contains(&2));
    }

    #[test]
    fn genesis_must_link_to_zero_hash() {
        let mut chain = make_chain(1, 1);
        chain[0].previous_hash = "1".repeat(64);
        let report = ChainVerifier::new(key()).verify(&chain);
        assert!(report.invalid_block_heights.contains(&0));
    }

    #[test]
    fn height_gap_is_reported() {
        let mut chain = make_chain(3, 1);
        chain.remove(2);
        let report = ChainVerifier::new(key()).verify(&chain);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::HeightGap && v.block_height == 3));
    }

    #[test]
    fn wrong_key_fails_every_entry() {
        let chain = make_chain(2, 3);
        let other = ChainKey::from_bytes(b"another-key".to_vec()).unwrap();
        let report = ChainVerifier::new(other).verify(&chain);

        assert_eq!(report.invalid_block_heights, vec![1, 2]);
        assert_eq!(report.invalid_entry_ids.len(), 6);
        assert!(report
            .violations
            .iter()
            .all(|v| v.kind == ViolationKind::AuthTagMismatch));
    }

    #[test]
    fn stamp_mismatch_is_reported() {
        let mut chain = make_chain(1, 2);
        chain[1].entries[0].block_height = Some(7);
        let report = ChainVerifier::new(key()).verify(&chain);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::BlockStampMismatch));
    }
}
