//! Block assembly.
//!
//! `ChainBlockSealer::assemble` is the pure half of sealing: given the next
//! height, the current head hash and a snapshot of pending entries, it
//! computes the Merkle root and block hash and stamps every entry.  Taking
//! the snapshot, persisting the block and advancing the head are done by
//! `AuditChain::seal_block` under the chain lock.

use chrono::{DateTime, Utc};

use tessera_contracts::{
    block::{AuditChainBlock, GENESIS_HASH},
    entry::EnhancedAuditLogEntry,
};

use crate::{hashing::compute_block_hash, merkle};

pub struct ChainBlockSealer;

impl ChainBlockSealer {
    /// Build the block at `height` on top of `previous_hash`.
    pub fn assemble(
        height: u64,
        previous_hash: &str,
        entries: Vec<EnhancedAuditLogEntry>,
        timestamp: DateTime<Utc>,
    ) -> AuditChainBlock {
        let leaves: Vec<&str> = entries.iter().map(|e| e.entry_hash()).collect();
        let merkle_root = merkle::compute_root(&leaves);
        let hash = compute_block_hash(height, previous_hash, &merkle_root, &timestamp);

        let entries = entries
            .into_iter()
            .map(|mut entry| {
                entry.block_hash = Some(hash.clone());
                entry.block_height = Some(height);
                entry
            })
            .collect();

        AuditChainBlock {
            height,
            hash,
            previous_hash: previous_hash.to_string(),
            timestamp,
            merkle_root,
            entries,
        }
    }

    /// The empty height-0 block every chain starts from.
    pub fn genesis(timestamp: DateTime<Utc>) -> AuditChainBlock {
        Self::assemble(0, GENESIS_HASH, Vec::new(), timestamp)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use tessera_contracts::{
        block::{EMPTY_MERKLE_ROOT, SEQUENCE_START_HASH},
        entry::EntryFields,
    };

    use super::*;
    use crate::{hashing::ChainKey, recorder::EntryRecorder};

    fn pending(count: usize) -> Vec<EnhancedAuditLogEntry> {
        let recorder = EntryRecorder::new(ChainKey::from_bytes(b"k".to_vec()).unwrap(), 256);
        let mut prev = SEQUENCE_START_HASH.to_string();
        let mut out = Vec::new();
        for i in 0..count {
            let entry = recorder
                .build(EntryFields::new("data_read", format!("read-{i}"), "success"), &prev)
                .unwrap();
            prev = entry.entry_hash().to_string();
            out.push(entry);
        }
        out
    }

    #[test]
    fn genesis_links_to_zero_hash_with_empty_root() {
        let genesis = ChainBlockSealer::genesis(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(genesis.height, 0);
        assert_eq!(genesis.previous_hash, GENESIS_HASH);
        assert_eq!(genesis.merkle_root, EMPTY_MERKLE_ROOT);
        assert!(genesis.entries.is_empty());
    }

    #[test]
    fn assemble_stamps_entries_and_keeps_order() {
        let entries = pending(3);
        let ids: Vec<_> = entries.iter().map(|e| e.id().clone()).collect();
        let block = ChainBlockSealer::assemble(1, GENESIS_HASH, entries, Utc::now());

        assert_eq!(block.entries.iter().map(|e| e.id().clone()).collect::<Vec<_>>(), ids);
        for entry in &block.entries {
            assert_eq!(entry.block_height, Some(1));
            assert_eq!(entry.block_hash.as_deref(), Some(block.hash.as_str()));
        }
        assert_eq!(
            block.hash,
            compute_block_hash(1, GENESIS_HASH, &block.merkle_root, &block.timestamp)
        );
    }

    #[test]
    fn single_entry_root_is_entry_hash() {
        let entries = pending(1);
        let expected = entries[0].entry_hash().to_string();
        let block = ChainBlockSealer::assemble(1, GENESIS_HASH, entries, Utc::now());
        assert_eq!(block.merkle_root, expected);
    }
}
