//! Chain verification report types.
//!
//! A verification pass never stops at the first mismatch.  Every violation
//! is collected so one report describes all the damage.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entry::EntryId;

/// What kind of mismatch a verification pass found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Block heights are not contiguous from 0.
    HeightGap,
    /// `previous_hash` does not match the prior block's recomputed hash.
    BrokenBlockLink,
    /// The stored block hash does not match its recomputed value.
    BlockHashMismatch,
    /// The stored Merkle root does not match the recomputed root.
    MerkleRootMismatch,
    /// The entry's authentication tag does not verify under the key.
    AuthTagMismatch,
    /// The stored entry hash does not match its recomputed value.
    EntryHashMismatch,
    /// `previous_entry_hash` does not match the prior entry's hash.
    BrokenEntryLink,
    /// The entry's stamped block height or hash disagrees with its block.
    BlockStampMismatch,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HeightGap => "height gap",
            Self::BrokenBlockLink => "broken block link",
            Self::BlockHashMismatch => "block hash mismatch",
            Self::MerkleRootMismatch => "merkle root mismatch",
            Self::AuthTagMismatch => "authentication tag mismatch",
            Self::EntryHashMismatch => "entry hash mismatch",
            Self::BrokenEntryLink => "broken entry link",
            Self::BlockStampMismatch => "block stamp mismatch",
        };
        f.write_str(s)
    }
}

/// A single detected integrity violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityViolation {
    /// Height of the block the violation was found in.
    pub block_height: u64,
    /// The offending entry, for entry-level violations.
    pub entry_id: Option<EntryId>,
    pub kind: ViolationKind,
}

/// The result of walking the whole chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// True only if no violation was found at any level.
    pub is_valid: bool,
    /// Heights of every block with at least one violation, ascending.
    pub invalid_block_heights: Vec<u64>,
    /// IDs of every entry with at least one violation, in chain order.
    pub invalid_entry_ids: Vec<EntryId>,
    /// Every individual violation, in the order found.
    pub violations: Vec<IntegrityViolation>,
    /// Number of blocks examined.
    pub blocks_checked: usize,
    /// Number of entries examined.
    pub entries_checked: usize,
}

impl VerificationReport {
    /// True if the block at `height` passed every check.
    pub fn is_block_valid(&self, height: u64) -> bool {
        !self.invalid_block_heights.contains(&height)
    }
}
