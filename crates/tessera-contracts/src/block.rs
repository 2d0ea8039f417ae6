//! Chain block types and chain-wide constants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::EnhancedAuditLogEntry;

/// The `previous_hash` of the genesis block.
///
/// 64 hex zeros, a value that is never the SHA-256 of real data.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// The `previous_entry_hash` of the first entry in every pending sequence.
pub const SEQUENCE_START_HASH: &str = GENESIS_HASH;

/// The Merkle root of an empty leaf set: SHA-256 of the empty string.
pub const EMPTY_MERKLE_ROOT: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// A sealed, immutable block of audit entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditChainBlock {
    /// Position in the chain; the genesis block is height 0.
    pub height: u64,

    /// SHA-256 (hex) over (height, previous_hash, merkle_root, timestamp).
    pub hash: String,

    /// `hash` of the block at `height - 1`, or `GENESIS_HASH` at height 0.
    pub previous_hash: String,

    /// Wall-clock time (UTC) the block was sealed.
    pub timestamp: DateTime<Utc>,

    /// Merkle root over the entries' `entry_hash` values, in order.
    pub merkle_root: String,

    /// Entries in insertion order, each stamped with this block's coordinates.
    pub entries: Vec<EnhancedAuditLogEntry>,
}

impl AuditChainBlock {
    pub fn head(&self) -> ChainHead {
        ChainHead {
            height: self.height,
            hash: self.hash.clone(),
        }
    }
}

/// The tip of the chain: height and hash of the most recently sealed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub height: u64,
    pub hash: String,
}
