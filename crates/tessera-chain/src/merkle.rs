//! Merkle root computation over ordered entry hashes.
//!
//! Bottom-up pairing: at each level every adjacent pair of node hashes is
//! combined as `SHA-256(left_hex ‖ right_hex)`.  An odd level duplicates its
//! last node to complete the final pair.  Verification uses this exact rule,
//! so it must never change for an existing chain.

use tessera_contracts::block::EMPTY_MERKLE_ROOT;

use crate::hashing::hash_pair;

/// Compute the Merkle root of `leaves`, in order.
///
/// - no leaves  → `EMPTY_MERKLE_ROOT`
/// - one leaf   → that leaf unchanged
/// - otherwise  → pairwise reduction as described in the module docs
pub fn compute_root<S: AsRef<str>>(leaves: &[S]) -> String {
    if leaves.is_empty() {
        return EMPTY_MERKLE_ROOT.to_string();
    }

    let mut level: Vec<String> = leaves.iter().map(|l| l.as_ref().to_string()).collect();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                hash_pair(left, right)
            })
            .collect();
    }

    level.swap_remove(0)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use sha2::{Digest, Sha256};

    use super::*;

    fn leaf(n: u8) -> String {
        hex::encode(Sha256::digest([n]))
    }

    #[test]
    fn empty_root_is_sha256_of_nothing() {
        let empty: [&str; 0] = [];
        assert_eq!(compute_root(&empty), EMPTY_MERKLE_ROOT);
        assert_eq!(EMPTY_MERKLE_ROOT, hex::encode(Sha256::digest(b"")));
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        assert_eq!(compute_root(&[leaf(1)]), leaf(1));
    }

    #[test]
    fn two_leaves_hash_as_a_pair() {
        assert_eq!(compute_root(&[leaf(1), leaf(2)]), hash_pair(&leaf(1), &leaf(2)));
    }

    /// An odd level duplicates its last node.
    #[test]
    fn odd_level_duplicates_last_node() {
        let left = hash_pair(&leaf(1), &leaf(2));
        let right = hash_pair(&leaf(3), &leaf(3));
        assert_eq!(compute_root(&[leaf(1), leaf(2), leaf(3)]), hash_pair(&left, &right));
    }

    #[test]
    fn root_is_deterministic() {
        let leaves: Vec<String> = (0..7).map(leaf).collect();
        assert_eq!(compute_root(&leaves), compute_root(&leaves));
    }

    proptest! {
        /// Swapping any two distinct leaves changes the root.
        #[test]
        fn reordering_leaves_changes_root(
            count in 2usize..24,
            a in 0usize..24,
            b in 0usize..24,
        ) {
            let a = a % count;
            let b = b % count;
            prop_assume!(a != b);

            let leaves: Vec<String> = (0..count as u8).map(leaf).collect();
            let mut swapped = leaves.clone();
            swapped.swap(a, b);

            prop_assert_ne!(compute_root(&leaves), compute_root(&swapped));
        }

        /// Any permutation other than the identity changes the root.
        #[test]
        fn shuffled_leaves_change_root(
            perm in Just((0u8..12).collect::<Vec<u8>>()).prop_shuffle(),
        ) {
            let original: Vec<String> = (0u8..12).map(leaf).collect();
            let shuffled: Vec<String> = perm.iter().map(|&n| leaf(n)).collect();
            prop_assume!(original != shuffled);
            prop_assert_ne!(compute_root(&original), compute_root(&shuffled));
        }
    }
}
