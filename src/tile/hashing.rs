//! RFC 6962 Leaf/Node Hashing and Merkle Tree Hash (MTH)
//!
//! Pure functions operating on 32-byte SHA-256 digests. `mth_from_leaf_hashes`
//! is the same recursive split used both by the tile-backed incremental root
//! path and by the statement-row-backed audit/recomputation path
//! (`crate::tile::TileLog::root_at` vs. `mth_from_statement_hashes`) — both
//! must agree for any tree size, which holds by construction since they call
//! the same function over the same logical sequence.

use sha2::{Digest, Sha256};

/// RFC 6962 leaf hash: `SHA-256(0x00 ‖ statement_hash_bytes)`.
pub fn leaf_hash(statement_hash_bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0x00]);
    hasher.update(statement_hash_bytes);
    hasher.finalize().into()
}

/// RFC 6962 node hash: `SHA-256(0x01 ‖ left ‖ right)`.
pub fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0x01]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// The empty tree's root: `SHA-256("")`.
pub fn empty_root() -> [u8; 32] {
    Sha256::digest([]).into()
}

/// Largest power of two strictly less than `n` (requires `n >= 2`).
pub fn largest_power_of_two_lt(n: usize) -> usize {
    let mut k = 1;
    while k * 2 < n {
        k *= 2;
    }
    k
}

/// `MTH(D[0:n])` over a slice of already leaf-hashed entries.
pub fn mth_from_leaf_hashes(leaves: &[[u8; 32]]) -> [u8; 32] {
    match leaves.len() {
        0 => empty_root(),
        1 => leaves[0],
        n => {
            let k = largest_power_of_two_lt(n);
            node_hash(
                &mth_from_leaf_hashes(&leaves[..k]),
                &mth_from_leaf_hashes(&leaves[k..]),
            )
        }
    }
}

/// `MTH(D[0:n])` over raw statement-hash bytes (the audit/recomputation
/// path): each entry is leaf-hashed first, then combined identically to
/// [`mth_from_leaf_hashes`].
pub fn mth_from_statement_hashes(statement_hashes: &[Vec<u8>]) -> [u8; 32] {
    let leaves: Vec<[u8; 32]> = statement_hashes.iter().map(|d| leaf_hash(d)).collect();
    mth_from_leaf_hashes(&leaves)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree_root_is_sha256_empty_string() {
        assert_eq!(empty_root(), Sha256::digest([]).as_slice());
    }

    #[test]
    fn test_single_leaf_matches_leaf_hash() {
        let d = b"hello".to_vec();
        let single = mth_from_statement_hashes(&[d.clone()]);
        assert_eq!(single, leaf_hash(&d));
    }

    #[test]
    fn test_largest_power_of_two_lt() {
        assert_eq!(largest_power_of_two_lt(2), 1);
        assert_eq!(largest_power_of_two_lt(3), 2);
        assert_eq!(largest_power_of_two_lt(4), 2);
        assert_eq!(largest_power_of_two_lt(5), 4);
        assert_eq!(largest_power_of_two_lt(8), 4);
        assert_eq!(largest_power_of_two_lt(9), 8);
    }

    #[test]
    fn test_two_leaves_is_single_node_hash() {
        let a = b"a".to_vec();
        let b = b"b".to_vec();
        let root = mth_from_statement_hashes(&[a.clone(), b.clone()]);
        let expected = node_hash(&leaf_hash(&a), &leaf_hash(&b));
        assert_eq!(root, expected);
    }

    #[test]
    fn test_mth_deterministic_and_order_sensitive() {
        let a = b"a".to_vec();
        let b = b"b".to_vec();
        let forward = mth_from_statement_hashes(&[a.clone(), b.clone()]);
        let backward = mth_from_statement_hashes(&[b, a]);
        assert_ne!(forward, backward);
    }
}
