//! Proof Engine
//!
//! RFC 6962 §2.1 inclusion (`PATH`) and consistency (`PROOF`) algorithms,
//! operating on an in-memory slice of leaf hashes. Construction and
//! verification are independent: verification never trusts a root it
//! hasn't recomputed itself.

use thiserror::Error;

use crate::tile::hashing::{largest_power_of_two_lt, mth_from_leaf_hashes, node_hash};

/// Proof engine errors.
#[derive(Debug, Error, PartialEq)]
pub enum ProofError {
    #[error("entry {entry_id} is not in a tree of size {tree_size}")]
    NotInTree { entry_id: u64, tree_size: u64 },

    #[error("old tree size {old_size} exceeds new tree size {new_size}")]
    SizesOutOfOrder { old_size: u64, new_size: u64 },

    #[error("malformed proof: {0}")]
    Malformed(String),
}

pub type ProofResult<T> = std::result::Result<T, ProofError>;

/// Construct the inclusion (audit) path for `entry_id` against the first
/// `leaves.len()` leaves, i.e. `PATH(entry_id, D[0:n])`.
pub fn inclusion_path(entry_id: u64, leaves: &[[u8; 32]]) -> ProofResult<Vec<[u8; 32]>> {
    let n = leaves.len() as u64;
    if entry_id >= n {
        return Err(ProofError::NotInTree {
            entry_id,
            tree_size: n,
        });
    }
    Ok(path_recursive(entry_id as usize, leaves))
}

fn path_recursive(m: usize, leaves: &[[u8; 32]]) -> Vec<[u8; 32]> {
    let n = leaves.len();
    if n <= 1 {
        return Vec::new();
    }
    let k = largest_power_of_two_lt(n);
    if m < k {
        let mut p = path_recursive(m, &leaves[..k]);
        p.push(mth_from_leaf_hashes(&leaves[k..]));
        p
    } else {
        let mut p = path_recursive(m - k, &leaves[k..]);
        p.push(mth_from_leaf_hashes(&leaves[..k]));
        p
    }
}

/// Verify an inclusion path: does `leaf_hash` at `entry_id`, combined with
/// `path`, reconstruct `root` for a tree of size `tree_size`?
pub fn verify_inclusion(
    entry_id: u64,
    tree_size: u64,
    leaf_hash: &[u8; 32],
    path: &[[u8; 32]],
    root: &[u8; 32],
) -> bool {
    if entry_id >= tree_size {
        return false;
    }
    reconstruct_inclusion(entry_id, tree_size, leaf_hash, path) == Some(*root)
}

fn reconstruct_inclusion(
    m: u64,
    n: u64,
    leaf_hash: &[u8; 32],
    path: &[[u8; 32]],
) -> Option<[u8; 32]> {
    fn go(m: u64, n: u64, leaf: [u8; 32], path: &[[u8; 32]]) -> Option<[u8; 32]> {
        if n == 1 {
            return if path.is_empty() { Some(leaf) } else { None };
        }
        let k = largest_power_of_two_lt(n as usize) as u64;
        let (sibling, rest) = path.split_last()?;
        if m < k {
            let left = go(m, k, leaf, rest)?;
            Some(node_hash(&left, sibling))
        } else {
            let right = go(m - k, n - k, leaf, rest)?;
            Some(node_hash(sibling, &right))
        }
    }
    go(m, n, *leaf_hash, path)
}

/// Construct the consistency proof `PROOF(old_size, D[0:new_size])`.
pub fn consistency_proof(
    old_size: u64,
    new_size: u64,
    leaves: &[[u8; 32]],
) -> ProofResult<Vec<[u8; 32]>> {
    if old_size > new_size {
        return Err(ProofError::SizesOutOfOrder { old_size, new_size });
    }
    if new_size as usize != leaves.len() {
        return Err(ProofError::Malformed(format!(
            "leaves length {} does not match new_size {new_size}",
            leaves.len()
        )));
    }
    if old_size == 0 || old_size == new_size {
        return Ok(Vec::new());
    }
    Ok(subproof(old_size as usize, leaves, true))
}

fn subproof(m: usize, leaves: &[[u8; 32]], complete: bool) -> Vec<[u8; 32]> {
    let n = leaves.len();
    if m == n {
        if complete {
            Vec::new()
        } else {
            vec![mth_from_leaf_hashes(leaves)]
        }
    } else {
        let k = largest_power_of_two_lt(n);
        if m <= k {
            let mut p = subproof(m, &leaves[..k], complete);
            p.push(mth_from_leaf_hashes(&leaves[k..]));
            p
        } else {
            let mut p = subproof(m - k, &leaves[k..], false);
            p.push(mth_from_leaf_hashes(&leaves[..k]));
            p
        }
    }
}

/// Verify a consistency proof between `old_root` (tree of size
/// `old_size`) and `new_root` (tree of size `new_size`).
pub fn verify_consistency(
    old_size: u64,
    new_size: u64,
    old_root: &[u8; 32],
    new_root: &[u8; 32],
    proof: &[[u8; 32]],
) -> bool {
    if old_size > new_size {
        return false;
    }
    if old_size == new_size {
        return proof.is_empty() && old_root == new_root;
    }
    if old_size == 0 {
        return proof.is_empty();
    }

    reconstruct_consistency(old_size as usize, new_size as usize, old_root, proof)
        .map(|(reconstructed_old, reconstructed_new)| {
            &reconstructed_old == old_root && &reconstructed_new == new_root
        })
        .unwrap_or(false)
}

/// Standard RFC 6962 consistency-proof reconstruction: walk the proof
/// front-to-back, tracking the old-tree hash (`fr`) and new-tree hash
/// (`sr`) at the bit position where the two trees' node paths diverge.
/// When `m` is a power of two, `old_root` is itself the seed (that
/// subtree's root is never re-derived by the proof); otherwise the
/// proof's first element is the seed.
fn reconstruct_consistency(
    m: usize,
    n: usize,
    old_root: &[u8; 32],
    proof: &[[u8; 32]],
) -> Option<([u8; 32], [u8; 32])> {
    if m == 0 {
        return None;
    }

    let mut iter = proof.iter().copied();
    let mut fn_ = m - 1;
    let mut sn = n - 1;
    while fn_ & 1 == 1 {
        fn_ >>= 1;
        sn >>= 1;
    }

    let is_power_of_two = m & (m - 1) == 0;
    let (mut fr, mut sr) = if is_power_of_two {
        (*old_root, *old_root)
    } else {
        let seed = iter.next()?;
        (seed, seed)
    };

    while fn_ > 0 {
        if fn_ & 1 == 1 || fn_ == sn {
            let c = iter.next()?;
            if fn_ & 1 == 1 {
                fr = node_hash(&c, &fr);
            }
            sr = node_hash(&c, &sr);
        }
        fn_ >>= 1;
        sn >>= 1;
    }

    while sn > 0 {
        let c = iter.next()?;
        sr = node_hash(&sr, &c);
        sn >>= 1;
    }

    if iter.next().is_some() {
        return None;
    }

    Some((fr, sr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::hashing::{leaf_hash, mth_from_leaf_hashes};

    fn leaves(n: usize) -> Vec<[u8; 32]> {
        (0..n)
            .map(|i| leaf_hash(format!("leaf-{i}").as_bytes()))
            .collect()
    }

    #[test]
    fn test_inclusion_proof_roundtrip_various_sizes() {
        for n in [1usize, 2, 3, 5, 8, 17, 37, 256, 257] {
            let data = leaves(n);
            let root = mth_from_leaf_hashes(&data);
            for m in 0..n {
                let path = inclusion_path(m as u64, &data).unwrap();
                assert!(
                    verify_inclusion(m as u64, n as u64, &data[m], &path, &root),
                    "failed for n={n} m={m}"
                );
            }
        }
    }

    #[test]
    fn test_inclusion_not_in_tree() {
        let data = leaves(5);
        assert_eq!(
            inclusion_path(5, &data),
            Err(ProofError::NotInTree {
                entry_id: 5,
                tree_size: 5
            })
        );
    }

    #[test]
    fn test_inclusion_tampered_path_fails() {
        let data = leaves(8);
        let root = mth_from_leaf_hashes(&data);
        let mut path = inclusion_path(3, &data).unwrap();
        path[0][0] ^= 0xFF;
        assert!(!verify_inclusion(3, 8, &data[3], &path, &root));
    }

    #[test]
    fn test_consistency_proof_between_sizes() {
        let data = leaves(37);
        for (m, n) in [(3usize, 7usize), (1, 8), (8, 8), (0, 5), (16, 37)] {
            let old_root = mth_from_leaf_hashes(&data[..m]);
            let new_root = mth_from_leaf_hashes(&data[..n]);
            let proof = consistency_proof(m as u64, n as u64, &data[..n]).unwrap();
            assert!(
                verify_consistency(m as u64, n as u64, &old_root, &new_root, &proof),
                "failed for m={m} n={n}"
            );
        }
    }

    #[test]
    fn test_consistency_sizes_out_of_order() {
        let data = leaves(5);
        assert_eq!(
            consistency_proof(4, 3, &data[..3]),
            Err(ProofError::SizesOutOfOrder {
                old_size: 4,
                new_size: 3
            })
        );
    }

    #[test]
    fn test_consistency_tampered_proof_fails() {
        let data = leaves(16);
        let old_root = mth_from_leaf_hashes(&data[..5]);
        let new_root = mth_from_leaf_hashes(&data[..16]);
        let mut proof = consistency_proof(5, 16, &data).unwrap();
        if let Some(first) = proof.first_mut() {
            first[0] ^= 0xFF;
        }
        assert!(!verify_consistency(5, 16, &old_root, &new_root, &proof));
    }
}
