use alloy_primitives::{Keccak256, B256};

use crate::{Commitment, CommitmentBuilder, CommitmentError, InclusionProof, MAX_LEAVES};

/// Binary keccak merkle tree with sorted-pair hashing.
///
/// Pairs are ordered before hashing so that a verifier does not need the leaf index to walk
/// the proof. An odd node at the end of a level is paired with itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeccakMerkleTree;

pub(crate) fn hash_pair(a: B256, b: B256) -> B256 {
    let (left, right) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Keccak256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize()
}

impl CommitmentBuilder for KeccakMerkleTree {
    fn build_commitment(&self, leaves: &[B256]) -> Result<Commitment, CommitmentError> {
        if leaves.is_empty() {
            return Err(CommitmentError::EmptyLeaves);
        }
        if leaves.len() > MAX_LEAVES {
            return Err(CommitmentError::TooManyLeaves(leaves.len()));
        }

        let mut siblings: Vec<Vec<B256>> = vec![Vec::new(); leaves.len()];
        // positions[i] is the index of leaf i's ancestor in the current level
        let mut positions: Vec<usize> = (0..leaves.len()).collect();
        let mut level = leaves.to_vec();

        while level.len() > 1 {
            for (leaf, position) in positions.iter_mut().enumerate() {
                let sibling = level.get(*position ^ 1).copied().unwrap_or(level[*position]);
                siblings[leaf].push(sibling);
                *position /= 2;
            }

            level = level.chunks(2).map(|pair| hash_pair(pair[0], pair[pair.len() - 1])).collect();
        }

        Ok(Commitment { root: level[0], proofs: siblings.into_iter().map(InclusionProof::new).collect() })
    }
}
