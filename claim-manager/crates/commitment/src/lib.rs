//! Commitments over the ordered leaves of a claimed segment range.
//!
//! A claim commits to a contiguous range of segments through a single root. The index of a
//! leaf inside the commitment maps back to a sequence number (`range.start + index`), which
//! is why the leaves must be handed over in sequence order.

use alloy_primitives::{Bytes, B256};
use mockall::automock;
use thiserror::Error;

mod merkle;

pub use merkle::KeccakMerkleTree;

/// Upper bound on the number of leaves in a single commitment.
pub const MAX_LEAVES: usize = 1 << 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitmentError {
    #[error("Cannot build a commitment over an empty leaf set")]
    EmptyLeaves,

    #[error("Commitment over {0} leaves exceeds the maximum of {MAX_LEAVES}")]
    TooManyLeaves(usize),

    #[error("Commitment returned {actual} proofs for {expected} leaves")]
    ProofCountMismatch { expected: usize, actual: usize },
}

/// Sibling path from a leaf up to the commitment root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionProof {
    siblings: Vec<B256>,
}

impl InclusionProof {
    pub fn new(siblings: Vec<B256>) -> Self {
        Self { siblings }
    }

    pub fn siblings(&self) -> &[B256] {
        &self.siblings
    }

    /// On-chain encoding: the 32-byte siblings concatenated from the leaf upwards.
    pub fn to_bytes(&self) -> Bytes {
        self.siblings.iter().flat_map(|sibling| sibling.0).collect::<Vec<u8>>().into()
    }

    pub fn verify(&self, leaf: B256, root: B256) -> bool {
        self.siblings.iter().fold(leaf, |node, sibling| merkle::hash_pair(node, *sibling)) == root
    }
}

/// Root plus one proof per leaf, in leaf order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    pub root: B256,
    pub proofs: Vec<InclusionProof>,
}

/// Trait for the commitment primitive a claim is built with.
#[automock]
pub trait CommitmentBuilder: Send + Sync {
    /// Should return the root over `leaves` and one proof per leaf, in the same order.
    fn build_commitment(&self, leaves: &[B256]) -> Result<Commitment, CommitmentError>;
}
