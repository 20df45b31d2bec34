use alloy_primitives::{keccak256, Keccak256, B256, U256};
use bytes::Bytes;
use claim_manager_commitment::InclusionProof;

/// Bookkeeping for one segment of the stream, created on its first receipt.
///
/// Output hashes are stored by canonical profile position (see
/// [`ProfileSet`](crate::profile::ProfileSet)). Records are never dropped: once committed,
/// their hashes and proof are what an audit discloses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    seq_no: u64,
    source_data: Bytes,
    source_data_hash: B256,
    output_hashes: Vec<Option<B256>>,
    broadcaster_signature: Bytes,
    commitment_leaf_hash: Option<B256>,
    inclusion_proof: Option<InclusionProof>,
}

impl SegmentRecord {
    pub(crate) fn new(seq_no: u64, source_data: Bytes, broadcaster_signature: Bytes, profile_count: usize) -> Self {
        let source_data_hash = keccak256(&source_data);
        Self {
            seq_no,
            source_data,
            source_data_hash,
            output_hashes: vec![None; profile_count],
            broadcaster_signature,
            commitment_leaf_hash: None,
            inclusion_proof: None,
        }
    }

    pub fn seq_no(&self) -> u64 {
        self.seq_no
    }

    pub fn source_data(&self) -> &Bytes {
        &self.source_data
    }

    pub fn source_data_hash(&self) -> B256 {
        self.source_data_hash
    }

    pub fn broadcaster_signature(&self) -> &Bytes {
        &self.broadcaster_signature
    }

    pub fn output_hash(&self, position: usize) -> Option<B256> {
        self.output_hashes.get(position).copied().flatten()
    }

    pub fn commitment_leaf_hash(&self) -> Option<B256> {
        self.commitment_leaf_hash
    }

    pub fn inclusion_proof(&self) -> Option<&InclusionProof> {
        self.inclusion_proof.as_ref()
    }

    /// True once every configured profile has an output hash.
    pub fn is_complete(&self) -> bool {
        self.output_hashes.iter().all(Option::is_some)
    }

    /// Returns false if the slot was already filled; the existing hash is left untouched.
    pub(crate) fn set_output_hash(&mut self, position: usize, hash: B256) -> bool {
        match self.output_hashes.get_mut(position) {
            Some(slot) if slot.is_none() => {
                *slot = Some(hash);
                true
            }
            _ => false,
        }
    }

    /// Hashes the output hashes in canonical profile order and stores the result.
    /// `None` while the segment is incomplete.
    pub(crate) fn derive_commitment_leaf_hash(&mut self) -> Option<B256> {
        let mut hasher = Keccak256::new();
        for hash in &self.output_hashes {
            hasher.update((*hash)?);
        }
        let leaf = hasher.finalize();
        self.commitment_leaf_hash = Some(leaf);
        Some(leaf)
    }

    pub(crate) fn set_inclusion_proof(&mut self, proof: InclusionProof) {
        self.inclusion_proof = Some(proof);
    }
}

/// Leaf of the claim commitment for one segment.
///
/// Binds the stream, the sequence number, the source data and the transcoded outputs to the
/// requester's signature so that a proof for one leaf cannot be replayed for another segment.
pub fn transcode_receipt_hash(stream_id: &str, record: &SegmentRecord, commitment_leaf_hash: B256) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(stream_id.as_bytes());
    hasher.update(U256::from(record.seq_no).to_be_bytes::<32>());
    hasher.update(record.source_data_hash);
    hasher.update(commitment_leaf_hash);
    hasher.update(&record.broadcaster_signature);
    hasher.finalize()
}
