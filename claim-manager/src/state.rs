use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::{TxHash, B256, U256};
use bytes::Bytes;
use claim_manager_commitment::InclusionProof;
use claim_manager_ledger_client_interface::{ClaimRecord, SegmentRange};

use crate::batcher::make_ranges;
use crate::error::{ClaimManagerError, ClaimResult};
use crate::profile::Profile;
use crate::segment::{transcode_receipt_hash, SegmentRecord};
use crate::workflow::{AuditCandidate, CommittedBatch};

/// Mutable bookkeeping of a claim manager. Always accessed under the manager's state lock.
#[derive(Debug, Default)]
pub(crate) struct ClaimState {
    segments: BTreeMap<u64, SegmentRecord>,
    pending: BTreeSet<u64>,
    accrued_cost: U256,
    accepted_batch_count: u64,
    committed: Vec<CommittedBatch>,
}

/// One output of one segment, as reported by the transcoder.
pub(crate) struct Receipt<'a> {
    pub seq_no: u64,
    pub source_data: Bytes,
    pub output_hash: B256,
    pub broadcaster_signature: Bytes,
    pub profile: &'a Profile,
    /// Canonical position of `profile`.
    pub position: usize,
}

impl ClaimState {
    /// Nothing is mutated when the receipt is rejected.
    pub(crate) fn add_receipt(&mut self, receipt: Receipt<'_>, profile_count: usize, price: U256) -> ClaimResult<()> {
        let Receipt { seq_no, source_data, output_hash, broadcaster_signature, profile, position } = receipt;

        if self.segments.get(&seq_no).is_some_and(|record| record.output_hash(position).is_some()) {
            return Err(ClaimManagerError::DuplicateProfileReceipt { seq_no, profile: profile.clone() });
        }

        let record = self
            .segments
            .entry(seq_no)
            .or_insert_with(|| SegmentRecord::new(seq_no, source_data, broadcaster_signature, profile_count));
        if !record.set_output_hash(position, output_hash) {
            return Err(ClaimManagerError::DuplicateProfileReceipt { seq_no, profile: profile.clone() });
        }

        self.accrued_cost = self.accrued_cost.saturating_add(price);
        self.pending.insert(seq_no);
        Ok(())
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(crate) fn pending_segments(&self) -> Vec<u64> {
        self.pending.iter().copied().collect()
    }

    pub(crate) fn pending_ranges(&self) -> Vec<SegmentRange> {
        make_ranges(self.pending.iter().copied(), |seq_no| {
            self.segments.get(&seq_no).is_some_and(SegmentRecord::is_complete)
        })
    }

    /// Derives and stores the commitment leaf hash of every segment in `range` and returns
    /// the claim leaves in sequence order. `None` if a segment of the range is missing or
    /// incomplete.
    pub(crate) fn prepare_leaves(&mut self, stream_id: &str, range: SegmentRange) -> Option<Vec<B256>> {
        range
            .iter()
            .map(|seq_no| {
                let record = self.segments.get_mut(&seq_no)?;
                let leaf_hash = record.derive_commitment_leaf_hash()?;
                Some(transcode_receipt_hash(stream_id, record, leaf_hash))
            })
            .collect()
    }

    /// Marks `range` as accepted on-chain and stores the inclusion proofs of its segments.
    /// Returns the batch index of the claim.
    pub(crate) fn accept_range(
        &mut self,
        range: SegmentRange,
        commitment_root: B256,
        tx_hash: TxHash,
        proofs: Vec<InclusionProof>,
    ) -> u64 {
        for (seq_no, proof) in range.iter().zip(proofs) {
            self.pending.remove(&seq_no);
            if let Some(record) = self.segments.get_mut(&seq_no) {
                record.set_inclusion_proof(proof);
            }
        }

        let batch_index = self.accepted_batch_count;
        self.accepted_batch_count += 1;
        self.committed.push(CommittedBatch { batch_index, range, commitment_root, tx_hash, claim: None });
        batch_index
    }

    /// Attaches the ledger's claim record to an accepted batch and snapshots what its audits
    /// may need to disclose.
    pub(crate) fn record_claim(
        &mut self,
        batch_index: u64,
        claim: ClaimRecord,
    ) -> Option<(CommittedBatch, Vec<AuditCandidate>)> {
        let batch = self.committed.iter_mut().find(|batch| batch.batch_index == batch_index)?;
        batch.claim = Some(claim);
        let batch = batch.clone();

        let candidates = batch
            .range
            .iter()
            .filter_map(|seq_no| {
                let record = self.segments.get(&seq_no)?;
                Some(AuditCandidate {
                    seq_no,
                    source_data: record.source_data().clone(),
                    source_data_hash: record.source_data_hash(),
                    commitment_leaf_hash: record.commitment_leaf_hash()?,
                    broadcaster_signature: record.broadcaster_signature().clone(),
                    inclusion_proof: record.inclusion_proof()?.clone(),
                })
            })
            .collect();

        Some((batch, candidates))
    }

    pub(crate) fn segment(&self, seq_no: u64) -> Option<&SegmentRecord> {
        self.segments.get(&seq_no)
    }

    pub(crate) fn accrued_cost(&self) -> U256 {
        self.accrued_cost
    }

    pub(crate) fn accepted_batch_count(&self) -> u64 {
        self.accepted_batch_count
    }

    pub(crate) fn committed(&self) -> &[CommittedBatch] {
        &self.committed
    }
}
