//! Audit sampling of committed segments.
//!
//! The selection for a claim is seeded with the hash of the block right after the claim
//! block. That hash does not exist when the claim is submitted, so a worker cannot commit
//! only the segments it knows will escape an audit.

use alloy_primitives::{Keccak256, B256, U256};
use claim_manager_ledger_client_interface::SegmentRange;

/// `keccak(pad32(claim_block + 1) ‖ anchor_block_hash ‖ pad32(seq_no))` as a big-endian integer.
pub fn audit_seed(claim_block: u64, anchor_block_hash: B256, seq_no: u64) -> U256 {
    let mut hasher = Keccak256::new();
    hasher.update((U256::from(claim_block) + U256::from(1)).to_be_bytes::<32>());
    hasher.update(anchor_block_hash);
    hasher.update(U256::from(seq_no).to_be_bytes::<32>());
    U256::from_be_bytes(hasher.finalize().0)
}

/// Whether `seq_no` of the claim over `range` has to be audited.
///
/// A `verify_rate` of zero disables sampling.
pub fn should_audit_segment(
    seq_no: u64,
    range: SegmentRange,
    claim_block: u64,
    anchor_block_hash: B256,
    verify_rate: u64,
) -> bool {
    if !range.contains(seq_no) || verify_rate == 0 {
        return false;
    }
    (audit_seed(claim_block, anchor_block_hash, seq_no) % U256::from(verify_rate)).is_zero()
}

/// Every sequence number of `range` selected for audit, ascending.
pub fn select_segments(range: SegmentRange, claim_block: u64, anchor_block_hash: B256, verify_rate: u64) -> Vec<u64> {
    range.iter().filter(|&seq_no| should_audit_segment(seq_no, range, claim_block, anchor_block_hash, verify_rate)).collect()
}
