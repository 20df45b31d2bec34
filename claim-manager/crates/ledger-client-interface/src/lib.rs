use std::fmt;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, TxHash, B256, U256};
use async_trait::async_trait;
use mockall::automock;

pub mod error;

pub use error::LedgerClientError;

pub type LedgerResult<T> = Result<T, LedgerClientError>;

/// Inclusive range of segment sequence numbers covered by one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentRange {
    pub start: u64,
    pub end: u64,
}

impl SegmentRange {
    pub fn single(seq_no: u64) -> Self {
        Self { start: seq_no, end: seq_no }
    }

    pub fn segment_count(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn contains(&self, seq_no: u64) -> bool {
        (self.start..=self.end).contains(&seq_no)
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<u64> {
        self.start..=self.end
    }
}

impl fmt::Display for SegmentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// On-chain view of a work assignment.
///
/// `assignee` stays [`Address::ZERO`] until a worker is bound to the assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkAssignment {
    pub assignee: Address,
    pub creation_block: u64,
}

impl WorkAssignment {
    pub fn is_bound(&self) -> bool {
        self.assignee != Address::ZERO
    }
}

/// Claim as recorded by the escrow contract once the claim transaction is mined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimRecord {
    pub claim_id: U256,
    pub claim_block: u64,
}

/// Payload of an audit transaction for a single segment of a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSubmission {
    pub assignment_id: U256,
    pub claim_id: U256,
    pub seq_no: u64,
    /// Content address of the disclosed source data.
    pub storage_address: String,
    pub source_data_hash: B256,
    pub commitment_leaf_hash: B256,
    pub broadcaster_signature: Bytes,
    /// Concatenated 32-byte merkle siblings.
    pub inclusion_proof: Bytes,
}

/// Trait every escrow ledger backend has to implement.
///
/// Implementations hand back confirmed state only: chain reorganisations are handled
/// below this interface.
#[automock]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Address of the worker account this client signs with.
    fn account_address(&self) -> Address;

    async fn get_work_assignment(&self, assignment_id: U256) -> LedgerResult<WorkAssignment>;

    /// Latest block number.
    async fn current_height(&self) -> LedgerResult<u64>;

    /// Deposit the requester still holds in escrow.
    async fn remaining_deposit(&self, requester: Address) -> LedgerResult<U256>;

    /// Should submit a claim for `range` committing to `commitment_root`.
    async fn submit_claim(&self, assignment_id: U256, range: SegmentRange, commitment_root: B256)
        -> LedgerResult<TxHash>;

    /// Should wait until `tx_hash` is mined and fail if it reverted or never landed.
    async fn confirm(&self, tx_hash: TxHash) -> LedgerResult<()>;

    /// Claim number `batch_index` (zero based) submitted by this worker for the assignment.
    async fn get_claim_record(&self, assignment_id: U256, batch_index: u64) -> LedgerResult<ClaimRecord>;

    /// One in `audit_rate` segments gets audited.
    async fn audit_rate(&self) -> LedgerResult<u64>;

    async fn submit_audit(&self, audit: AuditSubmission) -> LedgerResult<TxHash>;

    async fn verification_period_blocks(&self) -> LedgerResult<u64>;

    async fn slashing_period_blocks(&self) -> LedgerResult<u64>;

    /// Should release the escrowed fees of a claim.
    async fn settle(&self, assignment_id: U256, claim_id: U256) -> LedgerResult<TxHash>;

    /// Should block until `blocks` more blocks are mined. `rpc_timeout` bounds every
    /// individual poll, not the whole wait.
    async fn wait_for_blocks(&self, blocks: u64, rpc_timeout: Duration) -> LedgerResult<()>;

    async fn block_hash(&self, block_number: u64) -> LedgerResult<B256>;
}
