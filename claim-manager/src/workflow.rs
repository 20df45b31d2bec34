//! Post-commitment workflow of a single accepted claim: audit sampling, then settlement once
//! the dispute window is over.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{TxHash, B256, U256};
use bytes::Bytes;
use claim_manager_commitment::InclusionProof;
use claim_manager_ledger_client_interface::{AuditSubmission, ClaimRecord, LedgerClient, SegmentRange};
use claim_manager_storage_client_interface::StorageClient;
use opentelemetry::KeyValue;

use crate::error::ClaimResult;
use crate::metrics::CLAIM_MANAGER_METRICS;
use crate::sampler::should_audit_segment;

/// A range accepted on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBatch {
    /// Zero based index of the claim among this worker's claims for the assignment.
    pub batch_index: u64,
    pub range: SegmentRange,
    pub commitment_root: B256,
    pub tx_hash: TxHash,
    /// `None` until the claim record could be read back from the ledger.
    pub claim: Option<ClaimRecord>,
}

/// What an audit discloses about one committed segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuditCandidate {
    pub seq_no: u64,
    pub source_data: Bytes,
    pub source_data_hash: B256,
    pub commitment_leaf_hash: B256,
    pub broadcaster_signature: Bytes,
    pub inclusion_proof: InclusionProof,
}

pub(crate) struct ClaimWorkflow {
    pub ledger: Arc<dyn LedgerClient>,
    pub storage: Arc<dyn StorageClient>,
    pub assignment_id: U256,
    pub rpc_timeout: Duration,
    pub range: SegmentRange,
    pub claim: ClaimRecord,
    pub candidates: Vec<AuditCandidate>,
}

impl ClaimWorkflow {
    /// Audits the sampled segments and settles the claim. Failures end the workflow and are
    /// only logged. Without a readable anchor block the claim is abandoned unsettled.
    #[tracing::instrument(
        name = "claim_workflow",
        fields(category = "settlement", range = %self.range, claim_id = %self.claim.claim_id),
        skip(self)
    )]
    pub(crate) async fn run(self) {
        let anchor_block_hash = match self.anchor().await {
            Ok(hash) => hash,
            Err(err) => {
                CLAIM_MANAGER_METRICS.claims_abandoned.add(1, &[KeyValue::new("error_kind", error_kind(&err))]);
                tracing::error!(
                    log_type = "failed",
                    category = "audit",
                    error = %err,
                    "Cannot read the audit anchor block, abandoning claim."
                );
                return;
            }
        };

        if let Err(err) = self.audit(anchor_block_hash).await {
            tracing::error!(
                log_type = "failed",
                category = "audit",
                error = %err,
                "Audit sampling failed for claim."
            );
        }

        match self.settle().await {
            Ok(tx_hash) => {
                CLAIM_MANAGER_METRICS.settlements_completed.add(1, &[]);
                tracing::info!(
                    log_type = "completed",
                    category = "settlement",
                    tx_hash = %tx_hash,
                    "Claim settled."
                );
            }
            Err(err) => {
                CLAIM_MANAGER_METRICS.settlement_failures.add(1, &[]);
                tracing::error!(
                    log_type = "failed",
                    category = "settlement",
                    error = %err,
                    "Failed to settle claim."
                );
            }
        }
    }

    /// Waits for the block after the claim to be mined and returns its hash.
    #[tracing::instrument(fields(category = "audit"), skip(self), ret, err)]
    async fn anchor(&self) -> ClaimResult<B256> {
        self.ledger.wait_for_blocks(1, self.rpc_timeout).await?;
        let anchor_block = self.claim.claim_block.saturating_add(1);
        Ok(self.ledger.block_hash(anchor_block).await?)
    }

    /// Samples the range with the anchor block hash and audits every selected segment.
    /// Returns how many audits were confirmed.
    #[tracing::instrument(fields(category = "audit"), skip(self), ret, err)]
    async fn audit(&self, anchor_block_hash: B256) -> ClaimResult<usize> {
        let verify_rate = self.ledger.audit_rate().await?;

        let selected: Vec<&AuditCandidate> = self
            .candidates
            .iter()
            .filter(|candidate| {
                should_audit_segment(candidate.seq_no, self.range, self.claim.claim_block, anchor_block_hash, verify_rate)
            })
            .collect();
        tracing::debug!(
            verify_rate,
            selected = selected.len(),
            anchor_block_hash = %anchor_block_hash,
            "Sampled segments for audit."
        );

        let mut confirmed = 0;
        for candidate in selected {
            match self.audit_segment(candidate).await {
                Ok(tx_hash) => {
                    confirmed += 1;
                    CLAIM_MANAGER_METRICS.audits_submitted.add(1, &[]);
                    tracing::info!(
                        log_type = "completed",
                        category = "audit",
                        seq_no = candidate.seq_no,
                        tx_hash = %tx_hash,
                        "Segment audit confirmed."
                    );
                }
                Err(err) => {
                    CLAIM_MANAGER_METRICS
                        .audit_failures
                        .add(1, &[KeyValue::new("error_kind", error_kind(&err))]);
                    tracing::warn!(
                        log_type = "failed",
                        category = "audit",
                        seq_no = candidate.seq_no,
                        error = %err,
                        "Segment audit failed, continuing with the remaining segments."
                    );
                }
            }
        }

        Ok(confirmed)
    }

    async fn audit_segment(&self, candidate: &AuditCandidate) -> ClaimResult<TxHash> {
        tracing::info!(log_type = "starting", category = "audit", seq_no = candidate.seq_no, "Auditing segment.");
        let storage_address = self.storage.publish(candidate.source_data.clone()).await?;

        let tx_hash = self
            .ledger
            .submit_audit(AuditSubmission {
                assignment_id: self.assignment_id,
                claim_id: self.claim.claim_id,
                seq_no: candidate.seq_no,
                storage_address,
                source_data_hash: candidate.source_data_hash,
                commitment_leaf_hash: candidate.commitment_leaf_hash,
                broadcaster_signature: candidate.broadcaster_signature.clone().into(),
                inclusion_proof: candidate.inclusion_proof.to_bytes(),
            })
            .await?;
        self.ledger.confirm(tx_hash).await?;

        Ok(tx_hash)
    }

    /// Waits out the verification and slashing periods, then releases the claim's fees.
    #[tracing::instrument(fields(category = "settlement"), skip(self), ret, err)]
    async fn settle(&self) -> ClaimResult<TxHash> {
        let verification_period = self.ledger.verification_period_blocks().await?;
        let slashing_period = self.ledger.slashing_period_blocks().await?;
        let dispute_window = verification_period.saturating_add(slashing_period);

        tracing::info!(
            log_type = "starting",
            category = "settlement",
            dispute_window,
            "Waiting for the dispute window to elapse."
        );
        self.ledger.wait_for_blocks(dispute_window, self.rpc_timeout).await?;

        let tx_hash = self.ledger.settle(self.assignment_id, self.claim.claim_id).await?;
        self.ledger.confirm(tx_hash).await?;
        Ok(tx_hash)
    }
}

fn error_kind(err: &crate::error::ClaimManagerError) -> &'static str {
    use crate::error::ClaimManagerError::*;
    match err {
        StoragePublishFailed(_) => "storage",
        TransactionRejected(_) => "rejected",
        ConfirmationTimeout(_) => "timeout",
        _ => "ledger",
    }
}
