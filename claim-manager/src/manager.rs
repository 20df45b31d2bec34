use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy_primitives::{B256, U256};
use bytes::Bytes;
use claim_manager_commitment::{Commitment, CommitmentBuilder, CommitmentError};
use claim_manager_ledger_client_interface::{LedgerClient, LedgerClientError, SegmentRange};
use claim_manager_storage_client_interface::StorageClient;
use opentelemetry::KeyValue;
use tokio_util::task::TaskTracker;

use crate::config::{AssignmentParams, ClaimManagerParams};
use crate::error::{ClaimManagerError, ClaimResult};
use crate::metrics::CLAIM_MANAGER_METRICS;
use crate::profile::{Profile, ProfileSet};
use crate::segment::SegmentRecord;
use crate::state::{ClaimState, Receipt};
use crate::workflow::{ClaimWorkflow, CommittedBatch};

/// Outcome of a successful [`ClaimManager::run_claim_cycle`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimCycleReport {
    /// Ranges accepted on-chain during this cycle, in range order.
    pub committed: Vec<CommittedBatch>,
    /// Ranges left pending because their commitment could not be built.
    pub skipped: Vec<SegmentRange>,
}

/// Claims, audits and settles the transcoding work of one work assignment.
///
/// Receipt intake and the eligibility checks can be called from any task while a claim
/// cycle is in flight. Each accepted range gets its own audit and settlement task, tracked
/// so that [`ClaimManager::shutdown`] can drain them.
pub struct ClaimManager {
    ledger: Arc<dyn LedgerClient>,
    storage: Arc<dyn StorageClient>,
    commitments: Arc<dyn CommitmentBuilder>,
    assignment: AssignmentParams,
    profiles: ProfileSet,
    params: ClaimManagerParams,
    state: Mutex<ClaimState>,
    cycle_lock: tokio::sync::Mutex<()>,
    // Serializes closing and reopening the tracker.
    drain_lock: tokio::sync::Mutex<()>,
    shutting_down: AtomicBool,
    tasks: TaskTracker,
}

impl std::fmt::Debug for ClaimManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimManager")
            .field("assignment", &self.assignment)
            .field("profiles", &self.profiles)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ClaimManager {
    pub fn new(
        assignment: AssignmentParams,
        params: ClaimManagerParams,
        ledger: Arc<dyn LedgerClient>,
        storage: Arc<dyn StorageClient>,
        commitments: Arc<dyn CommitmentBuilder>,
    ) -> ClaimResult<Self> {
        let profiles = assignment.profile_set()?;
        Ok(Self {
            ledger,
            storage,
            commitments,
            assignment,
            profiles,
            params,
            state: Mutex::new(ClaimState::default()),
            cycle_lock: tokio::sync::Mutex::new(()),
            drain_lock: tokio::sync::Mutex::new(()),
            shutting_down: AtomicBool::new(false),
            tasks: TaskTracker::new(),
        })
    }

    // Never held across an await.
    fn state(&self) -> MutexGuard<'_, ClaimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the output hash of one profile for segment `seq_no` and bills the requester
    /// one segment price.
    pub fn add_receipt(
        &self,
        seq_no: u64,
        source_data: Bytes,
        output_hash: B256,
        broadcaster_signature: Bytes,
        profile: &Profile,
    ) -> ClaimResult<()> {
        let position = self.profiles.position(profile).ok_or_else(|| ClaimManagerError::UnknownProfile(profile.clone()))?;
        let receipt = Receipt { seq_no, source_data, output_hash, broadcaster_signature, profile, position };
        self.state().add_receipt(receipt, self.profiles.len(), self.assignment.price_per_segment)?;

        tracing::trace!(category = "receipt", seq_no, profile = %profile, "Receipt recorded.");
        Ok(())
    }

    /// Whether this worker may submit claims for the assignment right now.
    pub async fn can_claim(&self) -> ClaimResult<bool> {
        if !self.state().has_pending() {
            return Ok(false);
        }

        let assignment = self.ledger.get_work_assignment(self.assignment.assignment_id).await?;
        let height = self.ledger.current_height().await?;

        if assignment.is_bound() {
            return Ok(assignment.assignee == self.ledger.account_address());
        }
        Ok(height <= assignment.creation_block.saturating_add(self.params.first_claim_deadline_blocks))
    }

    /// Whether the requester's remaining deposit covers what was billed so far plus one more
    /// segment in every profile.
    pub async fn sufficient_deposit(&self) -> ClaimResult<bool> {
        let deposit = self.ledger.remaining_deposit(self.assignment.requester).await?;
        let accrued_cost = self.state().accrued_cost();

        let required = U256::from(self.profiles.len())
            .checked_mul(self.assignment.price_per_segment)
            .and_then(|round| round.checked_add(accrued_cost));
        Ok(required.is_some_and(|required| deposit >= required))
    }

    pub fn has_submitted_first_claim(&self) -> bool {
        self.state().accepted_batch_count() > 0
    }

    /// Commits every claimable range of pending segments.
    ///
    /// A range whose commitment cannot be built is skipped and stays pending. A ledger failure
    /// aborts the cycle; ranges accepted before it stay committed and are listed by
    /// [`ClaimManager::committed_batches`].
    ///
    /// Fails with [`ClaimManagerError::ShutDown`] once [`ClaimManager::shutdown`] was called.
    #[tracing::instrument(
        fields(category = "claim", assignment_id = %self.assignment.assignment_id),
        skip(self),
        err
    )]
    pub async fn run_claim_cycle(&self) -> ClaimResult<ClaimCycleReport> {
        let _cycle = self.cycle_lock.lock().await;
        if self.is_shutting_down() {
            return Err(ClaimManagerError::ShutDown);
        }

        let ranges = self.state().pending_ranges();
        let mut report = ClaimCycleReport::default();

        for range in ranges {
            // The batcher only hands out complete segments and completed segments stay complete.
            let leaves = self.state().prepare_leaves(&self.assignment.stream_id, range);
            let Some(leaves) = leaves else {
                tracing::warn!(category = "claim", range = %range, "Range has incomplete segments, skipping.");
                report.skipped.push(range);
                continue;
            };

            let commitment = match self.build_commitment(range, &leaves) {
                Ok(commitment) => commitment,
                Err(err) => {
                    tracing::warn!(
                        log_type = "failed",
                        category = "claim",
                        range = %range,
                        error = %err,
                        "Skipping range, it stays pending."
                    );
                    report.skipped.push(range);
                    continue;
                }
            };

            match self.commit_range(range, commitment).await {
                Ok(batch) => report.committed.push(batch),
                Err(err) => {
                    CLAIM_MANAGER_METRICS
                        .claim_failures
                        .add(1, &[KeyValue::new("retryable", err.is_retryable())]);
                    tracing::error!(
                        log_type = "failed",
                        category = "claim",
                        range = %range,
                        retryable = err.is_retryable(),
                        error = %err,
                        "Claim cycle aborted."
                    );
                    return Err(err);
                }
            }
        }

        Ok(report)
    }

    fn build_commitment(&self, range: SegmentRange, leaves: &[B256]) -> ClaimResult<Commitment> {
        let build_failed = |source| ClaimManagerError::CommitmentBuildFailed { range, source };

        let commitment = self.commitments.build_commitment(leaves).map_err(build_failed)?;
        if commitment.proofs.len() != leaves.len() {
            return Err(build_failed(CommitmentError::ProofCountMismatch {
                expected: leaves.len(),
                actual: commitment.proofs.len(),
            }));
        }
        Ok(commitment)
    }

    async fn commit_range(&self, range: SegmentRange, commitment: Commitment) -> ClaimResult<CommittedBatch> {
        let assignment_id = self.assignment.assignment_id;
        tracing::info!(
            log_type = "starting",
            category = "claim",
            range = %range,
            commitment_root = %commitment.root,
            "Submitting claim."
        );

        let tx_hash = self.ledger.submit_claim(assignment_id, range, commitment.root).await?;
        self.ledger.confirm(tx_hash).await?;

        let batch_index = self.state().accept_range(range, commitment.root, tx_hash, commitment.proofs);
        CLAIM_MANAGER_METRICS.claims_submitted.add(1, &[]);
        CLAIM_MANAGER_METRICS.segments_committed.add(range.segment_count(), &[]);

        let claim = self.ledger.get_claim_record(assignment_id, batch_index).await?;
        let (batch, candidates) = self
            .state()
            .record_claim(batch_index, claim)
            .ok_or(ClaimManagerError::LedgerQueryFailed(LedgerClientError::MissingData("committed batch")))?;

        self.tasks.spawn(
            ClaimWorkflow {
                ledger: Arc::clone(&self.ledger),
                storage: Arc::clone(&self.storage),
                assignment_id,
                rpc_timeout: self.params.rpc_timeout,
                range,
                claim,
                candidates,
            }
            .run(),
        );

        tracing::info!(
            log_type = "completed",
            category = "claim",
            range = %range,
            batch_index,
            claim_id = %claim.claim_id,
            claim_block = claim.claim_block,
            tx_hash = %tx_hash,
            "Claim accepted."
        );
        Ok(batch)
    }

    pub fn assignment(&self) -> &AssignmentParams {
        &self.assignment
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    pub fn accrued_cost(&self) -> U256 {
        self.state().accrued_cost()
    }

    pub fn accepted_batch_count(&self) -> u64 {
        self.state().accepted_batch_count()
    }

    pub fn pending_segments(&self) -> Vec<u64> {
        self.state().pending_segments()
    }

    pub fn segment(&self, seq_no: u64) -> Option<SegmentRecord> {
        self.state().segment(seq_no).cloned()
    }

    /// Every range accepted on-chain so far, including those of aborted cycles.
    pub fn committed_batches(&self) -> Vec<CommittedBatch> {
        self.state().committed().to_vec()
    }

    /// Audit and settlement tasks still in flight.
    pub fn outstanding_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for the audit and settlement tasks spawned so far. The manager keeps accepting
    /// work afterwards unless it is shutting down.
    pub async fn wait_for_outstanding_tasks(&self) {
        let _drain = self.drain_lock.lock().await;
        self.tasks.close();
        self.tasks.wait().await;
        if !self.is_shutting_down() {
            self.tasks.reopen();
        }
    }

    /// Refuses further claim cycles, lets a cycle in flight finish and waits for every audit
    /// and settlement task, including the ones that cycle spawns.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let _cycle = self.cycle_lock.lock().await;
        let _drain = self.drain_lock.lock().await;
        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!(category = "claim", "Claim manager drained.");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }
}
