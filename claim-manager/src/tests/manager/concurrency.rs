use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, TxHash, B256, U256};
use assert_matches::assert_matches;
use async_trait::async_trait;
use claim_manager_commitment::KeccakMerkleTree;
use claim_manager_ledger_client_interface::{
    AuditSubmission, ClaimRecord, LedgerClient, LedgerClientError, LedgerResult, MockLedgerClient, SegmentRange,
    WorkAssignment,
};
use claim_manager_storage_client_interface::MockStorageClient;
use tokio::sync::{oneshot, Notify};
use tokio::time::timeout;

use super::{claim_record, tx_hash_for};
use crate::error::ClaimManagerError;
use crate::tests::common::*;
use crate::ClaimManager;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Ledger that can hold the anchor block wait and the first confirmation until the test lets
/// them go. Everything else is answered by the inner mock.
struct GatedLedger {
    inner: MockLedgerClient,
    anchor_gate: Option<Arc<Notify>>,
    confirm_started: Arc<Notify>,
    confirm_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl GatedLedger {
    fn new(inner: MockLedgerClient) -> Self {
        Self { inner, anchor_gate: None, confirm_started: Arc::new(Notify::new()), confirm_gate: Mutex::new(None) }
    }

    fn hold_anchor(mut self, gate: &Arc<Notify>) -> Self {
        self.anchor_gate = Some(Arc::clone(gate));
        self
    }

    fn hold_first_confirm(self) -> (Self, oneshot::Sender<()>, Arc<Notify>) {
        let (release, gate) = oneshot::channel();
        *self.confirm_gate.lock().unwrap() = Some(gate);
        let started = Arc::clone(&self.confirm_started);
        (self, release, started)
    }
}

#[async_trait]
impl LedgerClient for GatedLedger {
    fn account_address(&self) -> Address {
        self.inner.account_address()
    }

    async fn get_work_assignment(&self, assignment_id: U256) -> LedgerResult<WorkAssignment> {
        self.inner.get_work_assignment(assignment_id).await
    }

    async fn current_height(&self) -> LedgerResult<u64> {
        self.inner.current_height().await
    }

    async fn remaining_deposit(&self, requester: Address) -> LedgerResult<U256> {
        self.inner.remaining_deposit(requester).await
    }

    async fn submit_claim(&self, assignment_id: U256, range: SegmentRange, root: B256) -> LedgerResult<TxHash> {
        self.inner.submit_claim(assignment_id, range, root).await
    }

    async fn confirm(&self, tx_hash: TxHash) -> LedgerResult<()> {
        let gate = self.confirm_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.confirm_started.notify_one();
            gate.await.map_err(|_| LedgerClientError::Rpc("confirmation gate dropped".into()))?;
        }
        self.inner.confirm(tx_hash).await
    }

    async fn get_claim_record(&self, assignment_id: U256, batch_index: u64) -> LedgerResult<ClaimRecord> {
        self.inner.get_claim_record(assignment_id, batch_index).await
    }

    async fn audit_rate(&self) -> LedgerResult<u64> {
        self.inner.audit_rate().await
    }

    async fn submit_audit(&self, audit: AuditSubmission) -> LedgerResult<TxHash> {
        self.inner.submit_audit(audit).await
    }

    async fn verification_period_blocks(&self) -> LedgerResult<u64> {
        self.inner.verification_period_blocks().await
    }

    async fn slashing_period_blocks(&self) -> LedgerResult<u64> {
        self.inner.slashing_period_blocks().await
    }

    async fn settle(&self, assignment_id: U256, claim_id: U256) -> LedgerResult<TxHash> {
        self.inner.settle(assignment_id, claim_id).await
    }

    async fn wait_for_blocks(&self, blocks: u64, rpc_timeout: Duration) -> LedgerResult<()> {
        if let Some(gate) = &self.anchor_gate {
            gate.notified().await;
        }
        self.inner.wait_for_blocks(blocks, rpc_timeout).await
    }

    async fn block_hash(&self, block_number: u64) -> LedgerResult<B256> {
        self.inner.block_hash(block_number).await
    }
}

fn gated_manager(ledger: GatedLedger) -> ClaimManager {
    ClaimManager::new(
        assignment_params(),
        manager_params(),
        Arc::new(ledger),
        Arc::new(MockStorageClient::new()),
        Arc::new(KeccakMerkleTree),
    )
    .unwrap()
}

/// Accepts claims, then lets every spawned workflow abandon its claim right after the anchor
/// wait.
fn claiming_ledger(claims: usize) -> MockLedgerClient {
    let mut ledger = MockLedgerClient::new();
    ledger.expect_submit_claim().times(claims).returning(|_, range, _| Ok(tx_hash_for(range)));
    ledger.expect_confirm().times(claims).returning(|_| Ok(()));
    ledger.expect_get_claim_record().times(claims).returning(|_, i| Ok(claim_record(i)));
    expect_idle_workflows(&mut ledger);
    ledger
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn claim_cycle_returns_while_its_workflow_is_still_waiting() {
    let anchor = Arc::new(Notify::new());
    let manager = gated_manager(GatedLedger::new(claiming_ledger(1)).hold_anchor(&anchor));
    add_complete_segment(&manager, 0);
    add_complete_segment(&manager, 1);

    let report = timeout(TEST_TIMEOUT, manager.run_claim_cycle()).await.unwrap().unwrap();
    assert_eq!(report.committed.len(), 1);
    assert_eq!(manager.outstanding_tasks(), 1);

    anchor.notify_one();
    timeout(TEST_TIMEOUT, manager.wait_for_outstanding_tasks()).await.unwrap();
    assert_eq!(manager.outstanding_tasks(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receipts_are_accepted_while_a_claim_awaits_confirmation() {
    let (ledger, release, confirm_started) = GatedLedger::new(claiming_ledger(1)).hold_first_confirm();
    let manager = Arc::new(gated_manager(ledger));
    add_complete_segment(&manager, 0);
    add_complete_segment(&manager, 1);

    let cycle = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.run_claim_cycle().await }
    });
    timeout(TEST_TIMEOUT, confirm_started.notified()).await.unwrap();

    add_complete_segment(&manager, 5);
    assert!(!manager.has_submitted_first_claim());
    assert_eq!(manager.pending_segments(), vec![0, 1, 5]);
    assert_eq!(manager.accrued_cost(), U256::from(6 * PRICE_PER_SEGMENT));

    release.send(()).unwrap();
    let report = timeout(TEST_TIMEOUT, cycle).await.unwrap().unwrap().unwrap();
    assert_eq!(report.committed[0].range, SegmentRange { start: 0, end: 1 });
    assert!(manager.has_submitted_first_claim());
    // Work added during the cycle waits for the next one.
    assert_eq!(manager.pending_segments(), vec![5]);

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_claim_cycles_submit_each_range_once() {
    let (ledger, release, confirm_started) = GatedLedger::new(claiming_ledger(1)).hold_first_confirm();
    let manager = gated_manager(ledger);
    add_complete_segment(&manager, 0);
    add_complete_segment(&manager, 1);

    let release_after_submission = async move {
        confirm_started.notified().await;
        release.send(()).unwrap();
    };
    let (first, second, ()) = timeout(TEST_TIMEOUT, async {
        tokio::join!(manager.run_claim_cycle(), manager.run_claim_cycle(), release_after_submission)
    })
    .await
    .unwrap();

    let committed: Vec<SegmentRange> =
        first.unwrap().committed.into_iter().chain(second.unwrap().committed).map(|batch| batch.range).collect();
    assert_eq!(committed, vec![SegmentRange { start: 0, end: 1 }]);
    assert_eq!(manager.accepted_batch_count(), 1);

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_lets_the_cycle_in_flight_finish_and_drains_its_workflow() {
    let (ledger, release, confirm_started) = GatedLedger::new(claiming_ledger(1)).hold_first_confirm();
    let manager = Arc::new(gated_manager(ledger));
    add_complete_segment(&manager, 0);

    let cycle = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.run_claim_cycle().await }
    });
    timeout(TEST_TIMEOUT, confirm_started.notified()).await.unwrap();

    let shutdown = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.shutdown().await }
    });
    while !manager.is_shutting_down() {
        tokio::task::yield_now().await;
    }
    release.send(()).unwrap();

    let report = timeout(TEST_TIMEOUT, cycle).await.unwrap().unwrap().unwrap();
    assert_eq!(report.committed.len(), 1);
    timeout(TEST_TIMEOUT, shutdown).await.unwrap().unwrap();
    assert_eq!(manager.outstanding_tasks(), 0);
}

#[tokio::test]
async fn claim_cycles_are_refused_after_shutdown() {
    let mut ledger = MockLedgerClient::new();
    ledger.expect_submit_claim().times(0);
    let manager = build_default_manager(ledger);
    add_complete_segment(&manager, 0);

    // A drain racing the shutdown must not reopen the manager.
    tokio::join!(manager.wait_for_outstanding_tasks(), manager.shutdown());

    assert_matches!(manager.run_claim_cycle().await, Err(ClaimManagerError::ShutDown));
    manager.wait_for_outstanding_tasks().await;
    assert_matches!(manager.run_claim_cycle().await, Err(ClaimManagerError::ShutDown));
    assert_eq!(manager.pending_segments(), vec![0]);
}
