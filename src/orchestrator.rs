// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transfer orchestration state machine.
//!
//! Drives each cross-chain transfer through
//! `Requested -> Admitted -> Locked -> ProofPending -> Verified ->
//! Authorized -> MintedUnlocked -> Completed`, with `Rejected` before funds
//! move and `Reverted` after. Admission consults the rate limiter and the
//! flash-loan detector; no destination-side mutation happens without quorum
//! authorization. Records are mutated single-writer per transfer id behind a
//! per-id lock, and no lock is held across a confirmation-poll suspend
//! point. The expiry sweeper terminates stuck transfers and guarantees the
//! source-side unlock on every revert.

use crate::adapter::AdapterRegistry;
use crate::config::OrchestratorConfig;
use crate::detector::{AnalyzeRequest, DetectedAttack, FlashLoanDetector};
use crate::error::{BridgeError, BridgeResult};
use crate::limiter::RateLimiter;
use crate::metrics::BridgeMetrics;
use crate::now_ms;
use crate::quorum::{AuthorizationClient, AuthorizationDecision};
use crate::storage::TransferStore;
use crate::types::{
    BridgeTransfer, TransferOutcome, TransferPhase, TransferRequest, TransferStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct BridgeOrchestrator {
    config: OrchestratorConfig,
    registry: Arc<AdapterRegistry>,
    limiter: Arc<RateLimiter>,
    detector: Arc<FlashLoanDetector>,
    quorum: Arc<dyn AuthorizationClient>,
    store: Arc<dyn TransferStore>,
    metrics: Arc<BridgeMetrics>,
    cancel: CancellationToken,
    /// Per-transfer mutation locks; execute and sweep serialize on these so
    /// a record only ever has one writer.
    transfer_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl BridgeOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<AdapterRegistry>,
        limiter: Arc<RateLimiter>,
        detector: Arc<FlashLoanDetector>,
        quorum: Arc<dyn AuthorizationClient>,
        store: Arc<dyn TransferStore>,
        metrics: Arc<BridgeMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            limiter,
            detector,
            quorum,
            store,
            metrics,
            cancel,
            transfer_locks: RwLock::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.transfer_locks.read().await.get(id) {
            return lock.clone();
        }
        let mut locks = self.transfer_locks.write().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load(&self, id: &str) -> BridgeResult<BridgeTransfer> {
        self.store
            .get(id)
            .await
            .map_err(|e| BridgeError::StorageError(e.to_string()))?
            .ok_or_else(|| BridgeError::TransferNotFound(id.to_string()))
    }

    async fn persist(&self, transfer: &BridgeTransfer) -> BridgeResult<()> {
        self.store
            .update(transfer)
            .await
            .map_err(|e| BridgeError::StorageError(e.to_string()))
    }

    /// Advance `transfer` and persist, counting the transition.
    async fn advance(
        &self,
        transfer: &mut BridgeTransfer,
        next: TransferPhase,
    ) -> BridgeResult<()> {
        transfer.transition(next)?;
        self.persist(transfer).await?;
        self.metrics
            .phase_transitions
            .with_label_values(&[next.as_label()])
            .inc();
        Ok(())
    }

    /// Accept a transfer request through the admission gates.
    ///
    /// Returns the new transfer id once the record is `Admitted`. A denial
    /// persists the record as `Rejected` and surfaces the specific reason:
    /// `RateLimited` and `AttackDetected` are distinguishable to the caller.
    pub async fn submit(&self, request: TransferRequest) -> BridgeResult<String> {
        self.metrics.transfers_requested.inc();
        request.validate()?;

        let source_adapter = self.registry.get(request.source_chain)?;
        let destination_adapter = self.registry.get(request.destination_chain)?;

        let source_validation = source_adapter.validate_address(&request.source_address);
        if !source_validation.valid {
            return Err(BridgeError::InvalidInput(format!(
                "source address {} is not valid on {}",
                request.source_address, request.source_chain
            )));
        }
        let destination_validation =
            destination_adapter.validate_address(&request.destination_address);
        if !destination_validation.valid {
            return Err(BridgeError::InvalidInput(format!(
                "destination address {} is not valid on {}",
                request.destination_address, request.destination_chain
            )));
        }

        let mut request = request;
        if let Some(normalized) = source_validation.normalized {
            request.source_address = normalized;
        }
        if let Some(normalized) = destination_validation.normalized {
            request.destination_address = normalized;
        }

        let mut transfer = BridgeTransfer::new(&request);
        self.store
            .create(&transfer)
            .await
            .map_err(|e| BridgeError::StorageError(e.to_string()))?;

        // Gate one: volume. Chain-scoped so per-route quotas hold.
        let rate = self
            .limiter
            .check_rate_limit(&request.source_address, Some(request.source_chain))
            .await;
        if rate.denied() {
            let reason = format!(
                "rate limited, retry after {}s",
                rate.retry_after_secs
            );
            self.reject(&mut transfer, &reason).await?;
            self.metrics
                .admission_denied
                .with_label_values(&["rate_limited"])
                .inc();
            return Err(BridgeError::RateLimited {
                retry_after_secs: rate.retry_after_secs,
            });
        }

        // Gate two: attack shape, against the block this transfer would
        // land in.
        let head = source_adapter
            .health_check()
            .await
            .latest_block
            .unwrap_or_default();
        let detection = self
            .detector
            .analyze_transfer(&AnalyzeRequest {
                source_address: request.source_address.clone(),
                amount: request.amount,
                block_number: head,
                tx_id: transfer.id.clone(),
            })
            .await;
        if detection.blocked() {
            let flags = detection.flags.clone();
            self.reject(&mut transfer, &format!("attack detected: {}", flags.join(",")))
                .await?;
            self.metrics
                .admission_denied
                .with_label_values(&["attack_detected"])
                .inc();
            if let Some(attack) = &detection.attack {
                if let Err(e) = self.store.append_attack(attack).await {
                    error!(
                        "[Orchestrator] failed to persist attack record for {}: {}",
                        transfer.id, e
                    );
                }
            }
            return Err(BridgeError::AttackDetected { flags });
        }

        self.advance(&mut transfer, TransferPhase::Admitted).await?;
        info!(
            "[Orchestrator] transfer {} admitted: {} {} -> {}",
            transfer.id, transfer.amount, transfer.source_chain, transfer.destination_chain
        );
        Ok(transfer.id)
    }

    async fn reject(&self, transfer: &mut BridgeTransfer, reason: &str) -> BridgeResult<()> {
        transfer.rejection_reason = Some(reason.to_string());
        transfer.transition(TransferPhase::Rejected)?;
        self.persist(transfer).await?;
        self.metrics.transfers_rejected.inc();
        warn!("[Orchestrator] transfer {} rejected: {}", transfer.id, reason);
        Ok(())
    }

    /// Drive an admitted transfer to a terminal phase.
    pub async fn execute(&self, id: &str) -> BridgeResult<TransferOutcome> {
        let lock = self.lock_for(id).await;

        // Lock the source-side funds.
        let (request, source_tx_hash) = {
            let _guard = lock.lock().await;
            let mut transfer = self.load(id).await?;
            if transfer.phase != TransferPhase::Admitted {
                return Err(BridgeError::IllegalTransferState(format!(
                    "transfer {id} is {}, expected Admitted",
                    transfer.phase
                )));
            }
            let request = transfer.request();
            let source = self.registry.get(transfer.source_chain)?;

            // Fees ride separately from principal; a failed estimate means
            // no funds have moved and the transfer is safe to discard.
            let fee = match source.estimate_fee(&request).await {
                Ok(estimate) => estimate.total_fee,
                Err(e) => {
                    self.reject(&mut transfer, &format!("fee estimation failed: {e}"))
                        .await?;
                    return Err(e);
                }
            };

            match source.submit_transfer(&request, id).await {
                Ok(result) => {
                    transfer.fee_paid = fee;
                    transfer.source_tx_hash = result.tx_hash.clone();
                    self.advance(&mut transfer, TransferPhase::Locked).await?;
                    self.advance(&mut transfer, TransferPhase::ProofPending)
                        .await?;
                    (request, result.tx_hash.unwrap_or_default())
                }
                Err(e) => {
                    // Nothing moved; safe to discard.
                    self.reject(&mut transfer, &format!("source lock failed: {e}"))
                        .await?;
                    return Err(e);
                }
            }
        };

        // Wait out the confirmation depth. No per-transfer lock is held
        // while suspended here; the sweep may terminate the transfer under
        // us, which the re-load detects.
        let proof = match self.await_source_finality(id, &lock, &source_tx_hash).await? {
            Some(proof) => proof,
            None => return Err(BridgeError::ExpiredTransfer(id.to_string())),
        };

        // Verify the inclusion proof against the source adapter.
        let source = self.registry.get(request.source_chain)?;
        let verdict = match source.verify_proof(&proof).await {
            Ok(verdict) => verdict,
            Err(e) => {
                // Malformed proof material cannot improve by retrying.
                self.revert(id, &lock, &format!("proof verification error: {e}"), TransferOutcome::Reverted)
                    .await?;
                return Err(BridgeError::ProofInvalid(e.to_string()));
            }
        };
        if !verdict.valid {
            let reason = verdict
                .reason
                .unwrap_or_else(|| "proof mismatch".to_string());
            self.revert(id, &lock, &reason, TransferOutcome::Reverted)
                .await?;
            return Err(BridgeError::ProofInvalid(reason));
        }
        {
            let _guard = lock.lock().await;
            let mut transfer = self.ensure_live(id).await?;
            transfer.proof = Some(proof);
            self.advance(&mut transfer, TransferPhase::Verified).await?;
        }

        // Quorum boundary: no adapter or detector decision alone mints.
        let transfer = self.load(id).await?;
        match self.quorum.request_authorization(&transfer).await {
            Ok(AuthorizationDecision::Approved) => {
                self.metrics
                    .quorum_requests
                    .with_label_values(&["approved"])
                    .inc();
                let _guard = lock.lock().await;
                let mut transfer = self.ensure_live(id).await?;
                self.advance(&mut transfer, TransferPhase::Authorized)
                    .await?;
            }
            Ok(AuthorizationDecision::Rejected(reason)) => {
                self.metrics
                    .quorum_requests
                    .with_label_values(&["rejected"])
                    .inc();
                self.revert(id, &lock, &format!("authorization denied: {reason}"), TransferOutcome::Reverted)
                    .await?;
                return Err(BridgeError::AuthorizationDenied(reason));
            }
            Err(e) => {
                self.metrics
                    .quorum_requests
                    .with_label_values(&["error"])
                    .inc();
                self.revert(id, &lock, &format!("authorization failed: {e}"), TransferOutcome::Reverted)
                    .await?;
                return Err(e);
            }
        }

        // Destination-side mint or unlock.
        let destination = self.registry.get(request.destination_chain)?;
        let destination_key = format!("{id}:dest");
        match destination.submit_transfer(&request, &destination_key).await {
            Ok(result) => {
                let _guard = lock.lock().await;
                let mut transfer = self.ensure_live(id).await?;
                transfer.destination_tx_hash = result.tx_hash;
                self.advance(&mut transfer, TransferPhase::MintedUnlocked)
                    .await?;
                transfer.outcome = Some(TransferOutcome::Completed);
                self.advance(&mut transfer, TransferPhase::Completed).await?;
                self.metrics.transfers_completed.inc();
                info!(
                    "[Orchestrator] transfer {} completed ({})",
                    id, transfer.action
                );
            }
            Err(e) => {
                // Funds are locked on the source side; only the revert path
                // may terminate this transfer.
                self.revert(id, &lock, &format!("destination submission failed: {e}"), TransferOutcome::Reverted)
                    .await?;
                return Err(e);
            }
        }

        // Feed the completed transfer back into the heuristics.
        self.record_completion(id).await;
        Ok(TransferOutcome::Completed)
    }

    /// Poll the source chain until the configured confirmation depth is
    /// reached, then fetch the inclusion proof. Returns `None` when the
    /// transfer was terminated (swept or failed) while waiting.
    async fn await_source_finality(
        &self,
        id: &str,
        lock: &Arc<Mutex<()>>,
        source_tx_hash: &str,
    ) -> BridgeResult<Option<crate::types::ProofVerificationRequest>> {
        let poll_interval = Duration::from_millis(self.config.confirmation_poll_interval_ms);
        let source_chain = {
            let transfer = self.load(id).await?;
            transfer.source_chain
        };
        let source = self.registry.get(source_chain)?;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            // The sweep may have expired the transfer while we slept.
            let current = self.load(id).await?;
            if current.is_terminal() {
                return Ok(None);
            }
            if self.expired(&current) {
                self.revert(id, lock, "transfer expired awaiting finality", TransferOutcome::Expired)
                    .await?;
                return Ok(None);
            }

            match source.get_transfer_status(source_tx_hash).await {
                Ok(TransferStatus::Finalized) => break,
                Ok(TransferStatus::Confirmed { confirmations }) => {
                    let _guard = lock.lock().await;
                    if let Ok(mut transfer) = self.ensure_live(id).await {
                        transfer.confirmations = confirmations;
                        self.persist(&transfer).await?;
                    }
                }
                Ok(TransferStatus::Pending) => {}
                Ok(TransferStatus::Failed) => {
                    // The lock transaction itself reverted on-chain: nothing
                    // is held, so nothing needs releasing.
                    let _guard = lock.lock().await;
                    let mut transfer = self.ensure_live(id).await?;
                    transfer.source_released = true;
                    transfer.outcome = Some(TransferOutcome::Reverted);
                    transfer.rejection_reason =
                        Some("source transaction failed on-chain".to_string());
                    self.advance(&mut transfer, TransferPhase::Reverted).await?;
                    self.metrics.transfers_reverted.inc();
                    return Err(BridgeError::SourceTxFailed(source_tx_hash.to_string()));
                }
                Err(e) if e.is_retryable() => {
                    // The adapter already exhausted its own retry budget;
                    // transfer-level patience is bounded by the expiry sweep.
                    warn!(
                        "[Orchestrator] status poll for {} failed transiently: {}",
                        id, e
                    );
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(poll_interval).await;
        }

        // Finalized: capture the inclusion proof. Transient fetch failures
        // poll like confirmations do.
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let current = self.load(id).await?;
            if current.is_terminal() {
                return Ok(None);
            }
            if self.expired(&current) {
                self.revert(id, lock, "transfer expired awaiting proof", TransferOutcome::Expired)
                    .await?;
                return Ok(None);
            }
            match source.fetch_inclusion_proof(source_tx_hash).await {
                Ok(proof) => return Ok(Some(proof)),
                Err(e) if e.is_retryable() => {
                    warn!(
                        "[Orchestrator] proof fetch for {} failed transiently: {}",
                        id, e
                    );
                    tokio::time::sleep(poll_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn expired(&self, transfer: &BridgeTransfer) -> bool {
        let expiry_ms = self.config.transfer_expiry_secs * 1_000;
        now_ms().saturating_sub(transfer.created_at_ms) > expiry_ms
    }

    async fn ensure_live(&self, id: &str) -> BridgeResult<BridgeTransfer> {
        let transfer = self.load(id).await?;
        if transfer.is_terminal() {
            return Err(BridgeError::ExpiredTransfer(id.to_string()));
        }
        Ok(transfer)
    }

    /// Terminate a transfer through the revert path. Releases the
    /// source-side lock exactly once before the phase flips; if the release
    /// fails the transfer stays non-terminal so the sweep retries it.
    async fn revert(
        &self,
        id: &str,
        lock: &Arc<Mutex<()>>,
        reason: &str,
        outcome: TransferOutcome,
    ) -> BridgeResult<()> {
        let _guard = lock.lock().await;
        let mut transfer = self.load(id).await?;
        if transfer.is_terminal() {
            return Ok(());
        }

        let funds_locked = transfer.source_tx_hash.is_some()
            && transfer.phase != TransferPhase::Requested
            && transfer.phase != TransferPhase::Admitted;
        if funds_locked && !transfer.source_released {
            let source = self.registry.get(transfer.source_chain)?;
            let release_key = format!("{id}:unlock");
            source.release_lock(&transfer, &release_key).await?;
            transfer.source_released = true;
            self.metrics.source_unlocks_issued.inc();
            info!("[Orchestrator] source lock released for {}", id);
        }

        transfer.outcome = Some(outcome);
        transfer.rejection_reason = Some(reason.to_string());
        self.advance(&mut transfer, TransferPhase::Reverted).await?;
        self.metrics.transfers_reverted.inc();
        warn!("[Orchestrator] transfer {} reverted: {}", id, reason);
        Ok(())
    }

    async fn record_completion(&self, id: &str) {
        let Ok(transfer) = self.load(id).await else {
            return;
        };
        let source_block = match self.registry.get(transfer.source_chain) {
            Ok(adapter) => adapter.health_check().await.latest_block.unwrap_or_default(),
            Err(_) => 0,
        };
        let destination_block = match self.registry.get(transfer.destination_chain) {
            Ok(adapter) => adapter.health_check().await.latest_block.unwrap_or_default(),
            Err(_) => 0,
        };
        self.detector
            .record_withdrawal(
                &transfer.source_address,
                transfer.amount,
                source_block,
                transfer.source_tx_hash.as_deref().unwrap_or(&transfer.id),
            )
            .await;
        self.detector
            .record_deposit(
                &transfer.destination_address,
                transfer.amount,
                destination_block,
                transfer
                    .destination_tx_hash
                    .as_deref()
                    .unwrap_or(&transfer.id),
            )
            .await;
    }

    /// Cancel a transfer before any funds are locked. Later cancellation
    /// must go through the revert path so the source-side unlock executes.
    pub async fn cancel(&self, id: &str) -> BridgeResult<()> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;
        let mut transfer = self.load(id).await?;
        match transfer.phase {
            TransferPhase::Requested | TransferPhase::Admitted => {
                self.reject(&mut transfer, "cancelled by caller").await
            }
            phase => Err(BridgeError::IllegalTransferState(format!(
                "transfer {id} is {phase}; cancellation after lock goes through the revert path"
            ))),
        }
    }

    pub async fn status(&self, id: &str) -> BridgeResult<BridgeTransfer> {
        self.load(id).await
    }

    /// Blocked-attack audit trail, most recent first.
    pub async fn recent_attacks(&self, limit: usize) -> Vec<DetectedAttack> {
        let mut attacks = self.detector.recent_attacks().await;
        attacks.truncate(limit);
        attacks
    }

    /// One sweep pass: move every transfer stuck past the expiry to
    /// `Reverted` and release its source-side lock.
    pub async fn sweep_expired_once(&self) -> BridgeResult<usize> {
        self.metrics.sweeps_run.inc();
        let cutoff = now_ms().saturating_sub(self.config.transfer_expiry_secs * 1_000);
        let expired = self
            .store
            .expired(cutoff)
            .await
            .map_err(|e| BridgeError::StorageError(e.to_string()))?;

        let mut swept = 0usize;
        for transfer in expired {
            let lock = self.lock_for(&transfer.id).await;
            match self
                .revert(&transfer.id, &lock, "expired by sweep", TransferOutcome::Expired)
                .await
            {
                Ok(()) => {
                    swept += 1;
                    self.metrics.swept_transfers.inc();
                }
                Err(e) => {
                    // Release failed; the transfer stays pending and the
                    // next pass retries it.
                    error!(
                        "[Sweeper] could not revert expired transfer {}: {}",
                        transfer.id, e
                    );
                }
            }
        }
        if swept > 0 {
            info!("[Sweeper] reverted {} expired transfer(s)", swept);
        }
        Ok(swept)
    }

    /// Run the expiry sweep until cancellation.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let interval = Duration::from_secs(orchestrator.config.sweep_interval_secs);
            info!(
                "[Sweeper] starting, interval {}s, expiry {}s",
                orchestrator.config.sweep_interval_secs,
                orchestrator.config.transfer_expiry_secs
            );
            loop {
                tokio::select! {
                    _ = orchestrator.cancel.cancelled() => {
                        info!("[Sweeper] cancelled, stopping");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = orchestrator.sweep_expired_once().await {
                            error!("[Sweeper] sweep pass failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectorConfig, RateLimiterConfig};
    use crate::quorum::StaticQuorumClient;
    use crate::storage::InMemoryTransferStore;
    use crate::test_utils::{mock_request, MockChainAdapter};
    use crate::types::ChainId;
    use ethers::types::U256;

    struct Fixture {
        orchestrator: Arc<BridgeOrchestrator>,
        source: Arc<MockChainAdapter>,
        destination: Arc<MockChainAdapter>,
        store: Arc<InMemoryTransferStore>,
        detector: Arc<FlashLoanDetector>,
    }

    fn fixture_with(
        limiter_config: RateLimiterConfig,
        quorum: Arc<dyn AuthorizationClient>,
    ) -> Fixture {
        let metrics = Arc::new(BridgeMetrics::new_for_testing());
        let source = Arc::new(MockChainAdapter::new(ChainId::EthCustom));
        let destination = Arc::new(MockChainAdapter::new(ChainId::LedgerTestnet));
        let mut registry = AdapterRegistry::new();
        registry.register(source.clone()).unwrap();
        registry.register(destination.clone()).unwrap();
        let limiter = Arc::new(RateLimiter::new(limiter_config, metrics.clone()));
        let detector = Arc::new(FlashLoanDetector::new(
            DetectorConfig::default(),
            metrics.clone(),
        ));
        let store = InMemoryTransferStore::shared();
        let config = OrchestratorConfig {
            transfer_expiry_secs: 3_600,
            confirmation_poll_interval_ms: 5,
            sweep_interval_secs: 1,
        };
        let orchestrator = Arc::new(BridgeOrchestrator::new(
            config,
            Arc::new(registry),
            limiter,
            detector.clone(),
            quorum,
            store.clone(),
            metrics,
            CancellationToken::new(),
        ));
        Fixture {
            orchestrator,
            source,
            destination,
            store,
            detector,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            RateLimiterConfig::default(),
            Arc::new(StaticQuorumClient::approving()),
        )
    }

    #[tokio::test]
    async fn test_happy_path_completes_and_feeds_detector() {
        let f = fixture();
        f.source
            .script_statuses(vec![
                TransferStatus::Pending,
                TransferStatus::Confirmed { confirmations: 1 },
                TransferStatus::Confirmed { confirmations: 2 },
            ])
            .await;

        let id = f.orchestrator.submit(mock_request(5_000)).await.unwrap();
        let outcome = f.orchestrator.execute(&id).await.unwrap();
        assert_eq!(outcome, TransferOutcome::Completed);

        let transfer = f.orchestrator.status(&id).await.unwrap();
        assert_eq!(transfer.phase, TransferPhase::Completed);
        assert_eq!(transfer.outcome, Some(TransferOutcome::Completed));
        assert_eq!(transfer.confirmations, 2);
        assert_eq!(transfer.source_tx_hash.as_deref(), Some(format!("tx-{id}").as_str()));
        assert!(transfer.destination_tx_hash.is_some());
        assert!(transfer.fee_paid > U256::zero());
        assert_eq!(transfer.amount, U256::from(5_000u64));

        // Source locked under the transfer id, destination minted under the
        // dest-suffixed key.
        assert_eq!(*f.source.submitted.lock().await, vec![id.clone()]);
        assert_eq!(
            *f.destination.submitted.lock().await,
            vec![format!("{id}:dest")]
        );
        assert!(f.source.released.lock().await.is_empty());

        // Completion was recorded into the detector: a same-block
        // round-trip against the recorded deposit now blocks.
        let verdict = f
            .detector
            .analyze_transfer(&crate::detector::AnalyzeRequest {
                source_address: "0xdestination-account".to_string(),
                amount: U256::from(5_000u64),
                block_number: 1_000,
                tx_id: "tx-probe".to_string(),
            })
            .await;
        assert!(verdict.blocked());
    }

    #[tokio::test]
    async fn test_rate_limit_rejection_is_distinguishable() {
        let f = fixture_with(
            RateLimiterConfig {
                max_requests: 1,
                window_secs: 60,
                burst_multiplier: 1.0,
                reset_audit_capacity: 4,
            },
            Arc::new(StaticQuorumClient::approving()),
        );
        let first = f.orchestrator.submit(mock_request(100)).await.unwrap();
        assert!(!first.is_empty());

        let err = f.orchestrator.submit(mock_request(100)).await.unwrap_err();
        match err {
            BridgeError::RateLimited { retry_after_secs } => assert!(retry_after_secs > 0),
            other => panic!("expected RateLimited, got {other:?}"),
        }

        // The denial is persisted with its specific reason.
        let pending = f.store.pending().await.unwrap();
        assert_eq!(pending.len(), 1, "rejected transfer must be terminal");
    }

    #[tokio::test]
    async fn test_attack_rejection_is_distinguishable_and_audited() {
        let f = fixture();
        // A deposit recorded in the block the transfer would land in.
        f.detector
            .record_deposit("0xsource-account", U256::from(10_000u64), 1_000, "tx-dep")
            .await;

        let err = f.orchestrator.submit(mock_request(10_000)).await.unwrap_err();
        match err {
            BridgeError::AttackDetected { flags } => {
                assert!(flags.contains(&"SAME_BLOCK_ROUND_TRIP".to_string()))
            }
            other => panic!("expected AttackDetected, got {other:?}"),
        }

        // Audit trail is persisted and queryable, most recent first.
        let attacks = f.store.recent_attacks(10).await.unwrap();
        assert_eq!(attacks.len(), 1);
        assert_eq!(attacks[0].source_address, "0xsource-account");
        assert_eq!(f.orchestrator.recent_attacks(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_failure_rejects_without_release() {
        let f = fixture();
        f.source.fail_submits.store(1, std::sync::atomic::Ordering::SeqCst);

        let id = f.orchestrator.submit(mock_request(700)).await.unwrap();
        let err = f.orchestrator.execute(&id).await.unwrap_err();
        assert_eq!(err.error_type(), "chain_unreachable");

        let transfer = f.orchestrator.status(&id).await.unwrap();
        // No funds moved: Rejected, never Reverted, nothing released.
        assert_eq!(transfer.phase, TransferPhase::Rejected);
        assert!(f.source.released.lock().await.is_empty());
        assert!(f.destination.submitted.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_proof_reverts_and_releases_source() {
        let f = fixture();
        f.source
            .proof_valid
            .store(false, std::sync::atomic::Ordering::SeqCst);

        let id = f.orchestrator.submit(mock_request(900)).await.unwrap();
        let err = f.orchestrator.execute(&id).await.unwrap_err();
        assert_eq!(err.error_type(), "proof_invalid");

        let transfer = f.orchestrator.status(&id).await.unwrap();
        assert_eq!(transfer.phase, TransferPhase::Reverted);
        assert_eq!(transfer.outcome, Some(TransferOutcome::Reverted));
        assert!(transfer.source_released);
        assert_eq!(*f.source.released.lock().await, vec![format!("{id}:unlock")]);
        // The destination was never touched.
        assert!(f.destination.submitted.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_quorum_rejection_reverts_and_releases() {
        let f = fixture_with(
            RateLimiterConfig::default(),
            Arc::new(StaticQuorumClient::rejecting("validators disagree")),
        );
        let id = f.orchestrator.submit(mock_request(1_100)).await.unwrap();
        let err = f.orchestrator.execute(&id).await.unwrap_err();
        match err {
            BridgeError::AuthorizationDenied(reason) => {
                assert!(reason.contains("validators disagree"))
            }
            other => panic!("expected AuthorizationDenied, got {other:?}"),
        }

        let transfer = f.orchestrator.status(&id).await.unwrap();
        assert_eq!(transfer.phase, TransferPhase::Reverted);
        assert!(transfer.source_released);
        assert!(f.destination.submitted.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_destination_failure_reverts_and_releases() {
        let f = fixture();
        f.destination
            .fail_submits
            .store(1, std::sync::atomic::Ordering::SeqCst);

        let id = f.orchestrator.submit(mock_request(1_300)).await.unwrap();
        let err = f.orchestrator.execute(&id).await.unwrap_err();
        assert_eq!(err.error_type(), "chain_unreachable");

        let transfer = f.orchestrator.status(&id).await.unwrap();
        assert_eq!(transfer.phase, TransferPhase::Reverted);
        assert!(transfer.source_released);
        assert_eq!(f.source.released.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_source_tx_failure_on_chain_reverts_without_release() {
        let f = fixture();
        f.source
            .script_statuses(vec![TransferStatus::Failed])
            .await;

        let id = f.orchestrator.submit(mock_request(1_500)).await.unwrap();
        let err = f.orchestrator.execute(&id).await.unwrap_err();
        assert_eq!(err.error_type(), "source_tx_failed");

        let transfer = f.orchestrator.status(&id).await.unwrap();
        assert_eq!(transfer.phase, TransferPhase::Reverted);
        // The lock never took effect on-chain, so nothing was released.
        assert!(transfer.source_released);
        assert!(f.source.released.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_only_before_lock() {
        let f = fixture();
        let id = f.orchestrator.submit(mock_request(200)).await.unwrap();
        f.orchestrator.cancel(&id).await.unwrap();
        let transfer = f.orchestrator.status(&id).await.unwrap();
        assert_eq!(transfer.phase, TransferPhase::Rejected);
        assert_eq!(
            transfer.rejection_reason.as_deref(),
            Some("cancelled by caller")
        );

        // Once locked, cancellation must go through the revert path.
        let id = f.orchestrator.submit(mock_request(300)).await.unwrap();
        let mut transfer = f.store.get(&id).await.unwrap().unwrap();
        transfer.transition(TransferPhase::Locked).unwrap();
        transfer.source_tx_hash = Some("tx-locked".to_string());
        f.store.update(&transfer).await.unwrap();

        let err = f.orchestrator.cancel(&id).await.unwrap_err();
        assert_eq!(err.error_type(), "illegal_transfer_state");
    }

    #[tokio::test]
    async fn test_execute_requires_admitted_phase() {
        let f = fixture();
        let id = f.orchestrator.submit(mock_request(400)).await.unwrap();
        f.orchestrator.execute(&id).await.unwrap();

        // A second execute of the same transfer is rejected.
        let err = f.orchestrator.execute(&id).await.unwrap_err();
        assert_eq!(err.error_type(), "illegal_transfer_state");

        let err = f.orchestrator.execute("no-such-id").await.unwrap_err();
        assert_eq!(err.error_type(), "transfer_not_found");
    }

    #[tokio::test]
    async fn test_sweep_reverts_stuck_transfer_and_releases_exactly_once() {
        let f = fixture();
        let id = f.orchestrator.submit(mock_request(2_000)).await.unwrap();

        // Strand the transfer in ProofPending well past the expiry.
        let mut transfer = f.store.get(&id).await.unwrap().unwrap();
        transfer.transition(TransferPhase::Locked).unwrap();
        transfer.transition(TransferPhase::ProofPending).unwrap();
        transfer.source_tx_hash = Some("tx-stuck".to_string());
        transfer.created_at_ms = now_ms() - 3_700 * 1_000;
        f.store.update(&transfer).await.unwrap();

        let swept = f.orchestrator.sweep_expired_once().await.unwrap();
        assert_eq!(swept, 1);

        let transfer = f.orchestrator.status(&id).await.unwrap();
        assert_eq!(transfer.phase, TransferPhase::Reverted);
        assert_eq!(transfer.outcome, Some(TransferOutcome::Expired));
        assert!(transfer.source_released);
        assert_eq!(*f.source.released.lock().await, vec![format!("{id}:unlock")]);

        // A second sweep finds nothing and never double-releases.
        let swept = f.orchestrator.sweep_expired_once().await.unwrap();
        assert_eq!(swept, 0);
        assert_eq!(f.source.released.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_discards_expired_pre_lock_transfer_without_release() {
        let f = fixture();
        let id = f.orchestrator.submit(mock_request(2_100)).await.unwrap();
        let mut transfer = f.store.get(&id).await.unwrap().unwrap();
        transfer.created_at_ms = now_ms() - 3_700 * 1_000;
        f.store.update(&transfer).await.unwrap();

        assert_eq!(f.orchestrator.sweep_expired_once().await.unwrap(), 1);
        let transfer = f.orchestrator.status(&id).await.unwrap();
        assert_eq!(transfer.phase, TransferPhase::Reverted);
        assert!(f.source.released.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_addresses_rejected_before_any_record() {
        let f = fixture();
        let mut request = mock_request(100);
        request.source_address = "  ".to_string();
        let err = f.orchestrator.submit(request).await.unwrap_err();
        assert_eq!(err.error_type(), "invalid_input");
        assert!(f.store.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_chain_rejected() {
        let f = fixture();
        let mut request = mock_request(100);
        request.source_chain = ChainId::BtcMainnet;
        request.destination_chain = ChainId::LedgerMainnet;
        let err = f.orchestrator.submit(request).await.unwrap_err();
        assert_eq!(err.error_type(), "unsupported_chain");
    }
}
