// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Test fixtures: a scriptable chain adapter and request builders.

use crate::adapter::{ChainAdapter, HealthStatus};
use crate::config::{ChainAdapterConfig, RetryConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::types::{
    AddressValidation, BridgeTransfer, ChainId, ChainInfo, ConsensusFamily, FeeEstimate,
    FeeModel, ProofVerdict, ProofVerificationRequest, TransferRequest, TransferResult,
    TransferStatus,
};
use async_trait::async_trait;
use ethers::types::{H256, U256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Adapter double whose status sequence, proof verdicts and failure counts
/// are scripted by the test.
pub struct MockChainAdapter {
    chain: ChainId,
    config: ChainAdapterConfig,
    /// Height reported by health probes.
    pub latest_block: AtomicU64,
    /// Statuses returned in order by `get_transfer_status`; once drained,
    /// every poll reports Finalized.
    pub statuses: Mutex<VecDeque<TransferStatus>>,
    /// Verdict `verify_proof` returns.
    pub proof_valid: AtomicBool,
    /// Fail this many `submit_transfer` calls before succeeding.
    pub fail_submits: AtomicU32,
    /// Idempotency keys seen by `submit_transfer`, in order.
    pub submitted: Mutex<Vec<String>>,
    /// Idempotency keys seen by `release_lock`, in order.
    pub released: Mutex<Vec<String>>,
}

impl MockChainAdapter {
    pub fn new(chain: ChainId) -> Self {
        let mut config = ChainAdapterConfig::new(chain, "http://mock.invalid", 3);
        config.retry = RetryConfig {
            max_retries: 0,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        config.request_timeout_ms = 200;
        Self {
            chain,
            config,
            latest_block: AtomicU64::new(1_000),
            statuses: Mutex::new(VecDeque::new()),
            proof_valid: AtomicBool::new(true),
            fail_submits: AtomicU32::new(0),
            submitted: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    pub async fn script_statuses(&self, statuses: Vec<TransferStatus>) {
        *self.statuses.lock().await = statuses.into();
    }
}

#[async_trait]
impl ChainAdapter for MockChainAdapter {
    fn config(&self) -> &ChainAdapterConfig {
        &self.config
    }

    fn chain_id(&self) -> ChainId {
        self.chain
    }

    async fn connect(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn chain_info(&self) -> BridgeResult<ChainInfo> {
        Ok(ChainInfo {
            chain_id: self.chain,
            name: self.chain.to_string(),
            native_currency: "MOCK".to_string(),
            decimals: 8,
            network: self.chain.network(),
            consensus: ConsensusFamily::Bft,
            fee_model: FeeModel::Legacy,
            block_time_ms: 1_000,
            gas_price: U256::one(),
        })
    }

    fn validate_address(&self, address: &str) -> AddressValidation {
        if address.trim().is_empty() {
            AddressValidation::invalid()
        } else {
            AddressValidation::valid(address.to_lowercase())
        }
    }

    async fn get_balance(&self, _address: &str, _asset: Option<&str>) -> BridgeResult<U256> {
        Ok(U256::from(1_000_000_000u64))
    }

    async fn estimate_fee(&self, _request: &TransferRequest) -> BridgeResult<FeeEstimate> {
        let units = U256::from(100u64);
        Ok(FeeEstimate {
            fee_model: FeeModel::Legacy,
            gas_limit: units,
            gas_price: Some(U256::one()),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            total_fee: units,
        })
    }

    async fn submit_transfer(
        &self,
        _request: &TransferRequest,
        idempotency_key: &str,
    ) -> BridgeResult<TransferResult> {
        if self.fail_submits.load(Ordering::SeqCst) > 0 {
            self.fail_submits.fetch_sub(1, Ordering::SeqCst);
            return Err(BridgeError::ChainUnreachable {
                chain: self.chain.to_string(),
                message: "scripted submit failure".to_string(),
            });
        }
        let mut submitted = self.submitted.lock().await;
        if !submitted.iter().any(|k| k == idempotency_key) {
            submitted.push(idempotency_key.to_string());
        }
        Ok(TransferResult {
            transfer_id: idempotency_key.to_string(),
            success: true,
            tx_hash: Some(format!("tx-{idempotency_key}")),
        })
    }

    async fn release_lock(
        &self,
        _transfer: &BridgeTransfer,
        idempotency_key: &str,
    ) -> BridgeResult<TransferResult> {
        self.released.lock().await.push(idempotency_key.to_string());
        Ok(TransferResult {
            transfer_id: idempotency_key.to_string(),
            success: true,
            tx_hash: Some(format!("release-{idempotency_key}")),
        })
    }

    async fn get_transfer_status(&self, _tx_hash: &str) -> BridgeResult<TransferStatus> {
        Ok(self
            .statuses
            .lock()
            .await
            .pop_front()
            .unwrap_or(TransferStatus::Finalized))
    }

    async fn fetch_inclusion_proof(
        &self,
        _tx_hash: &str,
    ) -> BridgeResult<ProofVerificationRequest> {
        Ok(ProofVerificationRequest::Merkle {
            leaf_hash: H256::zero(),
            siblings: vec![],
            expected_root: H256::zero(),
        })
    }

    async fn verify_proof(
        &self,
        _request: &ProofVerificationRequest,
    ) -> BridgeResult<ProofVerdict> {
        if self.proof_valid.load(Ordering::SeqCst) {
            Ok(ProofVerdict::valid())
        } else {
            Ok(ProofVerdict::invalid("scripted proof mismatch"))
        }
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            chain: self.chain,
            reachable: true,
            latest_block: Some(self.latest_block.load(Ordering::SeqCst)),
            latency_ms: 1,
        }
    }
}

/// A well-formed EVM-to-ledger transfer request against mock adapters.
pub fn mock_request(amount: u64) -> TransferRequest {
    TransferRequest {
        source_chain: ChainId::EthCustom,
        destination_chain: ChainId::LedgerTestnet,
        source_address: "0xsource-account".to_string(),
        destination_address: "0xdestination-account".to_string(),
        asset: "ETH".to_string(),
        amount: U256::from(amount),
    }
}
