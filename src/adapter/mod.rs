// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain adapter capability set.
//!
//! One implementing type per supported chain normalizes address formats, fee
//! models, proof schemes and transaction lifecycles behind a single trait.
//! Adapters own their configuration and connection exclusively; no state is
//! shared between adapters, so one chain being down never blocks another.

use crate::config::ChainAdapterConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics::BridgeMetrics;
use crate::types::{
    AddressValidation, ChainId, ChainInfo, FeeEstimate, ProofVerdict, ProofVerificationRequest,
    TransferRequest, TransferResult, TransferStatus,
};
use async_trait::async_trait;
use backoff::backoff::Backoff;
use ethers::types::U256;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tap::TapFallible;
use tokio::sync::RwLock;
use tracing::warn;

mod evm;
mod ledger;
mod registry;
mod utxo;

pub use evm::EvmAdapter;
pub use ledger::{InProcessLedger, InternalLedgerAdapter, LedgerBackend};
pub use registry::AdapterRegistry;
pub use utxo::{HttpUtxoRpc, RawUtxoProof, RawUtxoSibling, UtxoAdapter, UtxoRpc};

/// Point-in-time health snapshot of one adapter's endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub chain: ChainId,
    pub reachable: bool,
    pub latest_block: Option<u64>,
    pub latency_ms: u64,
}

/// Operations only available on chains with a programmable execution layer.
/// Chains without one simply do not expose this capability.
#[async_trait]
pub trait ContractOps: Send + Sync {
    /// Deploy bytecode, returning the new contract's address.
    async fn deploy_contract(&self, bytecode: Vec<u8>) -> BridgeResult<String>;

    /// Read-only contract call with raw calldata.
    async fn call_contract(&self, address: &str, data: Vec<u8>) -> BridgeResult<Vec<u8>>;
}

/// The shared chain capability set.
///
/// `validate_address` is pure and never touches the network; `chain_info`
/// serves from a bounded-interval cache. Network-touching calls retry per
/// the adapter's [`crate::config::RetryConfig`] and surface
/// `ChainUnreachable` after exhaustion.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn config(&self) -> &ChainAdapterConfig;

    fn chain_id(&self) -> ChainId;

    /// Probe the endpoint and verify it serves the configured chain.
    async fn connect(&self) -> BridgeResult<()>;

    async fn chain_info(&self) -> BridgeResult<ChainInfo>;

    /// Syntactic/checksum validation per this chain's address grammar.
    fn validate_address(&self, address: &str) -> AddressValidation;

    /// Balance of `address` in the native asset, or in `asset` when given.
    async fn get_balance(&self, address: &str, asset: Option<&str>) -> BridgeResult<U256>;

    /// Fee estimate per this chain's pricing model. Fails rather than
    /// returning a stale or zero estimate when the fee oracle is down.
    async fn estimate_fee(&self, request: &TransferRequest) -> BridgeResult<FeeEstimate>;

    /// Broadcast a chain-native transaction for `request`. Idempotent under
    /// retry: resubmitting the same `idempotency_key` returns the original
    /// result instead of broadcasting again.
    async fn submit_transfer(
        &self,
        request: &TransferRequest,
        idempotency_key: &str,
    ) -> BridgeResult<TransferResult>;

    /// Release a lock previously placed by `submit_transfer`, returning the
    /// escrowed principal to the original source address. Idempotent under
    /// the same key, exactly like submission.
    async fn release_lock(
        &self,
        transfer: &crate::types::BridgeTransfer,
        idempotency_key: &str,
    ) -> BridgeResult<TransferResult>;

    /// Confirmation progress of `tx_hash`, counted against the configured
    /// confirmation depth.
    async fn get_transfer_status(&self, tx_hash: &str) -> BridgeResult<TransferStatus>;

    /// Inclusion proof for a finalized transaction, in this chain's native
    /// proof scheme.
    async fn fetch_inclusion_proof(
        &self,
        tx_hash: &str,
    ) -> BridgeResult<ProofVerificationRequest>;

    /// Verify a proof under this chain's schemes, dispatching on the proof
    /// kind tag.
    async fn verify_proof(
        &self,
        request: &ProofVerificationRequest,
    ) -> BridgeResult<ProofVerdict>;

    /// Independent endpoint health probe; never retried, never cached.
    async fn health_check(&self) -> HealthStatus;

    /// Contract capability, for chains that have one.
    fn contract_ops(&self) -> Option<&dyn ContractOps> {
        None
    }
}

/// Run `op` with the adapter's retry policy: up to `max_retries` retries with
/// exponential backoff, each attempt bounded by the request timeout. After
/// exhaustion the failure surfaces as `ChainUnreachable`.
pub(crate) async fn with_retries<T, E, F, Fut>(
    chain: ChainId,
    method: &'static str,
    config: &ChainAdapterConfig,
    metrics: &BridgeMetrics,
    mut op: F,
) -> BridgeResult<T>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let chain_label = chain.to_string();
    let mut backoff = backoff::ExponentialBackoff {
        initial_interval: Duration::from_millis(config.retry.initial_backoff_ms),
        max_interval: Duration::from_millis(config.retry.max_backoff_ms),
        max_elapsed_time: None,
        ..Default::default()
    };
    let started = Instant::now();
    let mut last_error = String::new();

    for attempt in 0..=config.retry.max_retries {
        metrics
            .adapter_rpc_queries
            .with_label_values(&[chain_label.as_str(), method])
            .inc();
        let result = tokio::time::timeout(config.request_timeout(), op())
            .await
            .map_err(|_| format!("timed out after {}ms", config.request_timeout_ms))
            .and_then(|r| r.map_err(|e| e.to_string()));
        match result {
            Ok(value) => {
                metrics
                    .adapter_rpc_latency
                    .with_label_values(&[chain_label.as_str(), method])
                    .observe(started.elapsed().as_secs_f64());
                return Ok(value);
            }
            Err(message) => {
                metrics
                    .adapter_rpc_errors
                    .with_label_values(&[chain_label.as_str(), method])
                    .inc();
                warn!(
                    "[{}] {} attempt {}/{} failed: {}",
                    chain_label,
                    method,
                    attempt + 1,
                    config.retry.max_retries + 1,
                    message
                );
                last_error = message;
            }
        }
        if attempt < config.retry.max_retries {
            if let Some(delay) = backoff.next_backoff() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(BridgeError::ChainUnreachable {
        chain: chain_label,
        message: format!("{method} failed after retries: {last_error}"),
    })
}

/// TTL cache for the adapter's [`ChainInfo`] snapshot so `chain_info()` does
/// not hit the network on every call.
#[derive(Debug)]
pub(crate) struct ChainInfoCache {
    slot: RwLock<Option<(Instant, ChainInfo)>>,
    ttl: Duration,
}

impl ChainInfoCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
        }
    }

    pub async fn get(&self) -> Option<ChainInfo> {
        let slot = self.slot.read().await;
        match &*slot {
            Some((at, info)) if at.elapsed() < self.ttl => Some(info.clone()),
            _ => None,
        }
    }

    pub async fn update(&self, info: ChainInfo) {
        let mut slot = self.slot.write().await;
        *slot = Some((Instant::now(), info));
    }
}

/// Tracks completed submissions per idempotency key so a retry after a
/// timed-out submit never broadcasts twice.
#[derive(Debug, Default)]
pub(crate) struct SubmissionLedger {
    entries: RwLock<HashMap<String, TransferResult>>,
}

impl SubmissionLedger {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn recorded(&self, key: &str) -> Option<TransferResult> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn record(&self, key: &str, result: TransferResult) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), result);
    }
}

/// Probe helper shared by adapters: times a latest-block fetch and folds it
/// into a [`HealthStatus`], updating the health gauge.
pub(crate) async fn probe_health<E, Fut>(
    chain: ChainId,
    metrics: &BridgeMetrics,
    fetch_latest: Fut,
) -> HealthStatus
where
    E: std::fmt::Display,
    Fut: Future<Output = Result<u64, E>>,
{
    let started = Instant::now();
    let outcome = fetch_latest
        .await
        .tap_err(|e| warn!("[{}] health probe failed: {}", chain, e));
    let latency_ms = started.elapsed().as_millis() as u64;
    let status = match outcome {
        Ok(block) => HealthStatus {
            chain,
            reachable: true,
            latest_block: Some(block),
            latency_ms,
        },
        Err(_) => HealthStatus {
            chain,
            reachable: false,
            latest_block: None,
            latency_ms,
        },
    };
    metrics
        .adapter_health
        .with_label_values(&[chain.to_string().as_str()])
        .set(if status.reachable { 1 } else { 0 });
    status
}

/// Confirmation counting shared by adapters: maps a transaction's block
/// depth to a [`TransferStatus`] against the configured depth.
pub(crate) fn status_from_depth(
    tx_block: u64,
    latest_block: u64,
    confirmation_depth: u64,
) -> TransferStatus {
    let confirmations = latest_block.saturating_sub(tx_block) + 1;
    if confirmations >= confirmation_depth {
        TransferStatus::Finalized
    } else {
        TransferStatus::Confirmed { confirmations }
    }
}
