// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Internal-ledger adapter.
//!
//! The platform's own ledger is an account-model chain whose consensus is
//! consumed as a black box: entries it accepts are final at depth one, and
//! finalization is attested by the ledger's notary key. The adapter is the
//! mint/burn side of most routes. [`LedgerBackend`] abstracts the node so
//! tests and local development run against [`InProcessLedger`].

use super::{
    probe_health, status_from_depth, with_retries, ChainAdapter, ChainInfoCache, HealthStatus,
    SubmissionLedger,
};
use crate::config::ChainAdapterConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics::BridgeMetrics;
use crate::proof::{self, SignatureScheme, ZkVerifierRegistry};
use crate::types::{
    AddressValidation, ChainId, ChainInfo, ConsensusFamily, FeeEstimate, FeeModel, ProofVerdict,
    ProofVerificationRequest, TransferRequest, TransferResult, TransferStatus,
};
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{H256, U256};
use ethers::utils::{keccak256, to_checksum};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// Flat per-entry fee charged by the ledger, in base units.
const LEDGER_FEE_UNITS: u64 = 600;

/// Escrow account holding locked liquidity for outbound routes.
const ESCROW_ACCOUNT: &str =
    "0x00000000000000000000000000000000000000000000000000000000000000e5";

/// Node surface the adapter depends on.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    async fn latest_block(&self) -> Result<u64, String>;

    async fn balance(&self, address: &str, asset: &str) -> Result<U256, String>;

    /// Apply a ledger entry. `debit: None` mints the amount (wrapping an
    /// inbound transfer); a debit with the escrow as credit locks outbound
    /// liquidity. Entries are deduplicated by `key`; replaying a key returns
    /// the original txid and block.
    async fn submit_entry(
        &self,
        debit: Option<&str>,
        credit: &str,
        asset: &str,
        amount: U256,
        key: &str,
    ) -> Result<(String, u64), String>;

    async fn tx_block(&self, txid: &str) -> Result<Option<u64>, String>;

    /// Notary attestation that `txid` is final: (message, signature, signer).
    async fn attestation(&self, txid: &str) -> Result<(Vec<u8>, Vec<u8>, String), String>;
}

#[derive(Default)]
struct LedgerState {
    height: u64,
    balances: HashMap<(String, String), U256>,
    txs: HashMap<String, u64>,
    entries_by_key: HashMap<String, (String, u64)>,
}

/// Deterministic in-process ledger used as the reference backend.
pub struct InProcessLedger {
    state: RwLock<LedgerState>,
    notary: LocalWallet,
}

impl InProcessLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState {
                height: 1,
                ..Default::default()
            }),
            notary: LocalWallet::new(&mut rand::thread_rng()),
        }
    }

    pub fn notary_address(&self) -> String {
        to_checksum(&self.notary.address(), None)
    }

    /// Seed a balance, for tests and local development.
    pub async fn credit(&self, address: &str, asset: &str, amount: U256) {
        let mut state = self.state.write().await;
        let entry = state
            .balances
            .entry((address.to_lowercase(), asset.to_string()))
            .or_insert_with(U256::zero);
        *entry += amount;
    }
}

#[async_trait]
impl LedgerBackend for InProcessLedger {
    async fn latest_block(&self) -> Result<u64, String> {
        Ok(self.state.read().await.height)
    }

    async fn balance(&self, address: &str, asset: &str) -> Result<U256, String> {
        Ok(self
            .state
            .read()
            .await
            .balances
            .get(&(address.to_lowercase(), asset.to_string()))
            .copied()
            .unwrap_or_else(U256::zero))
    }

    async fn submit_entry(
        &self,
        debit: Option<&str>,
        credit: &str,
        asset: &str,
        amount: U256,
        key: &str,
    ) -> Result<(String, u64), String> {
        let mut state = self.state.write().await;
        if let Some(previous) = state.entries_by_key.get(key) {
            return Ok(previous.clone());
        }
        if let Some(debit) = debit {
            let slot = (debit.to_lowercase(), asset.to_string());
            let held = state.balances.get(&slot).copied().unwrap_or_else(U256::zero);
            if held < amount {
                return Err(format!(
                    "insufficient funds: {debit} holds {held} of {asset}, needs {amount}"
                ));
            }
            state.balances.insert(slot, held - amount);
        }
        let slot = (credit.to_lowercase(), asset.to_string());
        let held = state.balances.get(&slot).copied().unwrap_or_else(U256::zero);
        state.balances.insert(slot, held + amount);

        state.height += 1;
        let block = state.height;
        let txid = format!("0x{}", hex_digest(key));
        state.txs.insert(txid.clone(), block);
        state.entries_by_key.insert(key.to_string(), (txid.clone(), block));
        Ok((txid, block))
    }

    async fn tx_block(&self, txid: &str) -> Result<Option<u64>, String> {
        Ok(self.state.read().await.txs.get(txid).copied())
    }

    async fn attestation(&self, txid: &str) -> Result<(Vec<u8>, Vec<u8>, String), String> {
        if self.state.read().await.txs.get(txid).is_none() {
            return Err(format!("unknown transaction {txid}"));
        }
        let message = txid.as_bytes().to_vec();
        let digest = H256::from(keccak256(&message));
        let signature = self
            .notary
            .sign_hash(digest)
            .map_err(|e| format!("notary signing failed: {e}"))?;
        Ok((message, signature.to_vec(), self.notary_address()))
    }
}

fn hex_digest(input: &str) -> String {
    keccak256(input.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub struct InternalLedgerAdapter<C> {
    chain: ChainId,
    config: ChainAdapterConfig,
    backend: Arc<C>,
    metrics: Arc<BridgeMetrics>,
    zk_registry: Arc<ZkVerifierRegistry>,
    info_cache: ChainInfoCache,
    submissions: SubmissionLedger,
}

impl<C: LedgerBackend> InternalLedgerAdapter<C> {
    pub fn new(
        backend: Arc<C>,
        config: ChainAdapterConfig,
        metrics: Arc<BridgeMetrics>,
        zk_registry: Arc<ZkVerifierRegistry>,
    ) -> anyhow::Result<Self> {
        let chain = config.chain()?;
        Ok(Self {
            chain,
            config,
            backend,
            metrics,
            zk_registry,
            info_cache: ChainInfoCache::new(Duration::from_secs(30)),
            submissions: SubmissionLedger::new(),
        })
    }

    fn native_asset(asset: &str) -> &str {
        if asset.is_empty() {
            "LGR"
        } else {
            asset
        }
    }
}

#[async_trait]
impl<C: LedgerBackend + 'static> ChainAdapter for InternalLedgerAdapter<C> {
    fn config(&self) -> &ChainAdapterConfig {
        &self.config
    }

    fn chain_id(&self) -> ChainId {
        self.chain
    }

    async fn connect(&self) -> BridgeResult<()> {
        let backend = self.backend.clone();
        let height = with_retries(
            self.chain,
            "ledger_latestBlock",
            &self.config,
            &self.metrics,
            move || {
                let backend = backend.clone();
                async move { backend.latest_block().await }
            },
        )
        .await?;
        info!("[{}] connected, height {}", self.chain, height);
        Ok(())
    }

    async fn chain_info(&self) -> BridgeResult<ChainInfo> {
        if let Some(info) = self.info_cache.get().await {
            return Ok(info);
        }
        let info = ChainInfo {
            chain_id: self.chain,
            name: self.chain.to_string(),
            native_currency: "LGR".to_string(),
            decimals: 9,
            network: self.chain.network(),
            consensus: ConsensusFamily::Bft,
            fee_model: FeeModel::Legacy,
            block_time_ms: 3_000,
            gas_price: U256::one(),
        };
        self.info_cache.update(info.clone()).await;
        Ok(info)
    }

    fn validate_address(&self, address: &str) -> AddressValidation {
        let Some(hex) = address.strip_prefix("0x") else {
            return AddressValidation::invalid();
        };
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return AddressValidation::invalid();
        }
        AddressValidation::valid(format!("0x{}", hex.to_lowercase()))
    }

    async fn get_balance(&self, address: &str, asset: Option<&str>) -> BridgeResult<U256> {
        let validation = self.validate_address(address);
        let Some(address) = validation.normalized.filter(|_| validation.valid) else {
            return Err(BridgeError::InvalidInput(format!(
                "invalid ledger address: {address}"
            )));
        };
        let asset = Self::native_asset(asset.unwrap_or_default()).to_string();
        let backend = self.backend.clone();
        with_retries(
            self.chain,
            "ledger_balance",
            &self.config,
            &self.metrics,
            move || {
                let backend = backend.clone();
                let address = address.clone();
                let asset = asset.clone();
                async move { backend.balance(&address, &asset).await }
            },
        )
        .await
    }

    async fn estimate_fee(&self, _request: &TransferRequest) -> BridgeResult<FeeEstimate> {
        // The ledger charges a flat per-entry fee; there is no oracle to
        // consult and nothing to go stale.
        let units = U256::from(LEDGER_FEE_UNITS);
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
        request: &TransferRequest,
        idempotency_key: &str,
    ) -> BridgeResult<TransferResult> {
        if let Some(previous) = self.submissions.recorded(idempotency_key).await {
            info!(
                "[{}] submit for key {} already recorded, returning prior result",
                self.chain, idempotency_key
            );
            return Ok(previous);
        }
        request.validate()?;
        let asset = Self::native_asset(&request.asset).to_string();

        // Which side of the route this adapter plays follows from which
        // addresses belong to the ledger: a ledger source is debited into
        // escrow (lock/burn), an external source mints to the ledger
        // destination (wrap).
        let source = self.validate_address(&request.source_address);
        let destination = self.validate_address(&request.destination_address);
        let debit = source.normalized.filter(|_| source.valid);
        let credit = match destination.normalized.filter(|_| destination.valid) {
            Some(ledger_destination) => ledger_destination,
            None => {
                if debit.is_none() {
                    return Err(BridgeError::InvalidInput(format!(
                        "neither {} nor {} is a ledger address",
                        request.source_address, request.destination_address
                    )));
                }
                ESCROW_ACCOUNT.to_string()
            }
        };

        let backend = self.backend.clone();
        let amount = request.amount;
        let key = idempotency_key.to_string();
        let (txid, block) = with_retries(
            self.chain,
            "ledger_submitEntry",
            &self.config,
            &self.metrics,
            move || {
                let backend = backend.clone();
                let debit = debit.clone();
                let credit = credit.clone();
                let asset = asset.clone();
                let key = key.clone();
                // Safe to retry: entries are deduplicated by key.
                async move {
                    backend
                        .submit_entry(debit.as_deref(), &credit, &asset, amount, &key)
                        .await
                }
            },
        )
        .await?;
        info!(
            "[{}] entry {} accepted at block {}",
            self.chain, txid, block
        );

        let result = TransferResult {
            transfer_id: idempotency_key.to_string(),
            success: true,
            tx_hash: Some(txid),
        };
        self.submissions.record(idempotency_key, result.clone()).await;
        Ok(result)
    }

    async fn release_lock(
        &self,
        transfer: &crate::types::BridgeTransfer,
        idempotency_key: &str,
    ) -> BridgeResult<TransferResult> {
        if let Some(previous) = self.submissions.recorded(idempotency_key).await {
            return Ok(previous);
        }
        let source = self.validate_address(&transfer.source_address);
        let Some(credit) = source.normalized.filter(|_| source.valid) else {
            return Err(BridgeError::InvalidInput(format!(
                "release target {} is not a ledger address",
                transfer.source_address
            )));
        };
        let asset = Self::native_asset(&transfer.asset).to_string();
        let backend = self.backend.clone();
        let amount = transfer.amount;
        let key = idempotency_key.to_string();
        let (txid, block) = with_retries(
            self.chain,
            "ledger_submitEntry",
            &self.config,
            &self.metrics,
            move || {
                let backend = backend.clone();
                let credit = credit.clone();
                let asset = asset.clone();
                let key = key.clone();
                async move {
                    backend
                        .submit_entry(Some(ESCROW_ACCOUNT), &credit, &asset, amount, &key)
                        .await
                }
            },
        )
        .await?;
        info!(
            "[{}] release entry {} accepted at block {}",
            self.chain, txid, block
        );
        let result = TransferResult {
            transfer_id: idempotency_key.to_string(),
            success: true,
            tx_hash: Some(txid),
        };
        self.submissions.record(idempotency_key, result.clone()).await;
        Ok(result)
    }

    async fn get_transfer_status(&self, tx_hash: &str) -> BridgeResult<TransferStatus> {
        let backend = self.backend.clone();
        let txid = tx_hash.to_string();
        let depth = self.config.confirmation_depth;
        let backend_for_latest = self.backend.clone();
        with_retries(
            self.chain,
            "ledger_txStatus",
            &self.config,
            &self.metrics,
            move || {
                let backend = backend.clone();
                let latest_backend = backend_for_latest.clone();
                let txid = txid.clone();
                async move {
                    let Some(block) = backend.tx_block(&txid).await? else {
                        return Ok::<_, String>(TransferStatus::Pending);
                    };
                    let latest = latest_backend.latest_block().await?;
                    Ok(status_from_depth(block, latest, depth))
                }
            },
        )
        .await
    }

    async fn fetch_inclusion_proof(
        &self,
        tx_hash: &str,
    ) -> BridgeResult<ProofVerificationRequest> {
        let backend = self.backend.clone();
        let txid = tx_hash.to_string();
        let (message, signature, signer) = with_retries(
            self.chain,
            "ledger_attestation",
            &self.config,
            &self.metrics,
            move || {
                let backend = backend.clone();
                let txid = txid.clone();
                async move { backend.attestation(&txid).await }
            },
        )
        .await?;
        Ok(ProofVerificationRequest::Signature {
            message,
            signature,
            signer,
        })
    }

    async fn verify_proof(
        &self,
        request: &ProofVerificationRequest,
    ) -> BridgeResult<ProofVerdict> {
        // The notary signs the keccak digest of the message directly.
        let verdict = proof::verify(request, SignatureScheme::RawDigest, &self.zk_registry)?;
        self.metrics
            .proof_verifications
            .with_label_values(&[request.kind(), if verdict.valid { "valid" } else { "invalid" }])
            .inc();
        Ok(verdict)
    }

    async fn health_check(&self) -> HealthStatus {
        let backend = self.backend.clone();
        probe_health(self.chain, &self.metrics, async move {
            backend.latest_block().await
        })
        .await
    }

    // The ledger's execution layer is consensus-internal; no contract
    // capability is exposed through the bridge.
}
