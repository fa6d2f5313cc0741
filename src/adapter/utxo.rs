// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! UTXO-family chain adapter.
//!
//! Addresses follow the segwit bech32 grammar; fees follow the legacy
//! single-rate model quoted in sat/vB. The chain has no programmable
//! execution layer, so the contract capability is absent. The RPC surface is
//! behind [`UtxoRpc`] so tests run against an in-memory implementation.

use super::{
    probe_health, with_retries, ChainAdapter, ChainInfoCache, HealthStatus, SubmissionLedger,
};
use crate::config::ChainAdapterConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics::BridgeMetrics;
use crate::proof::{self, SignatureScheme, ZkVerifierRegistry};
use crate::types::{
    AddressValidation, ChainId, ChainInfo, ConsensusFamily, FeeEstimate, FeeModel, MerkleSibling,
    ProofVerdict, ProofVerificationRequest, SiblingPosition, TransferRequest, TransferResult,
    TransferStatus,
};
use async_trait::async_trait;
use bech32::Hrp;
use ethers::types::{H256, U256};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Weight of a one-input, two-output segwit spend, used as the fee unit
/// count.
const ESTIMATED_VSIZE: u64 = 141;

/// Inclusion proof as served by the bridge-aware fullnode: an SPV path from
/// the transaction hash to the block's transaction merkle root.
#[derive(Debug, Clone, Deserialize)]
pub struct RawUtxoProof {
    pub leaf_hash: H256,
    pub siblings: Vec<RawUtxoSibling>,
    pub root: H256,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUtxoSibling {
    pub hash: H256,
    pub left: bool,
}

/// Node RPC surface the adapter depends on.
#[async_trait]
pub trait UtxoRpc: Send + Sync {
    async fn block_count(&self) -> Result<u64, String>;

    /// Confirmed balance of an address, in satoshis.
    async fn address_balance(&self, address: &str) -> Result<u64, String>;

    /// Fee rate in sat/vB for confirmation within `target_blocks`, or `None`
    /// when the node's estimator has no data.
    async fn fee_rate(&self, target_blocks: u16) -> Result<Option<u64>, String>;

    /// Broadcast a lock spend. The node deduplicates by `key`, so a
    /// rebroadcast of the same key returns the original txid.
    async fn send_lock(
        &self,
        from: &str,
        to: &str,
        amount_sats: u64,
        key: &str,
    ) -> Result<String, String>;

    /// Release a previous lock spend back to `to`. Deduplicated by `key`
    /// like `send_lock`.
    async fn send_release(&self, to: &str, amount_sats: u64, key: &str)
        -> Result<String, String>;

    /// Confirmation count of a transaction, `None` when unknown to the node.
    async fn tx_confirmations(&self, txid: &str) -> Result<Option<u64>, String>;

    async fn transfer_proof(&self, txid: &str) -> Result<RawUtxoProof, String>;
}

/// JSON-RPC transport against a bitcoind-style node with bridge extensions.
pub struct HttpUtxoRpc {
    client: reqwest::Client,
    url: String,
}

impl HttpUtxoRpc {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, String> {
        #[derive(Deserialize)]
        struct RpcEnvelope<T> {
            result: Option<T>,
            error: Option<serde_json::Value>,
        }
        let body = serde_json::json!({
            "jsonrpc": "1.0",
            "id": "ledger-bridge",
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let envelope: RpcEnvelope<T> = response.json().await.map_err(|e| e.to_string())?;
        if let Some(error) = envelope.error {
            return Err(error.to_string());
        }
        envelope.result.ok_or_else(|| "empty result".to_string())
    }
}

#[async_trait]
impl UtxoRpc for HttpUtxoRpc {
    async fn block_count(&self) -> Result<u64, String> {
        self.call("getblockcount", serde_json::json!([])).await
    }

    async fn address_balance(&self, address: &str) -> Result<u64, String> {
        #[derive(Deserialize)]
        struct Balance {
            balance: u64,
        }
        let balance: Balance = self
            .call("getaddressbalance", serde_json::json!([address]))
            .await?;
        Ok(balance.balance)
    }

    async fn fee_rate(&self, target_blocks: u16) -> Result<Option<u64>, String> {
        #[derive(Deserialize)]
        struct SmartFee {
            // BTC per kvB, as quoted by the node.
            feerate: Option<f64>,
        }
        let fee: SmartFee = self
            .call("estimatesmartfee", serde_json::json!([target_blocks]))
            .await?;
        Ok(fee
            .feerate
            .map(|btc_per_kvb| ((btc_per_kvb * 100_000_000.0) / 1_000.0).round() as u64))
    }

    async fn send_lock(
        &self,
        from: &str,
        to: &str,
        amount_sats: u64,
        key: &str,
    ) -> Result<String, String> {
        self.call(
            "bridge_sendlock",
            serde_json::json!([from, to, amount_sats, key]),
        )
        .await
    }

    async fn send_release(
        &self,
        to: &str,
        amount_sats: u64,
        key: &str,
    ) -> Result<String, String> {
        self.call("bridge_sendrelease", serde_json::json!([to, amount_sats, key]))
            .await
    }

    async fn tx_confirmations(&self, txid: &str) -> Result<Option<u64>, String> {
        #[derive(Deserialize)]
        struct RawTx {
            confirmations: Option<u64>,
        }
        let tx: Result<RawTx, String> = self
            .call("getrawtransaction", serde_json::json!([txid, true]))
            .await;
        match tx {
            Ok(tx) => Ok(tx.confirmations),
            // The node answers "No such mempool or blockchain transaction"
            // for unknown txids; that is Pending from the bridge's view.
            Err(message) if message.contains("No such") => Ok(None),
            Err(message) => Err(message),
        }
    }

    async fn transfer_proof(&self, txid: &str) -> Result<RawUtxoProof, String> {
        self.call("bridge_gettransferproof", serde_json::json!([txid]))
            .await
    }
}

pub struct UtxoAdapter<C> {
    chain: ChainId,
    config: ChainAdapterConfig,
    rpc: Arc<C>,
    metrics: Arc<BridgeMetrics>,
    zk_registry: Arc<ZkVerifierRegistry>,
    info_cache: ChainInfoCache,
    submissions: SubmissionLedger,
}

impl UtxoAdapter<HttpUtxoRpc> {
    pub fn new(
        config: ChainAdapterConfig,
        metrics: Arc<BridgeMetrics>,
        zk_registry: Arc<ZkVerifierRegistry>,
    ) -> anyhow::Result<Self> {
        let rpc = Arc::new(HttpUtxoRpc::new(config.rpc_url.clone()));
        Self::from_rpc(rpc, config, metrics, zk_registry)
    }
}

impl<C: UtxoRpc + 'static> UtxoAdapter<C> {
    pub fn from_rpc(
        rpc: Arc<C>,
        config: ChainAdapterConfig,
        metrics: Arc<BridgeMetrics>,
        zk_registry: Arc<ZkVerifierRegistry>,
    ) -> anyhow::Result<Self> {
        let chain = config.chain()?;
        Ok(Self {
            chain,
            config,
            rpc,
            metrics,
            zk_registry,
            info_cache: ChainInfoCache::new(Duration::from_secs(60)),
            submissions: SubmissionLedger::new(),
        })
    }

    /// Human-readable part this chain's addresses must carry.
    fn expected_hrp(&self) -> Hrp {
        let hrp = match self.chain {
            ChainId::BtcMainnet => "bc",
            ChainId::BtcTestnet => "tb",
            _ => "bcrt",
        };
        Hrp::parse(hrp).expect("static hrp is valid")
    }

    fn parse_amount_sats(amount: U256) -> BridgeResult<u64> {
        if amount > U256::from(u64::MAX) {
            return Err(BridgeError::InvalidInput(format!(
                "amount {amount} exceeds the chain's representable range"
            )));
        }
        Ok(amount.as_u64())
    }

    fn require_native(&self, asset: &str) -> BridgeResult<()> {
        if asset.is_empty() || asset == "BTC" {
            Ok(())
        } else {
            Err(BridgeError::InvalidInput(format!(
                "chain {} carries only its native asset, got {asset}",
                self.chain
            )))
        }
    }

    fn checked_address(&self, address: &str) -> BridgeResult<String> {
        let validation = self.validate_address(address);
        match validation.normalized {
            Some(normalized) if validation.valid => Ok(normalized),
            _ => Err(BridgeError::InvalidInput(format!(
                "invalid address for chain {}: {address}",
                self.chain
            ))),
        }
    }
}

#[async_trait]
impl<C: UtxoRpc + 'static> ChainAdapter for UtxoAdapter<C> {
    fn config(&self) -> &ChainAdapterConfig {
        &self.config
    }

    fn chain_id(&self) -> ChainId {
        self.chain
    }

    async fn connect(&self) -> BridgeResult<()> {
        let rpc = self.rpc.clone();
        let height = with_retries(
            self.chain,
            "getblockcount",
            &self.config,
            &self.metrics,
            move || {
                let rpc = rpc.clone();
                async move { rpc.block_count().await }
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
        let rpc = self.rpc.clone();
        let fee_rate = with_retries(
            self.chain,
            "estimatesmartfee",
            &self.config,
            &self.metrics,
            move || {
                let rpc = rpc.clone();
                async move { rpc.fee_rate(6).await }
            },
        )
        .await?
        // Representative price only; estimate_fee refuses to fall back.
        .unwrap_or(1);
        let info = ChainInfo {
            chain_id: self.chain,
            name: self.chain.to_string(),
            native_currency: "BTC".to_string(),
            decimals: 8,
            network: self.chain.network(),
            consensus: ConsensusFamily::ProofOfWork,
            fee_model: FeeModel::Legacy,
            block_time_ms: 600_000,
            gas_price: U256::from(fee_rate),
        };
        self.info_cache.update(info.clone()).await;
        Ok(info)
    }

    fn validate_address(&self, address: &str) -> AddressValidation {
        let Ok((hrp, version, program)) = bech32::segwit::decode(address) else {
            return AddressValidation::invalid();
        };
        if hrp != self.expected_hrp() {
            return AddressValidation::invalid();
        }
        match bech32::segwit::encode(hrp, version, &program) {
            Ok(normalized) => AddressValidation::valid(normalized),
            Err(_) => AddressValidation::invalid(),
        }
    }

    async fn get_balance(&self, address: &str, asset: Option<&str>) -> BridgeResult<U256> {
        self.require_native(asset.unwrap_or_default())?;
        let address = self.checked_address(address)?;
        let rpc = self.rpc.clone();
        let sats = with_retries(
            self.chain,
            "getaddressbalance",
            &self.config,
            &self.metrics,
            move || {
                let rpc = rpc.clone();
                let address = address.clone();
                async move { rpc.address_balance(&address).await }
            },
        )
        .await?;
        Ok(U256::from(sats))
    }

    async fn estimate_fee(&self, request: &TransferRequest) -> BridgeResult<FeeEstimate> {
        self.require_native(&request.asset)?;
        let rpc = self.rpc.clone();
        let fee_rate = with_retries(
            self.chain,
            "estimatesmartfee",
            &self.config,
            &self.metrics,
            move || {
                let rpc = rpc.clone();
                async move { rpc.fee_rate(6).await }
            },
        )
        .await?;
        // A node without estimator data must not be papered over with a
        // stale or zero rate.
        let fee_rate = fee_rate.ok_or_else(|| BridgeError::ChainUnreachable {
            chain: self.chain.to_string(),
            message: "fee estimator has no data".to_string(),
        })?;
        let rate = U256::from(fee_rate);
        let vsize = U256::from(ESTIMATED_VSIZE);
        Ok(FeeEstimate {
            fee_model: FeeModel::Legacy,
            gas_limit: vsize,
            gas_price: Some(rate),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            total_fee: rate * vsize,
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
        self.require_native(&request.asset)?;
        let from = self.checked_address(&request.source_address)?;
        // The destination belongs to the counterpart chain; only shape-check
        // it here.
        if request.destination_address.trim().is_empty() {
            return Err(BridgeError::InvalidInput(
                "destination address is required".to_string(),
            ));
        }
        let amount_sats = Self::parse_amount_sats(request.amount)?;

        let rpc = self.rpc.clone();
        let to = request.destination_address.clone();
        let key = idempotency_key.to_string();
        let txid = with_retries(
            self.chain,
            "bridge_sendlock",
            &self.config,
            &self.metrics,
            move || {
                let rpc = rpc.clone();
                let from = from.clone();
                let to = to.clone();
                let key = key.clone();
                // Safe to retry: the node deduplicates lock spends by key.
                async move { rpc.send_lock(&from, &to, amount_sats, &key).await }
            },
        )
        .await?;

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
        let to = self.checked_address(&transfer.source_address)?;
        let amount_sats = Self::parse_amount_sats(transfer.amount)?;
        let rpc = self.rpc.clone();
        let key = idempotency_key.to_string();
        let txid = with_retries(
            self.chain,
            "bridge_sendrelease",
            &self.config,
            &self.metrics,
            move || {
                let rpc = rpc.clone();
                let to = to.clone();
                let key = key.clone();
                // Safe to retry: the node deduplicates release spends by key.
                async move { rpc.send_release(&to, amount_sats, &key).await }
            },
        )
        .await?;
        let result = TransferResult {
            transfer_id: idempotency_key.to_string(),
            success: true,
            tx_hash: Some(txid),
        };
        self.submissions.record(idempotency_key, result.clone()).await;
        Ok(result)
    }

    async fn get_transfer_status(&self, tx_hash: &str) -> BridgeResult<TransferStatus> {
        let rpc = self.rpc.clone();
        let txid = tx_hash.to_string();
        let depth = self.config.confirmation_depth;
        let confirmations = with_retries(
            self.chain,
            "getrawtransaction",
            &self.config,
            &self.metrics,
            move || {
                let rpc = rpc.clone();
                let txid = txid.clone();
                async move { rpc.tx_confirmations(&txid).await }
            },
        )
        .await?;
        Ok(match confirmations {
            None | Some(0) => TransferStatus::Pending,
            Some(count) => {
                if count >= depth {
                    TransferStatus::Finalized
                } else {
                    TransferStatus::Confirmed {
                        confirmations: count,
                    }
                }
            }
        })
    }

    async fn fetch_inclusion_proof(
        &self,
        tx_hash: &str,
    ) -> BridgeResult<ProofVerificationRequest> {
        let rpc = self.rpc.clone();
        let txid = tx_hash.to_string();
        let raw = with_retries(
            self.chain,
            "bridge_gettransferproof",
            &self.config,
            &self.metrics,
            move || {
                let rpc = rpc.clone();
                let txid = txid.clone();
                async move { rpc.transfer_proof(&txid).await }
            },
        )
        .await?;
        Ok(ProofVerificationRequest::Merkle {
            leaf_hash: raw.leaf_hash,
            siblings: raw
                .siblings
                .into_iter()
                .map(|s| MerkleSibling {
                    hash: s.hash,
                    position: if s.left {
                        SiblingPosition::Left
                    } else {
                        SiblingPosition::Right
                    },
                })
                .collect(),
            expected_root: raw.root,
        })
    }

    async fn verify_proof(
        &self,
        request: &ProofVerificationRequest,
    ) -> BridgeResult<ProofVerdict> {
        // Signature proofs on this chain are operator attestations in
        // recoverable secp256k1 form; the chain itself proves inclusion via
        // SPV merkle paths.
        let verdict = proof::verify(request, SignatureScheme::EthereumPersonal, &self.zk_registry)?;
        self.metrics
            .proof_verifications
            .with_label_values(&[request.kind(), if verdict.valid { "valid" } else { "invalid" }])
            .inc();
        Ok(verdict)
    }

    async fn health_check(&self) -> HealthStatus {
        let rpc = self.rpc.clone();
        probe_health(self.chain, &self.metrics, async move {
            rpc.block_count().await
        })
        .await
    }

    // No contract capability: pure value-transfer chain.
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct MockUtxoRpc {
        height: u64,
        fee_rate: Option<u64>,
        balances: HashMap<String, u64>,
        confirmations: Mutex<HashMap<String, u64>>,
        sent: Mutex<Vec<String>>,
    }

    impl MockUtxoRpc {
        fn new() -> Self {
            Self {
                height: 800_000,
                fee_rate: Some(12),
                balances: HashMap::new(),
                confirmations: Mutex::new(HashMap::new()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl UtxoRpc for MockUtxoRpc {
        async fn block_count(&self) -> Result<u64, String> {
            Ok(self.height)
        }

        async fn address_balance(&self, address: &str) -> Result<u64, String> {
            Ok(*self.balances.get(address).unwrap_or(&0))
        }

        async fn fee_rate(&self, _target_blocks: u16) -> Result<Option<u64>, String> {
            Ok(self.fee_rate)
        }

        async fn send_lock(
            &self,
            _from: &str,
            _to: &str,
            _amount_sats: u64,
            key: &str,
        ) -> Result<String, String> {
            self.sent.lock().await.push(key.to_string());
            Ok(format!("txid-{key}"))
        }

        async fn send_release(
            &self,
            _to: &str,
            _amount_sats: u64,
            key: &str,
        ) -> Result<String, String> {
            Ok(format!("release-{key}"))
        }

        async fn tx_confirmations(&self, txid: &str) -> Result<Option<u64>, String> {
            Ok(self.confirmations.lock().await.get(txid).copied())
        }

        async fn transfer_proof(&self, _txid: &str) -> Result<RawUtxoProof, String> {
            Ok(RawUtxoProof {
                leaf_hash: H256::zero(),
                siblings: vec![],
                root: H256::zero(),
            })
        }
    }

    const MAINNET_ADDR: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

    fn adapter_for(chain: ChainId, rpc: Arc<MockUtxoRpc>) -> UtxoAdapter<MockUtxoRpc> {
        let config = ChainAdapterConfig::new(chain, "http://127.0.0.1:8332", 6);
        UtxoAdapter::from_rpc(
            rpc,
            config,
            Arc::new(BridgeMetrics::new_for_testing()),
            Arc::new(ZkVerifierRegistry::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_validate_address_bech32() {
        let adapter = adapter_for(ChainId::BtcMainnet, Arc::new(MockUtxoRpc::new()));

        let validation = adapter.validate_address(MAINNET_ADDR);
        assert!(validation.valid);
        assert_eq!(validation.normalized.unwrap(), MAINNET_ADDR);

        // Uppercase input normalizes to the canonical lowercase form.
        let validation = adapter.validate_address(&MAINNET_ADDR.to_uppercase());
        assert!(validation.valid);
        assert_eq!(validation.normalized.unwrap(), MAINNET_ADDR);

        // A testnet address never validates against mainnet.
        assert!(
            !adapter
                .validate_address("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx")
                .valid
        );

        // Checksum damage is rejected.
        assert!(
            !adapter
                .validate_address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t5")
                .valid
        );
        assert!(!adapter.validate_address("not-an-address").valid);
    }

    #[tokio::test]
    async fn test_estimate_fee_uses_legacy_model() {
        let adapter = adapter_for(ChainId::BtcMainnet, Arc::new(MockUtxoRpc::new()));
        let request = TransferRequest {
            source_chain: ChainId::BtcMainnet,
            destination_chain: ChainId::LedgerMainnet,
            source_address: MAINNET_ADDR.to_string(),
            destination_address: format!("0x{}", "11".repeat(32)),
            asset: String::new(),
            amount: U256::from(50_000u64),
        };
        let estimate = adapter.estimate_fee(&request).await.unwrap();
        assert_eq!(estimate.fee_model, FeeModel::Legacy);
        assert_eq!(estimate.gas_price, Some(U256::from(12u64)));
        assert!(estimate.max_fee_per_gas.is_none());
        assert_eq!(estimate.total_fee, U256::from(12 * ESTIMATED_VSIZE));
    }

    #[tokio::test]
    async fn test_estimate_fee_fails_without_oracle_data() {
        let mut rpc = MockUtxoRpc::new();
        rpc.fee_rate = None;
        let adapter = adapter_for(ChainId::BtcMainnet, Arc::new(rpc));
        let request = TransferRequest {
            source_chain: ChainId::BtcMainnet,
            destination_chain: ChainId::LedgerMainnet,
            source_address: MAINNET_ADDR.to_string(),
            destination_address: format!("0x{}", "11".repeat(32)),
            asset: String::new(),
            amount: U256::from(50_000u64),
        };
        let err = adapter.estimate_fee(&request).await.unwrap_err();
        assert_eq!(err.error_type(), "chain_unreachable");
    }

    #[tokio::test]
    async fn test_non_native_asset_rejected() {
        let adapter = adapter_for(ChainId::BtcMainnet, Arc::new(MockUtxoRpc::new()));
        let err = adapter
            .get_balance(MAINNET_ADDR, Some("USDC"))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "invalid_input");
    }

    #[tokio::test]
    async fn test_submit_is_idempotent_per_key() {
        let rpc = Arc::new(MockUtxoRpc::new());
        let adapter = adapter_for(ChainId::BtcMainnet, rpc.clone());
        let request = TransferRequest {
            source_chain: ChainId::BtcMainnet,
            destination_chain: ChainId::LedgerMainnet,
            source_address: MAINNET_ADDR.to_string(),
            destination_address: format!("0x{}", "11".repeat(32)),
            asset: String::new(),
            amount: U256::from(50_000u64),
        };
        let first = adapter.submit_transfer(&request, "transfer-1").await.unwrap();
        let second = adapter.submit_transfer(&request, "transfer-1").await.unwrap();
        assert_eq!(first, second);
        // Only one broadcast reached the node.
        assert_eq!(rpc.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_status_maps_confirmations() {
        let rpc = Arc::new(MockUtxoRpc::new());
        rpc.confirmations
            .lock()
            .await
            .insert("tx-a".to_string(), 2);
        rpc.confirmations
            .lock()
            .await
            .insert("tx-b".to_string(), 6);
        let adapter = adapter_for(ChainId::BtcMainnet, rpc);

        assert_eq!(
            adapter.get_transfer_status("tx-unknown").await.unwrap(),
            TransferStatus::Pending
        );
        assert_eq!(
            adapter.get_transfer_status("tx-a").await.unwrap(),
            TransferStatus::Confirmed { confirmations: 2 }
        );
        assert_eq!(
            adapter.get_transfer_status("tx-b").await.unwrap(),
            TransferStatus::Finalized
        );
    }

    #[test]
    fn test_no_contract_capability() {
        let adapter = adapter_for(ChainId::BtcMainnet, Arc::new(MockUtxoRpc::new()));
        assert!(adapter.contract_ops().is_none());
    }
}
