// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! EVM-family chain adapter.
//!
//! Generic over the JSON-RPC transport so tests run against a mock provider.
//! Fee estimation follows the dynamic base + priority model; addresses are
//! validated against the EIP-55 checksum grammar without touching the
//! network.

use super::{
    probe_health, status_from_depth, with_retries, ChainAdapter, ChainInfoCache, ContractOps,
    HealthStatus, SubmissionLedger,
};
use crate::config::ChainAdapterConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics::BridgeMetrics;
use crate::proof::{self, SignatureScheme, ZkVerifierRegistry};
use crate::types::{
    AddressValidation, ChainId, ChainInfo, ConsensusFamily, FeeEstimate, FeeModel,
    ProofVerdict, ProofVerificationRequest, TransferRequest, TransferResult, TransferStatus,
};
use async_trait::async_trait;
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use ethers::utils::to_checksum;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Gas ceiling for a native value transfer.
const NATIVE_TRANSFER_GAS: u64 = 21_000;
/// Gas ceiling for an ERC-20 `transfer` call.
const TOKEN_TRANSFER_GAS: u64 = 65_000;
/// `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
/// `transfer(address,uint256)` selector.
const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Wire shape of the inclusion proof returned by the bridge-aware fullnode.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMerkleProof {
    leaf_hash: H256,
    siblings: Vec<RawSibling>,
    root: H256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSibling {
    hash: H256,
    left: bool,
}

pub struct EvmAdapter<P> {
    chain: ChainId,
    config: ChainAdapterConfig,
    provider: Provider<P>,
    metrics: Arc<BridgeMetrics>,
    zk_registry: Arc<ZkVerifierRegistry>,
    info_cache: ChainInfoCache,
    submissions: SubmissionLedger,
}

impl EvmAdapter<Http> {
    pub fn new(
        config: ChainAdapterConfig,
        metrics: Arc<BridgeMetrics>,
        zk_registry: Arc<ZkVerifierRegistry>,
    ) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())?;
        Ok(Self::from_provider(provider, config, metrics, zk_registry)?)
    }
}

impl<P> EvmAdapter<P>
where
    P: JsonRpcClient + Clone + 'static,
{
    /// Construct over an existing provider; performs no network I/O.
    pub fn from_provider(
        provider: Provider<P>,
        config: ChainAdapterConfig,
        metrics: Arc<BridgeMetrics>,
        zk_registry: Arc<ZkVerifierRegistry>,
    ) -> anyhow::Result<Self> {
        let chain = config.chain()?;
        Ok(Self {
            chain,
            config,
            provider,
            metrics,
            zk_registry,
            info_cache: ChainInfoCache::new(Duration::from_secs(30)),
            submissions: SubmissionLedger::new(),
        })
    }

    /// The EVM network id this bridge chain id must be served by, when it
    /// pins one.
    fn expected_evm_chain_id(&self) -> Option<u64> {
        match self.chain {
            ChainId::EthMainnet => Some(1),
            ChainId::EthSepolia => Some(11_155_111),
            _ => None,
        }
    }

    fn parse_address(&self, address: &str) -> BridgeResult<Address> {
        let validation = self.validate_address(address);
        if !validation.valid {
            return Err(BridgeError::InvalidInput(format!(
                "invalid EVM address: {address}"
            )));
        }
        Address::from_str(address)
            .map_err(|e| BridgeError::InvalidInput(format!("invalid EVM address {address}: {e}")))
    }

    fn parse_tx_hash(tx_hash: &str) -> BridgeResult<H256> {
        tx_hash
            .parse::<H256>()
            .map_err(|e| BridgeError::InvalidInput(format!("invalid tx hash {tx_hash}: {e}")))
    }

    fn build_transfer_tx(
        &self,
        request: &TransferRequest,
        idempotency_key: &str,
    ) -> BridgeResult<TransactionRequest> {
        let from = self.parse_address(&request.source_address)?;
        if request.asset.is_empty() || request.asset == "ETH" {
            // Native transfer; the idempotency key rides in calldata so the
            // escrow side can deduplicate rebroadcasts of the same lock.
            Ok(TransactionRequest::new()
                .from(from)
                .to(self.parse_address(&request.destination_address)?)
                .value(request.amount)
                .data(Bytes::from(idempotency_key.as_bytes().to_vec())))
        } else {
            let token = Address::from_str(&request.asset).map_err(|e| {
                BridgeError::InvalidInput(format!("invalid token address {}: {e}", request.asset))
            })?;
            let to = self.parse_address(&request.destination_address)?;
            let mut data = Vec::with_capacity(4 + 32 + 32);
            data.extend_from_slice(&TRANSFER_SELECTOR);
            data.extend_from_slice(&[0u8; 12]);
            data.extend_from_slice(to.as_bytes());
            let mut amount = [0u8; 32];
            request.amount.to_big_endian(&mut amount);
            data.extend_from_slice(&amount);
            Ok(TransactionRequest::new()
                .from(from)
                .to(token)
                .data(Bytes::from(data)))
        }
    }
}

#[async_trait]
impl<P> ChainAdapter for EvmAdapter<P>
where
    P: JsonRpcClient + Clone + 'static,
{
    fn config(&self) -> &ChainAdapterConfig {
        &self.config
    }

    fn chain_id(&self) -> ChainId {
        self.chain
    }

    async fn connect(&self) -> BridgeResult<()> {
        let provider = self.provider.clone();
        let network_id = with_retries(
            self.chain,
            "eth_chainId",
            &self.config,
            &self.metrics,
            move || {
                let provider = provider.clone();
                async move { provider.get_chainid().await }
            },
        )
        .await?
        .as_u64();

        if let Some(expected) = self.expected_evm_chain_id() {
            if network_id != expected {
                return Err(BridgeError::InvalidInput(format!(
                    "chain id mismatch: expected {expected}, endpoint serves {network_id}"
                )));
            }
        }
        info!("[{}] connected, network id {}", self.chain, network_id);
        Ok(())
    }

    async fn chain_info(&self) -> BridgeResult<ChainInfo> {
        if let Some(info) = self.info_cache.get().await {
            return Ok(info);
        }
        let provider = self.provider.clone();
        let gas_price = with_retries(
            self.chain,
            "eth_gasPrice",
            &self.config,
            &self.metrics,
            move || {
                let provider = provider.clone();
                async move { provider.get_gas_price().await }
            },
        )
        .await?;
        let info = ChainInfo {
            chain_id: self.chain,
            name: self.chain.to_string(),
            native_currency: "ETH".to_string(),
            decimals: 18,
            network: self.chain.network(),
            consensus: ConsensusFamily::ProofOfStake,
            fee_model: FeeModel::Dynamic,
            block_time_ms: 12_000,
            gas_price,
        };
        self.info_cache.update(info.clone()).await;
        Ok(info)
    }

    fn validate_address(&self, address: &str) -> AddressValidation {
        let Some(hex) = address.strip_prefix("0x") else {
            return AddressValidation::invalid();
        };
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return AddressValidation::invalid();
        }
        let Ok(parsed) = Address::from_str(address) else {
            return AddressValidation::invalid();
        };
        let checksummed = to_checksum(&parsed, None);
        let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower && address != checksummed {
            // Mixed case claims an EIP-55 checksum; a wrong one is a typo.
            return AddressValidation::invalid();
        }
        AddressValidation::valid(checksummed)
    }

    async fn get_balance(&self, address: &str, asset: Option<&str>) -> BridgeResult<U256> {
        let holder = self.parse_address(address)?;
        match asset {
            None => {
                let provider = self.provider.clone();
                with_retries(
                    self.chain,
                    "eth_getBalance",
                    &self.config,
                    &self.metrics,
                    move || {
                        let provider = provider.clone();
                        async move { provider.get_balance(holder, None).await }
                    },
                )
                .await
            }
            Some(token) => {
                let token = Address::from_str(token).map_err(|e| {
                    BridgeError::InvalidInput(format!("invalid token address {token}: {e}"))
                })?;
                let mut data = Vec::with_capacity(4 + 32);
                data.extend_from_slice(&BALANCE_OF_SELECTOR);
                data.extend_from_slice(&[0u8; 12]);
                data.extend_from_slice(holder.as_bytes());
                let call: TypedTransaction = TransactionRequest::new()
                    .to(token)
                    .data(Bytes::from(data))
                    .into();
                let provider = self.provider.clone();
                let raw = with_retries(
                    self.chain,
                    "eth_call",
                    &self.config,
                    &self.metrics,
                    move || {
                        let provider = provider.clone();
                        let call = call.clone();
                        async move { provider.call(&call, None).await }
                    },
                )
                .await?;
                if raw.len() < 32 {
                    return Err(BridgeError::InvalidInput(
                        "balanceOf returned malformed word".to_string(),
                    ));
                }
                Ok(U256::from_big_endian(&raw[..32]))
            }
        }
    }

    async fn estimate_fee(&self, request: &TransferRequest) -> BridgeResult<FeeEstimate> {
        let provider = self.provider.clone();
        let (max_fee, priority_fee) = with_retries(
            self.chain,
            "eth_feeHistory",
            &self.config,
            &self.metrics,
            move || {
                let provider = provider.clone();
                async move { provider.estimate_eip1559_fees(None).await }
            },
        )
        .await?;
        let gas_limit = if request.asset.is_empty() || request.asset == "ETH" {
            U256::from(NATIVE_TRANSFER_GAS)
        } else {
            U256::from(TOKEN_TRANSFER_GAS)
        };
        Ok(FeeEstimate {
            fee_model: FeeModel::Dynamic,
            gas_limit,
            gas_price: None,
            max_fee_per_gas: Some(max_fee),
            max_priority_fee_per_gas: Some(priority_fee),
            total_fee: max_fee * gas_limit,
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
        let tx = self.build_transfer_tx(request, idempotency_key)?;

        // Single broadcast attempt, bounded by the request timeout. On-chain
        // the lock call is keyed by the idempotency key, so a rebroadcast of
        // the same key after an ambiguous timeout cannot create a second
        // lock.
        let provider = self.provider.clone();
        let send = async move {
            provider
                .send_transaction(tx, None)
                .await
                .map(|pending| *pending)
        };
        let tx_hash = tokio::time::timeout(self.config.request_timeout(), send)
            .await
            .map_err(|_| BridgeError::ChainUnreachable {
                chain: self.chain.to_string(),
                message: format!("submit timed out after {}ms", self.config.request_timeout_ms),
            })?
            .map_err(|e| BridgeError::ChainUnreachable {
                chain: self.chain.to_string(),
                message: format!("submit failed: {e}"),
            })?;

        let result = TransferResult {
            transfer_id: idempotency_key.to_string(),
            success: true,
            tx_hash: Some(format!("{tx_hash:#x}")),
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
        // Refund spend back to the locked principal's owner, keyed so the
        // escrow contract deduplicates replays.
        let to = self.parse_address(&transfer.source_address)?;
        let tx = TransactionRequest::new()
            .to(to)
            .value(transfer.amount)
            .data(Bytes::from(idempotency_key.as_bytes().to_vec()));
        let provider = self.provider.clone();
        let send = async move {
            provider
                .send_transaction(tx, None)
                .await
                .map(|pending| *pending)
        };
        let tx_hash = tokio::time::timeout(self.config.request_timeout(), send)
            .await
            .map_err(|_| BridgeError::ChainUnreachable {
                chain: self.chain.to_string(),
                message: format!(
                    "release timed out after {}ms",
                    self.config.request_timeout_ms
                ),
            })?
            .map_err(|e| BridgeError::ChainUnreachable {
                chain: self.chain.to_string(),
                message: format!("release failed: {e}"),
            })?;
        let result = TransferResult {
            transfer_id: idempotency_key.to_string(),
            success: true,
            tx_hash: Some(format!("{tx_hash:#x}")),
        };
        self.submissions.record(idempotency_key, result.clone()).await;
        Ok(result)
    }

    async fn get_transfer_status(&self, tx_hash: &str) -> BridgeResult<TransferStatus> {
        let hash = Self::parse_tx_hash(tx_hash)?;
        let provider = self.provider.clone();
        let depth = self.config.confirmation_depth;
        with_retries(
            self.chain,
            "eth_getTransactionReceipt",
            &self.config,
            &self.metrics,
            move || {
                let provider = provider.clone();
                async move {
                    let receipt = provider.get_transaction_receipt(hash).await?;
                    let Some(receipt) = receipt else {
                        return Ok::<_, ethers::providers::ProviderError>(TransferStatus::Pending);
                    };
                    if receipt.status == Some(0.into()) {
                        return Ok(TransferStatus::Failed);
                    }
                    let Some(tx_block) = receipt.block_number else {
                        return Ok(TransferStatus::Pending);
                    };
                    let latest = provider.get_block_number().await?;
                    Ok(status_from_depth(
                        tx_block.as_u64(),
                        latest.as_u64(),
                        depth,
                    ))
                }
            },
        )
        .await
    }

    async fn fetch_inclusion_proof(
        &self,
        tx_hash: &str,
    ) -> BridgeResult<ProofVerificationRequest> {
        let hash = Self::parse_tx_hash(tx_hash)?;
        let provider = self.provider.clone();
        let raw: RawMerkleProof = with_retries(
            self.chain,
            "bridge_getTransferProof",
            &self.config,
            &self.metrics,
            move || {
                let provider = provider.clone();
                async move {
                    provider
                        .request("bridge_getTransferProof", [hash])
                        .await
                }
            },
        )
        .await?;
        Ok(ProofVerificationRequest::Merkle {
            leaf_hash: raw.leaf_hash,
            siblings: raw
                .siblings
                .into_iter()
                .map(|s| crate::types::MerkleSibling {
                    hash: s.hash,
                    position: if s.left {
                        crate::types::SiblingPosition::Left
                    } else {
                        crate::types::SiblingPosition::Right
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
        let verdict = proof::verify(request, SignatureScheme::EthereumPersonal, &self.zk_registry)?;
        self.metrics
            .proof_verifications
            .with_label_values(&[request.kind(), if verdict.valid { "valid" } else { "invalid" }])
            .inc();
        Ok(verdict)
    }

    async fn health_check(&self) -> HealthStatus {
        let provider = self.provider.clone();
        probe_health(self.chain, &self.metrics, async move {
            provider.get_block_number().await.map(|b| b.as_u64())
        })
        .await
    }

    fn contract_ops(&self) -> Option<&dyn ContractOps> {
        Some(self)
    }
}

#[async_trait]
impl<P> ContractOps for EvmAdapter<P>
where
    P: JsonRpcClient + Clone + 'static,
{
    async fn deploy_contract(&self, bytecode: Vec<u8>) -> BridgeResult<String> {
        if bytecode.is_empty() {
            return Err(BridgeError::InvalidInput("empty bytecode".to_string()));
        }
        let tx = TransactionRequest::new().data(Bytes::from(bytecode));
        let receipt = self
            .provider
            .send_transaction(tx, None)
            .await
            .map_err(|e| BridgeError::ChainUnreachable {
                chain: self.chain.to_string(),
                message: format!("deploy broadcast failed: {e}"),
            })?
            .await
            .map_err(|e| BridgeError::ChainUnreachable {
                chain: self.chain.to_string(),
                message: format!("deploy confirmation failed: {e}"),
            })?;
        let address = receipt
            .and_then(|r| r.contract_address)
            .ok_or_else(|| BridgeError::InternalError("deploy produced no address".to_string()))?;
        Ok(to_checksum(&address, None))
    }

    async fn call_contract(&self, address: &str, data: Vec<u8>) -> BridgeResult<Vec<u8>> {
        let contract = self.parse_address(address)?;
        let call: TypedTransaction = TransactionRequest::new()
            .to(contract)
            .data(Bytes::from(data))
            .into();
        let provider = self.provider.clone();
        let raw = with_retries(
            self.chain,
            "eth_call",
            &self.config,
            &self.metrics,
            move || {
                let provider = provider.clone();
                let call = call.clone();
                async move { provider.call(&call, None).await }
            },
        )
        .await?;
        Ok(raw.to_vec())
    }
}
