// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{BridgeError, BridgeResult};
use crate::now_ms;
use ethers::types::{H256, U256};
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Chain identifiers routable by this bridge.
///
/// The internal ledger occupies the low range, external chain families the
/// ranges above it. Custom variants exist for local development networks.
#[derive(
    Debug,
    Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum ChainId {
    LedgerMainnet = 0,
    LedgerTestnet = 1,
    EthMainnet = 10,
    EthSepolia = 11,
    EthCustom = 12,
    BtcMainnet = 20,
    BtcTestnet = 21,
    BtcCustom = 22,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkClass {
    Mainnet,
    Testnet,
    Custom,
}

impl ChainId {
    /// Whether this chain is the platform's internal ledger.
    pub fn is_internal(self) -> bool {
        matches!(self, ChainId::LedgerMainnet | ChainId::LedgerTestnet)
    }

    pub fn network(self) -> NetworkClass {
        match self {
            ChainId::LedgerMainnet | ChainId::EthMainnet | ChainId::BtcMainnet => {
                NetworkClass::Mainnet
            }
            ChainId::LedgerTestnet | ChainId::EthSepolia | ChainId::BtcTestnet => {
                NetworkClass::Testnet
            }
            ChainId::EthCustom | ChainId::BtcCustom => NetworkClass::Custom,
        }
    }
}

/// A route is valid when it connects two distinct chains of compatible
/// network classes. Custom (local dev) chains pair with anything.
pub fn is_route_valid(source: ChainId, destination: ChainId) -> bool {
    if source == destination {
        return false;
    }
    let (a, b) = (source.network(), destination.network());
    a == NetworkClass::Custom || b == NetworkClass::Custom || a == b
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusFamily {
    ProofOfWork,
    ProofOfStake,
    Bft,
}

/// Fee pricing model of a chain: a single legacy gas/fee price, or a dynamic
/// base + priority split.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeModel {
    Legacy,
    Dynamic,
}

/// Descriptive snapshot of a chain. Refreshed on demand by its adapter;
/// carries no identity beyond the chain id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain_id: ChainId,
    pub name: String,
    pub native_currency: String,
    pub decimals: u8,
    pub network: NetworkClass,
    pub consensus: ConsensusFamily,
    pub fee_model: FeeModel,
    /// Nominal block time in milliseconds.
    pub block_time_ms: u64,
    /// Representative gas/fee price in the chain's base fee units.
    pub gas_price: U256,
}

/// Result of syntactic address validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressValidation {
    pub valid: bool,
    /// Canonical form of the address when valid (e.g. EIP-55 checksum,
    /// lowercase bech32).
    pub normalized: Option<String>,
}

impl AddressValidation {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            normalized: None,
        }
    }

    pub fn valid(normalized: impl Into<String>) -> Self {
        Self {
            valid: true,
            normalized: Some(normalized.into()),
        }
    }
}

/// Fee estimate shaped by the chain's pricing model. `total_fee` is always
/// populated; the per-model fields are filled according to `fee_model`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub fee_model: FeeModel,
    pub gas_limit: U256,
    /// Legacy single price (or UTXO fee rate per vbyte).
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub total_fee: U256,
}

/// Immutable input for one cross-chain transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub source_address: String,
    pub destination_address: String,
    /// Asset identifier; the empty string or the chain's native symbol
    /// addresses the native asset.
    pub asset: String,
    /// Amount in base units. Arbitrary precision, never floating point.
    pub amount: U256,
}

impl TransferRequest {
    /// Shape-level validation. Adapter-level address grammar checks happen
    /// separately, against each chain's own rules.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.amount.is_zero() {
            return Err(BridgeError::InvalidInput(
                "transfer amount must be strictly positive".to_string(),
            ));
        }
        if self.source_address.trim().is_empty() || self.destination_address.trim().is_empty() {
            return Err(BridgeError::InvalidInput(
                "source and destination addresses are required".to_string(),
            ));
        }
        if !is_route_valid(self.source_chain, self.destination_chain) {
            return Err(BridgeError::InvalidInput(format!(
                "route {} -> {} is not valid",
                self.source_chain, self.destination_chain
            )));
        }
        Ok(())
    }
}

/// Outcome of a single submission attempt. Append-only: a retried submission
/// produces a new result, it never overwrites a prior one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer_id: String,
    pub success: bool,
    pub tx_hash: Option<String>,
}

/// On-chain lifecycle of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    Confirmed { confirmations: u64 },
    Finalized,
    Failed,
}

/// Phases of the transfer state machine. Transitions are monotonic and
/// enforced by [`BridgeTransfer::transition`]; the verify phase can never be
/// skipped.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferPhase {
    Requested,
    Admitted,
    Locked,
    ProofPending,
    Verified,
    Authorized,
    MintedUnlocked,
    Completed,
    Rejected,
    Reverted,
}

impl TransferPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferPhase::Completed | TransferPhase::Rejected | TransferPhase::Reverted
        )
    }

    /// Legal next phases. `Reverted` is reachable from every phase at or
    /// after `Requested` so the expiry sweep can always terminate a stuck
    /// transfer; `Rejected` is only reachable before funds are locked.
    pub fn can_transition_to(self, next: TransferPhase) -> bool {
        use TransferPhase::*;
        match (self, next) {
            (Requested, Admitted) | (Requested, Rejected) | (Requested, Reverted) => true,
            (Admitted, Locked) | (Admitted, Rejected) | (Admitted, Reverted) => true,
            (Locked, ProofPending) | (Locked, Reverted) => true,
            (ProofPending, Verified) | (ProofPending, Reverted) => true,
            (Verified, Authorized) | (Verified, Reverted) => true,
            (Authorized, MintedUnlocked) | (Authorized, Reverted) => true,
            (MintedUnlocked, Completed) | (MintedUnlocked, Reverted) => true,
            _ => false,
        }
    }

    /// Metrics label for this phase.
    pub fn as_label(self) -> &'static str {
        match self {
            TransferPhase::Requested => "requested",
            TransferPhase::Admitted => "admitted",
            TransferPhase::Locked => "locked",
            TransferPhase::ProofPending => "proof_pending",
            TransferPhase::Verified => "verified",
            TransferPhase::Authorized => "authorized",
            TransferPhase::MintedUnlocked => "minted_unlocked",
            TransferPhase::Completed => "completed",
            TransferPhase::Rejected => "rejected",
            TransferPhase::Reverted => "reverted",
        }
    }
}

/// Terminal outcome recorded on a finished transfer.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOutcome {
    Completed,
    Reverted,
    Expired,
}

/// What the destination adapter does once a transfer is authorized: mint a
/// wrapped representation, or release pre-escrowed liquidity.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestinationAction {
    Mint,
    Unlock,
}

impl DestinationAction {
    pub fn for_route(destination: ChainId) -> Self {
        if destination.is_internal() {
            DestinationAction::Mint
        } else {
            DestinationAction::Unlock
        }
    }
}

/// Position of a sibling hash along a Merkle path, relative to the running
/// hash being folded upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiblingPosition {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleSibling {
    pub hash: H256,
    pub position: SiblingPosition,
}

/// Proof material handed to an adapter for verification. Exactly one variant
/// per request; adapters dispatch on the tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofVerificationRequest {
    Merkle {
        leaf_hash: H256,
        /// Ordered siblings from leaf level to the root.
        siblings: Vec<MerkleSibling>,
        expected_root: H256,
    },
    ZeroKnowledge {
        /// Opaque proof bytes. The circuit id is embedded as a
        /// length-prefixed header, see `proof::extract_circuit_id`.
        proof: Vec<u8>,
        public_inputs: Vec<u8>,
    },
    Signature {
        message: Vec<u8>,
        signature: Vec<u8>,
        /// Address the signature is claimed to originate from, in the
        /// verifying chain's address format.
        signer: String,
    },
}

impl ProofVerificationRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            ProofVerificationRequest::Merkle { .. } => "merkle",
            ProofVerificationRequest::ZeroKnowledge { .. } => "zk",
            ProofVerificationRequest::Signature { .. } => "signature",
        }
    }
}

/// Verdict from proof verification, with a reason when invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofVerdict {
    pub valid: bool,
    pub reason: Option<String>,
}

impl ProofVerdict {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// The long-lived orchestration record for one cross-chain transfer.
///
/// Mutated only by the orchestrator task driving this transfer id; the
/// amount is immutable after creation and fees are tracked separately from
/// principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeTransfer {
    pub id: String,
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub source_address: String,
    pub destination_address: String,
    pub asset: String,
    pub amount: U256,
    /// Fees deducted so far, never folded into `amount`.
    pub fee_paid: U256,
    pub action: DestinationAction,
    pub phase: TransferPhase,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub source_tx_hash: Option<String>,
    pub destination_tx_hash: Option<String>,
    pub confirmations: u64,
    /// Inclusion proof captured once the source transaction finalized.
    pub proof: Option<ProofVerificationRequest>,
    pub outcome: Option<TransferOutcome>,
    pub rejection_reason: Option<String>,
    /// Set once the source-side lock has been released on the revert path.
    pub source_released: bool,
}

impl BridgeTransfer {
    pub fn new(request: &TransferRequest) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_chain: request.source_chain,
            destination_chain: request.destination_chain,
            source_address: request.source_address.clone(),
            destination_address: request.destination_address.clone(),
            asset: request.asset.clone(),
            amount: request.amount,
            fee_paid: U256::zero(),
            action: DestinationAction::for_route(request.destination_chain),
            phase: TransferPhase::Requested,
            created_at_ms: now,
            updated_at_ms: now,
            source_tx_hash: None,
            destination_tx_hash: None,
            confirmations: 0,
            proof: None,
            outcome: None,
            rejection_reason: None,
            source_released: false,
        }
    }

    /// Advance to `next`, enforcing the state machine. Updates the record's
    /// timestamp on success.
    pub fn transition(&mut self, next: TransferPhase) -> BridgeResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(BridgeError::InvalidPhaseTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.updated_at_ms = now_ms();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// The request this record was created from, reconstructed for adapter
    /// submission.
    pub fn request(&self) -> TransferRequest {
        TransferRequest {
            source_chain: self.source_chain,
            destination_chain: self.destination_chain,
            source_address: self.source_address.clone(),
            destination_address: self.destination_address.clone(),
            asset: self.asset.clone(),
            amount: self.amount,
        }
    }
}
