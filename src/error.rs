// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::types::TransferPhase;

/// Errors produced by the interoperability core.
///
/// The taxonomy distinguishes caller mistakes (never retried) from transient
/// chain conditions (retried per adapter policy) and from admission/verification
/// denials (surfaced with a specific reason, never silently retried).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    // Malformed address, amount, proof or request shape. Never retried.
    InvalidInput(String),
    // Chain RPC could not be reached after the adapter's retry budget.
    ChainUnreachable { chain: String, message: String },
    // Admission denial: the caller exceeded its sliding-window quota.
    RateLimited { retry_after_secs: u64 },
    // Admission denial: the transfer matched an attack pattern.
    AttackDetected { flags: Vec<String> },
    // The source-side lock transaction itself failed on-chain.
    SourceTxFailed(String),
    // Inclusion/signature/ZK proof failed verification.
    ProofInvalid(String),
    // The external quorum declined to authorize the transfer.
    AuthorizationDenied(String),
    // The transfer exceeded its overall lifetime and was swept.
    ExpiredTransfer(String),
    // No transfer with the given id exists.
    TransferNotFound(String),
    // A phase advance that the state machine forbids.
    InvalidPhaseTransition {
        from: TransferPhase,
        to: TransferPhase,
    },
    // Chain id not present in the adapter registry.
    UnsupportedChain(u8),
    // The chain has no programmable execution layer for the requested call.
    UnsupportedCapability(&'static str),
    // The requested operation is not legal in the transfer's current phase.
    IllegalTransferState(String),
    // Storage collaborator failure.
    StorageError(String),
    // Uncategorized error.
    InternalError(String),
}

impl BridgeError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::InvalidInput(_) => "invalid_input",
            BridgeError::ChainUnreachable { .. } => "chain_unreachable",
            BridgeError::RateLimited { .. } => "rate_limited",
            BridgeError::AttackDetected { .. } => "attack_detected",
            BridgeError::SourceTxFailed(_) => "source_tx_failed",
            BridgeError::ProofInvalid(_) => "proof_invalid",
            BridgeError::AuthorizationDenied(_) => "authorization_denied",
            BridgeError::ExpiredTransfer(_) => "expired_transfer",
            BridgeError::TransferNotFound(_) => "transfer_not_found",
            BridgeError::InvalidPhaseTransition { .. } => "invalid_phase_transition",
            BridgeError::UnsupportedChain(_) => "unsupported_chain",
            BridgeError::UnsupportedCapability(_) => "unsupported_capability",
            BridgeError::IllegalTransferState(_) => "illegal_transfer_state",
            BridgeError::StorageError(_) => "storage_error",
            BridgeError::InternalError(_) => "internal_error",
        }
    }

    /// Whether the failure is transient at the transfer level.
    ///
    /// Admission and verification denials are terminal for the transfer that
    /// triggered them; only infrastructure-level failures qualify for retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::ChainUnreachable { .. } | BridgeError::StorageError(_)
        )
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            BridgeError::ChainUnreachable { chain, message } => {
                write!(f, "chain {chain} unreachable: {message}")
            }
            BridgeError::RateLimited { retry_after_secs } => {
                write!(f, "rate limited, retry after {retry_after_secs}s")
            }
            BridgeError::AttackDetected { flags } => {
                write!(f, "attack detected: {}", flags.join(","))
            }
            BridgeError::SourceTxFailed(msg) => {
                write!(f, "source transaction failed: {msg}")
            }
            BridgeError::ProofInvalid(msg) => write!(f, "proof invalid: {msg}"),
            BridgeError::AuthorizationDenied(msg) => write!(f, "authorization denied: {msg}"),
            BridgeError::ExpiredTransfer(id) => write!(f, "transfer {id} expired"),
            BridgeError::TransferNotFound(id) => write!(f, "transfer {id} not found"),
            BridgeError::InvalidPhaseTransition { from, to } => {
                write!(f, "invalid phase transition {from} -> {to}")
            }
            BridgeError::UnsupportedChain(id) => write!(f, "unsupported chain id {id}"),
            BridgeError::UnsupportedCapability(cap) => {
                write!(f, "chain does not support capability: {cap}")
            }
            BridgeError::IllegalTransferState(msg) => write!(f, "illegal transfer state: {msg}"),
            BridgeError::StorageError(msg) => write!(f, "storage error: {msg}"),
            BridgeError::InternalError(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_stability() {
        // These labels feed monitoring dashboards - they MUST remain stable.
        let cases: Vec<(BridgeError, &'static str)> = vec![
            (BridgeError::InvalidInput("x".into()), "invalid_input"),
            (
                BridgeError::ChainUnreachable {
                    chain: "eth-mainnet".into(),
                    message: "timeout".into(),
                },
                "chain_unreachable",
            ),
            (
                BridgeError::RateLimited {
                    retry_after_secs: 30,
                },
                "rate_limited",
            ),
            (
                BridgeError::AttackDetected {
                    flags: vec!["SAME_BLOCK_ROUND_TRIP".into()],
                },
                "attack_detected",
            ),
            (
                BridgeError::SourceTxFailed("reverted".into()),
                "source_tx_failed",
            ),
            (BridgeError::ProofInvalid("root mismatch".into()), "proof_invalid"),
            (
                BridgeError::AuthorizationDenied("quorum below threshold".into()),
                "authorization_denied",
            ),
            (BridgeError::ExpiredTransfer("id".into()), "expired_transfer"),
            (BridgeError::UnsupportedChain(99), "unsupported_chain"),
            (BridgeError::StorageError("io".into()), "storage_error"),
            (BridgeError::InternalError("bug".into()), "internal_error"),
        ];
        for (error, expected) in cases {
            assert_eq!(error.error_type(), expected, "label for {:?}", error);
        }
    }

    #[test]
    fn test_error_type_valid_prometheus_labels() {
        let errors = vec![
            BridgeError::InvalidInput("x".into()),
            BridgeError::RateLimited {
                retry_after_secs: 1,
            },
            BridgeError::AttackDetected { flags: vec![] },
            BridgeError::UnsupportedCapability("contract_ops"),
            BridgeError::IllegalTransferState("x".into()),
        ];
        for error in errors {
            let label = error.error_type();
            assert!(!label.is_empty());
            for c in label.chars() {
                assert!(
                    c.is_ascii_lowercase() || c == '_',
                    "label '{}' contains invalid character '{}'",
                    label,
                    c
                );
            }
            assert!(!label.starts_with('_'));
            assert!(!label.ends_with('_'));
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BridgeError::ChainUnreachable {
            chain: "btc-mainnet".into(),
            message: "connection refused".into()
        }
        .is_retryable());
        assert!(BridgeError::StorageError("deadlock".into()).is_retryable());

        // Denials and verification failures must never be auto-retried.
        assert!(!BridgeError::ProofInvalid("bad path".into()).is_retryable());
        assert!(!BridgeError::AttackDetected { flags: vec![] }.is_retryable());
        assert!(!BridgeError::RateLimited {
            retry_after_secs: 5
        }
        .is_retryable());
        assert!(!BridgeError::AuthorizationDenied("no".into()).is_retryable());
        assert!(!BridgeError::InvalidInput("bad address".into()).is_retryable());
    }

    #[test]
    fn test_display_carries_specific_reason() {
        let err = BridgeError::RateLimited {
            retry_after_secs: 42,
        };
        assert!(err.to_string().contains("42"));

        let err = BridgeError::AttackDetected {
            flags: vec!["SAME_BLOCK_ROUND_TRIP".into(), "RAPID_SEQUENCE".into()],
        };
        let shown = err.to_string();
        assert!(shown.contains("SAME_BLOCK_ROUND_TRIP"));
        assert!(shown.contains("RAPID_SEQUENCE"));
    }
}
