// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Proof verification primitives shared by the chain adapters.
//!
//! Three proof schemes are normalized behind [`ProofVerificationRequest`]:
//! Merkle inclusion paths, recoverable secp256k1 signatures, and opaque
//! zero-knowledge proofs dispatched to a pluggable verifier by circuit id.

use crate::error::{BridgeError, BridgeResult};
use crate::types::{MerkleSibling, ProofVerdict, ProofVerificationRequest, SiblingPosition};
use ethers::types::{Address, Signature, H256};
use ethers::utils::keccak256;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// How a chain hashes the message before signature recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// EIP-191 personal-message prefix, the EVM convention. Also used for
    /// operator attestations on chains without their own recoverable scheme.
    EthereumPersonal,
    /// The message bytes are hashed with keccak256 and the digest is what
    /// was signed. The internal ledger signs this way.
    RawDigest,
}

/// Recompute the root by folding the sibling path against the leaf hash in
/// the given order and compare against the expected root.
///
/// Roots are not secret, so a plain comparison is sufficient here.
pub fn verify_merkle(
    leaf_hash: H256,
    siblings: &[MerkleSibling],
    expected_root: H256,
) -> ProofVerdict {
    let mut acc = leaf_hash;
    for sibling in siblings {
        let mut buf = [0u8; 64];
        match sibling.position {
            SiblingPosition::Left => {
                buf[..32].copy_from_slice(sibling.hash.as_bytes());
                buf[32..].copy_from_slice(acc.as_bytes());
            }
            SiblingPosition::Right => {
                buf[..32].copy_from_slice(acc.as_bytes());
                buf[32..].copy_from_slice(sibling.hash.as_bytes());
            }
        }
        acc = H256::from(keccak256(buf));
    }
    if acc == expected_root {
        ProofVerdict::valid()
    } else {
        ProofVerdict::invalid(format!(
            "computed root {acc:#x} does not match expected {expected_root:#x}"
        ))
    }
}

/// Check that the signer recovered from `signature` over `message` matches
/// the claimed address.
///
/// Malformed signature bytes or an unparseable claimed address are caller
/// mistakes and fail fast with `InvalidInput`; an honest mismatch yields an
/// invalid verdict.
pub fn verify_signature(
    message: &[u8],
    signature: &[u8],
    claimed_signer: &str,
    scheme: SignatureScheme,
) -> BridgeResult<ProofVerdict> {
    let signature = Signature::try_from(signature)
        .map_err(|e| BridgeError::InvalidInput(format!("malformed signature: {e}")))?;
    let claimed = Address::from_str(claimed_signer).map_err(|e| {
        BridgeError::InvalidInput(format!("malformed signer address {claimed_signer}: {e}"))
    })?;

    let recovered = match scheme {
        SignatureScheme::EthereumPersonal => signature.recover(message.to_vec()),
        SignatureScheme::RawDigest => signature.recover(H256::from(keccak256(message))),
    }
    .map_err(|e| BridgeError::InvalidInput(format!("unrecoverable signature: {e}")))?;

    if recovered == claimed {
        Ok(ProofVerdict::valid())
    } else {
        Ok(ProofVerdict::invalid(format!(
            "recovered signer {recovered:#x} does not match claimed {claimed:#x}"
        )))
    }
}

/// A verifier for one ZK circuit. Implementations wrap whatever proving
/// system the circuit was built with; the core only routes bytes.
pub trait ZkVerifier: Send + Sync {
    fn circuit_id(&self) -> &str;
    fn verify(&self, proof: &[u8], public_inputs: &[u8]) -> BridgeResult<bool>;
}

/// Circuit-id keyed registry of ZK verifiers.
#[derive(Default)]
pub struct ZkVerifierRegistry {
    verifiers: HashMap<String, Arc<dyn ZkVerifier>>,
}

impl ZkVerifierRegistry {
    pub fn new() -> Self {
        Self {
            verifiers: HashMap::new(),
        }
    }

    pub fn register(&mut self, verifier: Arc<dyn ZkVerifier>) {
        self.verifiers
            .insert(verifier.circuit_id().to_string(), verifier);
    }

    pub fn verify(&self, proof: &[u8], public_inputs: &[u8]) -> BridgeResult<ProofVerdict> {
        let (circuit_id, body) = extract_circuit_id(proof)?;
        match self.verifiers.get(circuit_id) {
            Some(verifier) => {
                if verifier.verify(body, public_inputs)? {
                    Ok(ProofVerdict::valid())
                } else {
                    Ok(ProofVerdict::invalid(format!(
                        "proof rejected by circuit {circuit_id}"
                    )))
                }
            }
            None => Ok(ProofVerdict::invalid(format!(
                "no verifier registered for circuit {circuit_id}"
            ))),
        }
    }
}

/// Split a ZK proof blob into its embedded circuit id and proof body.
///
/// Layout: one length byte, then that many bytes of UTF-8 circuit id, then
/// the proof body.
pub fn extract_circuit_id(proof: &[u8]) -> BridgeResult<(&str, &[u8])> {
    let (len, rest) = proof
        .split_first()
        .ok_or_else(|| BridgeError::InvalidInput("empty ZK proof".to_string()))?;
    let len = *len as usize;
    if len == 0 || rest.len() < len {
        return Err(BridgeError::InvalidInput(
            "ZK proof header is truncated".to_string(),
        ));
    }
    let (id_bytes, body) = rest.split_at(len);
    let circuit_id = std::str::from_utf8(id_bytes)
        .map_err(|_| BridgeError::InvalidInput("circuit id is not valid UTF-8".to_string()))?;
    Ok((circuit_id, body))
}

/// Prepend the length-prefixed circuit id header to a proof body.
pub fn encode_proof(circuit_id: &str, body: &[u8]) -> BridgeResult<Vec<u8>> {
    let id_bytes = circuit_id.as_bytes();
    if id_bytes.is_empty() || id_bytes.len() > u8::MAX as usize {
        return Err(BridgeError::InvalidInput(format!(
            "circuit id length {} out of range",
            id_bytes.len()
        )));
    }
    let mut out = Vec::with_capacity(1 + id_bytes.len() + body.len());
    out.push(id_bytes.len() as u8);
    out.extend_from_slice(id_bytes);
    out.extend_from_slice(body);
    Ok(out)
}

/// Dispatch a proof request to the verification routine for its variant.
pub fn verify(
    request: &ProofVerificationRequest,
    scheme: SignatureScheme,
    zk_registry: &ZkVerifierRegistry,
) -> BridgeResult<ProofVerdict> {
    match request {
        ProofVerificationRequest::Merkle {
            leaf_hash,
            siblings,
            expected_root,
        } => Ok(verify_merkle(*leaf_hash, siblings, *expected_root)),
        ProofVerificationRequest::Signature {
            message,
            signature,
            signer,
        } => verify_signature(message, signature, signer, scheme),
        ProofVerificationRequest::ZeroKnowledge {
            proof,
            public_inputs,
        } => zk_registry.verify(proof, public_inputs),
    }
}
