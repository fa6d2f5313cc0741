// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! External quorum authorization boundary.
//!
//! No adapter or detector decision alone may mint value: every transfer must
//! pass this capability between verification and any destination-side
//! mutation. The validator set and its consensus live outside this repo;
//! [`ThresholdQuorumClient`] aggregates member votes the way the production
//! deployment fronts its multi-signature service, and doubles as the
//! reference implementation for tests.

use crate::error::BridgeResult;
use crate::types::BridgeTransfer;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    Approved,
    Rejected(String),
}

impl AuthorizationDecision {
    pub fn approved(&self) -> bool {
        matches!(self, AuthorizationDecision::Approved)
    }
}

/// The single capability the orchestrator consumes at the
/// `Verified -> Authorized` transition. The transfer carries its accumulated
/// evidence (source tx hash, confirmations, proof) so the quorum can audit
/// without re-deriving state.
#[async_trait]
pub trait AuthorizationClient: Send + Sync {
    async fn request_authorization(
        &self,
        transfer: &BridgeTransfer,
    ) -> BridgeResult<AuthorizationDecision>;
}

/// Fixed-decision client, for wiring and tests.
pub struct StaticQuorumClient {
    decision: AuthorizationDecision,
}

impl StaticQuorumClient {
    pub fn approving() -> Self {
        Self {
            decision: AuthorizationDecision::Approved,
        }
    }

    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            decision: AuthorizationDecision::Rejected(reason.into()),
        }
    }
}

#[async_trait]
impl AuthorizationClient for StaticQuorumClient {
    async fn request_authorization(
        &self,
        _transfer: &BridgeTransfer,
    ) -> BridgeResult<AuthorizationDecision> {
        Ok(self.decision.clone())
    }
}

/// Aggregates independent member votes and approves once `threshold`
/// members have approved. Member failures count as rejections, never as
/// approvals.
pub struct ThresholdQuorumClient {
    members: Vec<Arc<dyn AuthorizationClient>>,
    threshold: usize,
}

impl ThresholdQuorumClient {
    pub fn new(members: Vec<Arc<dyn AuthorizationClient>>, threshold: usize) -> Self {
        assert!(
            threshold > 0 && threshold <= members.len(),
            "threshold {} out of range for {} members",
            threshold,
            members.len()
        );
        Self { members, threshold }
    }
}

#[async_trait]
impl AuthorizationClient for ThresholdQuorumClient {
    async fn request_authorization(
        &self,
        transfer: &BridgeTransfer,
    ) -> BridgeResult<AuthorizationDecision> {
        let mut votes: FuturesUnordered<_> = self
            .members
            .iter()
            .map(|member| member.request_authorization(transfer))
            .collect();

        let mut approvals = 0usize;
        let mut rejections = 0usize;
        let needed = self.threshold;
        let members = self.members.len();

        while let Some(vote) = votes.next().await {
            match vote {
                Ok(AuthorizationDecision::Approved) => approvals += 1,
                Ok(AuthorizationDecision::Rejected(reason)) => {
                    warn!(
                        "[Quorum] member rejected transfer {}: {}",
                        transfer.id, reason
                    );
                    rejections += 1;
                }
                Err(e) => {
                    warn!(
                        "[Quorum] member vote failed for transfer {}: {}",
                        transfer.id, e
                    );
                    rejections += 1;
                }
            }
            if approvals >= needed {
                info!(
                    "[Quorum] transfer {} authorized with {}/{} approvals",
                    transfer.id, approvals, members
                );
                return Ok(AuthorizationDecision::Approved);
            }
            // Bail out as soon as the threshold is unreachable.
            if members - rejections < needed {
                break;
            }
        }
        Ok(AuthorizationDecision::Rejected(format!(
            "{approvals} of {members} members approved, {needed} required"
        )))
    }
}
