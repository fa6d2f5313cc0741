// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Flash-loan attack detector.
//!
//! A heuristic classifier over per-address deposit/withdraw history. It uses
//! only information available before a transfer completes, without an
//! external oracle. The canonical signature is the same-block round-trip:
//! borrow and repay atomically inside one block. Supporting heuristics
//! (rapid sequence, repeated large amounts) raise informational flags that
//! escalate but do not block on their own.
//!
//! `analyze_transfer` is a pure function of recorded history except for the
//! state it explicitly records itself: large-amount observations and, when
//! it blocks, an entry in the bounded recent-attacks ring.

use crate::config::DetectorConfig;
use crate::metrics::BridgeMetrics;
use crate::now_ms;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum_macros::Display;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

pub const FLAG_SAME_BLOCK_ROUND_TRIP: &str = "SAME_BLOCK_ROUND_TRIP";
pub const FLAG_RAPID_SEQUENCE: &str = "RAPID_SEQUENCE";
pub const FLAG_LARGE_AMOUNT_PATTERN: &str = "LARGE_AMOUNT_PATTERN";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One triggered rule with its severity and a human-readable detail.
#[derive(Debug, Clone)]
pub struct DetectionReason {
    pub flag: &'static str,
    pub severity: Severity,
    pub detail: String,
}

/// Attack record retained for operator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedAttack {
    pub tx_id: String,
    pub source_address: String,
    pub detected_at_ms: u64,
}

/// Verdict for one prospective transfer. `allowed()` and `blocked()` are
/// mutually exclusive by construction.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    blocked: bool,
    pub flags: Vec<String>,
    pub reasons: Vec<DetectionReason>,
    pub attack: Option<DetectedAttack>,
}

impl DetectionResult {
    pub fn allowed(&self) -> bool {
        !self.blocked
    }

    pub fn blocked(&self) -> bool {
        self.blocked
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    pub fn severity_of(&self, flag: &str) -> Option<Severity> {
        self.reasons
            .iter()
            .find(|r| r.flag == flag)
            .map(|r| r.severity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Deposit,
    Withdrawal,
}

/// A prospective transfer under analysis: the would-be withdrawal.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    pub source_address: String,
    pub amount: U256,
    /// Block the transfer would land in (the chain's current head).
    pub block_number: u64,
    pub tx_id: String,
}

#[derive(Debug, Clone)]
struct HistoryEvent {
    kind: TransferKind,
    #[allow(dead_code)]
    amount: U256,
    block_number: u64,
    tx_id: String,
    recorded_at: Instant,
}

#[derive(Default)]
struct AddressState {
    /// Bounded event ring, oldest first.
    events: VecDeque<HistoryEvent>,
    /// Timestamps of large transfers observed by `analyze_transfer`.
    large_observations: VecDeque<Instant>,
}

pub struct FlashLoanDetector {
    config: DetectorConfig,
    /// Lock-per-address so unrelated addresses never contend.
    addresses: RwLock<HashMap<String, Arc<Mutex<AddressState>>>>,
    recent_attacks: Mutex<VecDeque<DetectedAttack>>,
    metrics: Arc<BridgeMetrics>,
}

impl FlashLoanDetector {
    pub fn new(config: DetectorConfig, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            config,
            addresses: RwLock::new(HashMap::new()),
            recent_attacks: Mutex::new(VecDeque::new()),
            metrics,
        }
    }

    async fn state_for(&self, address: &str) -> Arc<Mutex<AddressState>> {
        if let Some(state) = self.addresses.read().await.get(address) {
            return state.clone();
        }
        let mut addresses = self.addresses.write().await;
        addresses
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(AddressState::default())))
            .clone()
    }

    async fn record(
        &self,
        kind: TransferKind,
        address: &str,
        amount: U256,
        block_number: u64,
        tx_id: &str,
    ) {
        let state = self.state_for(address).await;
        let mut state = state.lock().await;
        while state.events.len() >= self.config.history_capacity {
            state.events.pop_front();
        }
        state.events.push_back(HistoryEvent {
            kind,
            amount,
            block_number,
            tx_id: tx_id.to_string(),
            recorded_at: Instant::now(),
        });
    }

    pub async fn record_deposit(
        &self,
        address: &str,
        amount: U256,
        block_number: u64,
        tx_id: &str,
    ) {
        self.record(TransferKind::Deposit, address, amount, block_number, tx_id)
            .await;
    }

    pub async fn record_withdrawal(
        &self,
        address: &str,
        amount: U256,
        block_number: u64,
        tx_id: &str,
    ) {
        self.record(
            TransferKind::Withdrawal,
            address,
            amount,
            block_number,
            tx_id,
        )
        .await;
    }

    /// Classify a prospective transfer against the address's recorded
    /// history. Flags are additive; only a Critical reason blocks.
    pub async fn analyze_transfer(&self, request: &AnalyzeRequest) -> DetectionResult {
        let state = self.state_for(&request.source_address).await;
        let mut state = state.lock().await;
        let mut reasons: Vec<DetectionReason> = Vec::new();

        // Same-block round-trip: a prior deposit in the very block this
        // withdrawal would land in. Strictly same-block; amounts play no
        // part in the rule.
        if let Some(deposit) = state.events.iter().find(|e| {
            e.kind == TransferKind::Deposit && e.block_number == request.block_number
        }) {
            reasons.push(DetectionReason {
                flag: FLAG_SAME_BLOCK_ROUND_TRIP,
                severity: Severity::Critical,
                detail: format!(
                    "deposit {} and withdrawal in the same block {}",
                    deposit.tx_id, request.block_number
                ),
            });
        }

        // Rapid sequence: transfer volume from this address inside the
        // sliding window. Informational on its own.
        let window = Duration::from_secs(self.config.rapid_sequence_window_secs);
        let recent = state
            .events
            .iter()
            .filter(|e| e.recorded_at.elapsed() < window)
            .count();
        if recent > self.config.rapid_sequence_threshold {
            reasons.push(DetectionReason {
                flag: FLAG_RAPID_SEQUENCE,
                severity: Severity::Low,
                detail: format!(
                    "{recent} transfers within {}s",
                    self.config.rapid_sequence_window_secs
                ),
            });
        }

        // Large-amount pattern: one whale transfer is Medium; a repeat
        // within the tracking window escalates to High.
        if request.amount >= self.config.large_amount_threshold {
            let tracking = Duration::from_secs(self.config.tracking_window_secs);
            while let Some(oldest) = state.large_observations.front() {
                if oldest.elapsed() >= tracking {
                    state.large_observations.pop_front();
                } else {
                    break;
                }
            }
            let occurrences = state.large_observations.len() + 1;
            state.large_observations.push_back(Instant::now());
            if state.large_observations.len() > self.config.history_capacity {
                state.large_observations.pop_front();
            }
            let severity = if occurrences >= self.config.escalation_occurrences {
                Severity::High
            } else {
                Severity::Medium
            };
            reasons.push(DetectionReason {
                flag: FLAG_LARGE_AMOUNT_PATTERN,
                severity,
                detail: format!(
                    "amount {} above threshold {}, occurrence {} in window",
                    request.amount, self.config.large_amount_threshold, occurrences
                ),
            });
        }
        drop(state);

        let blocked = reasons.iter().any(|r| r.severity == Severity::Critical);
        let flags: Vec<String> = reasons.iter().map(|r| r.flag.to_string()).collect();

        let attack = if blocked {
            let attack = DetectedAttack {
                tx_id: request.tx_id.clone(),
                source_address: request.source_address.clone(),
                detected_at_ms: now_ms(),
            };
            let mut recent_attacks = self.recent_attacks.lock().await;
            if recent_attacks.len() == self.config.recent_attacks_capacity {
                recent_attacks.pop_front();
            }
            recent_attacks.push_back(attack.clone());
            self.metrics.attacks_detected.inc();
            warn!(
                "[FlashLoanDetector] blocked transfer {} from {}: {:?}",
                request.tx_id, request.source_address, flags
            );
            Some(attack)
        } else {
            None
        };

        DetectionResult {
            blocked,
            flags,
            reasons,
            attack,
        }
    }

    /// Reset all tracked state for `address`. The next analysis behaves as
    /// if the address were first-seen.
    pub async fn clear_address_history(&self, address: &str) {
        let removed = self.addresses.write().await.remove(address).is_some();
        if removed {
            info!("[FlashLoanDetector] cleared history for {}", address);
        }
    }

    /// Blocked-attack audit trail, most recent first.
    pub async fn recent_attacks(&self) -> Vec<DetectedAttack> {
        let attacks = self.recent_attacks.lock().await;
        attacks.iter().rev().cloned().collect()
    }
}
