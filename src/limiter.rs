// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Sliding-window admission control, keyed by `(address, chain-or-default)`.
//!
//! Purely volume-based: attack semantics live in the detector. A chain-scoped
//! counter and the chain-agnostic counter for the same address are distinct
//! and share no quota. Denials report an accurate retry-after derived from
//! the oldest request still inside the window, never a fixed constant.

use crate::config::RateLimiterConfig;
use crate::metrics::BridgeMetrics;
use crate::now_ms;
use crate::types::ChainId;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RateLimitKey {
    address: String,
    chain: Option<ChainId>,
}

/// Verdict for one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    allowed: bool,
    pub remaining: u32,
    /// Seconds until the oldest in-window request expires. Only meaningful
    /// when denied.
    pub retry_after_secs: u64,
    /// Protocol-level surfacing for whatever API layer fronts the bridge.
    pub headers: HashMap<String, String>,
}

impl RateLimitResult {
    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn denied(&self) -> bool {
        !self.allowed
    }
}

/// Point-in-time view of one counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub current_count: u32,
    pub rate_limited: bool,
}

/// Administrative reset record, reason-tagged for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetAudit {
    pub address: String,
    pub actor: String,
    pub at_ms: u64,
}

/// Global counters across every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub denied_requests: u64,
}

impl RateLimiterStats {
    pub fn allowed_percentage(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.allowed_requests as f64 * 100.0 / self.total_requests as f64
        }
    }
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    /// Lock-per-key windows so unrelated addresses never contend.
    windows: RwLock<HashMap<RateLimitKey, Arc<Mutex<VecDeque<Instant>>>>>,
    total_requests: AtomicU64,
    allowed_requests: AtomicU64,
    denied_requests: AtomicU64,
    reset_audit: Mutex<VecDeque<ResetAudit>>,
    metrics: Arc<BridgeMetrics>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
            total_requests: AtomicU64::new(0),
            allowed_requests: AtomicU64::new(0),
            denied_requests: AtomicU64::new(0),
            reset_audit: Mutex::new(VecDeque::new()),
            metrics,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    async fn entry_for(&self, key: &RateLimitKey) -> Arc<Mutex<VecDeque<Instant>>> {
        if let Some(entry) = self.windows.read().await.get(key) {
            return entry.clone();
        }
        let mut windows = self.windows.write().await;
        windows
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    fn prune(timestamps: &mut VecDeque<Instant>, window: Duration) {
        while let Some(oldest) = timestamps.front() {
            if oldest.elapsed() >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Seconds until the oldest in-window entry slides out, rounded up so a
    /// caller retrying after this long is never denied by the same entry.
    fn secs_until_oldest_expires(timestamps: &VecDeque<Instant>, window: Duration) -> u64 {
        match timestamps.front() {
            None => 0,
            Some(oldest) => {
                let left = window.saturating_sub(oldest.elapsed());
                let mut secs = left.as_secs();
                if left.subsec_nanos() > 0 {
                    secs += 1;
                }
                secs.max(1)
            }
        }
    }

    fn headers(
        &self,
        effective: u32,
        remaining: u32,
        reset_secs: u64,
        retry_after: Option<u64>,
    ) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(HEADER_LIMIT.to_string(), effective.to_string());
        headers.insert(HEADER_REMAINING.to_string(), remaining.to_string());
        headers.insert(HEADER_RESET.to_string(), reset_secs.to_string());
        if let Some(retry_after) = retry_after {
            headers.insert(HEADER_RETRY_AFTER.to_string(), retry_after.to_string());
        }
        headers
    }

    fn denied_result(&self, effective: u32, retry_after_secs: u64) -> RateLimitResult {
        self.denied_requests.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .rate_limit_checks
            .with_label_values(&["denied"])
            .inc();
        RateLimitResult {
            allowed: false,
            remaining: 0,
            retry_after_secs,
            headers: self.headers(effective, 0, retry_after_secs, Some(retry_after_secs)),
        }
    }

    /// Admission check for `address`, optionally scoped to one chain. An
    /// allowed check consumes one slot in the window.
    pub async fn check_rate_limit(
        &self,
        address: &str,
        chain: Option<ChainId>,
    ) -> RateLimitResult {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let effective = self.config.effective_limit();

        // An absent address is denied outright, never treated as a
        // wildcard key.
        if address.trim().is_empty() {
            return self.denied_result(effective, 0);
        }

        let key = RateLimitKey {
            address: address.to_string(),
            chain,
        };
        let entry = self.entry_for(&key).await;
        let mut timestamps = entry.lock().await;
        let window = self.window();
        Self::prune(&mut timestamps, window);

        if (timestamps.len() as u32) < effective {
            timestamps.push_back(Instant::now());
            let remaining = effective - timestamps.len() as u32;
            let reset_secs = Self::secs_until_oldest_expires(&timestamps, window);
            self.allowed_requests.fetch_add(1, Ordering::Relaxed);
            self.metrics
                .rate_limit_checks
                .with_label_values(&["allowed"])
                .inc();
            RateLimitResult {
                allowed: true,
                remaining,
                retry_after_secs: 0,
                headers: self.headers(effective, remaining, reset_secs, None),
            }
        } else {
            let retry_after_secs = Self::secs_until_oldest_expires(&timestamps, window);
            self.denied_result(effective, retry_after_secs)
        }
    }

    /// Bookkeeping path for call sites that already know the request is
    /// happening regardless of a pre-check: consumes a slot and counts as an
    /// allowed request.
    pub async fn record_transfer(&self, address: &str, chain: Option<ChainId>) {
        if address.trim().is_empty() {
            return;
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.allowed_requests.fetch_add(1, Ordering::Relaxed);
        let key = RateLimitKey {
            address: address.to_string(),
            chain,
        };
        let entry = self.entry_for(&key).await;
        let mut timestamps = entry.lock().await;
        Self::prune(&mut timestamps, self.window());
        timestamps.push_back(Instant::now());
    }

    /// Point-in-time counter read. Does not consume a slot.
    pub async fn status(&self, address: &str, chain: Option<ChainId>) -> RateLimitStatus {
        let key = RateLimitKey {
            address: address.to_string(),
            chain,
        };
        let entry = self.entry_for(&key).await;
        let mut timestamps = entry.lock().await;
        Self::prune(&mut timestamps, self.window());
        let current_count = timestamps.len() as u32;
        RateLimitStatus {
            current_count,
            rate_limited: current_count >= self.config.effective_limit(),
        }
    }

    /// Administrative override: clear every counter for `address` (both the
    /// default and all chain-scoped keys), tagged with the acting operator.
    pub async fn reset_limit(&self, address: &str, actor: &str) {
        let mut windows = self.windows.write().await;
        windows.retain(|key, _| key.address != address);
        drop(windows);

        let mut audit = self.reset_audit.lock().await;
        if audit.len() == self.config.reset_audit_capacity {
            audit.pop_front();
        }
        audit.push_back(ResetAudit {
            address: address.to_string(),
            actor: actor.to_string(),
            at_ms: now_ms(),
        });
        info!(
            "[RateLimiter] counters for {} reset by {}",
            address, actor
        );
    }

    /// Reset audit trail, most recent first.
    pub async fn reset_history(&self) -> Vec<ResetAudit> {
        self.reset_audit.lock().await.iter().rev().cloned().collect()
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            allowed_requests: self.allowed_requests.load(Ordering::Relaxed),
            denied_requests: self.denied_requests.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(
            RateLimiterConfig {
                max_requests,
                window_secs,
                burst_multiplier: 1.5,
                reset_audit_capacity: 4,
            },
            Arc::new(BridgeMetrics::new_for_testing()),
        )
    }

    #[tokio::test]
    async fn test_burst_of_fifteen_then_denied_with_retry_after() {
        // 10/minute with a 1.5x burst: calls 1-15 allowed, 16 denied.
        let limiter = limiter(10, 60);
        for call in 1..=15 {
            let result = limiter.check_rate_limit("0xaddr-y", None).await;
            assert!(result.allowed(), "call {call} should be allowed");
        }
        let result = limiter.check_rate_limit("0xaddr-y", None).await;
        assert!(result.denied());
        assert!(result.retry_after_secs > 0);
        assert_eq!(result.headers.get(HEADER_REMAINING).unwrap(), "0");
        assert_eq!(result.headers.get(HEADER_LIMIT).unwrap(), "15");
        assert!(result.headers.contains_key(HEADER_RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_remaining_monotonically_decreases_within_window() {
        let limiter = limiter(10, 60);
        let mut previous = u32::MAX;
        for _ in 0..15 {
            let result = limiter.check_rate_limit("0xaddr", None).await;
            assert!(result.allowed());
            assert!(result.remaining < previous);
            previous = result.remaining;
        }
        assert_eq!(previous, 0);
    }

    #[tokio::test]
    async fn test_window_slides_and_quota_returns() {
        let limiter = limiter(2, 1);
        // Effective limit 3 with the 1.5x burst.
        for _ in 0..3 {
            assert!(limiter.check_rate_limit("0xaddr", None).await.allowed());
        }
        assert!(limiter.check_rate_limit("0xaddr", None).await.denied());

        tokio::time::sleep(Duration::from_millis(1_050)).await;
        assert!(limiter.check_rate_limit("0xaddr", None).await.allowed());
    }

    #[tokio::test]
    async fn test_reset_limit_restores_quota_and_audits_actor() {
        let limiter = limiter(10, 60);
        for _ in 0..16 {
            let _ = limiter.check_rate_limit("0xaddr-y", None).await;
        }
        assert!(limiter.check_rate_limit("0xaddr-y", None).await.denied());

        limiter.reset_limit("0xaddr-y", "admin-1").await;
        assert!(limiter.check_rate_limit("0xaddr-y", None).await.allowed());

        let audit = limiter.reset_history().await;
        assert_eq!(audit[0].address, "0xaddr-y");
        assert_eq!(audit[0].actor, "admin-1");
    }

    #[tokio::test]
    async fn test_per_address_isolation() {
        let limiter = limiter(10, 60);
        for _ in 0..16 {
            let _ = limiter.check_rate_limit("0xaddr-a", None).await;
        }
        assert!(limiter.check_rate_limit("0xaddr-a", None).await.denied());

        // Address B's quota is untouched.
        let result = limiter.check_rate_limit("0xaddr-b", None).await;
        assert!(result.allowed());
        assert_eq!(result.remaining, 14);
    }

    #[tokio::test]
    async fn test_chain_scoped_counter_is_distinct_from_default() {
        let limiter = limiter(2, 60);
        // Exhaust the chain-agnostic counter (effective limit 3).
        for _ in 0..3 {
            assert!(limiter.check_rate_limit("0xaddr", None).await.allowed());
        }
        assert!(limiter.check_rate_limit("0xaddr", None).await.denied());

        // The chain-qualified counter still has its full quota.
        for _ in 0..3 {
            assert!(limiter
                .check_rate_limit("0xaddr", Some(ChainId::EthMainnet))
                .await
                .allowed());
        }
        assert!(limiter
            .check_rate_limit("0xaddr", Some(ChainId::EthMainnet))
            .await
            .denied());
        // And a different chain scope is again distinct.
        assert!(limiter
            .check_rate_limit("0xaddr", Some(ChainId::BtcMainnet))
            .await
            .allowed());
    }

    #[tokio::test]
    async fn test_empty_address_always_denied() {
        let limiter = limiter(10, 60);
        assert!(limiter.check_rate_limit("", None).await.denied());
        assert!(limiter.check_rate_limit("   ", None).await.denied());
        // Statistics still count the attempts.
        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.denied_requests, 2);
    }

    #[tokio::test]
    async fn test_record_transfer_consumes_quota() {
        let limiter = limiter(2, 60);
        limiter.record_transfer("0xaddr", None).await;
        limiter.record_transfer("0xaddr", None).await;
        let status = limiter.status("0xaddr", None).await;
        assert_eq!(status.current_count, 2);
        assert!(!status.rate_limited);

        // One slot left of the effective 3.
        assert!(limiter.check_rate_limit("0xaddr", None).await.allowed());
        assert!(limiter.check_rate_limit("0xaddr", None).await.denied());
        assert!(limiter.status("0xaddr", None).await.rate_limited);
    }

    #[tokio::test]
    async fn test_global_statistics_and_percentage() {
        let limiter = limiter(2, 60);
        for _ in 0..4 {
            let _ = limiter.check_rate_limit("0xaddr", None).await;
        }
        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.allowed_requests, 3);
        assert_eq!(stats.denied_requests, 1);
        assert!((stats.allowed_percentage() - 75.0).abs() < f64::EPSILON);

        let empty = RateLimiterStats {
            total_requests: 0,
            allowed_requests: 0,
            denied_requests: 0,
        };
        assert_eq!(empty.allowed_percentage(), 0.0);
    }

    #[tokio::test]
    async fn test_allowed_and_denied_mutually_exclusive() {
        let limiter = limiter(1, 60);
        for _ in 0..3 {
            let result = limiter.check_rate_limit("0xaddr", None).await;
            assert_ne!(result.allowed(), result.denied());
        }
    }
}
