// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::types::ChainId;
use anyhow::{anyhow, Result};
use ethers::types::U256;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_with::serde_as;
use std::collections::HashSet;
use std::path::Path;
use url::Url;

/// Config load/save supporting both YAML and JSON, keyed on file extension.
pub trait Config: Serialize + DeserializeOwned {
    fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = if path.extension().and_then(|s| s.to_str()) == Some("yaml")
            || path.extension().and_then(|s| s.to_str()) == Some("yml")
        {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(config)
    }

    fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Retry policy for adapter network calls: bounded attempts with exponential
/// backoff, each attempt bounded by the adapter's request timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 400,
            max_backoff_ms: 8_000,
        }
    }
}

/// Immutable per-adapter configuration. Created at adapter construction and
/// owned exclusively by that adapter; never mutated afterwards.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainAdapterConfig {
    /// Numeric chain id, must map to a known [`ChainId`].
    pub chain_id: u8,
    /// Rpc url for the chain's fullnode, used for queries and submission.
    pub rpc_url: String,
    /// Optional websocket url for event streaming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// Confirmations required before a transaction counts as finalized.
    pub confirmation_depth: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Whether the adapter subscribes to chain events over websocket.
    #[serde(default)]
    pub event_streaming: bool,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl ChainAdapterConfig {
    pub fn new(chain_id: ChainId, rpc_url: impl Into<String>, confirmation_depth: u64) -> Self {
        Self {
            chain_id: chain_id as u8,
            rpc_url: rpc_url.into(),
            ws_url: None,
            confirmation_depth,
            retry: RetryConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
            event_streaming: false,
        }
    }

    pub fn chain(&self) -> Result<ChainId> {
        ChainId::try_from(self.chain_id)
            .map_err(|_| anyhow!("unknown chain id {} in adapter config", self.chain_id))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }
}

/// Flash-loan detector thresholds. All tunable rather than hard-coded; the
/// defaults mirror the values the heuristics were calibrated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DetectorConfig {
    /// Per-address history ring capacity.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Transfers within the rapid-sequence window before the flag raises.
    #[serde(default = "default_rapid_sequence_threshold")]
    pub rapid_sequence_threshold: usize,
    #[serde(default = "default_rapid_sequence_window_secs")]
    pub rapid_sequence_window_secs: u64,
    /// Absolute amount above which a transfer counts as large.
    #[serde(default = "default_large_amount_threshold")]
    pub large_amount_threshold: U256,
    /// Window within which repeated large transfers escalate severity.
    #[serde(default = "default_tracking_window_secs")]
    pub tracking_window_secs: u64,
    /// Number of large transfers inside the tracking window at which the
    /// severity escalates from Medium to High.
    #[serde(default = "default_escalation_occurrences")]
    pub escalation_occurrences: usize,
    /// Capacity of the recent-attacks audit ring.
    #[serde(default = "default_recent_attacks_capacity")]
    pub recent_attacks_capacity: usize,
}

fn default_history_capacity() -> usize {
    256
}
fn default_rapid_sequence_threshold() -> usize {
    5
}
fn default_rapid_sequence_window_secs() -> u64 {
    60
}
fn default_large_amount_threshold() -> U256 {
    U256::from(100_000u64)
}
fn default_tracking_window_secs() -> u64 {
    3_600
}
fn default_escalation_occurrences() -> usize {
    2
}
fn default_recent_attacks_capacity() -> usize {
    128
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            rapid_sequence_threshold: default_rapid_sequence_threshold(),
            rapid_sequence_window_secs: default_rapid_sequence_window_secs(),
            large_amount_threshold: default_large_amount_threshold(),
            tracking_window_secs: default_tracking_window_secs(),
            escalation_occurrences: default_escalation_occurrences(),
            recent_attacks_capacity: default_recent_attacks_capacity(),
        }
    }
}

/// Sliding-window admission control settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimiterConfig {
    /// Steady-state requests allowed per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Short bursts may exceed the steady-state rate by this factor.
    #[serde(default = "default_burst_multiplier")]
    pub burst_multiplier: f64,
    /// Capacity of the reset audit ring.
    #[serde(default = "default_reset_audit_capacity")]
    pub reset_audit_capacity: usize,
}

fn default_max_requests() -> u32 {
    10
}
fn default_window_secs() -> u64 {
    60
}
fn default_burst_multiplier() -> f64 {
    1.5
}
fn default_reset_audit_capacity() -> usize {
    64
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            burst_multiplier: default_burst_multiplier(),
            reset_audit_capacity: default_reset_audit_capacity(),
        }
    }
}

impl RateLimiterConfig {
    /// The effective per-window ceiling once the burst allowance applies.
    pub fn effective_limit(&self) -> u32 {
        (self.max_requests as f64 * self.burst_multiplier).floor() as u32
    }
}

/// Orchestrator timing knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrchestratorConfig {
    /// A transfer stuck in a non-terminal phase longer than this is swept to
    /// Reverted and its source-side lock released.
    #[serde(default = "default_transfer_expiry_secs")]
    pub transfer_expiry_secs: u64,
    #[serde(default = "default_confirmation_poll_interval_ms")]
    pub confirmation_poll_interval_ms: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_transfer_expiry_secs() -> u64 {
    1_800
}
fn default_confirmation_poll_interval_ms() -> u64 {
    2_000
}
fn default_sweep_interval_secs() -> u64 {
    30
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            transfer_expiry_secs: default_transfer_expiry_secs(),
            confirmation_poll_interval_ms: default_confirmation_poll_interval_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Top-level node configuration.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BridgeNodeConfig {
    pub adapters: Vec<ChainAdapterConfig>,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// The port for the metrics server.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_metrics_port() -> u16 {
    9184
}

impl Config for BridgeNodeConfig {}

impl BridgeNodeConfig {
    /// Cross-checks the configuration before any adapter is constructed.
    pub fn validate(&self) -> Result<Vec<ChainId>> {
        if self.adapters.is_empty() {
            return Err(anyhow!("at least one chain adapter must be configured"));
        }
        let mut seen = HashSet::new();
        let mut chains = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let chain = adapter.chain()?;
            if !seen.insert(chain) {
                return Err(anyhow!("duplicate adapter config for chain {}", chain));
            }
            Url::parse(&adapter.rpc_url)
                .map_err(|e| anyhow!("invalid rpc url for chain {}: {}", chain, e))?;
            if let Some(ws) = &adapter.ws_url {
                Url::parse(ws)
                    .map_err(|e| anyhow!("invalid websocket url for chain {}: {}", chain, e))?;
            }
            if adapter.confirmation_depth == 0 {
                return Err(anyhow!(
                    "confirmation depth for chain {} must be at least 1",
                    chain
                ));
            }
            chains.push(chain);
        }
        if self.rate_limiter.burst_multiplier < 1.0 {
            return Err(anyhow!("burst multiplier must be >= 1.0"));
        }
        if self.detector.escalation_occurrences < 2 {
            return Err(anyhow!(
                "large-amount escalation requires at least two occurrences"
            ));
        }
        Ok(chains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_config() -> BridgeNodeConfig {
        BridgeNodeConfig {
            adapters: vec![
                ChainAdapterConfig::new(ChainId::EthCustom, "http://127.0.0.1:8545", 12),
                ChainAdapterConfig::new(ChainId::LedgerTestnet, "http://127.0.0.1:9850", 1),
            ],
            detector: DetectorConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            metrics_port: default_metrics_port(),
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_config() {
        let chains = node_config().validate().unwrap();
        assert_eq!(chains, vec![ChainId::EthCustom, ChainId::LedgerTestnet]);
    }

    #[test]
    fn test_validate_rejects_duplicate_chain() {
        let mut config = node_config();
        config
            .adapters
            .push(ChainAdapterConfig::new(ChainId::EthCustom, "http://127.0.0.1:8546", 12));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = node_config();
        config.adapters[0].rpc_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_confirmation_depth() {
        let mut config = node_config();
        config.adapters[0].confirmation_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_sub_unit_burst() {
        let mut config = node_config();
        config.rate_limiter.burst_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_limit_applies_burst() {
        let config = RateLimiterConfig {
            max_requests: 10,
            window_secs: 60,
            burst_multiplier: 1.5,
            reset_audit_capacity: 8,
        };
        assert_eq!(config.effective_limit(), 15);
    }

    #[test]
    fn test_config_roundtrip_yaml_and_json() {
        let config = node_config();
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("bridge.json");
        config.save(&json_path).unwrap();
        let loaded = BridgeNodeConfig::load(&json_path).unwrap();
        assert_eq!(loaded.adapters.len(), 2);
        assert_eq!(loaded.rate_limiter, config.rate_limiter);

        let yaml_path = dir.path().join("bridge.yaml");
        std::fs::write(&yaml_path, serde_yaml::to_string(&config).unwrap()).unwrap();
        let loaded = BridgeNodeConfig::load(&yaml_path).unwrap();
        assert_eq!(loaded.adapters[0].chain().unwrap(), ChainId::EthCustom);
    }

    #[test]
    fn test_kebab_case_field_names() {
        let json = serde_json::to_string(&node_config()).unwrap();
        assert!(json.contains("rate-limiter"));
        assert!(json.contains("confirmation-depth"));
        assert!(!json.contains("confirmation_depth"));
    }
}
