// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry, HistogramVec,
    IntCounter, IntCounterVec, IntGaugeVec, Registry,
};

const FINE_GRAINED_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.4, 0.5, 0.7, 1.0, 1.5, 2.0, 3.0, 5.0,
    8.0, 10., 15., 20., 30., 60., 120.,
];

#[derive(Clone, Debug)]
pub struct BridgeMetrics {
    pub(crate) transfers_requested: IntCounter,
    pub(crate) transfers_completed: IntCounter,
    pub(crate) transfers_rejected: IntCounter,
    pub(crate) transfers_reverted: IntCounter,
    pub(crate) phase_transitions: IntCounterVec,
    pub(crate) admission_denied: IntCounterVec,
    pub(crate) attacks_detected: IntCounter,
    pub(crate) rate_limit_checks: IntCounterVec,
    pub(crate) source_unlocks_issued: IntCounter,
    pub(crate) sweeps_run: IntCounter,
    pub(crate) swept_transfers: IntCounter,
    pub(crate) adapter_rpc_queries: IntCounterVec,
    pub(crate) adapter_rpc_errors: IntCounterVec,
    pub(crate) adapter_rpc_latency: HistogramVec,
    pub(crate) adapter_health: IntGaugeVec,
    pub(crate) quorum_requests: IntCounterVec,
    pub(crate) proof_verifications: IntCounterVec,
}

impl BridgeMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            transfers_requested: register_int_counter_with_registry!(
                "bridge_transfers_requested",
                "Total transfer requests received",
                registry,
            )
            .unwrap(),
            transfers_completed: register_int_counter_with_registry!(
                "bridge_transfers_completed",
                "Transfers that reached the Completed phase",
                registry,
            )
            .unwrap(),
            transfers_rejected: register_int_counter_with_registry!(
                "bridge_transfers_rejected",
                "Transfers rejected before any funds moved",
                registry,
            )
            .unwrap(),
            transfers_reverted: register_int_counter_with_registry!(
                "bridge_transfers_reverted",
                "Transfers reverted after the source-side lock",
                registry,
            )
            .unwrap(),
            phase_transitions: register_int_counter_vec_with_registry!(
                "bridge_phase_transitions",
                "Transfer state machine transitions by destination phase",
                &["phase"],
                registry,
            )
            .unwrap(),
            admission_denied: register_int_counter_vec_with_registry!(
                "bridge_admission_denied",
                "Admission gate denials by reason",
                &["reason"],
                registry,
            )
            .unwrap(),
            attacks_detected: register_int_counter_with_registry!(
                "bridge_attacks_detected",
                "Transfers blocked by the flash-loan detector",
                registry,
            )
            .unwrap(),
            rate_limit_checks: register_int_counter_vec_with_registry!(
                "bridge_rate_limit_checks",
                "Rate limiter verdicts",
                &["verdict"],
                registry,
            )
            .unwrap(),
            source_unlocks_issued: register_int_counter_with_registry!(
                "bridge_source_unlocks_issued",
                "Source-side lock releases issued on the revert path",
                registry,
            )
            .unwrap(),
            sweeps_run: register_int_counter_with_registry!(
                "bridge_sweeps_run",
                "Expiry sweep passes executed",
                registry,
            )
            .unwrap(),
            swept_transfers: register_int_counter_with_registry!(
                "bridge_swept_transfers",
                "Transfers moved to Reverted by the expiry sweep",
                registry,
            )
            .unwrap(),
            adapter_rpc_queries: register_int_counter_vec_with_registry!(
                "bridge_adapter_rpc_queries",
                "Adapter RPC calls by chain and method",
                &["chain", "method"],
                registry,
            )
            .unwrap(),
            adapter_rpc_errors: register_int_counter_vec_with_registry!(
                "bridge_adapter_rpc_errors",
                "Adapter RPC failures by chain and method",
                &["chain", "method"],
                registry,
            )
            .unwrap(),
            adapter_rpc_latency: register_histogram_vec_with_registry!(
                "bridge_adapter_rpc_latency",
                "Adapter RPC latency in seconds, by chain and method",
                &["chain", "method"],
                FINE_GRAINED_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            adapter_health: register_int_gauge_vec_with_registry!(
                "bridge_adapter_health",
                "1 when the chain adapter's endpoint is reachable",
                &["chain"],
                registry,
            )
            .unwrap(),
            quorum_requests: register_int_counter_vec_with_registry!(
                "bridge_quorum_requests",
                "Authorization requests to the quorum by decision",
                &["decision"],
                registry,
            )
            .unwrap(),
            proof_verifications: register_int_counter_vec_with_registry!(
                "bridge_proof_verifications",
                "Proof verifications by proof kind and verdict",
                &["kind", "verdict"],
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}
