// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{ChainAdapter, HealthStatus};
use crate::error::{BridgeError, BridgeResult};
use crate::types::ChainId;
use std::collections::HashMap;
use std::sync::Arc;

/// Chain-id keyed lookup of the configured adapters.
///
/// Built once at node startup and shared read-only afterwards; each adapter
/// keeps its own connection, so the registry never serializes chain I/O.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ChainId, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) -> BridgeResult<()> {
        let chain = adapter.chain_id();
        if self.adapters.contains_key(&chain) {
            return Err(BridgeError::InvalidInput(format!(
                "adapter for chain {chain} already registered"
            )));
        }
        self.adapters.insert(chain, adapter);
        Ok(())
    }

    pub fn get(&self, chain: ChainId) -> BridgeResult<Arc<dyn ChainAdapter>> {
        self.adapters
            .get(&chain)
            .cloned()
            .ok_or(BridgeError::UnsupportedChain(chain as u8))
    }

    pub fn contains(&self, chain: ChainId) -> bool {
        self.adapters.contains_key(&chain)
    }

    pub fn chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<_> = self.adapters.keys().copied().collect();
        chains.sort();
        chains
    }

    /// Probe every registered adapter. Probes run independently; a dead
    /// chain only shows up in its own entry.
    pub async fn health_all(&self) -> Vec<HealthStatus> {
        let mut statuses = Vec::with_capacity(self.adapters.len());
        for chain in self.chains() {
            // Unwrap is safe: the key came from the map above.
            let adapter = self.get(chain).unwrap();
            statuses.push(adapter.health_check().await);
        }
        statuses
    }
}
