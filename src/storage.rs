// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Persistence collaborator interface.
//!
//! The core keeps transfers crash-recoverable through this trait and nothing
//! else; the durable engine behind it is out of scope. The in-memory
//! implementation backs tests and local development.

use crate::detector::DetectedAttack;
use crate::types::BridgeTransfer;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transfer {0} already exists")]
    AlreadyExists(String),

    #[error("transfer {0} not found")]
    NotFound(String),

    #[error("transfer {0} is not terminal and cannot be archived")]
    NotTerminal(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Durable store for transfer records and the detector's attack log.
#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn create(&self, transfer: &BridgeTransfer) -> StoreResult<()>;

    /// Persist the current state of an existing transfer.
    async fn update(&self, transfer: &BridgeTransfer) -> StoreResult<()>;

    async fn get(&self, id: &str) -> StoreResult<Option<BridgeTransfer>>;

    /// All transfers still in a non-terminal phase.
    async fn pending(&self) -> StoreResult<Vec<BridgeTransfer>>;

    /// Non-terminal transfers created at or before `created_before_ms`.
    async fn expired(&self, created_before_ms: u64) -> StoreResult<Vec<BridgeTransfer>>;

    /// Move a terminal transfer out of the active set. Pending transfers
    /// are never deleted.
    async fn archive(&self, id: &str) -> StoreResult<()>;

    async fn append_attack(&self, attack: &DetectedAttack) -> StoreResult<()>;

    /// Most-recent-first slice of the attack log.
    async fn recent_attacks(&self, limit: usize) -> StoreResult<Vec<DetectedAttack>>;
}

/// Reference store keeping everything in memory.
#[derive(Default)]
pub struct InMemoryTransferStore {
    active: RwLock<HashMap<String, BridgeTransfer>>,
    archived: RwLock<HashMap<String, BridgeTransfer>>,
    attacks: Mutex<Vec<DetectedAttack>>,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn archived_count(&self) -> usize {
        self.archived.read().await.len()
    }
}

#[async_trait]
impl TransferStore for InMemoryTransferStore {
    async fn create(&self, transfer: &BridgeTransfer) -> StoreResult<()> {
        let mut active = self.active.write().await;
        if active.contains_key(&transfer.id) || self.archived.read().await.contains_key(&transfer.id)
        {
            return Err(StoreError::AlreadyExists(transfer.id.clone()));
        }
        active.insert(transfer.id.clone(), transfer.clone());
        Ok(())
    }

    async fn update(&self, transfer: &BridgeTransfer) -> StoreResult<()> {
        let mut active = self.active.write().await;
        match active.get_mut(&transfer.id) {
            Some(slot) => {
                *slot = transfer.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(transfer.id.clone())),
        }
    }

    async fn get(&self, id: &str) -> StoreResult<Option<BridgeTransfer>> {
        if let Some(transfer) = self.active.read().await.get(id) {
            return Ok(Some(transfer.clone()));
        }
        Ok(self.archived.read().await.get(id).cloned())
    }

    async fn pending(&self) -> StoreResult<Vec<BridgeTransfer>> {
        Ok(self
            .active
            .read()
            .await
            .values()
            .filter(|t| !t.is_terminal())
            .cloned()
            .collect())
    }

    async fn expired(&self, created_before_ms: u64) -> StoreResult<Vec<BridgeTransfer>> {
        Ok(self
            .active
            .read()
            .await
            .values()
            .filter(|t| !t.is_terminal() && t.created_at_ms <= created_before_ms)
            .cloned()
            .collect())
    }

    async fn archive(&self, id: &str) -> StoreResult<()> {
        let mut active = self.active.write().await;
        let Some(transfer) = active.get(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        if !transfer.is_terminal() {
            return Err(StoreError::NotTerminal(id.to_string()));
        }
        let transfer = active.remove(id).expect("checked above");
        self.archived.write().await.insert(id.to_string(), transfer);
        Ok(())
    }

    async fn append_attack(&self, attack: &DetectedAttack) -> StoreResult<()> {
        self.attacks.lock().await.push(attack.clone());
        Ok(())
    }

    async fn recent_attacks(&self, limit: usize) -> StoreResult<Vec<DetectedAttack>> {
        let attacks = self.attacks.lock().await;
        Ok(attacks.iter().rev().take(limit).cloned().collect())
    }
}
