// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spell lifecycle: spawn, usage turns, turn-based reaping, and orphan
//! recovery after a crashed gateway.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use grim_core::SpellConfig;
use grim_storage::{EmbeddingStore, UsageRecord};
use grim_wire::Tool;

use crate::connect::{Connector, SpawnError, SpellClient};
use crate::probe::{Liveness, ProcessProbe};

/// Spells idle for at least this many turns are reaped.
pub const DEFAULT_REAP_THRESHOLD: u64 = 5;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("spell {0} is not active")]
    NotActive(String),
}

struct ActiveSpell {
    client: Arc<dyn SpellClient>,
    tools: Vec<Tool>,
}

pub struct LifecycleManager {
    active: HashMap<String, ActiveSpell>,
    connector: Arc<dyn Connector>,
    probe: Arc<dyn ProcessProbe>,
    store: Arc<Mutex<EmbeddingStore>>,
}

impl LifecycleManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        probe: Arc<dyn ProcessProbe>,
        store: Arc<Mutex<EmbeddingStore>>,
    ) -> Self {
        Self { active: HashMap::new(), connector, probe, store }
    }

    /// Spawn the spell and return its tools. Idempotent: an already-active
    /// spell returns its cached tool list without a second spawn.
    ///
    /// Does not create usage tracking; that happens only through
    /// [`Self::mark_used`].
    pub async fn spawn(&mut self, config: &SpellConfig) -> Result<Vec<Tool>, SpawnError> {
        if let Some(active) = self.active.get(&config.name) {
            return Ok(active.tools.clone());
        }

        let (client, tools) = self.connector.connect(config).await?;
        if let Some(pid) = client.pid() {
            self.store.lock().lifecycle_mut().active_pids.insert(config.name.clone(), pid);
        }
        info!(spell = %config.name, tools = tools.len(), "spell activated");
        self.active.insert(config.name.clone(), ActiveSpell { client, tools: tools.clone() });
        Ok(tools)
    }

    /// Record that the spell served the current turn.
    pub fn mark_used(&mut self, name: &str) {
        let mut store = self.store.lock();
        let turn = store.lifecycle().current_turn;
        store
            .lifecycle_mut()
            .usage
            .insert(name.to_string(), UsageRecord { last_used_turn: turn });
    }

    /// Advance the turn counter; called once per client request whether or
    /// not anything was spawned. Returns the new turn.
    pub fn increment_turn(&mut self) -> u64 {
        let mut store = self.store.lock();
        store.lifecycle_mut().current_turn += 1;
        store.lifecycle().current_turn
    }

    pub fn current_turn(&self) -> u64 {
        self.store.lock().lifecycle().current_turn
    }

    /// Names idle for at least `threshold` turns. Spells that were never
    /// marked used have no usage entry and are not returned; their eviction
    /// is a deferred decision.
    pub fn get_inactive(&self, threshold: u64) -> Vec<String> {
        let store = self.store.lock();
        let turn = store.lifecycle().current_turn;
        let mut names: Vec<String> = store
            .lifecycle()
            .usage
            .iter()
            .filter(|(_, usage)| turn.saturating_sub(usage.last_used_turn) >= threshold)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Reap every inactive spell: close its connection, kill the child,
    /// drop the active record and its bookkeeping. Returns the reaped names.
    pub async fn cleanup_inactive(&mut self, threshold: u64) -> Vec<String> {
        let names = self.get_inactive(threshold);
        for name in &names {
            if let Some(active) = self.active.remove(name) {
                active.client.shutdown().await;
            }
            let mut store = self.store.lock();
            store.lifecycle_mut().usage.remove(name);
            store.lifecycle_mut().active_pids.remove(name);
            info!(spell = %name, "reaped idle spell");
        }
        names
    }

    /// Close one spell explicitly (watcher update/remove). Returns whether
    /// it was active.
    pub async fn close(&mut self, name: &str) -> bool {
        let Some(active) = self.active.remove(name) else {
            return false;
        };
        active.client.shutdown().await;
        let mut store = self.store.lock();
        store.lifecycle_mut().usage.remove(name);
        store.lifecycle_mut().active_pids.remove(name);
        info!(spell = %name, "spell closed");
        true
    }

    /// Graceful teardown of every active connection; invoked at shutdown.
    pub async fn kill_all(&mut self) {
        let names: Vec<String> = self.active.keys().cloned().collect();
        for name in names {
            if let Some(active) = self.active.remove(&name) {
                active.client.shutdown().await;
            }
            self.store.lock().lifecycle_mut().active_pids.remove(&name);
        }
    }

    /// Reconcile persisted PIDs at startup: any child that survived a
    /// crashed gateway is killed, then the PID table is reset for this
    /// session. Turn counter and usage tracking are left untouched.
    pub fn load_from_storage(&mut self) {
        let pids: Vec<(String, u32)> = {
            let store = self.store.lock();
            store.lifecycle().active_pids.iter().map(|(n, p)| (n.clone(), *p)).collect()
        };

        for (name, pid) in &pids {
            match self.probe.probe(*pid) {
                Liveness::Alive => {
                    warn!(spell = %name, pid, "killing orphaned child from previous run");
                    self.probe.kill(*pid);
                }
                Liveness::Dead => {
                    info!(spell = %name, pid, "orphaned child already gone");
                }
                Liveness::Unknown => {}
            }
        }

        if !pids.is_empty() {
            self.store.lock().lifecycle_mut().active_pids.clear();
        }
    }

    /// The open connection for an active spell.
    pub fn get_client(&self, name: &str) -> Result<Arc<dyn SpellClient>, RoutingError> {
        self.active
            .get(name)
            .map(|active| Arc::clone(&active.client))
            .ok_or_else(|| RoutingError::NotActive(name.to_string()))
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    pub fn active_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.active.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
