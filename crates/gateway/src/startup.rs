// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway startup: directory resolution, store load, orphan recovery, and
//! the initial catalog scan.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

use grim_core::{Catalog, Clock, SpellEvent};
use grim_resolver::{Embedder, HybridResolver};
use grim_storage::EmbeddingStore;

use crate::connect::Connector;
use crate::env::{self, Deadlines};
use crate::facade::Gateway;
use crate::lifecycle::{LifecycleManager, DEFAULT_REAP_THRESHOLD};
use crate::loader::scan_spell_dir;
use crate::probe::ProcessProbe;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot determine the spell directory (set GRIMOIRE_HOME or HOME)")]
    NoSpellDir,

    #[error("cannot create spell directory {0}: {1}")]
    CreateDir(PathBuf, #[source] std::io::Error),
}

/// Resolved gateway paths and knobs.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// The spell directory (`GRIMOIRE_HOME`, default `~/.grimoire`).
    pub spell_dir: PathBuf,
    /// The persistence file inside it.
    pub store_path: PathBuf,
    /// Gateway log file inside it.
    pub log_path: PathBuf,
    pub deadlines: Deadlines,
}

impl GatewayConfig {
    /// Resolve paths from the environment, creating the spell directory on
    /// first run.
    pub fn load() -> Result<Self, StartupError> {
        let spell_dir = env::grimoire_home().ok_or(StartupError::NoSpellDir)?;
        if !spell_dir.exists() {
            std::fs::create_dir_all(&spell_dir)
                .map_err(|err| StartupError::CreateDir(spell_dir.clone(), err))?;
        }
        Ok(Self {
            store_path: spell_dir.join(env::STORE_FILE),
            log_path: spell_dir.join(env::LOG_FILE),
            spell_dir,
            deadlines: Deadlines::from_env(),
        })
    }
}

/// Bring the gateway up: load the store, reap orphans from a previous run,
/// scan and index the catalog. Returns the facade and the shared store
/// handle for the serializer's flushes.
pub async fn startup<C: Clock>(
    config: &GatewayConfig,
    embedder: Arc<dyn Embedder>,
    connector: Arc<dyn Connector>,
    probe: Arc<dyn ProcessProbe>,
    clock: C,
) -> (Gateway<C>, Arc<Mutex<EmbeddingStore>>) {
    let store = Arc::new(Mutex::new(EmbeddingStore::load(
        &config.store_path,
        embedder.model_name(),
    )));
    info!(
        store = %config.store_path.display(),
        turn = store.lock().lifecycle().current_turn,
        "store loaded"
    );

    let mut lifecycle = LifecycleManager::new(connector, probe, store.clone());
    lifecycle.load_from_storage();

    let configs: Vec<Arc<grim_core::SpellConfig>> =
        scan_spell_dir(&config.spell_dir).into_iter().map(Arc::new).collect();
    info!(spells = configs.len(), dir = %config.spell_dir.display(), "catalog scanned");

    let mut resolver = HybridResolver::new(store.clone(), embedder);
    resolver.index_all(&configs, clock.epoch_ms()).await;

    let mut catalog = Catalog::new();
    for config in &configs {
        catalog.insert((**config).clone());
    }

    let gateway = Gateway::new(catalog, resolver, lifecycle, DEFAULT_REAP_THRESHOLD, clock);
    (gateway, store)
}

/// Re-exported for the watcher seam: events applied through
/// [`Gateway::apply_event`] on the serializer.
pub type WatcherEvent = SpellEvent;

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
