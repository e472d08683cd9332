// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture for the workspace specs: a gateway wired to a scripted
//! connector, a fake probe, and a real store in a temp directory.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

pub use grim_core::{Catalog, FakeClock, SpellConfig, SpellEvent};
pub use grim_gateway::test_support::{spell_config, tool, FakeConnector, FakeProbe};
pub use grim_gateway::{Gateway, LifecycleManager, Outcome, DEFAULT_REAP_THRESHOLD};
pub use grim_resolver::{HashingEmbedder, HybridResolver};
pub use grim_storage::EmbeddingStore;
pub use grim_wire::Content;
pub use serde_json::{json, Value};
pub use tempfile::TempDir;

pub const MODEL: &str = "feature-hash-v1";

pub struct World {
    pub gateway: Gateway<FakeClock>,
    pub connector: Arc<FakeConnector>,
    pub probe: Arc<FakeProbe>,
    pub store: Arc<Mutex<EmbeddingStore>>,
    pub store_path: PathBuf,
    pub dir: TempDir,
}

/// Fresh world with its own spell directory and store.
pub async fn world(spells: Vec<SpellConfig>) -> World {
    let dir = TempDir::new().unwrap();
    world_in(dir, spells).await
}

/// World over an existing directory; reloads whatever store file is there.
/// Used by the restart specs.
pub async fn world_in(dir: TempDir, spells: Vec<SpellConfig>) -> World {
    let store_path = dir.path().join("grimoire.msgpack");
    let store = Arc::new(Mutex::new(EmbeddingStore::load(&store_path, MODEL)));
    let connector = FakeConnector::new();
    let probe = FakeProbe::new();

    let resolver = HybridResolver::new(store.clone(), Arc::new(HashingEmbedder));
    let lifecycle = LifecycleManager::new(connector.clone(), probe.clone(), store.clone());
    let mut gateway = Gateway::new(
        Catalog::new(),
        resolver,
        lifecycle,
        DEFAULT_REAP_THRESHOLD,
        FakeClock::new(),
    );
    for spell in spells {
        gateway.apply_event(SpellEvent::Added(Arc::new(spell))).await;
    }

    World { gateway, connector, probe, store, store_path, dir }
}

impl World {
    /// Simulate the startup-time orphan reconciliation of a fresh process.
    pub fn recover_orphans(&mut self) {
        let mut lifecycle = LifecycleManager::new(
            self.connector.clone(),
            self.probe.clone(),
            self.store.clone(),
        );
        lifecycle.load_from_storage();
    }

    pub fn surface(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.gateway.list_tools().into_iter().map(|t| t.name).collect();
        names.sort();
        names
    }

    pub fn turn(&self) -> u64 {
        self.gateway.lifecycle().current_turn()
    }
}

/// Parse the JSON payload out of a meta-tool text response.
pub fn payload(outcome: &Outcome) -> Value {
    match &outcome.result.content[0] {
        Content::Text { text } => serde_json::from_str(text).unwrap(),
        other => panic!("expected text content, got {other:?}"),
    }
}

/// The surface invariant: meta-tools plus the union of the active spells'
/// tools, nothing else.
pub fn assert_surface_invariant(world: &World) {
    let mut expected = vec!["resolve_intent".to_string(), "activate_spell".to_string()];
    for spell in world.gateway.router().active_spell_names() {
        expected.extend(
            world.gateway.router().tools_for_spell(&spell).into_iter().map(|t| t.name),
        );
    }
    expected.sort();
    assert_eq!(world.surface(), expected);
}

pub fn weather_spell() -> SpellConfig {
    spell_config("weather-api", &["weather", "forecast", "alerts"])
}

pub fn news_spell() -> SpellConfig {
    spell_config("news-feed", &["news", "headlines", "articles"])
}
