// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tempfile::TempDir;

use crate::test_support::{spell_config, tool, FakeConnector, FakeProbe};

use super::*;

fn new_store(dir: &TempDir) -> Arc<Mutex<EmbeddingStore>> {
    Arc::new(Mutex::new(EmbeddingStore::load(dir.path().join("grimoire.msgpack"), "feature-hash-v1")))
}

struct Fixture {
    manager: LifecycleManager,
    connector: Arc<FakeConnector>,
    probe: Arc<FakeProbe>,
    store: Arc<Mutex<EmbeddingStore>>,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = new_store(&dir);
    let connector = FakeConnector::new();
    let probe = FakeProbe::new();
    let manager =
        LifecycleManager::new(connector.clone(), probe.clone(), store.clone());
    Fixture { manager, connector, probe, store, _dir: dir }
}

#[tokio::test]
async fn spawn_returns_tools_and_records_pid() {
    let mut fx = fixture();
    fx.connector.script("weather-api", vec![tool("get_forecast")], Some(4242));

    let tools = fx.manager.spawn(&spell_config("weather-api", &["weather", "forecast", "alerts"])).await.unwrap();
    assert_eq!(tools.len(), 1);
    assert!(fx.manager.is_active("weather-api"));
    assert_eq!(fx.store.lock().lifecycle().active_pids.get("weather-api"), Some(&4242));
    // Spawn alone never creates usage tracking.
    assert!(fx.store.lock().lifecycle().usage.is_empty());
}

#[tokio::test]
async fn spawn_is_idempotent() {
    let mut fx = fixture();
    let config = spell_config("weather-api", &["weather", "forecast", "alerts"]);

    for _ in 0..4 {
        fx.manager.spawn(&config).await.unwrap();
    }
    assert_eq!(fx.connector.spawn_count("weather-api"), 1);
    assert_eq!(fx.manager.active_names(), vec!["weather-api"]);
}

#[tokio::test]
async fn failed_spawn_leaves_no_active_record() {
    let mut fx = fixture();
    fx.connector.script_failure("broken", "connection refused");

    let err = fx.manager.spawn(&spell_config("broken", &["a1", "b2", "c3"])).await.unwrap_err();
    assert!(matches!(err, SpawnError::ConnectRefused(_)));
    assert!(!fx.manager.is_active("broken"));
    assert!(fx.store.lock().lifecycle().active_pids.is_empty());
}

#[tokio::test]
async fn turn_counter_is_monotonic() {
    let mut fx = fixture();
    assert_eq!(fx.manager.current_turn(), 0);
    assert_eq!(fx.manager.increment_turn(), 1);
    assert_eq!(fx.manager.increment_turn(), 2);
    assert_eq!(fx.manager.current_turn(), 2);
}

#[tokio::test]
async fn used_spell_is_reaped_after_threshold_idle_turns() {
    let mut fx = fixture();
    fx.manager.spawn(&spell_config("weather-api", &["weather", "forecast", "alerts"])).await.unwrap();
    fx.manager.mark_used("weather-api");

    for _ in 0..4 {
        fx.manager.increment_turn();
        assert!(fx.manager.get_inactive(DEFAULT_REAP_THRESHOLD).is_empty());
    }
    fx.manager.increment_turn();
    assert_eq!(fx.manager.get_inactive(DEFAULT_REAP_THRESHOLD), vec!["weather-api"]);

    let reaped = fx.manager.cleanup_inactive(DEFAULT_REAP_THRESHOLD).await;
    assert_eq!(reaped, vec!["weather-api"]);
    assert!(!fx.manager.is_active("weather-api"));
    assert!(fx.store.lock().lifecycle().usage.is_empty());
    assert!(fx.store.lock().lifecycle().active_pids.is_empty());
    assert_eq!(fx.connector.client_for("weather-api").unwrap().shutdown_count(), 1);
}

#[tokio::test]
async fn never_used_spell_is_not_reaped() {
    let mut fx = fixture();
    fx.manager.spawn(&spell_config("weather-api", &["weather", "forecast", "alerts"])).await.unwrap();

    for _ in 0..10 {
        fx.manager.increment_turn();
    }
    assert!(fx.manager.get_inactive(DEFAULT_REAP_THRESHOLD).is_empty());
    assert!(fx.manager.cleanup_inactive(DEFAULT_REAP_THRESHOLD).await.is_empty());
    assert!(fx.manager.is_active("weather-api"));
}

#[tokio::test]
async fn recent_use_defers_reaping() {
    let mut fx = fixture();
    fx.manager.spawn(&spell_config("weather-api", &["weather", "forecast", "alerts"])).await.unwrap();
    fx.manager.mark_used("weather-api");

    for _ in 0..4 {
        fx.manager.increment_turn();
    }
    fx.manager.mark_used("weather-api");
    fx.manager.increment_turn();
    assert!(fx.manager.cleanup_inactive(DEFAULT_REAP_THRESHOLD).await.is_empty());
    assert!(fx.manager.is_active("weather-api"));
}

#[tokio::test]
async fn close_shuts_down_one_spell() {
    let mut fx = fixture();
    fx.manager.spawn(&spell_config("weather-api", &["weather", "forecast", "alerts"])).await.unwrap();
    fx.manager.mark_used("weather-api");

    assert!(fx.manager.close("weather-api").await);
    assert!(!fx.manager.close("weather-api").await);
    assert!(!fx.manager.is_active("weather-api"));
    assert!(fx.store.lock().lifecycle().usage.is_empty());
}

#[tokio::test]
async fn kill_all_tears_everything_down() {
    let mut fx = fixture();
    fx.connector.script("alpha", vec![tool("a")], Some(1));
    fx.connector.script("beta", vec![tool("b")], Some(2));
    fx.manager.spawn(&spell_config("alpha", &["a1", "a2", "a3"])).await.unwrap();
    fx.manager.spawn(&spell_config("beta", &["b1", "b2", "b3"])).await.unwrap();

    fx.manager.kill_all().await;
    assert!(fx.manager.active_names().is_empty());
    assert!(fx.store.lock().lifecycle().active_pids.is_empty());
    for client in fx.connector.clients() {
        assert_eq!(client.shutdown_count(), 1);
    }
}

#[tokio::test]
async fn orphan_recovery_kills_live_pids_and_resets_the_table() {
    let fx = fixture();
    {
        let mut store = fx.store.lock();
        store.lifecycle_mut().active_pids.insert("alpha".to_string(), 1111);
        store.lifecycle_mut().active_pids.insert("beta".to_string(), 2222);
        store.lifecycle_mut().current_turn = 9;
    }
    fx.probe.set_alive(1111);

    let mut manager = fx.manager;
    manager.load_from_storage();

    let mut probed = fx.probe.probed();
    probed.sort_unstable();
    assert_eq!(probed, vec![1111, 2222]);
    assert_eq!(fx.probe.killed(), vec![1111]);
    assert!(fx.store.lock().lifecycle().active_pids.is_empty());
    // Turn counter survives recovery untouched.
    assert_eq!(fx.store.lock().lifecycle().current_turn, 9);
}

#[tokio::test]
async fn get_client_requires_an_active_spell() {
    let mut fx = fixture();
    assert!(matches!(fx.manager.get_client("ghost"), Err(RoutingError::NotActive(_))));

    fx.manager.spawn(&spell_config("weather-api", &["weather", "forecast", "alerts"])).await.unwrap();
    assert!(fx.manager.get_client("weather-api").is_ok());
}
