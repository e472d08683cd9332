// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-safety and restart specs.

use crate::prelude::*;

/// Restart round-trip: the turn counter never decreases, usage tracking is
/// restored exactly, and embeddings survive.
#[tokio::test]
async fn restart_preserves_lifecycle_and_embeddings() {
    let mut world = world(vec![weather_spell(), news_spell()]).await;
    world.connector.script("weather-api", vec![tool("get_forecast")], None);

    world.gateway.resolve_intent("weather forecast alerts").await;
    world.gateway.call_tool("get_forecast", json!({})).await;
    let turn_before = world.turn();
    assert_eq!(turn_before, 2);
    world.store.lock().save(1_000).unwrap();

    let usage_before = world.store.lock().lifecycle().usage.clone();
    let weather_stamp =
        world.store.lock().get("weather-api").map(|r| r.timestamp_ms).unwrap();

    // Same directory, fresh process.
    let dir = world.dir;
    let restarted = world_in(dir, vec![weather_spell(), news_spell()]).await;

    assert_eq!(restarted.turn(), turn_before, "turn counter must not decrease");
    assert_eq!(restarted.store.lock().lifecycle().usage, usage_before);
    // Unchanged configs hash to the same digest, so nothing was re-embedded.
    assert_eq!(
        restarted.store.lock().get("weather-api").map(|r| r.timestamp_ms),
        Some(weather_stamp)
    );
}

/// Orphan reaping on restart: a persisted PID that no longer exists is
/// probed, the table is cleared, and the turn counter survives.
#[tokio::test]
async fn restart_reaps_persisted_orphans() {
    let world1 = world(vec![]).await;
    {
        let mut store = world1.store.lock();
        store.lifecycle_mut().current_turn = 17;
        store.lifecycle_mut().active_pids.insert("weather-api".to_string(), 99_999);
        store.save(0).unwrap();
    }

    let dir = world1.dir;
    let mut restarted = world_in(dir, vec![]).await;
    restarted.recover_orphans();

    assert_eq!(restarted.probe.probed(), vec![99_999]);
    assert!(restarted.probe.killed().is_empty(), "a dead pid needs no kill");
    assert!(restarted.store.lock().lifecycle().active_pids.is_empty());
    assert_eq!(restarted.turn(), 17);
}

/// A child that survived the crash is killed before this session starts.
#[tokio::test]
async fn restart_kills_surviving_children() {
    let world1 = world(vec![]).await;
    {
        let mut store = world1.store.lock();
        store.lifecycle_mut().active_pids.insert("weather-api".to_string(), 4242);
        store.save(0).unwrap();
    }

    let mut restarted = world_in(world1.dir, vec![]).await;
    restarted.probe.set_alive(4242);
    restarted.recover_orphans();

    assert_eq!(restarted.probe.killed(), vec![4242]);
    assert!(restarted.store.lock().lifecycle().active_pids.is_empty());
}

/// Spawn records its PID so a crash between spawn and shutdown leaves a
/// recoverable trail.
#[tokio::test]
async fn active_pids_follow_the_spell_lifecycle() {
    let mut world = world(vec![weather_spell()]).await;
    world.connector.script("weather-api", vec![tool("get_forecast")], Some(777));

    world.gateway.activate_spell("weather-api").await;
    assert_eq!(
        world.store.lock().lifecycle().active_pids.get("weather-api"),
        Some(&777)
    );

    // Idle the spell out; the PID entry goes with it.
    world.connector.script("news-feed", vec![tool("get_headlines")], None);
    world.gateway.apply_event(SpellEvent::Added(std::sync::Arc::new(news_spell()))).await;
    world.gateway.activate_spell("news-feed").await;
    for _ in 0..5 {
        world.gateway.call_tool("get_headlines", json!({})).await;
    }
    assert!(!world.gateway.lifecycle().is_active("weather-api"));
    assert!(world.store.lock().lifecycle().active_pids.get("weather-api").is_none());
}

/// Removing a spell deletes its persisted embedding; the rest survive a
/// reload of the same file.
#[tokio::test]
async fn removed_spell_loses_its_embedding() {
    let mut world = world(vec![weather_spell(), news_spell()]).await;
    assert!(world.store.lock().has("weather-api"));
    assert!(world.store.lock().has("news-feed"));

    world.gateway.apply_event(SpellEvent::Removed("weather-api".to_string())).await;
    world.store.lock().save(5).unwrap();

    let reloaded = EmbeddingStore::load(&world.store_path, MODEL);
    assert!(!reloaded.has("weather-api"));
    assert!(reloaded.has("news-feed"));
}
