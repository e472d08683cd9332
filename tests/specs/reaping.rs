// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turn accounting and reaping specs.

use crate::prelude::*;

/// Every request advances the turn counter by exactly one, including
/// failures and not_found responses.
#[tokio::test]
async fn every_request_costs_exactly_one_turn() {
    let mut world = world(vec![weather_spell()]).await;
    world.connector.script_failure("weather-api", "boom");

    assert_eq!(world.turn(), 0);
    world.gateway.resolve_intent("nothing matches this query at all").await; // not_found
    world.gateway.resolve_intent("").await; // empty
    world.gateway.activate_spell("missing-spell").await; // unknown spell
    world.gateway.call_tool("missing_tool", json!({})).await; // unknown tool
    world.gateway.resolve_intent("weather forecast alerts").await; // spawn failure
    assert_eq!(world.turn(), 5);
}

/// Idempotent spawn: repeated activation of the same spell performs one
/// real spawn.
#[tokio::test]
async fn repeated_activation_spawns_once() {
    let mut world = world(vec![weather_spell()]).await;
    world.connector.script("weather-api", vec![tool("get_forecast")], None);

    for _ in 0..3 {
        let outcome = world.gateway.activate_spell("weather-api").await;
        assert_eq!(payload(&outcome)["status"], "activated");
    }
    assert_eq!(world.connector.spawn_count("weather-api"), 1);
    assert_eq!(world.turn(), 3);
}

/// Two spells, one goes idle: after five requests that only touch the
/// other, the idle one is gone and its tools left the surface.
#[tokio::test]
async fn idle_spell_is_reaped_after_five_turns() {
    let mut world = world(vec![weather_spell(), news_spell()]).await;
    world.connector.script("weather-api", vec![tool("get_forecast")], None);
    world.connector.script("news-feed", vec![tool("get_headlines")], None);

    // Turn 1: activate weather. Turn 2: activate news.
    world.gateway.resolve_intent("weather forecast alerts").await;
    world.gateway.resolve_intent("news headlines articles").await;
    assert!(world.surface().contains(&"get_forecast".to_string()));

    // Turns 3-7: route to news only.
    let mut surface_changed = false;
    for _ in 0..5 {
        let outcome = world.gateway.call_tool("get_headlines", json!({})).await;
        surface_changed |= outcome.surface_changed;
    }
    assert_eq!(world.turn(), 7);

    assert!(surface_changed, "the reap must be announced");
    assert!(!world.gateway.lifecycle().is_active("weather-api"));
    assert!(world.gateway.lifecycle().is_active("news-feed"));

    let surface = world.surface();
    assert!(!surface.contains(&"get_forecast".to_string()));
    assert!(surface.contains(&"get_headlines".to_string()));
    assert_surface_invariant(&world);

    // The reaped child was actually shut down.
    assert_eq!(world.connector.client_for("weather-api").unwrap().shutdown_count(), 1);
}

/// A spell that keeps being used is never reaped.
#[tokio::test]
async fn active_use_resets_the_idle_clock() {
    let mut world = world(vec![weather_spell()]).await;
    world.connector.script("weather-api", vec![tool("get_forecast")], None);
    world.gateway.activate_spell("weather-api").await;

    for _ in 0..12 {
        let outcome = world.gateway.call_tool("get_forecast", json!({})).await;
        assert!(!outcome.result.is_error);
    }
    assert!(world.gateway.lifecycle().is_active("weather-api"));
    assert_eq!(world.turn(), 13);
}

/// Requests that resolve nothing still advance the clock and evict idle
/// spells; reaping runs on every turn, not only on passthrough calls.
#[tokio::test]
async fn resolution_only_turns_still_reap_idle_spells() {
    let mut world = world(vec![weather_spell()]).await;
    world.connector.script("weather-api", vec![tool("get_forecast")], None);
    world.gateway.activate_spell("weather-api").await;
    assert!(world.surface().contains(&"get_forecast".to_string()));

    let mut surface_changed = false;
    for _ in 0..5 {
        let outcome =
            world.gateway.resolve_intent("launch spaceship to mars and engage warp drive").await;
        assert_eq!(payload(&outcome)["status"], "not_found");
        surface_changed |= outcome.surface_changed;
    }

    assert!(surface_changed, "the reap must be announced");
    assert!(!world.gateway.lifecycle().is_active("weather-api"));
    assert!(!world.surface().contains(&"get_forecast".to_string()));
    assert_eq!(world.turn(), 6);
    assert_surface_invariant(&world);
}

/// Killing and re-activating a spell never yields duplicate connections.
#[tokio::test]
async fn reactivation_after_reap_creates_exactly_one_new_connection() {
    let mut world = world(vec![weather_spell(), news_spell()]).await;
    world.connector.script("weather-api", vec![tool("get_forecast")], None);
    world.connector.script("news-feed", vec![tool("get_headlines")], None);

    world.gateway.resolve_intent("weather forecast alerts").await;
    world.gateway.resolve_intent("news headlines articles").await;
    for _ in 0..5 {
        world.gateway.call_tool("get_headlines", json!({})).await;
    }
    assert!(!world.gateway.lifecycle().is_active("weather-api"));

    world.gateway.activate_spell("weather-api").await;
    assert!(world.gateway.lifecycle().is_active("weather-api"));
    assert_eq!(world.connector.spawn_count("weather-api"), 2);
    assert_surface_invariant(&world);
}
