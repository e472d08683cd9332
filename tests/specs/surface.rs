// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Intent resolution and surface specs.

use crate::prelude::*;

/// High-confidence auto-spawn: one matching spell, the query overlaps its
/// keywords heavily, and the downstream tools join the surface.
#[tokio::test]
async fn high_confidence_query_auto_spawns() {
    let mut world = world(vec![weather_spell()]).await;
    world.connector.script(
        "weather-api",
        vec![tool("get_current_weather"), tool("get_forecast"), tool("get_weather_alerts")],
        None,
    );

    let outcome = world
        .gateway
        .resolve_intent("get current weather forecast and weather alerts for my city")
        .await;

    let body = payload(&outcome);
    assert_eq!(body["status"], "activated");
    assert_eq!(body["spell"]["name"], "weather-api");
    assert!(body["spell"]["confidence"].as_f64().unwrap() >= 0.85);

    let surface = world.surface();
    for name in [
        "resolve_intent",
        "activate_spell",
        "get_current_weather",
        "get_forecast",
        "get_weather_alerts",
    ] {
        assert!(surface.contains(&name.to_string()), "surface missing {name}");
    }
    assert_surface_invariant(&world);
}

/// Overlapping medium matches come back as alternatives and nothing spawns.
#[tokio::test]
async fn medium_matches_are_offered_not_spawned() {
    let mut world = world(vec![
        spell_config("weather-data", &["weather", "forecast", "data"]),
        spell_config("news-data", &["news", "trending", "data"]),
        spell_config("analytics-data", &["analytics", "report", "data"]),
    ])
    .await;

    let before = world.surface();
    let outcome =
        world.gateway.resolve_intent("show me some data information about reports").await;

    let body = payload(&outcome);
    assert_eq!(body["status"], "multiple_matches");
    let matches = body["matches"].as_array().unwrap();
    assert!(matches.len() >= 2);
    for entry in matches {
        let confidence = entry["confidence"].as_f64().unwrap();
        assert!((0.50..0.85).contains(&confidence));
    }

    assert_eq!(world.surface(), before, "no spawn may touch the surface");
    for name in ["weather-data", "news-data", "analytics-data"] {
        assert_eq!(world.connector.spawn_count(name), 0);
    }
}

/// A query matching nothing lists the whole catalog and still costs a turn.
#[tokio::test]
async fn unrelated_query_is_not_found() {
    let mut world = world(vec![
        weather_spell(),
        news_spell(),
        spell_config("sys-monitor", &["monitoring", "cpu", "memory"]),
    ])
    .await;

    let before = world.surface();
    let outcome =
        world.gateway.resolve_intent("launch spaceship to mars and activate warp drive").await;

    let body = payload(&outcome);
    assert_eq!(body["status"], "not_found");
    assert_eq!(body["availableSpells"].as_array().unwrap().len(), 3);
    assert_eq!(world.surface(), before);
    assert_eq!(world.turn(), 1);
}

#[tokio::test]
async fn empty_query_is_not_found_with_message() {
    let mut world = world(vec![weather_spell()]).await;
    let outcome = world.gateway.resolve_intent("").await;
    let body = payload(&outcome);
    assert_eq!(body["status"], "not_found");
    assert_eq!(body["message"], "Query cannot be empty");
    assert_eq!(world.turn(), 1);
}

/// Explicit activation after a multiple_matches response behaves exactly
/// like the high-confidence branch.
#[tokio::test]
async fn activate_spell_follows_up_medium_matches() {
    let mut world = world(vec![
        spell_config("weather-data", &["weather", "forecast", "data"]),
        spell_config("news-data", &["news", "trending", "data"]),
        spell_config("analytics-data", &["analytics", "report", "data"]),
    ])
    .await;
    world.connector.script("weather-data", vec![tool("query_weather_data")], None);

    let first =
        world.gateway.resolve_intent("show me some data information about reports").await;
    let body = payload(&first);
    assert_eq!(body["status"], "multiple_matches");
    let chosen = body["matches"][0]["name"].as_str().unwrap().to_string();
    assert_eq!(world.turn(), 1);

    let outcome = world.gateway.activate_spell(&chosen).await;
    let body = payload(&outcome);
    assert_eq!(body["status"], "activated");
    assert_eq!(body["spell"]["name"], chosen);
    assert_eq!(world.turn(), 2);
    assert!(outcome.surface_changed);
    assert_surface_invariant(&world);
}

#[tokio::test]
async fn activate_spell_rejects_unknown_names_with_catalog() {
    let mut world = world(vec![weather_spell(), news_spell()]).await;
    let outcome = world.gateway.activate_spell("warp-drive").await;

    assert!(outcome.result.is_error);
    let body = payload(&outcome);
    assert_eq!(body["availableSpells"].as_array().unwrap().len(), 2);
    assert_eq!(world.turn(), 1);
}

/// Steering is appended to every advertised tool description behind the
/// fixed marker.
#[tokio::test]
async fn steering_decorates_the_advertised_tools() {
    let mut spell = weather_spell();
    spell.steering = Some("Use ISO timestamps.".to_string());
    let mut world = world(vec![spell]).await;
    world.connector.script("weather-api", vec![tool("get_forecast")], None);

    world.gateway.activate_spell("weather-api").await;

    let tools = world.gateway.list_tools();
    let decorated = tools.iter().find(|t| t.name == "get_forecast").unwrap();
    let description = decorated.description.as_deref().unwrap();
    assert!(description.contains("--- EXPERT GUIDANCE ---"));
    assert!(description.ends_with("Use ISO timestamps."));

    // The meta-tools are never steered.
    let resolve = tools.iter().find(|t| t.name == "resolve_intent").unwrap();
    assert!(!resolve.description.as_deref().unwrap().contains("EXPERT GUIDANCE"));
}

/// Passthrough calls reach the owning spell and the response comes back
/// verbatim as text content.
#[tokio::test]
async fn passthrough_round_trip() {
    let mut world = world(vec![weather_spell()]).await;
    world.connector.script("weather-api", vec![tool("get_forecast")], None);
    world.gateway.activate_spell("weather-api").await;

    let outcome = world.gateway.call_tool("get_forecast", json!({"city": "Bergen"})).await;
    assert!(!outcome.result.is_error);
    match &outcome.result.content[0] {
        Content::Text { text } => assert_eq!(text, "weather-api:get_forecast ok"),
        other => panic!("unexpected content {other:?}"),
    }
    let client = world.connector.client_for("weather-api").unwrap();
    assert_eq!(client.calls().len(), 1);
    assert_surface_invariant(&world);
}
