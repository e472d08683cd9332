// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! grimd: the grimoire gateway daemon.
//!
//! Speaks MCP over stdio to the client agent; logs go to stderr and to a
//! rolling file in the spell directory, never to stdout.

use std::sync::Arc;

use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use grim_core::SystemClock;
use grim_gateway::env;
use grim_gateway::server::Server;
use grim_gateway::{startup, GatewayConfig, McpConnector, SignalProbe};
use grim_resolver::{Embedder, HashingEmbedder, HttpEmbedder};

fn init_tracing(config: &GatewayConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(env::log_filter()));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_appender = config
        .log_path
        .parent()
        .map(|dir| tracing_appender::rolling::never(dir, env::LOG_FILE));
    match file_appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer =
                tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr_layer).init();
            None
        }
    }
}

/// Pick the embedding provider: a remote OpenAI-compatible endpoint when
/// `GRIMOIRE_EMBED_URL` is set, the offline hashing embedder otherwise.
fn build_embedder(deadlines: &env::Deadlines) -> Arc<dyn Embedder> {
    match std::env::var("GRIMOIRE_EMBED_URL") {
        Ok(url) if !url.is_empty() => {
            let client = reqwest::Client::builder()
                .timeout(deadlines.remote_connect)
                .build()
                .unwrap_or_default();
            let api_key = std::env::var("GRIMOIRE_EMBED_API_KEY").ok().filter(|k| !k.is_empty());
            let model = std::env::var("GRIMOIRE_EMBED_MODEL")
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "text-embedding-3-small".to_string());
            Arc::new(HttpEmbedder::new(client, url, api_key, model))
        }
        _ => Arc::new(HashingEmbedder),
    }
}

#[tokio::main]
async fn main() {
    let config = match GatewayConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("grimd: startup failed: {err}");
            std::process::exit(1);
        }
    };
    let _log_guard = init_tracing(&config);
    info!(version = env!("CARGO_PKG_VERSION"), home = %config.spell_dir.display(), "grimd starting");

    let embedder = build_embedder(&config.deadlines);
    let connector = Arc::new(McpConnector::new(config.deadlines));
    let probe = Arc::new(SignalProbe);
    let clock = SystemClock;

    let (gateway, store) = startup(&config, embedder, connector, probe, clock.clone()).await;

    // The watcher is an external collaborator; its events arrive on this
    // channel and are serialized with client requests. The sender is held
    // so an absent watcher never closes the channel.
    let (_watcher_tx, watcher_rx) = mpsc::channel(32);

    let server = Server::new(gateway, store, config.deadlines.save_debounce, clock);
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    if let Err(err) = server.run(stdin, stdout, watcher_rx).await {
        eprintln!("grimd: transport failure: {err}");
        std::process::exit(1);
    }
}
