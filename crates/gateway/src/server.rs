// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single request serializer.
//!
//! One task owns the catalog, router, and lifecycle tables and processes
//! inbound work to completion before dequeuing the next item: client frames
//! from stdin, watcher events, the debounced store flush, and shutdown.
//! Notifications and responses go out on stdout; logs go elsewhere.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use grim_core::{Clock, SpellEvent};
use grim_storage::EmbeddingStore;
use grim_wire::{
    decode, encode, method, read_frame, write_frame, Implementation, InitializeResult,
    ProtocolError, Request, Response, ServerCapabilities, ToolCallParams, ToolsCapability,
    INVALID_PARAMS, MCP_PROTOCOL_VERSION, METHOD_NOT_FOUND, PARSE_ERROR,
};

use crate::facade::{Gateway, ACTIVATE_SPELL, RESOLVE_INTENT};

pub struct Server<C: Clock> {
    gateway: Gateway<C>,
    store: Arc<Mutex<EmbeddingStore>>,
    save_debounce: Duration,
    clock: C,
}

impl<C: Clock> Server<C> {
    pub fn new(
        gateway: Gateway<C>,
        store: Arc<Mutex<EmbeddingStore>>,
        save_debounce: Duration,
        clock: C,
    ) -> Self {
        Self { gateway, store, save_debounce, clock }
    }

    /// Serve until stdin closes or a termination signal arrives, then tear
    /// down children and force a final synchronous flush.
    pub async fn run<R, W>(
        mut self,
        reader: R,
        mut writer: W,
        mut watcher_rx: mpsc::Receiver<SpellEvent>,
    ) -> Result<(), ProtocolError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        // Frames are pulled on a helper task so a slow handler never blocks
        // the pipe; the serializer below still processes one at a time.
        let (frame_tx, mut frame_rx) = mpsc::channel::<String>(16);
        tokio::spawn(async move {
            let mut reader = reader;
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(frame)) => {
                        if frame_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        error!(error = %err, "client transport read failed");
                        break;
                    }
                }
            }
        });

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        let mut flush_at: Option<Instant> = None;
        let mut watcher_open = true;

        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else {
                        info!("client transport closed");
                        break;
                    };
                    let (lines, mutated) = self.handle_frame(&frame).await;
                    for line in lines {
                        write_line(&mut writer, &line).await?;
                    }
                    if mutated {
                        flush_at = Some(Instant::now() + self.save_debounce);
                    }
                }
                event = watcher_rx.recv(), if watcher_open => {
                    let Some(event) = event else {
                        watcher_open = false;
                        continue;
                    };
                    if self.gateway.apply_event(event).await {
                        let note = Request::notification(method::TOOLS_LIST_CHANGED, None);
                        write_frame(&mut writer, &note).await?;
                    }
                    flush_at = Some(Instant::now() + self.save_debounce);
                }
                _ = sleep_until_opt(flush_at), if flush_at.is_some() => {
                    match self.store.lock().save(self.clock.epoch_ms()) {
                        Ok(()) => flush_at = None,
                        Err(err) => {
                            // Never fatal; try again after another window.
                            warn!(error = %err, "debounced store flush failed, rescheduling");
                            flush_at = Some(Instant::now() + self.save_debounce);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("termination signal received");
                    break;
                }
            }
        }

        self.gateway.shutdown().await;
        if let Err(err) = self.store.lock().save(self.clock.epoch_ms()) {
            warn!(error = %err, "final store flush failed");
        }
        info!("gateway shutdown complete");
        Ok(())
    }

    /// Handle one inbound frame. Returns the outbound lines (response first,
    /// then any notification) and whether persisted state was touched.
    async fn handle_frame(&mut self, frame: &str) -> (Vec<String>, bool) {
        let request: Request = match decode(frame) {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "malformed frame");
                return (
                    encode_all(&[Response::failure(Value::Null, PARSE_ERROR, "parse error")]),
                    false,
                );
            }
        };
        let id = request.id.clone().unwrap_or(Value::Null);

        match request.method.as_str() {
            method::INITIALIZE => {
                let result = InitializeResult {
                    protocol_version: MCP_PROTOCOL_VERSION.to_string(),
                    capabilities: ServerCapabilities {
                        tools: Some(ToolsCapability { list_changed: true }),
                        ..ServerCapabilities::default()
                    },
                    server_info: Some(Implementation {
                        name: "grimoire".to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    }),
                };
                (respond(id, serde_json::to_value(result)), false)
            }
            method::INITIALIZED => (Vec::new(), false),
            method::TOOLS_LIST => {
                let tools = self.gateway.list_tools();
                (respond(id, serde_json::to_value(json!({ "tools": tools }))), false)
            }
            method::TOOLS_CALL => {
                let params: ToolCallParams = match request
                    .params
                    .map(serde_json::from_value::<ToolCallParams>)
                {
                    Some(Ok(params)) => params,
                    _ => {
                        return (
                            encode_all(&[Response::failure(
                                id,
                                INVALID_PARAMS,
                                "tools/call requires {name, arguments}",
                            )]),
                            false,
                        )
                    }
                };

                let outcome = match params.name.as_str() {
                    RESOLVE_INTENT => {
                        let query = params.arguments["query"].as_str().unwrap_or_default();
                        self.gateway.resolve_intent(query).await
                    }
                    ACTIVATE_SPELL => {
                        let name = params.arguments["name"].as_str().unwrap_or_default();
                        self.gateway.activate_spell(name).await
                    }
                    tool => self.gateway.call_tool(tool, params.arguments.clone()).await,
                };

                let mut lines = respond(id, serde_json::to_value(&outcome.result));
                if outcome.surface_changed {
                    let note = Request::notification(method::TOOLS_LIST_CHANGED, None);
                    if let Ok(line) = encode(&note) {
                        lines.push(line);
                    }
                }
                (lines, true)
            }
            other => {
                if request.is_notification() {
                    debug!(method = other, "ignoring unknown notification");
                    (Vec::new(), false)
                } else {
                    (
                        encode_all(&[Response::failure(
                            id,
                            METHOD_NOT_FOUND,
                            format!("unknown method: {other}"),
                        )]),
                        false,
                    )
                }
            }
        }
    }
}

fn respond(id: Value, result: Result<Value, serde_json::Error>) -> Vec<String> {
    let response = match result {
        Ok(value) => Response::success(id, value),
        Err(err) => Response::failure(id, grim_wire::INTERNAL_ERROR, err.to_string()),
    };
    encode_all(&[response])
}

fn encode_all(responses: &[Response]) -> Vec<String> {
    responses.iter().filter_map(|r| encode(r).ok()).collect()
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<(), ProtocolError> {
    use tokio::io::AsyncWriteExt;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Resolves on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                warn!(error = %err, "cannot install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
