// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Downstream transports.
//!
//! Stdio spawns a child process and routes newline-delimited JSON-RPC over
//! its pipes; remote transports POST each message and read the reply from
//! the body (plain JSON, or SSE `data:` events for servers that stream).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use grim_wire::{decode, encode, read_frame, Request, Response};

use super::{CallError, SpawnError};

/// A spawned stdio child with reader/writer tasks routing responses back to
/// their callers by request id.
pub struct StdioTransport {
    writer_tx: mpsc::Sender<String>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>,
    child: Arc<Mutex<Option<Child>>>,
    pid: Option<u32>,
}

impl StdioTransport {
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, SpawnError> {
        info!(command, ?args, "spawning stdio spell");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => SpawnError::CommandNotFound(command.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                SpawnError::PermissionDenied(command.to_string())
            }
            _ => SpawnError::Protocol(format!("spawn {command}: {err}")),
        })?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SpawnError::Protocol("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpawnError::Protocol("child stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SpawnError::Protocol("child stderr unavailable".to_string()))?;

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        // Writer task: one frame per line down the child's stdin.
        let (writer_tx, mut writer_rx) = mpsc::channel::<String>(64);
        {
            let mut stdin = stdin;
            tokio::spawn(async move {
                use tokio::io::AsyncWriteExt;
                while let Some(mut line) = writer_rx.recv().await {
                    line.push('\n');
                    if let Err(err) = stdin.write_all(line.as_bytes()).await {
                        error!(error = %err, "child stdin write failed");
                        break;
                    }
                    if let Err(err) = stdin.flush().await {
                        error!(error = %err, "child stdin flush failed");
                        break;
                    }
                }
            });
        }

        // Reader task: match responses to pending requests by id; server
        // notifications are logged and dropped.
        {
            let pending = Arc::clone(&pending);
            let mut reader = BufReader::new(stdout);
            tokio::spawn(async move {
                loop {
                    match read_frame(&mut reader).await {
                        Ok(Some(frame)) => match decode::<Response>(&frame) {
                            Ok(response) => {
                                let Some(id) = response.id.as_u64() else {
                                    debug!("dropping frame without numeric id");
                                    continue;
                                };
                                if let Some(tx) = pending.lock().remove(&id) {
                                    let _ = tx.send(response);
                                } else {
                                    debug!(id, "response for unknown request id");
                                }
                            }
                            Err(_) => debug!("dropping non-response frame from child"),
                        },
                        Ok(None) => {
                            info!("child stdout closed");
                            break;
                        }
                        Err(err) => {
                            error!(error = %err, "child stdout read failed");
                            break;
                        }
                    }
                }
                // Unblock every caller still waiting.
                pending.lock().clear();
            });
        }

        // Stderr drain: children log freely; keep it out of our protocol.
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            debug!(target: "spell_stderr", "{trimmed}");
                        }
                    }
                }
            }
        });

        Ok(Self {
            writer_tx,
            pending,
            child: Arc::new(Mutex::new(Some(child))),
            pid,
        })
    }

    pub async fn request(&self, request: Request) -> Result<Response, CallError> {
        let id = request
            .id
            .as_ref()
            .and_then(Value::as_u64)
            .ok_or_else(|| CallError::Protocol("request without numeric id".to_string()))?;
        let line = encode(&request).map_err(|e| CallError::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if self.writer_tx.send(line).await.is_err() {
            self.pending.lock().remove(&id);
            return Err(CallError::Closed);
        }

        match rx.await {
            Ok(response) => Ok(response),
            Err(_) => Err(CallError::Closed),
        }
    }

    pub async fn notify(&self, request: Request) -> Result<(), CallError> {
        let line = encode(&request).map_err(|e| CallError::Protocol(e.to_string()))?;
        self.writer_tx.send(line).await.map_err(|_| CallError::Closed)
    }

    /// Kill the child and reap it. Idempotent.
    pub async fn shutdown(&self) {
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            if let Err(err) = child.start_kill() {
                warn!(error = %err, "failed to kill child");
            }
            let _ = child.wait().await;
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Remote transport for `http` and `sse` servers: one POST per message.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    sse: bool,
}

impl HttpTransport {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        headers: Vec<(String, String)>,
        sse: bool,
    ) -> Self {
        Self { client, url: url.into(), headers, sse }
    }

    fn post(&self, request: &Request) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(&self.url).json(request);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        if self.sse {
            builder = builder.header("Accept", "text/event-stream");
        }
        builder
    }

    pub async fn request(&self, request: Request) -> Result<Response, CallError> {
        let response = self
            .post(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() {
                    CallError::Closed
                } else {
                    CallError::Protocol(err.to_string())
                }
            })?
            .error_for_status()
            .map_err(|err| CallError::Protocol(err.to_string()))?;

        if self.sse {
            let want_id = request.id.as_ref().and_then(Value::as_u64);
            read_sse_response(response, want_id).await
        } else {
            response
                .json::<Response>()
                .await
                .map_err(|err| CallError::Protocol(err.to_string()))
        }
    }

    pub async fn notify(&self, request: Request) -> Result<(), CallError> {
        self.post(&request)
            .send()
            .await
            .map_err(|err| CallError::Protocol(err.to_string()))?;
        Ok(())
    }
}

/// Scan an SSE body for the `data:` event carrying the response to `want_id`.
async fn read_sse_response(
    response: reqwest::Response,
    want_id: Option<u64>,
) -> Result<Response, CallError> {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| CallError::Protocol(err.to_string()))?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        // Events are separated by a blank line; process complete ones.
        while let Some(split) = buffer.find("\n\n") {
            let event: String = buffer[..split].to_string();
            buffer.drain(..split + 2);
            for line in event.lines() {
                let Some(data) = line.strip_prefix("data:") else { continue };
                if let Ok(parsed) = decode::<Response>(data.trim()) {
                    if want_id.is_none() || parsed.id.as_u64() == want_id {
                        return Ok(parsed);
                    }
                }
            }
        }
    }

    // Some servers answer a POST with a bare JSON body even when asked for
    // an event stream.
    if let Ok(parsed) = decode::<Response>(buffer.trim()) {
        return Ok(parsed);
    }
    Err(CallError::Protocol("event stream ended without a response".to_string()))
}
