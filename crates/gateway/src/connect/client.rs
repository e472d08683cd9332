// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MCP client for one downstream spell: handshake, tool listing, and tool
//! invocation over whichever transport the spell configured.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;
use tracing::info;

use grim_core::{expand_env, ServerConfig, SpellConfig};
use grim_wire::{
    method, ClientCapabilities, Implementation, InitializeParams, InitializeResult, Request,
    Response, Tool, ToolCallParams, ToolCallResult, ToolsListResult, MCP_PROTOCOL_VERSION,
};

use super::transport::{HttpTransport, StdioTransport};
use super::{resolve_headers, CallError, SpawnError};

enum Transport {
    Stdio(StdioTransport),
    Http(HttpTransport),
}

impl Transport {
    async fn request(&self, request: Request) -> Result<Response, CallError> {
        match self {
            Transport::Stdio(t) => t.request(request).await,
            Transport::Http(t) => t.request(request).await,
        }
    }

    async fn notify(&self, request: Request) -> Result<(), CallError> {
        match self {
            Transport::Stdio(t) => t.notify(request).await,
            Transport::Http(t) => t.notify(request).await,
        }
    }

    async fn shutdown(&self) {
        if let Transport::Stdio(t) = self {
            t.shutdown().await;
        }
    }

    fn pid(&self) -> Option<u32> {
        match self {
            Transport::Stdio(t) => t.pid(),
            Transport::Http(_) => None,
        }
    }
}

pub struct McpClient {
    transport: Transport,
    next_id: AtomicU64,
    call_deadline: Duration,
}

impl McpClient {
    /// Open the transport, run the initialize handshake, and fetch the tool
    /// list, all under the transport's connect deadline. On any failure the
    /// transport is torn down before the error is returned.
    pub async fn connect(
        config: &SpellConfig,
        http: &reqwest::Client,
        deadlines: &crate::env::Deadlines,
    ) -> Result<(Self, Vec<Tool>), SpawnError> {
        let (transport, deadline) = match &config.server {
            ServerConfig::Stdio { command, args, env } => {
                let mut expanded = std::collections::HashMap::new();
                for (name, value) in env {
                    let value = expand_env(value)
                        .map_err(|err| SpawnError::AuthFailed(err.to_string()))?;
                    expanded.insert(name.clone(), value);
                }
                let transport = StdioTransport::spawn(command, args, &expanded).await?;
                (Transport::Stdio(transport), deadlines.stdio_connect)
            }
            ServerConfig::Sse { url, auth, headers } => {
                let headers = resolve_headers(auth, headers, http).await?;
                let transport = HttpTransport::new(http.clone(), url.clone(), headers, true);
                (Transport::Http(transport), deadlines.remote_connect)
            }
            ServerConfig::Http { url, auth, headers } => {
                let headers = resolve_headers(auth, headers, http).await?;
                let transport = HttpTransport::new(http.clone(), url.clone(), headers, false);
                (Transport::Http(transport), deadlines.remote_connect)
            }
        };

        let client =
            Self { transport, next_id: AtomicU64::new(1), call_deadline: deadlines.call };

        let handshake = timeout(deadline, client.handshake(&config.name)).await;
        match handshake {
            Ok(Ok(tools)) => Ok((client, tools)),
            Ok(Err(err)) => {
                client.transport.shutdown().await;
                Err(err)
            }
            Err(_) => {
                client.transport.shutdown().await;
                Err(SpawnError::Timeout(deadline))
            }
        }
    }

    async fn handshake(&self, spell: &str) -> Result<Vec<Tool>, SpawnError> {
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "grimoire".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let request = Request::new(
            self.next_id(),
            method::INITIALIZE,
            Some(serde_json::to_value(&params).map_err(protocol)?),
        );
        let response = self.transport.request(request).await.map_err(connect_failed)?;
        if let Some(error) = response.error {
            return Err(SpawnError::Protocol(format!(
                "initialize failed: {} (code {})",
                error.message, error.code
            )));
        }
        if let Some(result) = response.result {
            let init: InitializeResult = serde_json::from_value(result).map_err(protocol)?;
            info!(
                spell,
                protocol = %init.protocol_version,
                server = init.server_info.as_ref().map(|s| s.name.as_str()).unwrap_or("unknown"),
                "downstream initialized"
            );
        }

        self.transport
            .notify(Request::notification(method::INITIALIZED, None))
            .await
            .map_err(connect_failed)?;

        let request = Request::new(self.next_id(), method::TOOLS_LIST, None);
        let response = self.transport.request(request).await.map_err(connect_failed)?;
        if let Some(error) = response.error {
            // Method-not-found just means the server has no tools.
            if error.code == grim_wire::METHOD_NOT_FOUND {
                return Ok(Vec::new());
            }
            return Err(SpawnError::Protocol(format!(
                "tools/list failed: {} (code {})",
                error.message, error.code
            )));
        }
        let list: ToolsListResult = match response.result {
            Some(result) => serde_json::from_value(result).map_err(protocol)?,
            None => ToolsListResult::default(),
        };
        Ok(list.tools)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

fn protocol(err: serde_json::Error) -> SpawnError {
    SpawnError::Protocol(err.to_string())
}

fn connect_failed(err: CallError) -> SpawnError {
    match err {
        CallError::Closed => SpawnError::ConnectRefused("downstream closed".to_string()),
        CallError::Timeout(d) => SpawnError::Timeout(d),
        CallError::Rpc { code, message } => {
            SpawnError::Protocol(format!("{message} (code {code})"))
        }
        CallError::Protocol(message) => SpawnError::Protocol(message),
    }
}

#[async_trait]
impl super::SpellClient for McpClient {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, CallError> {
        let params = ToolCallParams { name: name.to_string(), arguments };
        let request = Request::new(
            self.next_id(),
            method::TOOLS_CALL,
            Some(serde_json::to_value(&params).map_err(|e| CallError::Protocol(e.to_string()))?),
        );

        let response = timeout(self.call_deadline, self.transport.request(request))
            .await
            .map_err(|_| CallError::Timeout(self.call_deadline))??;

        if let Some(error) = response.error {
            return Err(CallError::Rpc { code: error.code, message: error.message });
        }
        let result = response
            .result
            .ok_or_else(|| CallError::Protocol("empty tools/call result".to_string()))?;
        serde_json::from_value(result).map_err(|e| CallError::Protocol(e.to_string()))
    }

    async fn shutdown(&self) {
        self.transport.shutdown().await;
    }

    fn pid(&self) -> Option<u32> {
        self.transport.pid()
    }
}
