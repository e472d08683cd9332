// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Downstream connections: transports, auth, and the MCP client.

mod auth;
mod client;
mod transport;

pub use auth::resolve_headers;
pub use client::McpClient;
pub use transport::{HttpTransport, StdioTransport};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use grim_core::SpellConfig;
use grim_wire::{Tool, ToolCallResult};

use crate::env::Deadlines;

/// Why a spell failed to come up. Partially-acquired resources are released
/// before any of these is returned; the catalog is untouched.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("permission denied running {0}")]
    PermissionDenied(String),

    #[error("connection refused: {0}")]
    ConnectRefused(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("timed out after {0:?} while connecting")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Why a tool invocation on an active spell failed.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("downstream connection closed")]
    Closed,

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("downstream error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// An open connection to one active spell.
#[async_trait]
pub trait SpellClient: Send + Sync {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, CallError>;

    /// Close the connection and, for stdio transports, terminate the child.
    async fn shutdown(&self);

    /// Child PID for orphan recovery; `None` for remote transports.
    fn pid(&self) -> Option<u32>;
}

/// Connection factory, the seam between the lifecycle manager and real
/// transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &SpellConfig,
    ) -> Result<(Arc<dyn SpellClient>, Vec<Tool>), SpawnError>;
}

/// The production connector: spawns children or opens HTTP clients per the
/// spell's transport, then runs the MCP handshake.
pub struct McpConnector {
    http: reqwest::Client,
    deadlines: Deadlines,
}

impl McpConnector {
    pub fn new(deadlines: Deadlines) -> Self {
        Self { http: reqwest::Client::new(), deadlines }
    }
}

#[async_trait]
impl Connector for McpConnector {
    async fn connect(
        &self,
        config: &SpellConfig,
    ) -> Result<(Arc<dyn SpellClient>, Vec<Tool>), SpawnError> {
        let (client, tools) = McpClient::connect(config, &self.http, &self.deadlines).await?;
        Ok((Arc::new(client), tools))
    }
}
