// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes and builders shared by this crate's tests and the workspace specs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use grim_core::{ServerConfig, SpellConfig};
use grim_wire::{Tool, ToolCallResult};

use crate::connect::{CallError, Connector, SpawnError, SpellClient};
use crate::probe::{Liveness, ProcessProbe};

/// Build a minimal valid stdio spell config.
pub fn spell_config(name: &str, keywords: &[&str]) -> SpellConfig {
    SpellConfig {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        description: format!("{name} test spell"),
        keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        steering: None,
        server: ServerConfig::Stdio {
            command: "true".to_string(),
            args: vec![],
            env: HashMap::new(),
        },
    }
}

/// Build a tool with an empty object schema.
pub fn tool(name: &str) -> Tool {
    Tool::new(name, format!("{name} test tool"), json!({"type": "object", "properties": {}}))
}

/// A scripted connection for one spell.
#[derive(Clone)]
struct Script {
    tools: Vec<Tool>,
    pid: Option<u32>,
    fail: Option<String>,
    call_error: bool,
}

#[derive(Default)]
struct ConnectorState {
    scripts: HashMap<String, Script>,
    spawn_counts: HashMap<String, usize>,
    clients: Vec<Arc<FakeSpellClient>>,
}

/// Connector returning scripted clients instead of spawning processes.
#[derive(Default)]
pub struct FakeConnector {
    state: Mutex<ConnectorState>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script a successful connection exposing `tools`.
    pub fn script(&self, name: &str, tools: Vec<Tool>, pid: Option<u32>) {
        self.state.lock().scripts.insert(
            name.to_string(),
            Script { tools, pid, fail: None, call_error: false },
        );
    }

    /// Script a connection failure.
    pub fn script_failure(&self, name: &str, message: &str) {
        self.state.lock().scripts.insert(
            name.to_string(),
            Script { tools: vec![], pid: None, fail: Some(message.to_string()), call_error: false },
        );
    }

    /// Script a connection whose tool calls fail downstream.
    pub fn script_call_errors(&self, name: &str, tools: Vec<Tool>) {
        self.state.lock().scripts.insert(
            name.to_string(),
            Script { tools, pid: None, fail: None, call_error: true },
        );
    }

    /// How many real spawns happened for `name`.
    pub fn spawn_count(&self, name: &str) -> usize {
        self.state.lock().spawn_counts.get(name).copied().unwrap_or(0)
    }

    /// Every client handed out so far, in spawn order.
    pub fn clients(&self) -> Vec<Arc<FakeSpellClient>> {
        self.state.lock().clients.clone()
    }

    /// The most recent client for `name`, if any.
    pub fn client_for(&self, name: &str) -> Option<Arc<FakeSpellClient>> {
        self.state.lock().clients.iter().rev().find(|c| c.spell == name).cloned()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        config: &SpellConfig,
    ) -> Result<(Arc<dyn SpellClient>, Vec<Tool>), SpawnError> {
        let mut state = self.state.lock();
        *state.spawn_counts.entry(config.name.clone()).or_insert(0) += 1;

        let script = state.scripts.get(&config.name).cloned().unwrap_or(Script {
            tools: vec![tool(&format!("{}_tool", config.name.replace('-', "_")))],
            pid: None,
            fail: None,
            call_error: false,
        });

        if let Some(message) = script.fail {
            return Err(SpawnError::ConnectRefused(message));
        }

        let client = Arc::new(FakeSpellClient {
            spell: config.name.clone(),
            pid: script.pid,
            call_error: script.call_error,
            calls: Mutex::new(Vec::new()),
            shutdowns: Mutex::new(0),
        });
        state.clients.push(client.clone());
        Ok((client.clone(), script.tools))
    }
}

/// Client recording calls and shutdowns.
pub struct FakeSpellClient {
    pub spell: String,
    pid: Option<u32>,
    call_error: bool,
    calls: Mutex<Vec<(String, Value)>>,
    shutdowns: Mutex<usize>,
}

impl FakeSpellClient {
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    pub fn shutdown_count(&self) -> usize {
        *self.shutdowns.lock()
    }
}

#[async_trait]
impl SpellClient for FakeSpellClient {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, CallError> {
        self.calls.lock().push((name.to_string(), arguments));
        if self.call_error {
            return Err(CallError::Rpc { code: -32000, message: "scripted failure".to_string() });
        }
        Ok(ToolCallResult::text(format!("{}:{} ok", self.spell, name)))
    }

    async fn shutdown(&self) {
        *self.shutdowns.lock() += 1;
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

#[derive(Default)]
struct ProbeState {
    alive: HashSet<u32>,
    probed: Vec<u32>,
    killed: Vec<u32>,
}

/// Probe with a scriptable set of live PIDs.
#[derive(Default)]
pub struct FakeProbe {
    state: Mutex<ProbeState>,
}

impl FakeProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_alive(&self, pid: u32) {
        self.state.lock().alive.insert(pid);
    }

    pub fn probed(&self) -> Vec<u32> {
        self.state.lock().probed.clone()
    }

    pub fn killed(&self) -> Vec<u32> {
        self.state.lock().killed.clone()
    }
}

impl ProcessProbe for FakeProbe {
    fn probe(&self, pid: u32) -> Liveness {
        let mut state = self.state.lock();
        state.probed.push(pid);
        if state.alive.contains(&pid) {
            Liveness::Alive
        } else {
            Liveness::Dead
        }
    }

    fn kill(&self, pid: u32) {
        let mut state = self.state.lock();
        state.killed.push(pid);
        state.alive.remove(&pid);
    }
}
