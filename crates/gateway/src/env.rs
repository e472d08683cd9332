// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the gateway crate.

use std::path::PathBuf;
use std::time::Duration;

/// Name of the persistence file inside the spell directory.
pub const STORE_FILE: &str = "grimoire.msgpack";

/// Name of the gateway log file inside the spell directory.
pub const LOG_FILE: &str = "gateway.log";

/// Resolve the spell directory: `GRIMOIRE_HOME` (relative paths resolved
/// against the current working directory) falling back to `~/.grimoire`.
pub fn grimoire_home() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("GRIMOIRE_HOME") {
        let path = PathBuf::from(dir);
        if path.is_absolute() {
            return Some(path);
        }
        return std::env::current_dir().ok().map(|cwd| cwd.join(path));
    }
    dirs::home_dir().map(|home| home.join(".grimoire"))
}

/// Default tracing filter: `GRIMOIRE_TRACE` wins over `GRIMOIRE_DEBUG`;
/// `RUST_LOG` overrides both at subscriber construction.
pub fn log_filter() -> &'static str {
    if flag("GRIMOIRE_TRACE") {
        "trace"
    } else if flag("GRIMOIRE_DEBUG") {
        "debug"
    } else {
        "info"
    }
}

fn flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
}

fn duration_ms(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Deadlines for downstream I/O. Every suspension point carries one.
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    /// Spawn + handshake deadline for stdio children (may include a package
    /// download on first run).
    pub stdio_connect: Duration,
    /// Connect + handshake deadline for sse/http servers.
    pub remote_connect: Duration,
    /// Per tool invocation.
    pub call: Duration,
    /// Quiescence window before a debounced store flush.
    pub save_debounce: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            stdio_connect: Duration::from_secs(30),
            remote_connect: Duration::from_secs(10),
            call: Duration::from_secs(120),
            save_debounce: Duration::from_secs(5),
        }
    }
}

impl Deadlines {
    /// Defaults with `GRIMOIRE_SPAWN_TIMEOUT_MS` / `GRIMOIRE_CALL_TIMEOUT_MS`
    /// overrides applied.
    pub fn from_env() -> Self {
        let mut deadlines = Self::default();
        if let Some(spawn) = duration_ms("GRIMOIRE_SPAWN_TIMEOUT_MS") {
            deadlines.stdio_connect = spawn;
            deadlines.remote_connect = spawn;
        }
        if let Some(call) = duration_ms("GRIMOIRE_CALL_TIMEOUT_MS") {
            deadlines.call = call;
        }
        deadlines
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
