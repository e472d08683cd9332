// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spell-file discovery: scan the spell directory for `*.spell.yaml`.
//!
//! Hot reload is the watcher's job; the gateway only consumes its events.
//! This scan feeds the same `add` path once, at startup.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use grim_core::SpellConfig;

pub const SPELL_SUFFIX: &str = ".spell.yaml";

/// Parse every spell file under `dir`. Offending files are skipped with a
/// warning; duplicate names keep the first file loaded (directory order is
/// made deterministic by sorting paths).
pub fn scan_spell_dir(dir: &Path) -> Vec<SpellConfig> {
    let mut paths: Vec<std::path::PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(SPELL_SUFFIX))
            })
            .collect(),
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "cannot read spell directory");
            return Vec::new();
        }
    };
    paths.sort();

    let mut seen: HashSet<String> = HashSet::new();
    let mut configs = Vec::new();
    for path in paths {
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "skipping unreadable spell file");
                continue;
            }
        };
        match SpellConfig::from_yaml_str(&text) {
            Ok(config) => {
                if !seen.insert(config.name.clone()) {
                    warn!(
                        file = %path.display(),
                        spell = %config.name,
                        "skipping duplicate spell name; first file loaded wins"
                    );
                    continue;
                }
                debug!(file = %path.display(), spell = %config.name, "loaded spell");
                configs.push(config);
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "skipping invalid spell file");
            }
        }
    }
    configs
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
