// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool router: the bijection between advertised tool names and owning
//! spells, re-established before every list-changed notification.

use std::collections::HashMap;

use tracing::warn;

use grim_wire::Tool;

#[derive(Debug, Default)]
pub struct ToolRouter {
    owner_by_tool: HashMap<String, String>,
    tools_by_spell: HashMap<String, Vec<Tool>>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or idempotently replace) a spell's tool set.
    ///
    /// On a name collision across spells, the most recent registration wins
    /// and the conflict is logged; the loser's entry is removed so routing
    /// stays 1:1.
    pub fn register_tools(&mut self, spell: &str, tools: Vec<Tool>) {
        self.unregister_tools(spell);
        for tool in &tools {
            if let Some(previous) = self.owner_by_tool.insert(tool.name.clone(), spell.to_string())
            {
                if previous != spell {
                    warn!(
                        tool = %tool.name,
                        previous = %previous,
                        current = %spell,
                        "tool surface conflict; most recent registration wins"
                    );
                    if let Some(list) = self.tools_by_spell.get_mut(&previous) {
                        list.retain(|t| t.name != tool.name);
                    }
                }
            }
        }
        self.tools_by_spell.insert(spell.to_string(), tools);
    }

    /// Remove a spell and its tools from the surface.
    pub fn unregister_tools(&mut self, spell: &str) {
        let Some(tools) = self.tools_by_spell.remove(spell) else {
            return;
        };
        for tool in tools {
            // A conflict may have reassigned the name; only drop what this
            // spell still owns.
            if self.owner_by_tool.get(&tool.name).is_some_and(|owner| owner == spell) {
                self.owner_by_tool.remove(&tool.name);
            }
        }
    }

    pub fn find_spell_for_tool(&self, tool: &str) -> Option<&str> {
        self.owner_by_tool.get(tool).map(String::as_str)
    }

    pub fn active_spell_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools_by_spell.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn tools_for_spell(&self, spell: &str) -> Vec<Tool> {
        self.tools_by_spell.get(spell).cloned().unwrap_or_default()
    }

    /// Every registered tool, grouped by spell in name order.
    pub fn all_tools(&self) -> Vec<Tool> {
        self.active_spell_names()
            .iter()
            .flat_map(|spell| self.tools_for_spell(spell))
            .collect()
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
