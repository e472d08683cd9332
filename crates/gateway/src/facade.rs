// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The gateway facade: two meta-tools, passthrough routing, and the
//! advertised surface.
//!
//! Every operation here runs on the single request serializer, so catalog,
//! router, and lifecycle tables need no cross-request locking. Per request
//! the ordering is fixed: spawn → register → turn → reap → notify.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use grim_core::{Catalog, Clock, SpellEvent};
use grim_resolver::{Candidate, HybridResolver, MatchType, HIGH_CONFIDENCE, LOW_CONFIDENCE, MEDIUM_CONFIDENCE};
use grim_wire::{Tool, ToolCallResult};

use crate::lifecycle::LifecycleManager;
use crate::router::ToolRouter;

pub const RESOLVE_INTENT: &str = "resolve_intent";
pub const ACTIVATE_SPELL: &str = "activate_spell";

/// Separator between a tool's own description and the spell's steering.
pub const STEERING_MARKER: &str = "\n\n--- EXPERT GUIDANCE ---\n";

const MEDIUM_ALTERNATIVES: usize = 3;
const WEAK_ALTERNATIVES: usize = 5;
const KEYWORD_PREVIEW: usize = 5;

/// What one facade operation produced: the content object for the client
/// and whether the advertised surface changed (one notification covers both
/// new registrations and reaped removals).
#[derive(Debug)]
pub struct Outcome {
    pub result: ToolCallResult,
    pub surface_changed: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ResolvePayload {
    Activated {
        spell: ActivatedSpell,
        tools: Vec<String>,
    },
    MultipleMatches {
        query: String,
        message: String,
        matches: Vec<MatchEntry>,
    },
    WeakMatches {
        query: String,
        message: String,
        matches: Vec<MatchEntry>,
    },
    NotFound {
        query: String,
        message: String,
        #[serde(rename = "availableSpells")]
        available_spells: Vec<SpellListing>,
    },
}

#[derive(Debug, Serialize)]
struct ActivatedSpell {
    name: String,
    confidence: f32,
    #[serde(rename = "matchType")]
    match_type: &'static str,
}

#[derive(Debug, Serialize)]
struct MatchEntry {
    name: String,
    confidence: f32,
    #[serde(rename = "matchType")]
    match_type: &'static str,
    description: String,
    keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SpellListing {
    name: String,
    description: String,
}

fn match_label(match_type: MatchType) -> &'static str {
    match match_type {
        MatchType::Keyword => "keyword",
        MatchType::Semantic => "semantic",
        MatchType::Hybrid => "hybrid",
    }
}

fn payload_result(payload: &ResolvePayload) -> ToolCallResult {
    match serde_json::to_string_pretty(payload) {
        Ok(text) => ToolCallResult::text(text),
        Err(err) => ToolCallResult::error_text(format!("internal serialization error: {err}")),
    }
}

pub struct Gateway<C: Clock> {
    catalog: Catalog,
    resolver: HybridResolver,
    lifecycle: LifecycleManager,
    router: ToolRouter,
    reap_threshold: u64,
    clock: C,
}

impl<C: Clock> Gateway<C> {
    pub fn new(
        catalog: Catalog,
        resolver: HybridResolver,
        lifecycle: LifecycleManager,
        reap_threshold: u64,
        clock: C,
    ) -> Self {
        Self {
            catalog,
            resolver,
            lifecycle,
            router: ToolRouter::new(),
            reap_threshold,
            clock,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// The advertised surface: the two meta-tools plus the union of every
    /// active spell's tools.
    pub fn list_tools(&self) -> Vec<Tool> {
        let mut tools = self.meta_tools();
        tools.extend(self.router.all_tools());
        tools
    }

    fn meta_tools(&self) -> Vec<Tool> {
        let resolve = Tool::new(
            RESOLVE_INTENT,
            "Find the right tool server for a task. Describe what you want to do in natural \
             language; a high-confidence match is activated automatically and its tools join \
             this tool list.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What you want to accomplish, in natural language"
                    }
                },
                "required": ["query"]
            }),
        );

        // The enum is a hint for clients; unknown names still reach the
        // handler and fail with the catalog attached.
        let names = self.catalog.names();
        let mut name_schema = json!({
            "type": "string",
            "description": "Name of the spell to activate"
        });
        if !names.is_empty() {
            name_schema["enum"] = json!(names);
        }
        let activate = Tool::new(
            ACTIVATE_SPELL,
            "Activate a specific spell by name, typically after resolve_intent offered \
             multiple candidates.",
            json!({
                "type": "object",
                "properties": { "name": name_schema },
                "required": ["name"]
            }),
        );

        vec![resolve, activate]
    }

    /// `resolve_intent` meta-tool: tiered by the top candidate's confidence.
    pub async fn resolve_intent(&mut self, query: &str) -> Outcome {
        if query.trim().is_empty() {
            let surface_changed = self.finish_turn().await;
            return Outcome {
                result: payload_result(&self.not_found(
                    query,
                    "Query cannot be empty".to_string(),
                )),
                surface_changed,
            };
        }

        let candidates =
            self.resolver.resolve_top_n(query, WEAK_ALTERNATIVES, LOW_CONFIDENCE).await;

        match candidates.first() {
            Some(top) if top.confidence >= HIGH_CONFIDENCE => {
                let top = top.clone();
                self.activate(&top.name, top.confidence, match_label(top.match_type), query).await
            }
            Some(top) if top.confidence >= MEDIUM_CONFIDENCE => {
                let matches = self.match_entries(&candidates, MEDIUM_ALTERNATIVES);
                let surface_changed = self.finish_turn().await;
                Outcome {
                    result: payload_result(&ResolvePayload::MultipleMatches {
                        query: query.to_string(),
                        message: "Multiple spells match; call activate_spell with one of them."
                            .to_string(),
                        matches,
                    }),
                    surface_changed,
                }
            }
            Some(_) => {
                let matches = self.match_entries(&candidates, WEAK_ALTERNATIVES);
                let surface_changed = self.finish_turn().await;
                Outcome {
                    result: payload_result(&ResolvePayload::WeakMatches {
                        query: query.to_string(),
                        message: "Only weak matches found; call activate_spell to pick one anyway."
                            .to_string(),
                        matches,
                    }),
                    surface_changed,
                }
            }
            None => {
                let surface_changed = self.finish_turn().await;
                Outcome {
                    result: payload_result(&self.not_found(
                        query,
                        format!("No spell matches {query:?}"),
                    )),
                    surface_changed,
                }
            }
        }
    }

    /// `activate_spell` meta-tool: the explicit follow-up to a
    /// multiple_matches response.
    pub async fn activate_spell(&mut self, name: &str) -> Outcome {
        if !self.catalog.contains(name) {
            let surface_changed = self.finish_turn().await;
            let payload = self.not_found(name, format!("Unknown spell {name:?}"));
            let mut result = payload_result(&payload);
            result.is_error = true;
            return Outcome { result, surface_changed };
        }
        self.activate(name, 1.0, "explicit", name).await
    }

    /// Shared activation path: spawn → steer → register → turn → reap.
    async fn activate(
        &mut self,
        name: &str,
        confidence: f32,
        match_type: &'static str,
        query: &str,
    ) -> Outcome {
        let Some(config) = self.catalog.get(name).cloned() else {
            let surface_changed = self.finish_turn().await;
            return Outcome {
                result: payload_result(&self.not_found(query, format!("Unknown spell {name:?}"))),
                surface_changed,
            };
        };

        let tools = match self.lifecycle.spawn(&config).await {
            Ok(tools) => tools,
            Err(err) => {
                warn!(spell = %name, error = %err, "spawn failed");
                let surface_changed = self.finish_turn().await;
                return Outcome {
                    result: payload_result(&self.not_found(
                        query,
                        format!("Failed to activate {name}: {err}"),
                    )),
                    surface_changed,
                };
            }
        };

        let enhanced = decorate_tools(tools, config.steering.as_deref());
        let tool_names: Vec<String> = enhanced.iter().map(|t| t.name.clone()).collect();

        self.lifecycle.mark_used(name);
        self.router.register_tools(name, enhanced);
        self.finish_turn().await;

        info!(spell = %name, confidence, "spell activated for client");
        Outcome {
            result: payload_result(&ResolvePayload::Activated {
                spell: ActivatedSpell { name: name.to_string(), confidence, match_type },
                tools: tool_names,
            }),
            surface_changed: true,
        }
    }

    /// Passthrough: route a tool call to the owning spell.
    pub async fn call_tool(&mut self, tool_name: &str, arguments: Value) -> Outcome {
        let Some(spell) = self.router.find_spell_for_tool(tool_name).map(str::to_string) else {
            let surface_changed = self.finish_turn().await;
            return Outcome {
                result: ToolCallResult::error_text(format!("Unknown tool: {tool_name}")),
                surface_changed,
            };
        };

        let client = match self.lifecycle.get_client(&spell) {
            Ok(client) => client,
            Err(err) => {
                let surface_changed = self.finish_turn().await;
                return Outcome {
                    result: ToolCallResult::error_text(err.to_string()),
                    surface_changed,
                };
            }
        };

        match client.call_tool(tool_name, arguments).await {
            Ok(result) => {
                self.lifecycle.mark_used(&spell);
                let surface_changed = self.finish_turn().await;
                Outcome { result: result.into_text_only(), surface_changed }
            }
            Err(err) => {
                warn!(spell = %spell, tool = %tool_name, error = %err, "downstream call failed");
                let surface_changed = self.finish_turn().await;
                Outcome {
                    result: ToolCallResult::error_text(format!(
                        "Tool call {tool_name} failed: {err}"
                    )),
                    surface_changed,
                }
            }
        }
    }

    /// Watcher intake, serialized with client requests. Returns whether the
    /// advertised surface changed.
    pub async fn apply_event(&mut self, event: SpellEvent) -> bool {
        match event {
            SpellEvent::Added(config) => {
                info!(spell = %config.name, "spell added");
                self.resolver.index_spell(&config, self.clock.epoch_ms()).await;
                self.catalog.insert((*config).clone());
                false
            }
            SpellEvent::Updated(config) => {
                info!(spell = %config.name, "spell updated");
                let was_active = self.lifecycle.close(&config.name).await;
                if was_active {
                    self.router.unregister_tools(&config.name);
                }
                self.resolver.index_spell(&config, self.clock.epoch_ms()).await;
                self.catalog.insert((*config).clone());
                was_active
            }
            SpellEvent::Removed(name) => {
                info!(spell = %name, "spell removed");
                let was_active = self.lifecycle.close(&name).await;
                if was_active {
                    self.router.unregister_tools(&name);
                }
                self.resolver.remove_spell(&name);
                self.catalog.remove(&name);
                was_active
            }
        }
    }

    /// Graceful teardown of every downstream connection.
    pub async fn shutdown(&mut self) {
        self.lifecycle.kill_all().await;
    }

    /// Per-request bookkeeping: advance the turn, then run the reap pass.
    /// Runs on every facade request, successes and failures alike. Returns
    /// whether the reap changed the advertised surface.
    async fn finish_turn(&mut self) -> bool {
        self.lifecycle.increment_turn();
        !self.reap().await.is_empty()
    }

    async fn reap(&mut self) -> Vec<String> {
        let reaped = self.lifecycle.cleanup_inactive(self.reap_threshold).await;
        for name in &reaped {
            self.router.unregister_tools(name);
        }
        if !reaped.is_empty() {
            info!(reaped = reaped.len(), "idle spells reaped");
        }
        reaped
    }

    fn match_entries(&self, candidates: &[Candidate], limit: usize) -> Vec<MatchEntry> {
        candidates
            .iter()
            .take(limit)
            .map(|candidate| {
                let config = self.catalog.get(&candidate.name);
                MatchEntry {
                    name: candidate.name.clone(),
                    confidence: candidate.confidence,
                    match_type: match_label(candidate.match_type),
                    description: config.map(|c| c.description.clone()).unwrap_or_default(),
                    keywords: config
                        .map(|c| c.keywords.iter().take(KEYWORD_PREVIEW).cloned().collect())
                        .unwrap_or_default(),
                }
            })
            .collect()
    }

    fn not_found(&self, query: &str, message: String) -> ResolvePayload {
        ResolvePayload::NotFound {
            query: query.to_string(),
            message,
            available_spells: self
                .catalog
                .iter()
                .map(|config| SpellListing {
                    name: config.name.clone(),
                    description: config.description.clone(),
                })
                .collect(),
        }
    }
}

/// Append the spell's steering to each tool description, when present.
fn decorate_tools(tools: Vec<Tool>, steering: Option<&str>) -> Vec<Tool> {
    let Some(steering) = steering.filter(|s| !s.is_empty()) else {
        return tools;
    };
    tools
        .into_iter()
        .map(|mut tool| {
            let base = tool.description.take().unwrap_or_default();
            tool.description = Some(format!("{base}{STEERING_MARKER}{steering}"));
            tool
        })
        .collect()
}

#[cfg(test)]
#[path = "facade_tests.rs"]
mod tests;
