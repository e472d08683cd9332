// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The hybrid resolver: a parallel in-memory index of keyword sets and
//! embedding vectors, scored against free-text queries.
//!
//! Scoring is deterministic given the same catalog, embeddings, and query.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use grim_core::SpellConfig;
use grim_storage::EmbeddingStore;

use crate::embedder::{cosine, normalize, Embedder};

/// Candidates at or above this confidence are activated automatically.
pub const HIGH_CONFIDENCE: f32 = 0.85;
/// Candidates in `[MEDIUM, HIGH)` are offered as alternatives.
pub const MEDIUM_CONFIDENCE: f32 = 0.50;
/// Candidates below this are discarded entirely.
pub const LOW_CONFIDENCE: f32 = 0.30;

/// How many meaningful description tokens join the keyword set.
const DESCRIPTION_KEYWORDS: usize = 10;

/// Which scoring branch produced a candidate's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Keyword,
    Semantic,
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub confidence: f32,
    pub match_type: MatchType,
}

#[derive(Debug)]
struct IndexEntry {
    keywords: HashSet<String>,
    vector: Option<Vec<f32>>,
}

pub struct HybridResolver {
    entries: HashMap<String, IndexEntry>,
    store: Arc<Mutex<EmbeddingStore>>,
    embedder: Arc<dyn Embedder>,
}

impl HybridResolver {
    pub fn new(store: Arc<Mutex<EmbeddingStore>>, embedder: Arc<dyn Embedder>) -> Self {
        Self { entries: HashMap::new(), store, embedder }
    }

    /// Index one spell: refresh its keyword set and, when the persisted
    /// embedding is missing or stale, recompute and persist the vector.
    ///
    /// A provider failure leaves the entry without a vector; keyword scoring
    /// still covers it.
    pub async fn index_spell(&mut self, config: &SpellConfig, now_ms: u64) {
        let hash = config.content_hash();
        let needs_update = self.store.lock().needs_update(&config.name, &hash);

        let vector = if needs_update {
            match self.embedder.embed(&config.indexable_text()).await {
                Ok(vector) => {
                    let vector = normalize(vector);
                    self.store.lock().set(&config.name, vector.clone(), hash, now_ms);
                    Some(vector)
                }
                Err(err) => {
                    warn!(spell = %config.name, error = %err, "embedding failed, keyword-only index");
                    None
                }
            }
        } else {
            self.store.lock().get(&config.name).map(|record| record.vector.clone())
        };

        self.entries
            .insert(config.name.clone(), IndexEntry { keywords: keyword_set(config), vector });
    }

    /// Index a batch of spells, computing all stale embeddings in a single
    /// provider round-trip. Used at startup.
    pub async fn index_all(&mut self, configs: &[Arc<SpellConfig>], now_ms: u64) {
        let mut stale: Vec<(usize, grim_core::ContentHash)> = Vec::new();
        {
            let store = self.store.lock();
            for (i, config) in configs.iter().enumerate() {
                let hash = config.content_hash();
                if store.needs_update(&config.name, &hash) {
                    stale.push((i, hash));
                }
            }
        }

        if !stale.is_empty() {
            let texts: Vec<String> =
                stale.iter().map(|(i, _)| configs[*i].indexable_text()).collect();
            match self.embedder.embed_batch(&texts).await {
                Ok(vectors) if vectors.len() == texts.len() => {
                    let mut store = self.store.lock();
                    for ((i, hash), vector) in stale.iter().zip(vectors) {
                        store.set(&configs[*i].name, normalize(vector), *hash, now_ms);
                    }
                }
                Ok(_) | Err(_) => {
                    warn!(count = stale.len(), "batch embedding failed, keyword-only index");
                }
            }
        }

        let store = self.store.lock();
        for config in configs {
            let vector = store.get(&config.name).map(|record| record.vector.clone());
            self.entries
                .insert(config.name.clone(), IndexEntry { keywords: keyword_set(config), vector });
        }
    }

    /// Drop a spell from the index and delete its persisted embedding.
    pub fn remove_spell(&mut self, name: &str) {
        self.entries.remove(name);
        self.store.lock().delete(name);
    }

    pub fn is_indexed(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Score `query` against every indexed spell and return up to `n`
    /// candidates at or above `min_confidence`, best first.
    pub async fn resolve_top_n(&self, query: &str, n: usize, min_confidence: f32) -> Vec<Candidate> {
        let tokens = tokenize(query);

        // Computed once per resolution; on provider failure every match is
        // forced to the keyword branch.
        let query_vector = match self.embedder.embed(query).await {
            Ok(vector) => Some(normalize(vector)),
            Err(err) => {
                warn!(error = %err, "query embedding failed, falling back to keyword scoring");
                None
            }
        };

        let mut candidates: Vec<Candidate> = self
            .entries
            .iter()
            .filter_map(|(name, entry)| {
                let scored = score(entry, &tokens, query_vector.as_deref());
                let candidate = Candidate {
                    name: name.clone(),
                    confidence: scored.confidence,
                    match_type: scored.match_type,
                };
                (candidate.confidence >= min_confidence).then_some(candidate)
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        candidates.truncate(n);
        debug!(query, candidates = candidates.len(), "resolution complete");
        candidates
    }
}

struct Scored {
    confidence: f32,
    match_type: MatchType,
}

fn score(entry: &IndexEntry, tokens: &[String], query_vector: Option<&[f32]>) -> Scored {
    let keyword = keyword_score(&entry.keywords, tokens);

    let Some(query_vector) = query_vector else {
        return Scored { confidence: keyword, match_type: MatchType::Keyword };
    };

    let semantic = match &entry.vector {
        // Similarity is mapped into [0,1] by clamping; anticorrelated
        // vectors must not outrank an absent match.
        Some(vector) => cosine(query_vector, vector).clamp(0.0, 1.0),
        None => 0.0,
    };

    if keyword > semantic {
        Scored { confidence: keyword, match_type: MatchType::Keyword }
    } else if semantic > keyword {
        Scored { confidence: semantic, match_type: MatchType::Semantic }
    } else {
        Scored { confidence: keyword, match_type: MatchType::Hybrid }
    }
}

/// Base `0.9 + coverage · 0.1`, with a −0.1 weak-match penalty when fewer
/// than half the query tokens hit; zero when nothing hits.
fn keyword_score(keywords: &HashSet<String>, tokens: &[String]) -> f32 {
    let q = tokens.len();
    let m = tokens.iter().filter(|t| keywords.contains(t.as_str())).count();
    if m == 0 {
        return 0.0;
    }
    let ratio = m as f32 / q.max(1) as f32;
    let mut score = 0.9 + ratio * 0.1;
    if ratio < 0.5 {
        score -= 0.1;
    }
    score
}

/// English filler dropped during tokenization. Deliberately small: spells
/// match on domain nouns, not particles.
const STOPWORDS: &[&str] = &[
    "about", "all", "and", "any", "are", "can", "could", "for", "from", "get", "give", "had",
    "has", "have", "how", "into", "its", "just", "like", "more", "most", "need", "not", "now",
    "off", "once", "only", "other", "our", "out", "over", "please", "should", "show", "some",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "use",
    "very", "want", "was", "were", "what", "when", "where", "which", "who", "will", "with",
    "would", "you", "your",
];

/// Meaningful query/description tokens: lowercased alphanumeric runs of at
/// least three characters, minus stopwords. Occurrences are kept (no
/// dedup), so repeated domain words weigh in coverage. No stemming.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= 3)
        .filter(|t| !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// A spell's keyword set: name segments, declared keywords, and the first
/// few meaningful description tokens.
fn keyword_set(config: &SpellConfig) -> HashSet<String> {
    let mut set: HashSet<String> = HashSet::new();
    set.extend(tokenize(&config.name));
    for keyword in &config.keywords {
        set.extend(tokenize(keyword));
    }
    set.extend(tokenize(&config.description).into_iter().take(DESCRIPTION_KEYWORDS));
    set
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
