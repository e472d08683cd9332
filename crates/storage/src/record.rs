// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted store record and version migration.
//!
//! The on-disk format is a single msgpack document with named struct maps.
//! v1 predates lifecycle tracking; loading a v1 record attaches an empty
//! lifecycle block and re-stamps the version.

use std::collections::HashMap;

use grim_core::ContentHash;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Current store schema version.
pub const STORE_VERSION: u32 = 2;

/// Versions [`decode`] accepts; anything else reinitializes the store.
const SUPPORTED_VERSIONS: [u32; 2] = [1, 2];

/// Dimension of every persisted embedding vector.
pub const EMBEDDING_DIM: usize = 384;

/// One spell's persisted embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unit-normalized vector of [`EMBEDDING_DIM`] components.
    pub vector: Vec<f32>,
    /// Digest of the indexable text the vector was computed from.
    pub hash: ContentHash,
    /// When the vector was computed, ms since epoch.
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub last_used_turn: u64,
}

/// Global lifecycle bookkeeping, persisted alongside the embeddings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    /// Monotonic turn counter; never decreases across restarts.
    pub current_turn: u64,
    /// Per-spell usage; an entry exists only once the spell was marked used.
    #[serde(default)]
    pub usage: HashMap<String, UsageRecord>,
    /// Child PIDs of active stdio spells, for orphan recovery.
    #[serde(default)]
    pub active_pids: HashMap<String, u32>,
    /// When the store was last flushed, ms since epoch.
    #[serde(default)]
    pub last_saved_ms: u64,
}

/// The full on-disk document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoreRecord {
    pub version: u32,
    pub model_name: String,
    pub dimension: u32,
    pub spells: HashMap<String, EmbeddingRecord>,
    #[serde(default)]
    pub lifecycle: Option<LifecycleRecord>,
}

/// A v2 record whose lifecycle block is unreadable; embeddings survive.
#[derive(Debug, Deserialize)]
struct EmbeddingsOnlyRecord {
    version: u32,
    model_name: String,
    dimension: u32,
    spells: HashMap<String, EmbeddingRecord>,
    #[serde(default)]
    #[allow(dead_code)]
    lifecycle: Option<serde::de::IgnoredAny>,
}

/// Decoded store contents, lifecycle always present.
#[derive(Debug, Clone)]
pub(crate) struct DecodedStore {
    pub model_name: String,
    pub dimension: u32,
    pub spells: HashMap<String, EmbeddingRecord>,
    pub lifecycle: LifecycleRecord,
}

/// Decode persisted bytes. `None` means the record is unusable and the
/// caller reinitializes; a corrupted lifecycle subrecord alone is recovered
/// by resetting it while keeping the embeddings.
pub(crate) fn decode(bytes: &[u8]) -> Option<DecodedStore> {
    match rmp_serde::from_slice::<StoreRecord>(bytes) {
        Ok(record) => {
            if !SUPPORTED_VERSIONS.contains(&record.version) {
                warn!(version = record.version, "unsupported store version, reinitializing");
                return None;
            }
            let lifecycle = record.lifecycle.unwrap_or_default();
            Some(DecodedStore {
                model_name: record.model_name,
                dimension: record.dimension,
                spells: record.spells,
                lifecycle,
            })
        }
        Err(full_err) => match rmp_serde::from_slice::<EmbeddingsOnlyRecord>(bytes) {
            Ok(partial) if SUPPORTED_VERSIONS.contains(&partial.version) => {
                warn!("lifecycle subrecord unreadable, resetting it and keeping embeddings");
                Some(DecodedStore {
                    model_name: partial.model_name,
                    dimension: partial.dimension,
                    spells: partial.spells,
                    lifecycle: LifecycleRecord::default(),
                })
            }
            _ => {
                warn!(error = %full_err, "store file unreadable, reinitializing");
                None
            }
        },
    }
}
