// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The embedding + lifecycle store: loaded once, held in memory, written
//! back with an atomic temp-file-then-rename replace.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use grim_core::ContentHash;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::record::{
    decode, DecodedStore, EmbeddingRecord, LifecycleRecord, StoreRecord, EMBEDDING_DIM,
    STORE_VERSION,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode store record: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

#[derive(Debug)]
pub struct EmbeddingStore {
    path: PathBuf,
    model_name: String,
    dimension: u32,
    spells: HashMap<String, EmbeddingRecord>,
    lifecycle: LifecycleRecord,
}

impl EmbeddingStore {
    /// Load the store from `path`, or initialize an empty one.
    ///
    /// Never fails: missing files, unsupported versions, and unreadable
    /// content all reinitialize; a corrupt lifecycle subrecord alone resets
    /// only the lifecycle. A `model_name` different from the persisted one
    /// drops the embeddings (they will be recomputed on the next index
    /// pass) while lifecycle state is kept.
    pub fn load(path: impl Into<PathBuf>, model_name: &str) -> Self {
        let path = path.into();
        let decoded = match fs::read(&path) {
            Ok(bytes) => decode(&bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no store file yet, starting empty");
                None
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "store file unreadable, reinitializing");
                None
            }
        };

        match decoded {
            Some(mut decoded) => {
                if decoded.model_name != model_name {
                    info!(
                        old = %decoded.model_name,
                        new = %model_name,
                        "embedding model changed, invalidating persisted vectors"
                    );
                    decoded.spells.clear();
                    decoded.model_name = model_name.to_string();
                    decoded.dimension = EMBEDDING_DIM as u32;
                }
                Self::from_decoded(path, decoded)
            }
            None => Self::empty(path, model_name),
        }
    }

    fn empty(path: PathBuf, model_name: &str) -> Self {
        Self {
            path,
            model_name: model_name.to_string(),
            dimension: EMBEDDING_DIM as u32,
            spells: HashMap::new(),
            lifecycle: LifecycleRecord::default(),
        }
    }

    fn from_decoded(path: PathBuf, decoded: DecodedStore) -> Self {
        Self {
            path,
            model_name: decoded.model_name,
            dimension: decoded.dimension,
            spells: decoded.spells,
            lifecycle: decoded.lifecycle,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    pub fn get(&self, name: &str) -> Option<&EmbeddingRecord> {
        self.spells.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.spells.contains_key(name)
    }

    pub fn set(&mut self, name: &str, vector: Vec<f32>, hash: ContentHash, now_ms: u64) {
        self.spells
            .insert(name.to_string(), EmbeddingRecord { vector, hash, timestamp_ms: now_ms });
    }

    pub fn delete(&mut self, name: &str) -> bool {
        self.spells.remove(name).is_some()
    }

    /// True when no current embedding exists for `name` under `hash`.
    pub fn needs_update(&self, name: &str, hash: &ContentHash) -> bool {
        !self.spells.get(name).is_some_and(|record| record.hash == *hash)
    }

    pub fn spell_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.spells.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn lifecycle(&self) -> &LifecycleRecord {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut LifecycleRecord {
        &mut self.lifecycle
    }

    /// Write the store atomically: temp sibling with owner-only mode, then
    /// rename over the target. The temp file is best-effort removed on
    /// failure.
    pub fn save(&mut self, now_ms: u64) -> Result<(), StoreError> {
        self.lifecycle.last_saved_ms = now_ms;

        let record = StoreRecord {
            version: STORE_VERSION,
            model_name: self.model_name.clone(),
            dimension: self.dimension,
            spells: self.spells.clone(),
            lifecycle: Some(self.lifecycle.clone()),
        };
        let bytes = rmp_serde::to_vec_named(&record)?;

        let tmp_path = self.path.with_extension("msgpack.tmp");
        if let Err(source) = write_owner_only(&tmp_path, &bytes) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::Io { path: tmp_path, source });
        }
        if let Err(source) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::Io { path: self.path.clone(), source });
        }
        debug!(path = %self.path.display(), spells = self.spells.len(), "store flushed");
        Ok(())
    }
}

#[cfg(unix)]
fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
