// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedding provider interface and the two shipped implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use grim_storage::EMBEDDING_DIM;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },
}

/// `embed(text) → vector<f32, 384>` plus its batch form.
///
/// Implementations return unit-normalized vectors; the resolver normalizes
/// again defensively before persisting.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Identifies the model; persisted in the store so a model switch
    /// invalidates old vectors.
    fn model_name(&self) -> &str;
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Cosine similarity of two unit vectors; 0.0 on length mismatch.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Deterministic offline provider: signed token feature hashing into
/// [`EMBEDDING_DIM`] buckets. Not a language model, but overlapping
/// vocabularies score close and disjoint ones score near zero, which is
/// exactly what the tiered policy needs when no real provider is wired up.
#[derive(Debug, Clone, Default)]
pub struct HashingEmbedder;

impl HashingEmbedder {
    fn embed_one(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_ascii_alphanumeric()) {
            if token.len() < 3 {
                continue;
            }
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u16::from_be_bytes([digest[0], digest[1]]) as usize % EMBEDDING_DIM;
            let sign = if digest[2] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        normalize(v)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(Self::embed_one(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }

    fn model_name(&self) -> &str {
        "feature-hash-v1"
    }
}

/// Remote provider speaking the OpenAI-compatible `/embeddings` shape.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/embeddings", self.base_url);
        let mut req = self
            .client
            .post(&url)
            .json(&EmbeddingsRequest { model: &self.model, input });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;
        let body: EmbeddingsResponse =
            resp.json().await.map_err(|e| EmbedError::Unavailable(e.to_string()))?;

        let mut vectors = Vec::with_capacity(body.data.len());
        for data in body.data {
            if data.embedding.len() != EMBEDDING_DIM {
                return Err(EmbedError::Dimension {
                    expected: EMBEDDING_DIM,
                    got: data.embedding.len(),
                });
            }
            vectors.push(normalize(data.embedding));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.request(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::Unavailable("provider returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.request(texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::Unavailable(format!(
                "provider returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
#[path = "embedder_tests.rs"]
mod tests;
