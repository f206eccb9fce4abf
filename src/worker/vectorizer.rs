// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vectorization capability.
//!
//! Embedding extraction is an injected capability behind the [`Vectorize`]
//! trait. The production implementation calls a remote embedder over HTTP;
//! its endpoint is resolved from configuration at startup, so a missing
//! vectorizer is a startup error. A refusal at runtime is an error for the
//! job attempt, never a placeholder vector.

use std::future::Future;
use std::path::Path;

use reqwest::Client;
use serde::Deserialize;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum VectorizeError {
    /// The embedder is unreachable or refused the request.
    #[error("vectorizer unavailable: {0}")]
    Unavailable(String),

    /// The embedder answered without a usable vector.
    #[error("vectorizer returned no embedding")]
    EmptyEmbedding,

    /// Vectors of differing dimensions cannot be combined.
    #[error("embedding dimension mismatch: {0} vs {1}")]
    DimensionMismatch(usize, usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Embedding extraction for the two enrollment modalities.
pub trait Vectorize: Send + Sync + 'static {
    /// Compute a speaker embedding from a decrypted WAV file.
    fn embed_voice(
        &self,
        wav: &Path,
    ) -> impl Future<Output = Result<Vec<f32>, VectorizeError>> + Send;

    /// Compute a face embedding from one decrypted image file.
    fn embed_image(
        &self,
        image: &Path,
    ) -> impl Future<Output = Result<Vec<f32>, VectorizeError>> + Send;
}

/// Shape of the remote embedder's response. Older deployments answer with
/// `embedding` instead of `vector`; accept both.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    vector: Option<Vec<f32>>,
    embedding: Option<Vec<f32>>,
}

impl EmbedResponse {
    fn into_vector(self) -> Result<Vec<f32>, VectorizeError> {
        match self.vector.or(self.embedding) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(VectorizeError::EmptyEmbedding),
        }
    }
}

/// HTTP client for a remote embedding service.
#[derive(Debug, Clone)]
pub struct RemoteVectorizer {
    http: Client,
    base: Url,
}

impl RemoteVectorizer {
    pub fn new(http: Client, base: Url) -> Self {
        Self { http, base }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base.as_str().trim_end_matches('/'))
    }

    async fn embed_file(&self, path: &Path, endpoint: &str) -> Result<Vec<f32>, VectorizeError> {
        let bytes = tokio::fs::read(path).await?;
        let response = self
            .http
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| VectorizeError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| VectorizeError::Unavailable(e.to_string()))?;

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| VectorizeError::Unavailable(e.to_string()))?;
        parsed.into_vector()
    }
}

impl Vectorize for RemoteVectorizer {
    async fn embed_voice(&self, wav: &Path) -> Result<Vec<f32>, VectorizeError> {
        self.embed_file(wav, &self.endpoint("embed/voice")).await
    }

    async fn embed_image(&self, image: &Path) -> Result<Vec<f32>, VectorizeError> {
        self.embed_file(image, &self.endpoint("embed/image")).await
    }
}

// =============================================================================
// Vector Math & Codec
// =============================================================================

/// Arithmetic mean of several embeddings; this average is the face print.
pub fn mean_combine(vectors: &[Vec<f32>]) -> Result<Vec<f32>, VectorizeError> {
    let first = vectors.first().ok_or(VectorizeError::EmptyEmbedding)?;
    let dim = first.len();

    let mut avg = vec![0.0f32; dim];
    for vector in vectors {
        if vector.len() != dim {
            return Err(VectorizeError::DimensionMismatch(dim, vector.len()));
        }
        for (acc, &val) in avg.iter_mut().zip(vector) {
            *acc += val;
        }
    }

    let count = vectors.len() as f32;
    for val in avg.iter_mut() {
        *val /= count;
    }
    Ok(avg)
}

/// Serialize an embedding as little-endian f32 bytes.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|&f| f.to_le_bytes()).collect()
}

/// Deserialize little-endian f32 bytes back into an embedding.
pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Scripted vectorizer for tests: returns queued vectors in order, then
/// refuses.
#[cfg(test)]
pub struct FixedVectorizer {
    queue: std::sync::Mutex<std::collections::VecDeque<Vec<f32>>>,
}

#[cfg(test)]
impl FixedVectorizer {
    pub fn with_vectors(vectors: Vec<Vec<f32>>) -> Self {
        Self {
            queue: std::sync::Mutex::new(vectors.into()),
        }
    }

    /// A vectorizer that refuses every request.
    pub fn unavailable() -> Self {
        Self::with_vectors(Vec::new())
    }

    fn next(&self) -> Result<Vec<f32>, VectorizeError> {
        self.queue
            .lock()
            .expect("vectorizer queue poisoned")
            .pop_front()
            .ok_or_else(|| VectorizeError::Unavailable("no scripted vector left".into()))
    }
}

#[cfg(test)]
impl Vectorize for FixedVectorizer {
    async fn embed_voice(&self, _wav: &Path) -> Result<Vec<f32>, VectorizeError> {
        self.next()
    }

    async fn embed_image(&self, _image: &Path) -> Result<Vec<f32>, VectorizeError> {
        self.next()
    }
}
