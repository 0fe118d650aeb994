//! Embedding generation against an OpenAI-compatible endpoint.
//!
//! The provider is a seam (`EmbeddingProvider`) carried in `AppState`, so
//! workers and the match handler never know which backend produced a vector.
//! Empty input is rejected, over-limit input is head-truncated (and flagged,
//! since silent truncation degrades match quality for long CVs), and batch
//! order is always the input order.

pub mod queue;
pub mod worker;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Bad input from the caller; retrying the same text is pointless.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    /// Transient errors are retried by the queue worker with backoff.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }
}

/// One embedded text: the vector plus whether the input was cut to fit the
/// model's budget.
#[derive(Debug, Clone)]
pub struct Embedded {
    pub vector: Vec<f32>,
    pub truncated: bool,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedded, EmbeddingError>;

    /// Order-preserving; the result has exactly one entry per input. A
    /// failure in any chunk fails the whole batch, so partial results are
    /// never returned out of order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedded>, EmbeddingError>;

    fn dimensions(&self) -> usize;
}

/// Head-truncates to `max_chars` on a char boundary.
pub fn truncate_input(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// Cosine similarity of two vectors. Zero-norm input yields 0 rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
    max_batch_size: usize,
    max_input_chars: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        dimensions: usize,
        max_batch_size: usize,
        max_input_chars: usize,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build embeddings HTTP client"),
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key,
            model,
            dimensions,
            max_batch_size,
            max_input_chars,
        }
    }

    /// One provider round trip for at most `max_batch_size` inputs.
    async fn request_chunk(&self, inputs: Vec<&str>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = inputs.len();
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Provider(format!(
                "embeddings request failed ({status}): {body}"
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Provider(format!("unparseable response: {e}")))?;
        parsed.data.sort_by_key(|d| d.index);

        if parsed.data.len() != expected {
            return Err(EmbeddingError::Provider(format!(
                "provider returned {} embeddings for {} inputs",
                parsed.data.len(),
                expected
            )));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedded, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::Validation(
                "cannot embed empty or whitespace-only text".to_string(),
            ));
        }

        let (input, truncated) = truncate_input(text, self.max_input_chars);
        if truncated {
            warn!(
                original_chars = text.chars().count(),
                kept_chars = self.max_input_chars,
                "embedding input truncated to model budget"
            );
        }

        let mut vectors = self.request_chunk(vec![input]).await?;
        let vector = vectors.pop().ok_or_else(|| {
            EmbeddingError::Provider("provider returned no embedding".to_string())
        })?;

        Ok(Embedded { vector, truncated })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedded>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                return Err(EmbeddingError::Validation(format!(
                    "batch item {i} is empty or whitespace-only"
                )));
            }
        }

        let truncated_inputs: Vec<(&str, bool)> = texts
            .iter()
            .map(|t| truncate_input(t, self.max_input_chars))
            .collect();
        let truncated_count = truncated_inputs.iter().filter(|(_, t)| *t).count();
        if truncated_count > 0 {
            warn!(truncated_count, batch = texts.len(), "batch items truncated");
        }

        let mut results = Vec::with_capacity(texts.len());
        for chunk in truncated_inputs.chunks(self.max_batch_size) {
            let inputs: Vec<&str> = chunk.iter().map(|(t, _)| *t).collect();
            debug!(chunk_size = inputs.len(), "sending embedding chunk");
            let vectors = self.request_chunk(inputs).await?;
            for (vector, (_, truncated)) in vectors.into_iter().zip(chunk) {
                results.push(Embedded {
                    vector,
                    truncated: *truncated,
                });
            }
        }

        Ok(results)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
