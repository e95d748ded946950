//! Embedding backend abstraction and implementations.
//!
//! Defines the [`EmbeddingBackend`] trait plus two implementations:
//! - **OpenAI**: calls the hosted embeddings API with retry and backoff.
//! - **Local**: runs a sentence-embedding model via fastembed; gated behind
//!   the `local-embeddings` cargo feature so default builds stay light.
//!
//! Also provides the vector utilities used by the store and the retriever:
//! [`vec_to_blob`] / [`blob_to_vec`] for little-endian f32 BLOB encoding and
//! [`cosine_similarity`] for ranking.
//!
//! # Retry Strategy
//!
//! The hosted backend retries transient failures with exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::PipelineError;

/// A capability that turns a batch of texts into fixed-length vectors,
/// one per input, in input order.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts. Failure aborts the current build or query.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Instantiate the backend selected by the configuration.
pub fn create_backend(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingBackend>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiBackend::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalBackend::new(config))),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!(
            "Local embedding provider requires building with --features local-embeddings"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ OpenAI backend ============

/// Hosted embeddings via `POST /v1/embeddings`. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAiBackend {
    model: String,
    dims: usize,
    max_retries: u32,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PipelineError::Backend("OPENAI_API_KEY not set".to_string()))?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embeddings_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(PipelineError::Backend(format!(
                            "embeddings API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error other than rate limiting: not retryable.
                    return Err(PipelineError::Backend(format!(
                        "embeddings API error {}: {}",
                        status, body_text
                    ))
                    .into());
                }
                Err(e) => {
                    last_err = Some(PipelineError::Backend(e.to_string()));
                    continue;
                }
            }
        }

        let err = last_err
            .unwrap_or_else(|| PipelineError::Backend("embedding failed after retries".to_string()));
        Err(err.into())
    }
}

fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            PipelineError::Backend("invalid embeddings response: missing data array".to_string())
        })?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let vector = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                PipelineError::Backend("invalid embeddings response: missing embedding".to_string())
            })?;
        embeddings.push(
            vector
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(embeddings)
}

// ============ Local backend (fastembed) ============

#[cfg(feature = "local-embeddings")]
mod local {
    use super::*;

    /// In-process sentence embeddings; no network calls after the model
    /// download.
    pub struct LocalBackend {
        model: String,
        dims: usize,
    }

    impl LocalBackend {
        pub fn new(config: &EmbeddingConfig) -> Self {
            Self {
                model: config.model.clone(),
                dims: config.dims,
            }
        }
    }

    fn model_by_name(name: &str) -> Result<fastembed::EmbeddingModel> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
            other => bail!("Unsupported local embedding model: {}", other),
        }
    }

    #[async_trait]
    impl EmbeddingBackend for LocalBackend {
        fn model_name(&self) -> &str {
            &self.model
        }

        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let model = model_by_name(&self.model)?;
            let texts = texts.to_vec();
            // Inference is CPU-bound; keep it off the async runtime.
            let vectors = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut embedder = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(false),
                )?;
                Ok(embedder.embed(texts, None)?)
            })
            .await
            .map_err(|e| PipelineError::Backend(e.to_string()))??;
            Ok(vectors)
        }
    }
}

#[cfg(feature = "local-embeddings")]
pub use local::LocalBackend;

// ============ Vector utilities ============

/// Encode a vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for &v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Empty or mismatched vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_encoding_round_trips() {
        let vector = vec![0.5f32, -1.25, 3.0, 0.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&vector)), vector);
        assert_eq!(vec_to_blob(&vector).len(), 16);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.2, 0.4, 0.6];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_degenerate_inputs_is_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn embeddings_response_is_parsed_in_order() {
        let json = serde_json::json!({
            "data": [
                {"index": 0, "embedding": [1.0, 0.0]},
                {"index": 1, "embedding": [0.0, 1.0]}
            ]
        });
        let vectors = parse_embeddings_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn malformed_response_is_a_backend_error() {
        let err = parse_embeddings_response(&serde_json::json!({"oops": true})).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Backend(_))
        ));
    }
}
