//! Embedding provider adapter.
//!
//! The engine only sees the `EmbeddingProvider` trait; the production
//! implementation posts to an Ollama-compatible `/api/embed` endpoint.
//! Injecting the provider keeps rebuild jobs testable without a live model.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::{EmbedError, EmbedResult};
use inkling_core::EmbedSettings;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Whether an embedding model is configured. Checked once per rebuild
    /// run before any item is processed.
    fn is_configured(&self) -> bool;

    /// Embed one batch of texts into vectors, one vector per input.
    async fn embed_batch(&self, inputs: &[String]) -> EmbedResult<Vec<Vec<f32>>>;
}

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    base_url: String,
    model: Option<String>,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    /// Fails only if the HTTP client itself cannot be built. The request
    /// timeout comes from the settings; every call is bounded by it.
    pub fn new(settings: &EmbedSettings) -> EmbedResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;

        Ok(Self {
            base_url: settings.embedding_url.trim_end_matches('/').to_string(),
            model: settings
                .embedding_model
                .as_deref()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    async fn embed_batch(&self, inputs: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        let Some(model) = &self.model else {
            return Err(EmbedError::NoEmbeddingModel);
        };
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: model.clone(),
            input: inputs.to_vec(),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EmbedError::Embedding(format!(
                "embedding request failed: {status} {text}"
            )));
        }

        let payload: EmbedResponse = response.json().await?;

        if let Some(embeddings) = payload.embeddings {
            return Ok(embeddings);
        }

        if let Some(embedding) = payload.embedding {
            return Ok(vec![embedding]);
        }

        Err(EmbedError::Embedding(
            "embedding response missing vectors".to_string(),
        ))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
    embedding: Option<Vec<f32>>,
}
