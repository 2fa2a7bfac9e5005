//! `OpenAI` embedding client using the `async-openai` crate.
//!
//! Compatible with any `OpenAI`-style embeddings API via the base URL
//! override in [`ServiceConfig`].

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{EMBEDDING_DIMENSIONS, EMBEDDING_MODEL, Embedder, MAX_EMBED_BATCH, MAX_EMBED_RETRIES};
use crate::config::ServiceConfig;
use crate::error::LlmError;

/// Base delay for exponential retry backoff.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Embedding client backed by the external provider.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
}

impl OpenAiEmbedder {
    /// Creates an embedder from service configuration.
    #[must_use]
    pub fn new(config: &ServiceConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(openai_config),
        }
    }

    /// Sends one embeddings request for a batch of at most
    /// [`MAX_EMBED_BATCH`] texts.
    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, LlmError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(EMBEDDING_MODEL)
            .input(texts.to_vec())
            .build()
            .map_err(|e| LlmError::Upstream {
                message: e.to_string(),
                status: None,
            })?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| LlmError::Upstream {
                message: e.to_string(),
                status: None,
            })?;

        if response.data.len() != texts.len() {
            return Err(LlmError::BatchMismatch {
                sent: texts.len(),
                received: response.data.len(),
            });
        }

        // The provider tags each vector with its input index; order by it
        // rather than trusting response order.
        let mut ordered: Vec<Vec<f64>> = vec![Vec::new(); texts.len()];
        for item in response.data {
            let index = item.index as usize;
            if index >= ordered.len() {
                return Err(LlmError::Parse {
                    message: format!("embedding index {index} out of range"),
                });
            }
            ordered[index] = item.embedding.iter().map(|&v| f64::from(v)).collect();
        }

        for vector in &ordered {
            if vector.len() != EMBEDDING_DIMENSIONS {
                return Err(LlmError::Parse {
                    message: format!(
                        "embedding dimension {} does not match pinned {EMBEDDING_DIMENSIONS}",
                        vector.len()
                    ),
                });
            }
        }

        Ok(ordered)
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &EMBEDDING_MODEL)
            .finish()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn model(&self) -> &str {
        EMBEDDING_MODEL
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all: Vec<Vec<f64>> = Vec::with_capacity(texts.len());
        for window in texts.chunks(MAX_EMBED_BATCH) {
            let mut last_error = LlmError::Upstream {
                message: "no attempt made".to_string(),
                status: None,
            };
            let mut done = false;

            for attempt in 0..MAX_EMBED_RETRIES {
                match self.request_batch(window).await {
                    Ok(vectors) => {
                        all.extend(vectors);
                        done = true;
                        break;
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "embedding request failed");
                        last_error = e;
                        if attempt + 1 < MAX_EMBED_RETRIES {
                            tokio::time::sleep(RETRY_BASE_DELAY * 2_u32.pow(attempt)).await;
                        }
                    }
                }
            }

            if !done {
                return Err(last_error);
            }
        }

        debug!(texts = texts.len(), "embedded batch");
        Ok(all)
    }
}
