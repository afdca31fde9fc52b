
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::tokens::{CostEstimate, estimate_cost, estimate_tokens};
use super::transport::{HttpTransport, UreqTransport};
use crate::config::{ConfigError, EmbeddingConfig, EmbeddingConfigUpdate};
use crate::{MemoryError, Result};

/// Pause between consecutive batches of one request, to stay under provider rate limits
const BATCH_PAUSE: Duration = Duration::from_millis(100);
const CONNECTION_TEST_TEXT: &str = "测试连接";

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    config: EmbeddingConfig,
    transport: Arc<dyn HttpTransport>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Option<Vec<EmbeddingData>>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    /// Create a client that talks to the configured API over HTTP
    #[inline]
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        Self::with_transport(config, Arc::new(UreqTransport::default()))
    }

    #[inline]
    pub fn with_transport(
        config: EmbeddingConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, transport })
    }

    /// Snapshot of the current configuration
    #[inline]
    pub fn get_config(&self) -> EmbeddingConfig {
        self.config.clone()
    }

    /// Merge `update` into the configuration. The previous configuration is
    /// kept if the merged one does not validate.
    #[inline]
    pub fn update_config(&mut self, update: EmbeddingConfigUpdate) -> Result<()> {
        let merged = self.config.merged(update);
        merged.validate()?;
        self.config = merged;
        Ok(())
    }

    /// Embed a single text
    #[inline]
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(MemoryError::InvalidArgument(
                "cannot embed empty text".to_string(),
            ));
        }

        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| MemoryError::Format("API returned no embedding".to_string()))
    }

    /// Embed many texts, one request per `max_batch_size` chunk.
    ///
    /// Chunks are sent strictly one after another and the result keeps the
    /// input order.
    #[inline]
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(MemoryError::InvalidArgument(
                "cannot embed an empty batch".to_string(),
            ));
        }

        if !self.config.has_api_key() {
            return Err(ConfigError::MissingApiKey.into());
        }

        let url = self.config.embeddings_url()?;
        let batch_count = texts.len().div_ceil(self.config.max_batch_size);
        debug!(
            "Embedding {} texts in {} batches of up to {}",
            texts.len(),
            batch_count,
            self.config.max_batch_size
        );

        let mut results = Vec::with_capacity(texts.len());
        for (index, chunk) in texts.chunks(self.config.max_batch_size).enumerate() {
            if index > 0 {
                sleep(BATCH_PAUSE).await;
            }

            let embeddings = self.embed_chunk_with_retry(&url, chunk).await?;
            results.extend(embeddings);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    /// Check the API with a short text. Never fails; errors are logged.
    #[inline]
    pub async fn test_connection(&self) -> bool {
        match self.embed(CONNECTION_TEST_TEXT).await {
            Ok(embedding) => {
                info!(
                    "Embedding API reachable at {} (model {}, {} dimensions)",
                    self.config.api_url,
                    self.config.model,
                    embedding.len()
                );
                true
            }
            Err(e) => {
                error!("Embedding API connection test failed: {}", e);
                false
            }
        }
    }

    #[inline]
    pub fn estimate_tokens(&self, text: &str) -> usize {
        estimate_tokens(text)
    }

    #[inline]
    pub fn estimate_cost<S: AsRef<str>>(&self, texts: &[S]) -> CostEstimate {
        estimate_cost(texts, self.config.cost_per_million_tokens)
    }

    async fn embed_chunk_with_retry(&self, url: &str, chunk: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: chunk,
            encoding_format: "float",
        };
        let body = serde_json::to_string(&request).map_err(|e| {
            MemoryError::InvalidArgument(format!("Failed to serialize embedding request: {}", e))
        })?;

        let attempts = self.config.retry_times.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!("Embedding request attempt {}/{}", attempt, attempts);

            let error = match self
                .transport
                .post_json(url, &self.config.api_key, body.clone())
                .await
            {
                Ok(response) if response.is_success() => {
                    return parse_embeddings(&response.body, chunk.len());
                }
                Ok(response) => MemoryError::Api {
                    status: response.status,
                    body: response.body,
                },
                Err(e) => e,
            };

            warn!(
                "Embedding request failed (attempt {}/{}): {}",
                attempt, attempts, error
            );
            last_error = Some(error);

            if attempt < attempts {
                let delay = self.config.retry_delay() * attempt;
                debug!("Waiting {:?} before retry", delay);
                sleep(delay).await;
            }
        }

        error!("All {} embedding attempts failed for {}", attempts, url);

        Err(MemoryError::RetriesExhausted {
            attempts,
            source: Box::new(last_error.unwrap_or_else(|| {
                MemoryError::Network("request was never attempted".to_string())
            })),
        })
    }
}

fn parse_embeddings(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let response: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| MemoryError::Format(format!("Failed to parse embedding response: {}", e)))?;

    let data = response
        .data
        .ok_or_else(|| MemoryError::Format("response has no `data` array".to_string()))?;

    if data.len() != expected {
        return Err(MemoryError::Format(format!(
            "Mismatch between request and response counts: {} vs {}",
            expected,
            data.len()
        )));
    }

    Ok(data.into_iter().map(|item| item.embedding).collect())
}
