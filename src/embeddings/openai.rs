use super::{Embedder, QueryEmbeddingCache};
use crate::error::{Result, PdfChatError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI caps the number of inputs per embeddings request
const MAX_BATCH_SIZE: usize = 2048;

/// Request structure for OpenAI embeddings API
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Response structure from OpenAI embeddings API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI embeddings client
///
/// Splits large inputs into API-sized batches and retries rate-limited or
/// server-side failures with exponential backoff. Question embeddings go
/// through an optional LRU cache.
pub struct OpenAIEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    batch_size: usize,
    dimensions: Option<usize>,
    max_retries: usize,
    cache: Option<Arc<QueryEmbeddingCache>>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    ///
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "text-embedding-3-small")
    /// * `batch_size` - Maximum number of texts to send per API request (capped at 2048)
    pub fn new(api_key: String, model: String, batch_size: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PdfChatError::Embedding(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            dimensions: None,
            max_retries: 3,
            cache: None,
        })
    }

    /// Attach a question embedding cache
    pub fn with_cache(mut self, cache: Arc<QueryEmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Ask for vectors of this length (text-embedding-3 models only)
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Point the client at an OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Make one API request, retrying 429 and 5xx responses
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.request(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(RequestError::Retryable(msg)) if attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Embedding retry {}/{} after error: {}",
                        attempt,
                        self.max_retries,
                        msg
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(RequestError::Retryable(msg)) | Err(RequestError::Fatal(msg)) => {
                    return Err(PdfChatError::Embedding(msg));
                }
            }
        }
    }

    async fn request(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, RequestError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RequestError::Retryable(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            let msg = format!("OpenAI API error {}: {}", status, body);
            return Err(if is_retryable(status) {
                RequestError::Retryable(msg)
            } else {
                RequestError::Fatal(msg)
            });
        }

        let mut result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RequestError::Fatal(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(RequestError::Fatal(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        result.data.sort_by_key(|d| d.index);
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}

enum RequestError {
    Retryable(String),
    Fatal(String),
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.request_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);

            // Small pause between full batches to stay under rate limits
            if chunk.len() == self.batch_size {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        Ok(all_embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(text) {
                log::debug!("Query embedding cache hit");
                return Ok(cached);
            }
        }

        let start = std::time::Instant::now();
        let embedding = self
            .request_with_retry(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| PdfChatError::Embedding("Empty response from OpenAI API".to_string()))?;
        log::debug!("Query embedding took {:?}", start.elapsed());

        if let Some(cache) = &self.cache {
            cache.put(text.to_string(), embedding.clone());
        }

        Ok(embedding)
    }
}
