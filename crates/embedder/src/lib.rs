//! Batched client for an OpenAI-compatible `/embeddings` HTTP endpoint.
//!
//! Availability is gated entirely on an API key environment variable —
//! with no key, every call is a no-op returning nulls, and no network
//! attempt is made at all. Failures past that point (timeouts, HTTP
//! errors, exhausted retries) degrade the same way: the caller always
//! sees "no embedding" for the affected item, never an error.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Environment variable that both enables the embedder and supplies its key.
pub const API_KEY_ENV_VAR: &str = "AGENT_INDEX_EMBEDDING_API_KEY";

const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSION: usize = 1536;
const DEFAULT_COUNT_BATCH_LIMIT: usize = 100;
const DEFAULT_TOKEN_BATCH_LIMIT: usize = 250_000;
const DEFAULT_MAX_CHARS_PER_ITEM: usize = 28_000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRIES: u32 = 2;

#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub model: String,
    pub dimension: usize,
    pub count_batch_limit: usize,
    pub token_batch_limit: usize,
    pub max_chars_per_item: usize,
    pub endpoint: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            count_batch_limit: DEFAULT_COUNT_BATCH_LIMIT,
            token_batch_limit: DEFAULT_TOKEN_BATCH_LIMIT,
            max_chars_per_item: DEFAULT_MAX_CHARS_PER_ITEM,
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_RETRIES,
        }
    }
}

/// Serialize a vector as packed little-endian float32 bytes.
pub fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Reconstitute a vector from a little-endian float32 blob. Any trailing
/// bytes that don't make a full component are ignored.
pub fn deserialize_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Rough token estimate used only for batch-splitting, not billing.
fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

fn truncate_to_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect()
    } else {
        text.to_string()
    }
}

/// Split `texts` into batches that respect both the count and token limits —
/// a batch boundary is hit whichever limit is reached first.
fn batch_texts(texts: &[String], config: &EmbedderConfig) -> Vec<Vec<usize>> {
    let mut batches = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_tokens = 0usize;

    for (i, text) in texts.iter().enumerate() {
        let tokens = estimate_tokens(text);
        let would_exceed_count = current.len() + 1 > config.count_batch_limit;
        let would_exceed_tokens = !current.is_empty() && current_tokens + tokens > config.token_batch_limit;

        if would_exceed_count || would_exceed_tokens {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
            }
            current_tokens = 0;
        }
        current.push(i);
        current_tokens += tokens;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn available(&self) -> bool;

    /// The embedding model this instance requests, stamped onto every
    /// chunk it successfully embeds so every chunk of a session shares one
    /// embedding_model value, without the caller needing to know the
    /// concrete embedder type.
    fn model_name(&self) -> &str;

    /// Best-effort batch embedding; the returned vec is always the same
    /// length as `texts`, with `None` standing in for any failed item.
    async fn embed_texts(&self, texts: &[String]) -> Vec<Option<Vec<f32>>>;

    /// Single-item convenience call for search-time query embedding.
    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        if query.is_empty() {
            return None;
        }
        self.embed_texts(std::slice::from_ref(&query.to_string()))
            .await
            .into_iter()
            .next()
            .flatten()
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedder backed by a real HTTP client, talking to any OpenAI-compatible
/// `/embeddings` endpoint.
pub struct OpenAiCompatibleEmbedder {
    client: reqwest::Client,
    config: EmbedderConfig,
    api_key: Option<String>,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(config: EmbedderConfig) -> Self {
        let api_key = std::env::var(API_KEY_ENV_VAR).ok().filter(|k| !k.is_empty());
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config, api_key }
    }

    pub fn with_api_key(config: EmbedderConfig, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            config,
            api_key: Some(api_key.into()),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let Some(api_key) = &self.api_key else {
            return vec![None; texts.len()];
        };

        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_to_chars(t, self.config.max_chars_per_item))
            .collect();

        let request = EmbeddingsRequest {
            model: &self.config.model,
            input: &truncated,
        };

        let mut attempt = 0;
        loop {
            let result = self
                .client
                .post(&self.config.endpoint)
                .bearer_auth(api_key)
                .json(&request)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => match resp.json::<EmbeddingsResponse>().await {
                    Ok(parsed) => {
                        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
                        for item in parsed.data {
                            if item.index < out.len() {
                                out[item.index] = Some(item.embedding);
                            }
                        }
                        return out;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "embedding response decode failed");
                        return vec![None; texts.len()];
                    }
                },
                Ok(resp) => {
                    tracing::warn!(status = %resp.status(), "embedding API returned an error status");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "embedding API call failed");
                }
            }

            if attempt >= self.config.max_retries {
                return vec![None; texts.len()];
            }
            attempt += 1;
            tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt))).await;
        }
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
    fn available(&self) -> bool {
        self.api_key.is_some()
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn embed_texts(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        if !self.available() || texts.is_empty() {
            return vec![None; texts.len()];
        }

        let batches = batch_texts(texts, &self.config);
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

        for batch_indices in batches {
            let batch_texts: Vec<String> = batch_indices.iter().map(|&i| texts[i].clone()).collect();
            let embeddings = self.embed_batch(&batch_texts).await;
            for (local_i, global_i) in batch_indices.into_iter().enumerate() {
                if let Some(embedding) = embeddings.get(local_i).cloned().flatten() {
                    results[global_i] = Some(embedding);
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_round_trips_exactly() {
        let original = vec![0.0_f32, -1.5, 3.25, f32::MIN, f32::MAX];
        let blob = serialize_embedding(&original);
        assert_eq!(blob.len(), original.len() * 4);
        let restored = deserialize_embedding(&blob);
        assert_eq!(original, restored);
    }

    #[test]
    fn serialize_is_little_endian() {
        let blob = serialize_embedding(&[1.0_f32]);
        assert_eq!(blob, 1.0_f32.to_le_bytes().to_vec());
    }

    #[test]
    fn batching_respects_count_limit() {
        let config = EmbedderConfig {
            count_batch_limit: 3,
            ..Default::default()
        };
        let texts: Vec<String> = (0..7).map(|i| format!("text {i}")).collect();
        let batches = batch_texts(&texts, &config);
        assert_eq!(batches.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![3, 3, 1]);
    }

    #[test]
    fn batching_respects_token_limit() {
        let config = EmbedderConfig {
            count_batch_limit: 100,
            token_batch_limit: 10,
            ..Default::default()
        };
        let texts = vec!["x".repeat(40), "y".repeat(40), "z".repeat(40)];
        let batches = batch_texts(&texts, &config);
        assert!(batches.len() >= 2, "expected token limit to force multiple batches");
    }

    #[tokio::test]
    async fn unavailable_without_api_key_returns_all_nulls() {
        let embedder = OpenAiCompatibleEmbedder::new(EmbedderConfig::default());
        assert!(!embedder.available());
        let results = embedder.embed_texts(&["hello".to_string()]).await;
        assert_eq!(results, vec![None]);
    }

    #[tokio::test]
    async fn empty_query_returns_none_without_network_call() {
        let embedder = OpenAiCompatibleEmbedder::with_api_key(EmbedderConfig::default(), "test-key");
        assert!(embedder.embed_query("").await.is_none());
    }

    #[tokio::test]
    async fn successful_response_populates_embeddings_by_index() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.1, 0.2]},
                {"index": 0, "embedding": [0.3, 0.4]},
            ]
        });
        let mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let config = EmbedderConfig {
            endpoint: format!("{}/v1/embeddings", server.url()),
            ..Default::default()
        };
        let embedder = OpenAiCompatibleEmbedder::with_api_key(config, "test-key");
        let results = embedder
            .embed_texts(&["first".to_string(), "second".to_string()])
            .await;

        mock.assert_async().await;
        assert_eq!(results[0], Some(vec![0.3, 0.4]));
        assert_eq!(results[1], Some(vec![0.1, 0.2]));
    }

    #[tokio::test]
    async fn server_error_degrades_to_nulls_without_panicking() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(500)
            .expect_at_least(1)
            .create_async()
            .await;

        let config = EmbedderConfig {
            endpoint: format!("{}/v1/embeddings", server.url()),
            max_retries: 0,
            ..Default::default()
        };
        let embedder = OpenAiCompatibleEmbedder::with_api_key(config, "test-key");
        let results = embedder.embed_texts(&["hello".to_string()]).await;

        mock.assert_async().await;
        assert_eq!(results, vec![None]);
    }
}
