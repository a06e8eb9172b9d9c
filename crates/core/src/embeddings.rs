use crate::config::OpenAiConfig;
use crate::traits::Embedder;
use crate::IngestError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 256;

const EMBEDDING_BATCH_SIZE: usize = 64;

/// Deterministic local embedder: hashes words and in-word character
/// trigrams into a fixed number of buckets, then L2-normalizes.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let bucket = bucket_for(word, vector.len());
            vector[bucket] += 1.0;

            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram = window.iter().collect::<String>();
                let bucket = bucket_for(&trigram, vector.len());
                vector[bucket] += 0.5;
            }
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

fn bucket_for(token: &str, buckets: usize) -> usize {
    let mut hash = 1469598103934665603u64;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    (hash % buckets as u64) as usize
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> String {
        format!("hashing-{}", self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiConfig,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiConfig, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client: Client::new(),
            config,
            model: model.into(),
            dimensions,
        }
    }

    async fn request_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.config.api_base.trim_end_matches('/')))
            .json(&json!({
                "model": self.model,
                "input": batch,
            }));

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(IngestError::Embedding(format!(
                "embedding request for model {} returned {}",
                self.model,
                response.status()
            )));
        }

        let parsed: Value = response.json().await?;
        parse_embedding_response(&parsed, batch.len(), self.dimensions)
    }
}

fn parse_embedding_response(
    parsed: &Value,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, IngestError> {
    let mut rows = parsed
        .pointer("/data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(position, row)| {
            let index = row
                .pointer("/index")
                .and_then(Value::as_u64)
                .map(|index| index as usize)
                .unwrap_or(position);
            let vector = row
                .pointer("/embedding")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(Value::as_f64)
                        .map(|value| value as f32)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            (index, vector)
        })
        .collect::<Vec<_>>();

    if rows.len() != expected {
        return Err(IngestError::Embedding(format!(
            "expected {expected} embeddings, got {}",
            rows.len()
        )));
    }

    rows.sort_by_key(|(index, _)| *index);
    rows.into_iter()
        .map(|(_, vector)| {
            if vector.len() == dimensions {
                Ok(vector)
            } else {
                Err(IngestError::Embedding(format!(
                    "embedding dimension {} != {}",
                    vector.len(),
                    dimensions
                )))
            }
        })
        .collect()
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> String {
        format!("openai-{}", self.model)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            vectors.extend(self.request_batch(batch).await?);
        }
        Ok(vectors)
    }
}
