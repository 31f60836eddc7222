use crate::error::EmbedError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

const DEFAULT: usize = 384;
const NGRAM: usize = 3;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Maps batches of text to fixed-dimension, L2-normalized vectors, so inner
/// product equals cosine similarity. Queries go through the same path as
/// ingested chunks.
#[async_trait]
pub trait Embedder {
    fn dimensions(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

pub fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// Deterministic local embedder hashing character trigrams into a fixed-width
/// vector. No model download, no network.
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
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.len() < NGRAM {
            if !chars.is_empty() {
                let token: String = chars.iter().collect();
                let bucket = (fnv1a(&token) % vector.len() as u64) as usize;
                vector[bucket] = 1.0;
            }
            return vector;
        }

        for window in chars.windows(NGRAM) {
            let token: String = window.iter().collect();
            let bucket = (fnv1a(&token) % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash = 1469598103934665603u64;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

/// Client for a remote embedding service speaking the OpenAI-compatible
/// `/embeddings` shape. Rows are re-normalized locally, so ranking never
/// depends on whether the remote normalizes.
pub struct HttpEmbedder {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        dimensions: usize,
    ) -> Result<Self, EmbedError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            model: model.into(),
            api_key,
            dimensions,
            client: Client::new(),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "model": self.model, "input": texts }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(EmbedError::BackendResponse {
                backend: "embeddings".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        rows_from_response(&parsed, texts.len(), self.dimensions)
    }
}

fn backend_error(details: impl Into<String>) -> EmbedError {
    EmbedError::BackendResponse {
        backend: "embeddings".to_string(),
        details: details.into(),
    }
}

fn rows_from_response(
    parsed: &Value,
    expected_rows: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = parsed
        .pointer("/data")
        .and_then(Value::as_array)
        .ok_or_else(|| backend_error("missing data array"))?;

    if data.len() != expected_rows {
        return Err(backend_error(format!(
            "{} embedding rows for {} inputs",
            data.len(),
            expected_rows
        )));
    }

    let mut rows = Vec::with_capacity(data.len());
    for entry in data {
        let raw = entry
            .pointer("/embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| backend_error("missing embedding row"))?;

        let mut row = Vec::with_capacity(raw.len());
        for value in raw {
            let number = value
                .as_f64()
                .ok_or_else(|| backend_error("non-numeric embedding value"))?;
            row.push(number as f32);
        }

        if row.len() != dimensions {
            return Err(backend_error(format!(
                "embedding dimension {} is not {}",
                row.len(),
                dimensions
            )));
        }

        l2_normalize(&mut row);
        rows.push(row);
    }

    Ok(rows)
}
