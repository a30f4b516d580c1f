//! Query embedding: glue the gateway's own contract assumes but the
//! dense retrieval component does not name. `search`/`ask` accept raw
//! query text; the vector backend (C2) expects a `query_vector`. This
//! module turns the former into the latter, grounded in the teacher's
//! `OpenAIEmbedder` (`src/embeddings/openai.rs`): a pooled `reqwest::Client`
//! hitting a configurable endpoint, with a deterministic local fallback
//! so the gateway runs without a live embedding service.

use crate::error::{GatewayError, Result};
use std::time::Duration;

/// Produces a dense vector for a query string.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
    fn dim(&self) -> usize;
}

/// Deterministic, dependency-free embedder for local runs and tests: hashes
/// n-grams of the input into fixed-size buckets and L2-normalizes. Not
/// semantically meaningful, but stable and dimension-correct, so the
/// fusion/rerank/generate pipeline is fully exercisable without a model host.
pub struct StubEmbedder {
    dim: usize,
}

impl StubEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait::async_trait]
impl Embedder for StubEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash as usize) % self.dim;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Calls an HTTP embedding endpoint (e.g. a text-embeddings-inference
/// server or a hosted API) that takes `{"model", "input"}` and returns
/// `{"embedding": [f32; dim]}`.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dim: usize,
}

impl HttpEmbedder {
    pub fn new(endpoint: String, model: String, dim: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(GatewayError::Backend)?;
        Ok(Self {
            client,
            endpoint,
            model,
            dim,
        })
    }
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<EmbedResponse>()
            .await?;

        if resp.embedding.len() != self.dim {
            return Err(GatewayError::Config(format!(
                "embedding endpoint returned dimension {}, expected {}",
                resp.embedding.len(),
                self.dim
            )));
        }
        Ok(resp.embedding)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_embedder_dimension() {
        let embedder = StubEmbedder::new(64);
        let v = embedder.embed_query("hello world").await.unwrap();
        assert_eq!(v.len(), 64);
    }

    #[tokio::test]
    async fn test_stub_embedder_deterministic() {
        let embedder = StubEmbedder::new(32);
        let a = embedder.embed_query("the quick fox").await.unwrap();
        let b = embedder.embed_query("the quick fox").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_stub_embedder_normalized() {
        let embedder = StubEmbedder::new(32);
        let v = embedder.embed_query("some query text here").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[tokio::test]
    async fn test_stub_embedder_empty_query() {
        let embedder = StubEmbedder::new(16);
        let v = embedder.embed_query("").await.unwrap();
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
