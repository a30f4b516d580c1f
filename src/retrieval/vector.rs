//! Vector search adapter (C2): k-NN cosine query against a Qdrant-compatible
//! dense index over its REST API, same pooled-`reqwest::Client` idiom as
//! the lexical adapter.

use crate::domain::Chunk;
use crate::error::{GatewayError, Result};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

const COLLECTION_NAME: &str = "chunks";

pub struct VectorAdapter {
    client: reqwest::Client,
    base_url: String,
    dim: usize,
}

impl VectorAdapter {
    /// `dim` is the embedding dimension the gateway was configured with.
    /// A later dimension mismatch against this value is checked once here,
    /// at construction, so it fails the process at startup rather than
    /// degrading per-request (spec §4.2).
    pub fn new(base_url: String, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(GatewayError::Config(
                "vector adapter requires a non-zero embedding dimension".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(GatewayError::Backend)?;
        Ok(Self {
            client,
            base_url,
            dim,
        })
    }

    /// `len(query_vector) != dim` is a hard configuration fault (spec §4.2
    /// invariant), surfaced as an error rather than an empty-list degrade —
    /// the distinction the source blurs by accepting any-length vectors.
    pub async fn search_dense(
        &self,
        query_vector: &[f32],
        size: usize,
        filters: &HashMap<String, String>,
    ) -> Result<Vec<(Chunk, f64)>> {
        if query_vector.len() != self.dim {
            return Err(GatewayError::Config(format!(
                "query vector has dimension {}, expected {}",
                query_vector.len(),
                self.dim
            )));
        }

        Ok(self
            .search_dense_inner(query_vector, size, filters)
            .await
            .unwrap_or_else(|_| {
                log::warn!("dense search failed, degrading to empty result");
                Vec::new()
            }))
    }

    async fn search_dense_inner(
        &self,
        query_vector: &[f32],
        size: usize,
        filters: &HashMap<String, String>,
    ) -> std::result::Result<Vec<(Chunk, f64)>, reqwest::Error> {
        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, COLLECTION_NAME
        );
        let body = json!({
            "vector": query_vector,
            "limit": size,
            "with_payload": true,
            "filter": filter_clause(filters)
        });

        let resp = match self.client.post(&url).json(&body).send().await {
            Ok(r) if r.status().as_u16() == 404 => {
                let _ = self.create_collection_if_missing().await;
                self.client.post(&url).json(&body).send().await?
            }
            Ok(r) => r,
            Err(e) => return Err(e),
        };

        let resp = resp.error_for_status()?;
        let parsed: Value = resp.json().await?;
        Ok(parse_points(&parsed))
    }

    async fn create_collection_if_missing(&self) -> std::result::Result<(), reqwest::Error> {
        let url = format!("{}/collections/{}", self.base_url, COLLECTION_NAME);
        let body = json!({
            "vectors": { "size": self.dim, "distance": "Cosine" }
        });
        self.client.put(&url).json(&body).send().await?;
        Ok(())
    }
}

fn filter_clause(filters: &HashMap<String, String>) -> Option<Value> {
    if filters.is_empty() {
        return None;
    }
    let must: Vec<Value> = filters
        .iter()
        .map(|(field, value)| json!({ "key": field, "match": { "value": value } }))
        .collect();
    Some(json!({ "must": must }))
}

fn parse_points(parsed: &Value) -> Vec<(Chunk, f64)> {
    let points = match parsed["result"].as_array() {
        Some(p) => p,
        None => return Vec::new(),
    };

    points
        .iter()
        .filter_map(|point| {
            let payload = point.get("payload")?;
            let score = point["score"].as_f64().unwrap_or(0.0);
            let chunk = Chunk {
                doc_id: payload["doc_id"].as_str()?.to_string(),
                chunk_id: payload["chunk_id"].as_str()?.to_string(),
                title: payload["title"].as_str().unwrap_or("").to_string(),
                text: payload["text"].as_str().unwrap_or("").to_string(),
                url: payload["url"].as_str().unwrap_or("").to_string(),
                section: payload["section"].as_str().unwrap_or("").to_string(),
                lang: payload["lang"].as_str().unwrap_or("").to_string(),
                tags: payload["tags"]
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect::<HashSet<_>>()
                    })
                    .unwrap_or_default(),
                tokens: 0,
                embedding: None,
            };
            Some((chunk, score))
        })
        .collect()
}

/// Cosine similarity between two equal-length vectors, in `[-1.0, 1.0]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical_vectors() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_new_rejects_zero_dimension() {
        let result = VectorAdapter::new("http://localhost:6333".to_string(), 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_points_empty_on_missing_result() {
        assert!(parse_points(&json!({})).is_empty());
    }

    #[test]
    fn test_parse_points_populates_fields() {
        let parsed = json!({
            "result": [
                { "score": 0.92, "payload": {
                    "doc_id": "d1", "chunk_id": "c1", "title": "T", "text": "body",
                    "url": "u", "section": "s", "lang": "en", "tags": ["x"]
                }}
            ]
        });
        let points = parse_points(&parsed);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].0.chunk_id, "c1");
        assert_eq!(points[0].1, 0.92);
    }

    #[test]
    fn test_filter_clause_empty_filters_is_none() {
        assert!(filter_clause(&HashMap::new()).is_none());
    }

    #[tokio::test]
    async fn test_search_dense_rejects_mismatched_dimension() {
        let adapter = VectorAdapter::new("http://127.0.0.1:1".to_string(), 8).unwrap();
        let result = adapter.search_dense(&[1.0, 2.0], 10, &HashMap::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_search_dense_degrades_on_connection_failure() {
        let adapter = VectorAdapter::new("http://127.0.0.1:1".to_string(), 4).unwrap();
        let results = adapter
            .search_dense(&[0.0, 0.0, 0.0, 0.0], 10, &HashMap::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
