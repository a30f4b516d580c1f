//! Retrieval: lexical (C1) and dense (C2) adapters fanned out concurrently
//! and fused (C3) into a single ranked list.

pub mod embed;
pub mod fusion;
pub mod lexical;
pub mod vector;

use crate::domain::RetrievedChunk;
use crate::error::{GatewayError, Result};
use embed::Embedder;
use lexical::LexicalAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use vector::VectorAdapter;

/// Owns both backend adapters and the query embedder; runs the
/// retrieve-and-fuse step of both `search` and `ask` (spec §5: C1 and C2
/// suspend concurrently, joined before anything downstream runs).
pub struct Retriever {
    pub lexical: LexicalAdapter,
    pub vector: VectorAdapter,
    pub embedder: Arc<dyn Embedder>,
    pub rrf_k: u32,
}

impl Retriever {
    /// Fetch `2 * top_k` candidates from each backend in parallel, then
    /// fuse to `top_k` (spec §4.4 search contract).
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filters: &HashMap<String, String>,
    ) -> Result<Vec<RetrievedChunk>> {
        let fetch_size = top_k * 2;

        // A transient embedder failure (network error, non-2xx, timeout)
        // must not turn a whole search/ask request into a 500 — it leaves
        // the dense side with nothing to search, so C2 is skipped and the
        // lexical side still answers (spec §6: no 5xx as a consequence of
        // a retrieval backend failure). A dimension mismatch is the one
        // case that stays fatal: it is a startup-time configuration fault,
        // not an outage, and the vector adapter's own invariant check
        // would reject the query anyway.
        let query_vector = match self.embedder.embed_query(query).await {
            Ok(v) => Some(v),
            Err(GatewayError::Config(msg)) => {
                return Err(GatewayError::Config(msg));
            }
            Err(err) => {
                log::warn!("query embedding failed, degrading to lexical-only: {err}");
                None
            }
        };

        let (lex_results, dense_results) = match &query_vector {
            Some(vector) => {
                tokio::join!(
                    self.lexical.search_lexical(query, fetch_size, filters),
                    self.vector.search_dense(vector, fetch_size, filters)
                )
            }
            None => (
                self.lexical.search_lexical(query, fetch_size, filters).await,
                Ok(Vec::new()),
            ),
        };

        // Dense adapter failures degrade to an empty list per spec §4.2;
        // a dimension-mismatch error is the one case that must propagate,
        // since it signals a startup-time configuration fault, not a
        // transient backend outage.
        let dense_results = dense_results?;

        let lex_scores: HashMap<String, f64> = lex_results
            .iter()
            .map(|(chunk, score)| (chunk.chunk_id.clone(), *score))
            .collect();
        let dense_scores: HashMap<String, f64> = dense_results
            .iter()
            .map(|(chunk, score)| (chunk.chunk_id.clone(), *score))
            .collect();

        let lex_chunks = lex_results.into_iter().map(|(chunk, _)| chunk).collect();
        let dense_chunks = dense_results.into_iter().map(|(chunk, _)| chunk).collect();

        let mut fused = fusion::fuse(lex_chunks, dense_chunks, top_k, self.rrf_k);
        fusion::carry_forward_scores(&mut fused, &lex_scores, &dense_scores);
        Ok(fused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embed::StubEmbedder;

    #[tokio::test]
    async fn test_retrieve_degrades_gracefully_with_unreachable_backends() {
        let retriever = Retriever {
            lexical: LexicalAdapter::new("http://127.0.0.1:1".to_string()),
            vector: VectorAdapter::new("http://127.0.0.1:1".to_string(), 16).unwrap(),
            embedder: Arc::new(StubEmbedder::new(16)),
            rrf_k: 60,
        };
        let results = retriever
            .retrieve("test query", 10, &HashMap::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    struct FailingEmbedder;

    #[async_trait::async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Err(GatewayError::Backend(
                reqwest::Client::new()
                    .get("http://127.0.0.1:1")
                    .send()
                    .await
                    .unwrap_err(),
            ))
        }

        fn dim(&self) -> usize {
            16
        }
    }

    #[tokio::test]
    async fn test_retrieve_degrades_to_lexical_only_on_embedder_failure() {
        // A transient embedder failure must not propagate out of retrieve()
        // as an error (spec §6: no 5xx from a retrieval backend failure) —
        // the dense side contributes nothing and the lexical side still
        // runs.
        let retriever = Retriever {
            lexical: LexicalAdapter::new("http://127.0.0.1:1".to_string()),
            vector: VectorAdapter::new("http://127.0.0.1:1".to_string(), 16).unwrap(),
            embedder: Arc::new(FailingEmbedder),
            rrf_k: 60,
        };
        let results = retriever.retrieve("test query", 10, &HashMap::new()).await;
        assert!(results.is_ok());
    }

    #[tokio::test]
    async fn test_retrieve_propagates_embedder_dimension_mismatch() {
        struct WrongDimEmbedder;

        #[async_trait::async_trait]
        impl Embedder for WrongDimEmbedder {
            async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
                Err(GatewayError::Config("dimension mismatch".to_string()))
            }

            fn dim(&self) -> usize {
                16
            }
        }

        let retriever = Retriever {
            lexical: LexicalAdapter::new("http://127.0.0.1:1".to_string()),
            vector: VectorAdapter::new("http://127.0.0.1:1".to_string(), 16).unwrap(),
            embedder: Arc::new(WrongDimEmbedder),
            rrf_k: 60,
        };
        let result = retriever.retrieve("test query", 10, &HashMap::new()).await;
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }
}
