//! Cross-encoder reranker (C4): pairwise relevance scoring over
//! `(query, candidate.text)` pairs, with a deterministic fallback when the
//! model cannot be loaded or a prediction call fails — grounded in the
//! source's `CEReranker`, whose `predict` failure path returns
//! `rerank_score = 0.0` for the untouched input-order prefix rather than
//! raising.

use crate::domain::RetrievedChunk;
use std::sync::atomic::{AtomicU64, Ordering};

/// Scores `(query, text)` pairs. A real implementation would wrap a loaded
/// cross-encoder model; `StubScorer` below is the dev/test fallback that
/// also doubles as the degradation path when a model-backed scorer fails.
pub trait Scorer: Send + Sync {
    fn score(&self, query: &str, text: &str) -> Option<f64>;
}

/// Deterministic lexical-overlap scorer: fraction of query terms present
/// in the candidate text. Not a real cross-encoder, but satisfies the
/// contract's determinism and ordering requirements for dev and tests.
pub struct StubScorer;

impl Scorer for StubScorer {
    fn score(&self, query: &str, text: &str) -> Option<f64> {
        let query_terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if query_terms.is_empty() {
            return Some(0.0);
        }
        let text_lower = text.to_lowercase();
        let matched = query_terms
            .iter()
            .filter(|term| text_lower.contains(term.as_str()))
            .count();
        Some(matched as f64 / query_terms.len() as f64)
    }
}

/// Counts reranker degradations (model unavailable / prediction failure),
/// exposed to `/metrics` as `rerank_degradations_total`.
#[derive(Default)]
pub struct DegradationCounter(AtomicU64);

impl DegradationCounter {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Rerank `candidates` against `query`, writing `rerank_score` on each and
/// returning the top `top_k` by descending score (stable on ties, per
/// spec §4.4). Never raises: a scorer that returns `None` for any
/// candidate degrades the whole call to input-order passthrough with
/// `rerank_score = 0.0`, and increments `degradations`.
pub fn rerank(
    scorer: &dyn Scorer,
    query: &str,
    mut candidates: Vec<RetrievedChunk>,
    top_k: usize,
    degradations: &DegradationCounter,
) -> Vec<RetrievedChunk> {
    let mut degraded = false;
    let scores: Vec<Option<f64>> = candidates
        .iter()
        .map(|c| scorer.score(query, &c.chunk.text))
        .collect();

    if scores.iter().any(|s| s.is_none()) {
        degraded = true;
    }

    if degraded {
        degradations.increment();
        for c in candidates.iter_mut() {
            c.rerank_score = Some(0.0);
        }
        candidates.truncate(top_k);
        return candidates;
    }

    for (c, score) in candidates.iter_mut().zip(scores) {
        c.rerank_score = score;
    }

    // Stable sort preserves input order on ties, per spec §4.4.
    candidates.sort_by(|a, b| {
        b.rerank_score
            .partial_cmp(&a.rerank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(top_k);
    candidates
}
