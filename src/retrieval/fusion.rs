//! Fusion ranker (C3): Reciprocal Rank Fusion merge of the lexical and
//! dense rank lists, per spec §4.3.

use crate::domain::{Chunk, RetrievedChunk};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Merge two already-ranked lists into a single list of up to `top_k`
/// `RetrievedChunk`s, fused by Reciprocal Rank Fusion.
///
/// Identity is `(doc_id, chunk_id)`; a chunk appearing in both lists
/// contributes to the sum exactly once per list. Ties in `fusion_score`
/// are broken by `(bm25_rank, dense_rank)` ascending (missing rank treated
/// as +infinity), then by lexicographic `chunk_id` — spec §4.3 fixes this
/// order explicitly since the source leaves it to hash-map iteration order.
pub fn fuse(
    list_lex: Vec<Chunk>,
    list_dense: Vec<Chunk>,
    top_k: usize,
    k_rrf: u32,
) -> Vec<RetrievedChunk> {
    let mut by_key: HashMap<(String, String), RetrievedChunk> = HashMap::new();

    for (idx, chunk) in list_lex.into_iter().enumerate() {
        let rank = idx + 1;
        let key = (chunk.doc_id.clone(), chunk.chunk_id.clone());
        let score = 1.0 / (k_rrf as f64 + rank as f64);
        by_key.insert(
            key,
            RetrievedChunk {
                chunk,
                fusion_score: score,
                bm25_rank: Some(rank),
                bm25_score: None,
                dense_rank: None,
                dense_score: None,
                rerank_score: None,
            },
        );
    }

    for (idx, chunk) in list_dense.into_iter().enumerate() {
        let rank = idx + 1;
        let key = (chunk.doc_id.clone(), chunk.chunk_id.clone());
        let score = 1.0 / (k_rrf as f64 + rank as f64);
        by_key
            .entry(key)
            .and_modify(|rc| {
                rc.fusion_score += score;
                rc.dense_rank = Some(rank);
            })
            .or_insert_with(|| RetrievedChunk {
                chunk,
                fusion_score: score,
                bm25_rank: None,
                bm25_score: None,
                dense_rank: Some(rank),
                dense_score: None,
                rerank_score: None,
            });
    }

    let mut fused: Vec<RetrievedChunk> = by_key.into_values().collect();
    fused.sort_by(compare_fused);
    fused.truncate(top_k);
    fused
}

fn compare_fused(a: &RetrievedChunk, b: &RetrievedChunk) -> Ordering {
    b.fusion_score
        .partial_cmp(&a.fusion_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| rank_or_inf(a.bm25_rank).cmp(&rank_or_inf(b.bm25_rank)))
        .then_with(|| rank_or_inf(a.dense_rank).cmp(&rank_or_inf(b.dense_rank)))
        .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
}

fn rank_or_inf(rank: Option<usize>) -> usize {
    rank.unwrap_or(usize::MAX)
}

/// Annotate fused results' `bm25_score`/`dense_score` once both source
/// lists' scores are known, and decide which list's display fields
/// (title/text/url/section/lang/tags) win on conflict (lexical wins,
/// per spec §4.3, because it carries highlight-ready text).
pub fn carry_forward_scores(
    fused: &mut [RetrievedChunk],
    lex_scores: &HashMap<String, f64>,
    dense_scores: &HashMap<String, f64>,
) {
    for rc in fused.iter_mut() {
        if let Some(score) = lex_scores.get(&rc.chunk.chunk_id) {
            rc.bm25_score = Some(*score);
        }
        if let Some(score) = dense_scores.get(&rc.chunk.chunk_id) {
            rc.dense_score = Some(*score);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn chunk(doc: &str, id: &str, text: &str) -> Chunk {
        Chunk {
            doc_id: doc.to_string(),
            chunk_id: id.to_string(),
            title: String::new(),
            text: text.to_string(),
            url: String::new(),
            section: String::new(),
            lang: String::new(),
            tags: HashSet::new(),
            tokens: 0,
            embedding: None,
        }
    }

    #[test]
    fn test_fuse_empty_both() {
        // R1: fusion of two empty lists yields an empty list.
        let fused = fuse(vec![], vec![], 10, 60);
        assert!(fused.is_empty());
    }

    #[test]
    fn test_fuse_lexical_only_preserves_order() {
        // R2: fusion with only one non-empty list preserves that list's order exactly.
        let lex = vec![chunk("d1", "c1", "a"), chunk("d2", "c2", "b"), chunk("d3", "c3", "c")];
        let fused = fuse(lex, vec![], 10, 60);
        let ids: Vec<&str> = fused.iter().map(|r| r.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn test_fuse_dense_only_preserves_order() {
        let dense = vec![chunk("d1", "c1", "a"), chunk("d2", "c2", "b")];
        let fused = fuse(vec![], dense, 10, 60);
        let ids: Vec<&str> = fused.iter().map(|r| r.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[test]
    fn test_hybrid_merge_scenario_from_spec() {
        // Scenario 1 (spec §8): lexical [d1/c1, d2/c2]; dense [d2/c2, d3/c3].
        // c2 appears in both (lex rank 2, dense rank 1: 1/62 + 1/61), ranking
        // first; c1 (lex rank 1 only: 1/61) outranks c3 (dense rank 2 only:
        // 1/62). Top-3 = [c2, c1, c3].
        let lex = vec![chunk("d1", "c1", "x"), chunk("d2", "c2", "y")];
        let dense = vec![chunk("d2", "c2", "y"), chunk("d3", "c3", "z")];

        let fused = fuse(lex, dense, 3, 60);
        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].chunk.chunk_id, "c2");
        assert!((fused[0].fusion_score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-9);
        assert_eq!(fused[1].chunk.chunk_id, "c1");
        assert!((fused[1].fusion_score - 1.0 / 61.0).abs() < 1e-9);
        assert_eq!(fused[2].chunk.chunk_id, "c3");
        assert!((fused[2].fusion_score - 1.0 / 62.0).abs() < 1e-9);
    }

    #[test]
    fn test_fuse_dedup_no_duplicate_identity() {
        // P2: never returns duplicate (doc_id, chunk_id) pairs.
        let lex = vec![chunk("d1", "c1", "x")];
        let dense = vec![chunk("d1", "c1", "x")];
        let fused = fuse(lex, dense, 10, 60);
        assert_eq!(fused.len(), 1);
    }

    #[test]
    fn test_fuse_truncates_to_top_k_without_padding() {
        let lex = vec![
            chunk("d1", "c1", "a"),
            chunk("d2", "c2", "b"),
            chunk("d3", "c3", "c"),
        ];
        let fused = fuse(lex, vec![], 2, 60);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_fuse_determinism() {
        // P3: running the same inputs twice yields identical ordering.
        let lex = vec![chunk("d1", "c1", "a"), chunk("d2", "c2", "b")];
        let dense = vec![chunk("d2", "c2", "b"), chunk("d3", "c3", "c")];
        let first = fuse(lex.clone(), dense.clone(), 10, 60);
        let second = fuse(lex, dense, 10, 60);
        let first_ids: Vec<&str> = first.iter().map(|r| r.chunk.chunk_id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|r| r.chunk.chunk_id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_carry_forward_scores_populates_bm25_and_dense() {
        let lex = vec![chunk("d1", "c1", "a")];
        let dense = vec![chunk("d1", "c1", "a")];
        let mut fused = fuse(lex, dense, 10, 60);

        let mut lex_scores = HashMap::new();
        lex_scores.insert("c1".to_string(), 12.3);
        let mut dense_scores = HashMap::new();
        dense_scores.insert("c1".to_string(), 0.87);

        carry_forward_scores(&mut fused, &lex_scores, &dense_scores);
        assert_eq!(fused[0].bm25_score, Some(12.3));
        assert_eq!(fused[0].dense_score, Some(0.87));
    }

    #[test]
    fn test_fuse_monotonic_score_order() {
        // P1: score is monotonically non-increasing with index.
        let lex = vec![
            chunk("d1", "c1", "a"),
            chunk("d2", "c2", "b"),
            chunk("d3", "c3", "c"),
        ];
        let dense = vec![chunk("d4", "c4", "d")];
        let fused = fuse(lex, dense, 10, 60);
        for pair in fused.windows(2) {
            assert!(pair[0].fusion_score >= pair[1].fusion_score);
        }
    }
}
