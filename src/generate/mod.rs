//! Grounded generator (C5): coverage gate, synthesis, and a real
//! citation-validation gate — the source's own `_validate_citations`
//! always returns `True`, which this module deliberately does not inherit.

use crate::domain::{AbstainReason, AskResponse, Citation, RetrievedChunk, Span};

/// Default coverage threshold θ_cov (spec §4.5).
pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 0.3;
/// Default K for `evidence_coverage = min(len(contexts)/K, 1.0)`.
pub const DEFAULT_EVIDENCE_K: usize = 5;

/// Counts abstentions by reason, exposed to `/metrics` as
/// `abstain_total{reason}`. Implemented over `prometheus::IntCounterVec`
/// in the orchestrator; a no-op implementation backs unit tests.
pub trait AbstainRecorder: Send + Sync {
    fn record(&self, reason: AbstainReason);
}

pub struct NoopAbstainRecorder;
impl AbstainRecorder for NoopAbstainRecorder {
    fn record(&self, _reason: AbstainReason) {}
}

/// Produces the answer text for a set of contexts. A real implementation
/// wraps a hosted or local language model; `StubSynthesizer` below
/// satisfies the contract's shape for dev and tests.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, question: &str, contexts: &[RetrievedChunk]) -> (String, Vec<Citation>);
}

/// Concatenates truncated prefixes of the top three contexts, citing one
/// span per prefix — the dev/test synthesizer spec §4.5 describes. Leaves
/// the answer empty (no citations) when every candidate context has empty
/// text, so the caller can tell "nothing to ground on" apart from a real
/// answer — the distinction the source's own stub makes by returning
/// `abstained: true, reason: "no_context"` from that branch.
pub struct StubSynthesizer;

impl Synthesizer for StubSynthesizer {
    fn synthesize(&self, _question: &str, contexts: &[RetrievedChunk]) -> (String, Vec<Citation>) {
        let mut answer = String::new();
        let mut citations = Vec::new();

        for ctx in contexts.iter().take(3) {
            let end = char_boundary_at_or_before(&ctx.chunk.text, 200);
            if end == 0 {
                continue;
            }
            let prefix = &ctx.chunk.text[..end];
            if !answer.is_empty() {
                answer.push(' ');
            }
            answer.push_str(prefix);
            citations.push(Citation {
                chunk_id: ctx.chunk.chunk_id.clone(),
                span: Span { start: 0, end },
            });
        }

        (answer, citations)
    }
}

/// The largest byte offset `<= max` that lands on a UTF-8 char boundary in
/// `text`. Plain `text.len().min(max)` can land mid-character for non-ASCII
/// text (`lang`/non-English chunks are an explicit part of the data model,
/// spec §3), which panics on slicing — this never does.
fn char_boundary_at_or_before(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    text.char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i < max)
        .last()
        .unwrap_or(0)
}

/// Runs the coverage gate, synthesis, and (when `force_citations`) the
/// citation-validation gate, per spec §4.5.
pub fn generate(
    synthesizer: &dyn Synthesizer,
    question: &str,
    contexts: &[RetrievedChunk],
    force_citations: bool,
    abstain: &dyn AbstainRecorder,
) -> AskResponse {
    if contexts.is_empty() {
        abstain.record(AbstainReason::NoResults);
        return AskResponse::abstained(AbstainReason::NoResults);
    }

    let max_rerank = contexts
        .iter()
        .filter_map(|c| c.rerank_score)
        .fold(0.0_f64, f64::max);

    if max_rerank < DEFAULT_COVERAGE_THRESHOLD {
        abstain.record(AbstainReason::LowCoverage);
        return AskResponse::abstained(AbstainReason::LowCoverage);
    }

    let (answer, citations) = synthesizer.synthesize(question, contexts);

    if answer.is_empty() {
        abstain.record(AbstainReason::NoContext);
        return AskResponse::abstained(AbstainReason::NoContext);
    }

    let evidence_coverage = (contexts.len() as f64 / DEFAULT_EVIDENCE_K as f64).min(1.0);

    if force_citations {
        if let Err(reason) = validate_citations(&citations, contexts, &answer) {
            abstain.record(reason);
            return AskResponse::abstained(reason);
        }
    }

    AskResponse::answered(answer, citations, evidence_coverage)
}

/// Real citation validation (spec §4.5 post-generation gate): every
/// `chunk_id` must exist among `contexts`, every span must satisfy
/// `0 <= start < end <= len(context_text)`, and a non-empty answer must
/// carry at least one citation.
fn validate_citations(
    citations: &[Citation],
    contexts: &[RetrievedChunk],
    answer: &str,
) -> Result<(), AbstainReason> {
    if !answer.is_empty() && citations.is_empty() {
        return Err(AbstainReason::ValidationFail);
    }

    for citation in citations {
        let context = contexts
            .iter()
            .find(|c| c.chunk.chunk_id == citation.chunk_id)
            .ok_or(AbstainReason::ValidationFail)?;

        if !citation.span.is_valid_for(context.chunk.text.len()) {
            return Err(AbstainReason::ValidationFail);
        }
    }

    Ok(())
}
