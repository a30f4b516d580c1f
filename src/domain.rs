//! Core data model: chunks, per-query scoring, grounded answers, feedback.
//!
//! Mirrors spec §3. `Chunk` is the unit of retrieval; `RetrievedChunk` adds
//! per-query scoring as it moves through fusion and reranking; `AskResponse`
//! is the tagged `Answered | Abstained` sum type the source leaves as an
//! optional-field struct.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An addressable piece of text belonging to a parent document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_id: String,
    #[serde(default)]
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub tags: HashSet<String>,
    #[serde(default)]
    pub tokens: u32,
    /// Present only on chunks that came back from the vector backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A chunk carrying per-query scoring, as produced by fusion (§4.3) and
/// optionally refined by reranking (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub fusion_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

impl RetrievedChunk {
    pub fn identity(&self) -> (&str, &str) {
        (&self.chunk.doc_id, &self.chunk.chunk_id)
    }
}

/// A reference into a context's text, as returned alongside an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub chunk_id: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn is_valid_for(&self, context_len: usize) -> bool {
        self.start < self.end && self.end <= context_len
    }
}

/// Why the generator declined to answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbstainReason {
    NoResults,
    LowCoverage,
    ValidationFail,
    NoContext,
}

impl AbstainReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbstainReason::NoResults => "no_results",
            AbstainReason::LowCoverage => "low_coverage",
            AbstainReason::ValidationFail => "validation_fail",
            AbstainReason::NoContext => "no_context",
        }
    }
}

/// Response to `ask`: a grounded answer with citations, or a first-class
/// abstention carrying a machine-readable reason. Modeled as a genuine sum
/// type rather than a struct with nullable fields, per the source's own
/// observation that this eliminates an "answer may be null" ambiguity.
/// The wire format still carries a plain `abstained: bool` discriminant
/// (via `AskResponseWire`) so HTTP clients see the shape spec §3 describes.
#[derive(Debug, Clone, PartialEq)]
pub enum AskResponse {
    Answered {
        answer: String,
        citations: Vec<Citation>,
        evidence_coverage: f64,
    },
    Abstained {
        reason: AbstainReason,
    },
}

impl AskResponse {
    pub fn answered(answer: String, citations: Vec<Citation>, evidence_coverage: f64) -> Self {
        AskResponse::Answered {
            answer,
            citations,
            evidence_coverage,
        }
    }

    pub fn abstained(reason: AbstainReason) -> Self {
        AskResponse::Abstained { reason }
    }

    pub fn is_abstained(&self) -> bool {
        matches!(self, AskResponse::Abstained { .. })
    }
}

/// Wire representation: a flat JSON object with an explicit `abstained` tag,
/// matching spec §3/§6 exactly (`{abstained, answer?, citations?,
/// evidence_coverage?, reason?}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AskResponseWire {
    pub abstained: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_coverage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<AbstainReason>,
}

impl From<AskResponse> for AskResponseWire {
    fn from(resp: AskResponse) -> Self {
        match resp {
            AskResponse::Answered {
                answer,
                citations,
                evidence_coverage,
            } => AskResponseWire {
                abstained: false,
                answer: Some(answer),
                citations,
                evidence_coverage: Some(evidence_coverage),
                reason: None,
            },
            AskResponse::Abstained { reason } => AskResponseWire {
                abstained: true,
                answer: None,
                citations: Vec::new(),
                evidence_coverage: None,
                reason: Some(reason),
            },
        }
    }
}

/// The closed set of feedback labels (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackLabel {
    Click,
    Relevant,
    NotRelevant,
    ThumbsUp,
    ThumbsDown,
}

impl FeedbackLabel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "click" => Some(FeedbackLabel::Click),
            "relevant" => Some(FeedbackLabel::Relevant),
            "not_relevant" => Some(FeedbackLabel::NotRelevant),
            "thumbs_up" => Some(FeedbackLabel::ThumbsUp),
            "thumbs_down" => Some(FeedbackLabel::ThumbsDown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackLabel::Click => "click",
            FeedbackLabel::Relevant => "relevant",
            FeedbackLabel::NotRelevant => "not_relevant",
            FeedbackLabel::ThumbsUp => "thumbs_up",
            FeedbackLabel::ThumbsDown => "thumbs_down",
        }
    }
}

/// An append-only feedback record, as persisted to the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub label: FeedbackLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
