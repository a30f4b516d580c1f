//! Request orchestrator (C6): the axum surface wiring retrieval, rerank,
//! generation, the metadata store, and the event bus into `search`,
//! `ask`, `feedback`, `health`, and `metrics` routes. Grounded in the
//! teacher's own `create_router`/`AppState` shape (`src/mcp/http.rs`),
//! generalized from an MCP-protocol server to a plain REST gateway.

use crate::config::Config;
use crate::domain::{AskResponseWire, FeedbackLabel, FeedbackRecord};
use crate::error::GatewayError;
use crate::eventbus::{self, EventBus};
use crate::generate::{self, Synthesizer};
use crate::metrics::Metrics;
use crate::ratelimit::RateLimiter;
use crate::rerank::{self, Scorer};
use crate::retrieval::{lexical, Retriever};
use crate::store::{self, MetadataStore};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Per-request deadline (spec §5): in-flight suspensions are cancelled and
/// a timeout response is returned when it expires.
const REQUEST_DEADLINE: Duration = Duration::from_secs(10);

pub struct AppState {
    pub config: Config,
    pub retriever: Retriever,
    pub scorer: Box<dyn Scorer>,
    pub synthesizer: Box<dyn Synthesizer>,
    pub store: Option<MetadataStore>,
    pub event_bus: Option<EventBus>,
    pub rate_limiter: RateLimiter,
    pub metrics: Metrics,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", get(handle_search))
        .route("/ask", post(handle_ask))
        .route("/feedback", post(handle_feedback))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: String,
    top_k: Option<usize>,
    filters: Option<String>,
    #[allow(dead_code)]
    with_highlights: Option<bool>,
}

#[derive(Debug, Serialize)]
struct SearchResponseBody {
    query: String,
    results: Vec<crate::domain::RetrievedChunk>,
    facets: std::collections::HashMap<String, std::collections::HashMap<String, u64>>,
    total: usize,
}

async fn handle_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let start = Instant::now();
    let top_k = params.top_k.unwrap_or(state.config.default_top_k);

    if top_k < 1 || top_k > state.config.max_top_k {
        return bad_request(format!(
            "top_k must be between 1 and {}",
            state.config.max_top_k
        ));
    }

    let filters = lexical::parse_filters(params.filters.as_deref());

    let result = tokio::time::timeout(REQUEST_DEADLINE, async {
        let results = state
            .retriever
            .retrieve(&params.q, top_k, &filters)
            .await?;
        let facets = state.retriever.lexical.facets(&filters).await;
        Ok::<_, GatewayError>((results, facets))
    })
    .await;

    let (results, facets) = match result {
        Ok(Ok(pair)) => pair,
        Ok(Err(err)) => return error_response(err),
        Err(_) => return timeout_response(),
    };

    state.metrics.record_retrieved("bm25", results.iter().filter(|r| r.bm25_rank.is_some()).count());
    state.metrics.record_retrieved("dense", results.iter().filter(|r| r.dense_rank.is_some()).count());
    state.metrics.record_stage("retrieve", start.elapsed().as_secs_f64());
    state.metrics.record_request("/search", "GET", start.elapsed().as_secs_f64());

    if let Some(bus) = &state.event_bus {
        let event = eventbus::search_event(&params.q, results.len());
        bus.emit(eventbus::TOPIC_SEARCH_EVENTS, event).await;
    }

    let total = results.len();
    Json(SearchResponseBody {
        query: params.q,
        results,
        facets,
        total,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct AskBody {
    question: String,
    #[serde(default = "default_ask_top_k")]
    top_k: usize,
    #[serde(default = "default_ground")]
    ground: bool,
}

fn default_ask_top_k() -> usize {
    8
}
fn default_ground() -> bool {
    true
}

const ASK_FETCH_TOP_K: usize = 100;

async fn handle_ask(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<AskBody>,
) -> Response {
    let start = Instant::now();
    let client_id = addr.ip().to_string();

    if !state.rate_limiter.check(&client_id) {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }

    let result = tokio::time::timeout(REQUEST_DEADLINE, async {
        let retrieve_start = Instant::now();
        let candidates = state
            .retriever
            .retrieve(&body.question, ASK_FETCH_TOP_K, &Default::default())
            .await?;
        state
            .metrics
            .record_stage("retrieve", retrieve_start.elapsed().as_secs_f64());

        let rerank_start = Instant::now();
        let degradations = rerank::DegradationCounter::default();
        let reranked = rerank::rerank(
            state.scorer.as_ref(),
            &body.question,
            candidates,
            body.top_k,
            &degradations,
        );
        state
            .metrics
            .record_stage("rerank", rerank_start.elapsed().as_secs_f64());

        let generate_start = Instant::now();
        let response = generate::generate(
            state.synthesizer.as_ref(),
            &body.question,
            &reranked,
            body.ground,
            &state.metrics,
        );
        state
            .metrics
            .record_stage("generate", generate_start.elapsed().as_secs_f64());

        Ok::<_, GatewayError>(response)
    })
    .await;

    let response = match result {
        Ok(Ok(r)) => r,
        Ok(Err(err)) => return error_response(err),
        Err(_) => return timeout_response(),
    };

    state.metrics.record_request("/ask", "POST", start.elapsed().as_secs_f64());

    if let Some(bus) = &state.event_bus {
        let event = eventbus::ask_event(&body.question, response.is_abstained());
        bus.emit(eventbus::TOPIC_ASK_EVENTS, event).await;
    }

    let wire: AskResponseWire = response.into();
    Json(wire).into_response()
}

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    query: String,
    doc_id: Option<String>,
    chunk_id: Option<String>,
    label: String,
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct FeedbackResponseBody {
    status: &'static str,
    feedback_id: i64,
    message: String,
}

async fn handle_feedback(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FeedbackBody>,
) -> Response {
    let start = Instant::now();

    let label = match store::validate_label(&body.label) {
        Ok(label) => label,
        Err(_) => return bad_request(format!("unrecognized feedback label: {}", body.label)),
    };

    let record = FeedbackRecord {
        query: body.query.clone(),
        doc_id: body.doc_id.clone(),
        chunk_id: body.chunk_id.clone(),
        label,
        user_id: body.user_id.clone(),
        timestamp: chrono::Utc::now(),
    };

    let store = match &state.store {
        Some(store) => store,
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "metadata store unavailable",
            )
                .into_response()
        }
    };

    let feedback_id = match store.insert_feedback(&record).await {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to persist feedback",
            )
                .into_response()
        }
    };

    state
        .metrics
        .record_request("/feedback", "POST", start.elapsed().as_secs_f64());

    if let Some(bus) = &state.event_bus {
        // `search.events` carries three distinct event types (spec §6):
        // search, click, feedback. A click label with both identifiers
        // present is the narrower click event; anything else is feedback.
        let event = match (label, body.doc_id.as_deref(), body.chunk_id.as_deref()) {
            (FeedbackLabel::Click, Some(doc_id), Some(chunk_id)) => {
                eventbus::click_event(&body.query, doc_id, chunk_id)
            }
            _ => eventbus::feedback_event(
                &body.query,
                label.as_str(),
                body.doc_id.as_deref(),
                body.chunk_id.as_deref(),
            ),
        };
        bus.emit(eventbus::TOPIC_SEARCH_EVENTS, event).await;
    }

    Json(FeedbackResponseBody {
        status: "success",
        feedback_id,
        message: "feedback recorded".to_string(),
    })
    .into_response()
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    service: String,
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    Json(HealthBody {
        status: "healthy",
        service: state.config.otel_service_name.clone(),
    })
    .into_response()
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

fn timeout_response() -> Response {
    (StatusCode::GATEWAY_TIMEOUT, "request deadline exceeded").into_response()
}

fn error_response(err: GatewayError) -> Response {
    match err {
        GatewayError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
        GatewayError::RateLimited => {
            (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response()
        }
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_deserializes_with_defaults() {
        let json = r#"{"q": "rust"}"#;
        let parsed: SearchQuery = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.q, "rust");
        assert!(parsed.top_k.is_none());
    }

    #[test]
    fn test_ask_body_applies_defaults() {
        let json = r#"{"question": "what is rust?"}"#;
        let parsed: AskBody = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.top_k, 8);
        assert!(parsed.ground);
    }

    #[test]
    fn test_ask_body_honors_explicit_values() {
        let json = r#"{"question": "q", "top_k": 3, "ground": false}"#;
        let parsed: AskBody = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.top_k, 3);
        assert!(!parsed.ground);
    }
}
