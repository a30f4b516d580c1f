use anyhow::Context;
use hyrax_gateway::config::GeneratorKind;
use hyrax_gateway::eventbus::EventBus;
use hyrax_gateway::generate::{StubSynthesizer, Synthesizer};
use hyrax_gateway::http::{build_router, AppState};
use hyrax_gateway::metrics::Metrics;
use hyrax_gateway::ratelimit::RateLimiter;
use hyrax_gateway::rerank::{Scorer, StubScorer};
use hyrax_gateway::retrieval::embed::{Embedder, HttpEmbedder, StubEmbedder};
use hyrax_gateway::retrieval::{lexical::LexicalAdapter, vector::VectorAdapter, Retriever};
use hyrax_gateway::store::MetadataStore;
use hyrax_gateway::Config;
use std::net::SocketAddr;
use std::sync::Arc;

/// Picks the embedder implementation for the configured generator backend.
/// `stub`/dev runs never have a live embedding host, so they fall back to
/// the deterministic local embedder rather than failing startup.
fn build_embedder(config: &Config) -> Arc<dyn Embedder> {
    match config.generator {
        GeneratorKind::Api | GeneratorKind::Hf if config.hf_token.is_some() => {
            match HttpEmbedder::new(
                config.embed_endpoint.clone(),
                config.embed_model.clone(),
                config.embed_dim,
            ) {
                Ok(embedder) => Arc::new(embedder),
                Err(err) => {
                    log::warn!("failed to build HTTP embedder, falling back to stub: {err}");
                    Arc::new(StubEmbedder::new(config.embed_dim))
                }
            }
        }
        _ => Arc::new(StubEmbedder::new(config.embed_dim)),
    }
}

fn build_scorer(_config: &Config) -> Box<dyn Scorer> {
    Box::new(StubScorer)
}

fn build_synthesizer(_config: &Config) -> Box<dyn Synthesizer> {
    Box::new(StubSynthesizer)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    log::info!("Starting hyrax-gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().context("failed to load configuration")?;
    log::info!("Configuration loaded: env={}, generator={:?}", config.env, config.generator);

    let retriever = Retriever {
        lexical: LexicalAdapter::new(config.opensearch_url.clone()),
        vector: VectorAdapter::new(config.qdrant_url.clone(), config.embed_dim)
            .context("vector adapter dimension fault at startup")?,
        embedder: build_embedder(&config),
        rrf_k: config.rrf_k,
    };

    let store = match MetadataStore::new(&config) {
        Ok(store) => {
            if let Err(err) = store.ensure_schema().await {
                log::warn!("failed to ensure metadata store schema: {err}");
            }
            Some(store)
        }
        Err(err) => {
            log::warn!("metadata store unavailable, feedback persistence disabled: {err}");
            None
        }
    };

    let event_bus = match EventBus::connect(&config.kafka_broker).await {
        Ok(bus) => Some(bus),
        Err(err) => {
            log::warn!("event bus unavailable, analytics events disabled: {err}");
            None
        }
    };

    let port = config.gateway_port;
    let state = Arc::new(AppState {
        scorer: build_scorer(&config),
        synthesizer: build_synthesizer(&config),
        retriever,
        store,
        event_bus,
        rate_limiter: RateLimiter::new(),
        metrics: Metrics::new().context("failed to initialize metrics registry")?,
        config,
    });

    let app = build_router(state);
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    log::info!("Listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
