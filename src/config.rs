use anyhow::{Context, Result};

/// Which generator backend produces grounded answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorKind {
    Stub,
    Hf,
    Api,
}

impl GeneratorKind {
    fn parse(raw: &str) -> Self {
        match raw {
            "hf" => GeneratorKind::Hf,
            "api" => GeneratorKind::Api,
            _ => GeneratorKind::Stub,
        }
    }
}

/// Gateway configuration, assembled entirely from environment-derived
/// values per spec §6's recognized key list. Loaded once at startup;
/// a bad value (missing URL, non-positive dimension, inverted top-k
/// bounds) fails the process immediately rather than degrading per-request.
#[derive(Debug, Clone)]
pub struct Config {
    pub opensearch_url: String,
    pub qdrant_url: String,

    pub postgres_host: String,
    pub postgres_port: u16,
    pub postgres_db: String,
    pub postgres_user: String,
    pub postgres_password: String,

    pub minio_endpoint: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub minio_bucket: String,

    pub kafka_broker: String,

    pub gateway_port: u16,
    pub env: String,

    pub embed_model: String,
    pub embed_dim: usize,
    pub embed_endpoint: String,
    pub reranker_model: String,
    pub generator: GeneratorKind,
    pub hf_token: Option<String>,

    pub default_top_k: usize,
    pub max_top_k: usize,
    pub rrf_k: u32,
    pub rerank_top_k: usize,
    pub final_top_k: usize,

    pub otel_exporter_otlp_endpoint: Option<String>,
    pub otel_service_name: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} is not a valid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from the environment, loading a `.env` file first
    /// if present (mirrors the teacher's `Config::load`).
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config = Config {
            opensearch_url: env_or("OPENSEARCH_URL", "http://localhost:9200"),
            qdrant_url: env_or("QDRANT_URL", "http://localhost:6333"),

            postgres_host: env_or("POSTGRES_HOST", "localhost"),
            postgres_port: env_parse("POSTGRES_PORT", 5432u16)
                .context("POSTGRES_PORT")?,
            postgres_db: env_or("POSTGRES_DB", "searchit"),
            postgres_user: env_or("POSTGRES_USER", "searchit"),
            postgres_password: env_or("POSTGRES_PASSWORD", "searchit"),

            minio_endpoint: env_or("MINIO_ENDPOINT", "http://localhost:9000"),
            minio_access_key: env_or("MINIO_ACCESS_KEY", "searchit"),
            minio_secret_key: env_or("MINIO_SECRET_KEY", "searchitsecret"),
            minio_bucket: env_or("MINIO_BUCKET", "searchit-data"),

            kafka_broker: env_or("KAFKA_BROKER", "localhost:9092"),

            gateway_port: env_parse("GATEWAY_PORT", 8000u16).context("GATEWAY_PORT")?,
            env: env_or("ENV", "dev"),

            embed_model: env_or("EMBED_MODEL", "intfloat/e5-base"),
            embed_dim: env_parse("EMBED_DIM", 768usize).context("EMBED_DIM")?,
            embed_endpoint: env_or("EMBED_ENDPOINT", "http://localhost:8001/embed"),
            reranker_model: env_or("RERANKER_MODEL", "cross-encoder/ms-marco-MiniLM-L-6-v2"),
            generator: GeneratorKind::parse(&env_or("GENERATOR", "stub")),
            hf_token: std::env::var("HF_TOKEN").ok(),

            default_top_k: env_parse("DEFAULT_TOP_K", 10usize).context("DEFAULT_TOP_K")?,
            max_top_k: env_parse("MAX_TOP_K", 100usize).context("MAX_TOP_K")?,
            rrf_k: env_parse("RRF_K", 60u32).context("RRF_K")?,
            rerank_top_k: env_parse("RERANK_TOP_K", 50usize).context("RERANK_TOP_K")?,
            final_top_k: env_parse("FINAL_TOP_K", 8usize).context("FINAL_TOP_K")?,

            otel_exporter_otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            otel_service_name: env_or("OTEL_SERVICE_NAME", "searchit-gateway"),
        };

        // A generator requesting "hf" without a token degrades to "stub",
        // matching the source's behavior, logged rather than treated as fatal.
        let config = if config.generator == GeneratorKind::Hf && config.hf_token.is_none() {
            log::warn!("GENERATOR=hf requested but HF_TOKEN not set, falling back to stub");
            Config {
                generator: GeneratorKind::Stub,
                ..config
            }
        } else {
            config
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.embed_dim == 0 {
            anyhow::bail!("EMBED_DIM must be greater than 0");
        }
        if self.default_top_k == 0 {
            anyhow::bail!("DEFAULT_TOP_K must be greater than 0");
        }
        if self.max_top_k == 0 || self.default_top_k > self.max_top_k {
            anyhow::bail!(
                "MAX_TOP_K ({}) must be >= DEFAULT_TOP_K ({}) and > 0",
                self.max_top_k,
                self.default_top_k
            );
        }
        if self.rerank_top_k == 0 {
            anyhow::bail!("RERANK_TOP_K must be greater than 0");
        }
        if self.final_top_k == 0 || self.final_top_k > self.max_top_k {
            anyhow::bail!("FINAL_TOP_K must be > 0 and <= MAX_TOP_K");
        }
        Ok(())
    }

    pub fn postgres_config(&self) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.postgres_host)
            .port(self.postgres_port)
            .dbname(&self.postgres_db)
            .user(&self.postgres_user)
            .password(&self.postgres_password);
        cfg
    }
}
