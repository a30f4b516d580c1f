//! Metadata store (Postgres): `feedback` persistence. `documents` and
//! `chunks` are populated by ingestion (out of scope for the core) and
//! read only through the lexical/vector backends, never through this pool
//! — so this module's write surface is `feedback` alone, per spec §6.

use crate::config::Config;
use crate::domain::{FeedbackLabel, FeedbackRecord};
use crate::error::{GatewayError, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

/// Connection-pooled handle to the metadata store, created lazily on first
/// use per spec §5 ("backend clients are connection-pooled; pools are
/// created lazily on first use").
#[derive(Clone)]
pub struct MetadataStore {
    pool: Pool,
}

impl MetadataStore {
    pub fn new(config: &Config) -> Result<Self> {
        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = Manager::from_config(config.postgres_config(), NoTls, manager_config);
        let pool = Pool::builder(manager)
            .max_size(16)
            .build()
            .map_err(|e| GatewayError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Creates the `feedback` table if it does not already exist. Called
    /// once at startup; the `documents`/`chunks` tables are owned by
    /// ingestion and are never created here.
    pub async fn ensure_schema(&self) -> Result<()> {
        let client = self.pool.get().await.map_err(|e| GatewayError::Pool(e.to_string()))?;
        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS feedback (
                    id BIGSERIAL PRIMARY KEY,
                    query TEXT NOT NULL,
                    doc_id TEXT,
                    chunk_id TEXT,
                    label TEXT NOT NULL,
                    user_id TEXT,
                    ts TIMESTAMPTZ NOT NULL
                )",
            )
            .await?;
        Ok(())
    }

    /// Persists one feedback record, returning its auto-assigned id.
    pub async fn insert_feedback(&self, record: &FeedbackRecord) -> Result<i64> {
        let client = self.pool.get().await.map_err(|e| GatewayError::Pool(e.to_string()))?;
        let row = client
            .query_one(
                "INSERT INTO feedback (query, doc_id, chunk_id, label, user_id, ts)
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
                &[
                    &record.query,
                    &record.doc_id,
                    &record.chunk_id,
                    &record.label.as_str(),
                    &record.user_id,
                    &record.timestamp,
                ],
            )
            .await?;
        Ok(row.get(0))
    }
}

/// Closed-set label validation per spec §3/§4.6, surfaced as a 400 in C6
/// rather than a store-level error.
pub fn validate_label(raw: &str) -> std::result::Result<FeedbackLabel, GatewayError> {
    FeedbackLabel::parse(raw).ok_or_else(|| {
        GatewayError::InvalidInput(format!("unrecognized feedback label: {raw}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_label_accepts_known_label() {
        assert_eq!(validate_label("relevant").unwrap(), FeedbackLabel::Relevant);
    }

    #[test]
    fn test_validate_label_rejects_unknown_label() {
        assert!(validate_label("definitely-not-a-label").is_err());
    }
}
