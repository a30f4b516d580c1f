use thiserror::Error;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors (missing/invalid env vars, dimension mismatch)
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O errors (bootstrap only — `.env` loading, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata store (Postgres) errors
    #[error("Metadata store error: {0}")]
    Store(#[from] tokio_postgres::Error),

    /// Metadata store pool errors
    #[error("Metadata store pool error: {0}")]
    Pool(String),

    /// Backend HTTP transport errors (lexical/vector adapters, embedder)
    #[error("Backend error: {0}")]
    Backend(#[from] reqwest::Error),

    /// Invalid request input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited,
}

/// Convenient Result type using GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::Config("missing OPENSEARCH_URL".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("missing OPENSEARCH_URL"));
    }

    #[test]
    fn test_rate_limited_display() {
        let err = GatewayError::RateLimited;
        assert_eq!(err.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let gw_err: GatewayError = io_err.into();
        assert!(matches!(gw_err, GatewayError::Io(_)));
    }
}
