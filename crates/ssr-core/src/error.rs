use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SsrError {
    #[error("not initialized: run 'ssr init'")]
    NotInitialized,

    #[error("invalid namespace '{0}': must be lowercase alphanumeric with hyphens or underscores")]
    InvalidNamespace(String),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("malformed input '{encoded}': unmapped symbols {symbols:?}")]
    MalformedInput { encoded: String, symbols: Vec<char> },

    #[error("registry error: {0}")]
    Registry(String),

    #[error("upstream query {query} finished with status {state}")]
    Upstream { query: String, state: String },

    #[error("upstream query {query} did not finish within {timeout:?}")]
    UpstreamTimeout { query: String, timeout: Duration },

    #[error("job report delivery failed: {0}")]
    Report(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SsrError>;
