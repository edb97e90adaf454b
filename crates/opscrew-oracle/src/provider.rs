//! Oracle trait

use async_trait::async_trait;

/// Result type for oracle operations
pub type OracleResult<T> = Result<T, OracleError>;

/// Oracle error types
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// The black-box language-model collaborator. Implementations complete a
/// prompt to raw text; all structure is recovered by the typed parsers in
/// [`crate::types`].
#[async_trait]
pub trait Oracle: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> OracleResult<String>;
}
