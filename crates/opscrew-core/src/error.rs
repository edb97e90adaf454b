//! Error types for opscrew
//!
//! Every pipeline stage converts its failures into one of these variants
//! at the stage boundary; the orchestrator inspects them and resolves the
//! ticket to a terminal status instead of letting anything propagate out.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("classification parse failure: {0}")]
    ClassificationParse(String),

    #[error("plan validation failed: {0}")]
    PlanValidation(String),

    #[error("command rejected by policy: {0}")]
    CommandRejected(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("command timed out after {0}s")]
    Timeout(u64),

    #[error("execution failure: {0}")]
    ExecutionFailure(String),

    #[error("unknown server: {0}")]
    UnknownServer(String),

    #[error("unknown ticket: {0}")]
    UnknownTicket(String),

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn plan(reason: impl Into<String>) -> Self {
        Self::PlanValidation(reason.into())
    }
}
