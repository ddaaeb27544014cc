//! Error types for remediation.

use circuit_breaker::CircuitOpenError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type RemediateResult<T> = Result<T, RemediateError>;

/// Errors that can occur while validating, investigating or persisting.
#[derive(Debug, Error)]
pub enum RemediateError {
    /// Tool input rejected before any session was created
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The AI backend's circuit breaker denied the call
    #[error("AI backend unavailable: {0}")]
    CircuitOpen(#[from] CircuitOpenError),

    /// The AI backend call itself failed
    #[error("AI error: {0}")]
    Ai(String),

    /// A read-only cluster query failed
    #[error("Cluster query failed: {0}")]
    Cluster(String),

    /// A data request outside the read-only vocabulary
    #[error("Unsafe data request refused: {0}")]
    UnsafeRequest(String),

    /// Session directory or file could not be used
    #[error("Session storage error at {path}: {reason}")]
    SessionStorage { path: String, reason: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// An investigation ended in the failed state
    #[error("Investigation {session_id} failed: {source}")]
    InvestigationFailed {
        session_id: String,
        #[source]
        source: Box<RemediateError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt template error: {0}")]
    Template(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemediateError {
    /// The breaker denial behind this error, if any.
    pub fn circuit_open(&self) -> Option<&CircuitOpenError> {
        match self {
            Self::CircuitOpen(open) => Some(open),
            Self::InvestigationFailed { source, .. } => source.circuit_open(),
            _ => None,
        }
    }

    /// Session the error belongs to, if one had been created.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::InvestigationFailed { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}
