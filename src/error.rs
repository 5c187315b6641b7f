//! Error taxonomy shared by every engine operation.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the engine to its callers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("Backup {backup_id} already has a running execution")]
    Conflict { backup_id: Uuid },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    TransientIo(String),

    #[error("Permanent delivery failure (status {status}): {message}")]
    PermanentDelivery { status: u16, message: String },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        EngineError::NotFound { kind, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Whether the failure is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::TransientIo(_))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::TransientIo(err.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
