use thiserror::Error;

/// Error kinds surfaced across the pipeline (spec.md §7).
///
/// `Conflict` is never surfaced to a caller — it marks a primary-key
/// collision on event insert that a consumer treats as a successful,
/// idempotent no-op under at-least-once redelivery.
#[derive(Debug, Error)]
pub enum TyrError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient backend error: {0}")]
    TransientBackend(#[from] anyhow::Error),
}

impl TyrError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
