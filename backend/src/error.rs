//! Core error kinds (see spec §7).
//!
//! Connector and store code classifies failures into one of these
//! variants as early as possible; coordination layers (resolver,
//! render, uploader, scheduler) match on the variant instead of
//! inspecting transport-level errors directly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TcmError {
    /// Requested remote entity is absent. Treated as data, not failure.
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials rejected. Disables the connector; never retried.
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// Local/remote ID disagreement for the same (kind, instance[, library]).
    #[error("conflicting id for {kind}: local={local:?} remote={remote:?}")]
    Conflict {
        kind: &'static str,
        local: String,
        remote: String,
    },

    /// Card-type validation failed; the recipe is not buildable as-is.
    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),

    /// Filesize limit unreachable after compression.
    #[error("resource exceeded: {0}")]
    ResourceExceeded(String),

    /// Network/5xx error, eligible for retry per §5.
    #[error("transient error: {0}")]
    Transient(String),

    /// Cooperative cancellation observed at a checkpoint.
    #[error("cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TcmError {
    /// Whether a retrying caller should try again per the §5 retry policy.
    /// `AuthError` and `Cancelled` never retry; `NotFound` is data, not a
    /// failure to retry past; everything else backed by a transient
    /// condition is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TcmError::Transient(_) | TcmError::Store(_))
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        TcmError::Transient(msg.into())
    }
}

/// Classification of an HTTP response status into a `TcmError`, shared by
/// every connector so the 401/403-never-retry, 404-is-data, 5xx-retries
/// policy of §5 is defined exactly once.
pub fn classify_status(status: reqwest::StatusCode, body_hint: &str) -> TcmError {
    if status == reqwest::StatusCode::NOT_FOUND {
        TcmError::NotFound(body_hint.to_string())
    } else if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        TcmError::AuthError(body_hint.to_string())
    } else if status.is_server_error() {
        TcmError::Transient(format!("{status}: {body_hint}"))
    } else {
        TcmError::Other(anyhow::anyhow!("unexpected status {status}: {body_hint}"))
    }
}

pub type Result<T> = std::result::Result<T, TcmError>;
