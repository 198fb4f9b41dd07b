//! # AppError
//!
//! Centralized error handling for the cinedex ecosystem.
//! Maps domain-specific failures to actionable error kinds.

use thiserror::Error;

/// The primary error type for all cinedex operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Referenced entity does not exist (e.g., Director, Genre, Movie, User)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Malformed input (e.g., bad credential format, unknown movie on a reaction)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Signature, expiry, type or revocation failure; caller should re-authenticate
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not privileged enough for the operation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource already exists (e.g., duplicate title or email)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure failure (e.g., DB down, cache unreachable)
    #[error("internal service error: {0}")]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        AppError::NotFound(entity.to_string(), id.to_string())
    }

    /// Stable machine-readable kind, independent of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(..) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal",
        }
    }
}

/// Raised by store adapters when a unique constraint rejects a write.
///
/// Travels inside an `anyhow::Error` and surfaces as [`AppError::Conflict`].
#[derive(Error, Debug)]
#[error("{0} already exists")]
pub struct UniqueViolation(pub String);

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<UniqueViolation>() {
            Some(violation) => AppError::Conflict(violation.to_string()),
            None => AppError::Internal(err),
        }
    }
}

/// A specialized Result type for cinedex logic.
pub type Result<T> = std::result::Result<T, AppError>;
