//! Layered error types for the event relayer.
//!
//! - [`DomainError`] - business logic errors (decode failures, invalid config)
//! - [`InfraError`] - infrastructure errors (RPC, store, publish, config)
//! - [`AppError`] - application-level errors combining domain and infra
//! - [`ApiError`] - HTTP API errors with status codes
//!
//! # Error Philosophy
//!
//! - Domain errors are recoverable and safe to show operators.
//! - Infrastructure errors are logged but details are hidden from API callers.
//! - `Duplicate` is not an error at all: it is the `false` return of
//!   `mark_event_processed`, an expected and counted-but-not-erroring outcome.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Domain-level errors representing business logic violations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DomainError {
    /// Decoding a log against a named ABI event failed.
    #[error("failed to decode {event_name} on {contract}: {reason}")]
    DecodeFailure {
        /// Contract address the log was emitted from.
        contract: String,
        /// Event name the decode was attempted against.
        event_name: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Invalid address format.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid or unparseable ABI JSON.
    #[error("invalid ABI: {0}")]
    InvalidAbi(String),

    /// An admin rewind request was rejected.
    #[error("rewind rejected: {reason}")]
    RewindRejected {
        /// Why the rewind was rejected.
        reason: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// INFRASTRUCTURE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Infrastructure-level errors from external systems.
///
/// These errors are typically logged but their details are hidden from
/// API callers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InfraError {
    /// RPC error communicating with the EVM node.
    #[error("RPC error: {source}")]
    Rpc {
        /// Whether this failure is transient and worth retrying.
        transient: bool,
        /// Underlying transport/provider error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Checkpoint/registry store error.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Publish to the message bus failed.
    #[error("publish error: {source}")]
    Publish {
        /// Whether this failure is transient and worth retrying.
        transient: bool,
        /// Underlying streaming client error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Registry file I/O error.
    #[error("registry I/O error: {0}")]
    RegistryIo(#[from] std::io::Error),

    /// Resource not found in storage.
    #[error("resource not found")]
    NotFound,

    /// Configuration file or environment error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Retry budget for a rate-limited RPC call was exhausted.
    #[error("rate limit retries exhausted after {attempts} attempts: {last_error}")]
    RateLimitExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Display of the last underlying error.
        last_error: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// APPLICATION ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Application-level errors combining domain and infrastructure errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Infrastructure error.
    #[error(transparent)]
    Infra(#[from] InfraError),

    /// Configuration error surfaced at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Initialization error (e.g. failed to connect to a required dependency).
    #[error("initialization error: {0}")]
    Initialization(String),

    /// Graceful shutdown requested.
    #[error("shutdown requested")]
    ShutdownRequested,
}

/// Type alias for application Results.
pub type Result<T> = std::result::Result<T, AppError>;

// ═══════════════════════════════════════════════════════════════════════════════
// API ERRORS (HTTP-specific)
// ═══════════════════════════════════════════════════════════════════════════════

/// API-level errors with HTTP status codes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Wrapped application error.
    #[error(transparent)]
    App(#[from] AppError),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Authentication required or failed (admin secret mismatch).
    #[error("unauthorized")]
    Unauthorized,

    /// Internal server error (with source for logging).
    #[error("internal error")]
    Internal(#[source] eyre::Report),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::App(AppError::Domain(DomainError::RewindRejected { .. })) | Self::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", self.to_string())
            }

            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),

            Self::App(
                AppError::Domain(_) | AppError::Infra(_) | AppError::Config(_) | AppError::Initialization(_)
                | AppError::ShutdownRequested,
            )
            | Self::Internal(_) => {
                tracing::error!(error = ?self, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal error".into(),
                )
            }
        };

        (
            status,
            Json(json!({
                "error": {
                    "code": code,
                    "message": message
                }
            })),
        )
            .into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVENIENCE CONVERSIONS
// ═══════════════════════════════════════════════════════════════════════════════

impl From<crate::types::primitives::InvalidAddress> for DomainError {
    fn from(err: crate::types::primitives::InvalidAddress) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

impl From<crate::types::primitives::InvalidAddress> for AppError {
    fn from(err: crate::types::primitives::InvalidAddress) -> Self {
        Self::Domain(err.into())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
