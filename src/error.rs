//! Error taxonomy shared by the filter compiler, payload builder, task client
//! and storage signer.

use chrono::{DateTime, Utc};
use hyper::StatusCode;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors raised by the request-construction and signing core
#[derive(Error, Debug)]
pub enum ApiError {
    /// Filter DSL has the wrong shape (arity, empty relation, unknown relation)
    #[error("Malformed filter: {0}")]
    MalformedFilter(String),

    /// Signing attempted at or after the credential expiration
    #[error("Storage credentials expired at {expiration}")]
    CredentialsExpired { expiration: DateTime<Utc> },

    /// Server explicitly reported `success=false`
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// A failure was expected but no structured detail was present
    #[error("Unknown error: {0}")]
    UnknownError(String),

    /// Task was still running after the configured number of status checks
    #[error("Task {task_id} still running after {attempts} status checks")]
    PollLimitExceeded { task_id: String, attempts: u32 },

    /// Polling was cancelled by the caller
    #[error("Polling of task {task_id} cancelled")]
    Cancelled { task_id: String },

    /// Storage endpoint answered with a non-success status
    #[error("Storage error: {status} - {message}")]
    Storage { status: StatusCode, message: String },

    /// Payload precondition violated before anything was sent
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;
