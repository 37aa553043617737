//! Error types for REST calls and the top-level dashboard error.

use reqwest::StatusCode;
use shared::ServerState;
use thiserror::Error;

use crate::session::SessionError;
use crate::upload::UploadError;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a call to one of the REST APIs.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error("unexpected response body: {0}")]
    Body(#[from] serde_json::Error),

    /// A presigned URL was missing for a file we asked to upload.
    #[error("no presigned url returned for {0}")]
    MissingUploadUrl(String),
}

impl ApiError {
    /// Message for a non-2xx response: the body's `message` field when present.
    pub(crate) fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("HTTP error status: {}", status.as_u16()));
        ApiError::Status { status, message }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status(),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no server named {0}")]
    UnknownServer(String),

    #[error("server {name} cannot be {action} while {state}")]
    InvalidTransition {
        name: String,
        action: &'static str,
        state: ServerState,
    },

    #[error("{0} already has an operation in progress")]
    OperationInFlight(String),

    #[error("no {kind} named {key}")]
    UnknownFile { kind: &'static str, key: String },
}
