//! Error types
//!
//! Typed errors for the frame codec and the notification sinks. Application
//! plumbing uses `anyhow` on top of these.

use thiserror::Error;

/// A text frame that could not be decoded
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown frame code '{0}'")]
    UnknownCode(char),

    #[error("message frame without a type")]
    MissingType,

    #[error("unknown message type '{0}'")]
    UnknownType(char),

    #[error("invalid message id '{0}'")]
    InvalidId(String),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// A notification that could not be delivered
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected with HTTP status {0}")]
    Status(reqwest::StatusCode),
}
