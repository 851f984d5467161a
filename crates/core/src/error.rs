//! Shared error taxonomy for the gateway (spec §7).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable wire values for the `error` message's `code` field. Serializes to
/// exactly the snake_case strings spec.md §7 declares authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    UnknownSession,
    Backpressure,
    EngineFailure,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::UnknownSession => "unknown_session",
            ErrorCode::Backpressure => "backpressure",
            ErrorCode::EngineFailure => "engine_failure",
            ErrorCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while mediating between ingress, the engine, and the send
/// queue. Every variant carries the [`ErrorCode`] its terminal wire message
/// should use.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("malformed message: {0}")]
    BadRequest(String),

    #[error("unknown or expired session: {0}")]
    UnknownSession(String),

    #[error("send queue saturated, client too slow")]
    Backpressure,

    #[error("synthesis engine failed: {0}")]
    EngineFailure(String),

    #[error("internal gateway error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::BadRequest(_) => ErrorCode::BadRequest,
            GatewayError::UnknownSession(_) => ErrorCode::UnknownSession,
            GatewayError::Backpressure => ErrorCode::Backpressure,
            GatewayError::EngineFailure(_) => ErrorCode::EngineFailure,
            GatewayError::Internal(_) => ErrorCode::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
