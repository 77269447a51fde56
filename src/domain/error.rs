// Error taxonomy for the monitoring pipeline
//
// None of these are fatal: connection errors drive the reconnect loop, poll
// errors are retried on the next tick, command errors go back to the caller
// and render errors drop the offending sample.
use std::time::Duration;
use thiserror::Error;

use super::sample::VialId;

/// Channel unreachable, dropped or speaking an unexpected protocol.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("channel unreachable: {0}")]
    Unreachable(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("channel closed by peer")]
    Closed,
}

/// Snapshot fetch for a single vial failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PollError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Actuator request rejected locally, by the backend, or never delivered.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("invalid command: {0}")]
    Invalid(String),

    /// Carries the backend message verbatim.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("backend unreachable: {0}")]
    Unreachable(String),
}

impl CommandError {
    /// Message used when a non-2xx response carries no `error` field.
    pub fn from_status(status: u16) -> Self {
        CommandError::Rejected {
            status,
            message: format!("request failed with HTTP status {}", status),
        }
    }
}

/// A sample or frame that cannot be shown.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    #[error("vial {vial}: non-finite value {value}")]
    NonFiniteValue { vial: VialId, value: f64 },

    #[error("unparsable timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("malformed {event} payload: {reason}")]
    MalformedPayload { event: String, reason: String },

    #[error("surface error: {0}")]
    Surface(String),
}
