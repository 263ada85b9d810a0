//! Client error types.
//!
//! Transport problems are not errors from the caller's point of view: they are
//! reported as [`TransportFault`] values through the `on_error` hook and drive
//! the reconnect path. [`StreamError`] only covers API misuse and a stopped
//! engine.

use std::fmt;

/// Errors returned by the client API.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Subscriptions need a non-empty event name.
    #[error("Event name must not be empty")]
    EmptyEventName,

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The engine task is gone (every client handle dropped or runtime shut down).
    #[error("Stream engine has shut down")]
    EngineStopped,
}

/// Result type for client operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Broad classification of a transport fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Network-level failure (DNS, refused, reset).
    Network,
    /// Non-success HTTP status.
    Http(u16),
    /// The server ended the stream.
    ClosedByServer,
    /// Anything else the transport could not classify.
    Other,
}

/// A connection-level failure reported by the transport.
///
/// The engine cannot tell fatal faults from transient ones; every fault leads
/// to a scheduled reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFault {
    /// Fault classification.
    pub kind: FaultKind,
    /// Human readable detail.
    pub message: String,
}

impl TransportFault {
    /// Create a new fault.
    #[must_use]
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Network fault shorthand.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Network, message)
    }

    /// HTTP status fault shorthand.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(FaultKind::Http(status), message)
    }

    /// Server-side close shorthand.
    #[must_use]
    pub fn closed_by_server() -> Self {
        Self::new(FaultKind::ClosedByServer, "stream closed by server")
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FaultKind::Network => write!(f, "network error: {}", self.message),
            FaultKind::Http(status) => write!(f, "HTTP {status}: {}", self.message),
            FaultKind::ClosedByServer => write!(f, "closed: {}", self.message),
            FaultKind::Other => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransportFault {}
