//! Error types for linkwire-client.
//!
//! Two layers:
//!
//! - [`TransportError`] - faults raised by the framed transport. I/O and
//!   framing faults never leave [`Connection::act`](crate::Connection::act);
//!   they are absorbed by the reconnect loop.
//! - [`LinkError`] - everything a caller of the serializer or an action can
//!   observe. It is `Clone` so a completed action can hand the same fault to
//!   every waiter.

use std::fmt;

use thiserror::Error;

use crate::protocol::ErrorKind;

/// Fault raised by a [`Transport`](crate::transport::Transport) operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error on the underlying channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Block framing violated (oversized block, truncated payload, ...).
    #[error("Framing error: {0}")]
    Framing(String),

    /// Block payload was not a well-formed document or string.
    #[error("Syntax error: {0}")]
    Syntax(String),
}

impl TransportError {
    /// Whether this fault means the link itself is broken.
    ///
    /// Syntax faults leave the byte stream aligned, so they are reported
    /// to the caller instead of triggering a reconnect.
    #[inline]
    pub fn is_link_fault(&self) -> bool {
        matches!(self, TransportError::Io(_) | TransportError::Framing(_))
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Syntax(e.to_string())
    }
}

/// A definitive error answer from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Which declared error kind the server answered with.
    pub kind: ErrorKind,
    /// Optional human-readable message from the server.
    pub message: Option<String>,
}

impl ServerError {
    /// Create a server error without a message.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(m) => write!(f, "{}: {}", self.kind, m),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Main error type for everything above the transport.
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    /// Opening the channel failed (refused, timed out, handshake rejected).
    #[error("Connection startup failed for {host}:{port}: {reason}")]
    Startup {
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
        /// Underlying failure.
        reason: String,
    },

    /// No live connection; `start()` was never called or did not finish.
    #[error("Connection not started")]
    NotStarted,

    /// The connection was stopped on purpose while an operation was pending.
    #[error("Connection manually stopped")]
    Stopped,

    /// A reply or payload could not be decoded.
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// The server answered with an error kind the request declared.
    #[error("Server error: {0}")]
    Protocol(ServerError),

    /// The server answered with something the request did not declare.
    #[error("Illegal protocol reply to '{request}': {detail}")]
    IllegalProtocol {
        /// Name of the request that got the reply.
        request: String,
        /// What was received.
        detail: String,
    },

    /// The action was cancelled before it started.
    #[error("Action skipped")]
    Skipped,

    /// `queue()` was called on an action built with `completed`/`failed`.
    #[error("Constant action cannot be queued")]
    ConstantQueued,

    /// The action engine worker is gone.
    #[error("Action engine shut down")]
    EngineShutdown,

    /// The action's body stopped before producing a result: the inline
    /// `get()` running it was dropped, or the body panicked.
    #[error("Action interrupted before completing")]
    Interrupted,
}

impl LinkError {
    /// Build an illegal-protocol fault.
    pub fn illegal(request: impl Into<String>, detail: impl Into<String>) -> Self {
        LinkError::IllegalProtocol {
            request: request.into(),
            detail: detail.into(),
        }
    }

    /// The server error kind, if this is a protocol error.
    pub fn server_kind(&self) -> Option<ErrorKind> {
        match self {
            LinkError::Protocol(e) => Some(e.kind),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        LinkError::Syntax(e.to_string())
    }
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_fault_classification() {
        let io = TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "gone",
        ));
        assert!(io.is_link_fault());
        assert!(TransportError::Framing("short".into()).is_link_fault());
        assert!(!TransportError::Syntax("bad json".into()).is_link_fault());
    }

    #[test]
    fn test_serde_error_maps_to_syntax() {
        let err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        assert!(matches!(TransportError::from(err), TransportError::Syntax(_)));
    }

    #[test]
    fn test_server_error_display() {
        let e = ServerError::new(ErrorKind::RateLimit).with_message("slow down");
        assert_eq!(e.to_string(), "rate_limit: slow down");
        assert_eq!(ServerError::new(ErrorKind::NotFound).to_string(), "not_found");
    }

    #[test]
    fn test_server_kind_accessor() {
        let e = LinkError::Protocol(ServerError::new(ErrorKind::AccessDenied));
        assert_eq!(e.server_kind(), Some(ErrorKind::AccessDenied));
        assert_eq!(LinkError::Stopped.server_kind(), None);
    }
}
