//! Error types for jumpcp-core.

use thiserror::Error;

/// Main error type for jumpcp operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the socket or filesystem, including unexpected EOF and
    /// timeouts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol violation: malformed frame, unknown kind, oversized payload,
    /// size mismatch or illegal state transition.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Cooperative cancellation was observed.
    #[error("transfer cancelled")]
    Cancelled,

    /// Invalid configuration, surfaced at construction time only.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// The peer reported an error via an ERROR frame.
    #[error("peer error: {reason}")]
    Peer { reason: String },
}

impl Error {
    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Create a peer error from an ERROR frame reason.
    pub fn peer(reason: impl Into<String>) -> Self {
        Error::Peer {
            reason: reason.into(),
        }
    }

    /// Create a timeout error for the named operation.
    pub fn timeout(operation: &str) -> Self {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("{operation} timed out"),
        ))
    }

    /// Create an unexpected-EOF error for the named operation.
    pub fn unexpected_eof(operation: &str) -> Self {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("peer closed during {operation}"),
        ))
    }

    /// Returns true if this error is a timed-out I/O operation.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut)
    }

    /// Returns true if the peer closed the stream mid-operation.
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }

    /// Stable machine-readable kind, carried in `TaskError` events.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => "timeout",
            Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => "unexpected-eof",
            Error::Io(_) => "io",
            Error::Protocol { .. } => "protocol",
            Error::Cancelled => "cancelled",
            Error::Config { .. } => "config",
            Error::Peer { .. } => "peer",
        }
    }
}

/// Convenience result type for jumpcp operations.
pub type Result<T> = std::result::Result<T, Error>;
