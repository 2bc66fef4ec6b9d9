//! Error types for the reactor

use std::io;
use thiserror::Error;

/// Result type for reactor operations
pub type Result<T> = std::result::Result<T, ReactorError>;

/// Errors surfaced at the reactor boundary
#[derive(Error, Debug)]
pub enum ReactorError {
    /// The channel (or its registration) is already closed. Expected-terminal:
    /// callers translate this into end-of-stream, the connection is dead.
    #[error("socket closed")]
    SocketClosed,

    /// A client connect attempt failed
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// Unexpected transport failure; the affected channel has been closed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ReactorError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        ReactorError::Config {
            message: message.into(),
        }
    }

    /// Check if this error indicates the connection is closed
    pub fn is_closed(&self) -> bool {
        match self {
            ReactorError::SocketClosed => true,
            ReactorError::Io(e) => is_closed_kind(e.kind()),
            _ => false,
        }
    }
}

/// I/O error kinds that mean "the peer or the socket is gone" rather than an
/// unexpected transport fault.
pub(crate) fn is_closed_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// Map a channel-level I/O failure to the boundary taxonomy.
pub(crate) fn from_channel_io(err: io::Error) -> ReactorError {
    if is_closed_kind(err.kind()) {
        ReactorError::SocketClosed
    } else {
        ReactorError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_classification() {
        assert!(ReactorError::SocketClosed.is_closed());
        assert!(ReactorError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_closed());
        assert!(!ReactorError::Io(io::Error::from(io::ErrorKind::OutOfMemory)).is_closed());
        assert!(!ReactorError::config("bad").is_closed());
    }

    #[test]
    fn channel_io_mapping() {
        let closed = from_channel_io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(closed, ReactorError::SocketClosed));

        let other = from_channel_io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(other, ReactorError::Io(_)));
    }
}
