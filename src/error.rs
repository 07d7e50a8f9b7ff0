//! Error types for the WebSocket client, server and wire codec.
//!
//! Errors fall into three families (see [`ErrorKind`]): caller errors raised
//! synchronously before any I/O, transport errors from the socket or TLS
//! layer, and protocol errors from the handshake or the frame codec.

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Misuse of the API (malformed URL, connecting twice).
    Caller,
    /// Socket, connect or TLS failure.
    Transport,
    /// Handshake or framing violation by the peer.
    Protocol,
}

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The target URL is missing a scheme or a host, or uses a scheme other
    /// than `ws`/`wss`.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The operation is not allowed in the current connection state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// TLS negotiation or configuration failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The peer did not complete the upgrade in time.
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// HTTP head exceeds the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The upgrade response failed validation.
    #[error("{0}")]
    InvalidHandshake(String),

    /// The server answered the upgrade request with something other than 101.
    #[error("{0}")]
    HandshakeRejected(String),

    /// Frame declares a 64-bit extended payload length, which is unsupported.
    #[error("Payload limit reached: 64-bit payload lengths are not supported")]
    PayloadTooLarge,

    /// Outgoing payload does not fit the 16-bit extended length field.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Buffer ends before the frame does.
    #[error("Truncated frame: need {needed} more bytes")]
    Truncated {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Connection has been closed.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Map this error onto the caller/transport/protocol taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUrl(_) | Error::InvalidState(_) => ErrorKind::Caller,
            Error::Io(_) | Error::Tls(_) | Error::HandshakeTimeout | Error::ConnectionClosed => {
                ErrorKind::Transport
            }
            Error::HandshakeTooLarge { .. }
            | Error::InvalidHandshake(_)
            | Error::HandshakeRejected(_)
            | Error::PayloadTooLarge
            | Error::FrameTooLarge { .. }
            | Error::Truncated { .. } => ErrorKind::Protocol,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}
