use std::io;

use thiserror::Error;

use crate::types::AlertDescription;

/// Errors surfaced by a [`Connection`](crate::Connection).
///
/// Only [`Error::WouldBlock`] and [`Error::Timeout`] leave the connection in
/// a resumable state. Every other error ends the handshake or session and
/// puts the connection back at [`State::Init`](crate::State::Init).
#[derive(Debug, Error)]
pub enum Error {
    /// The transport had no data or no room; call again.
    #[error("operation would block")]
    WouldBlock,

    /// The transport timed out; call again.
    #[error("transport timed out")]
    Timeout,

    /// The peer closed the byte stream.
    #[error("connection closed by peer")]
    Closed,

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Io(io::Error),

    /// No socket has been configured.
    #[error("no transport configured")]
    NoTransport,

    /// Malformed input from the peer.
    #[error("decode error: {0}")]
    Decode(String),

    /// Well-formed input that violates the protocol.
    #[error("protocol error ({alert}): {reason}")]
    Protocol {
        alert: AlertDescription,
        reason: String,
    },

    /// Record or Finished authentication failed.
    #[error("cryptographic failure ({alert})")]
    Crypto { alert: AlertDescription },

    /// The crypto provider or an internal invariant failed.
    #[error("internal error: {0}")]
    Internal(String),

    /// Neither a ticket nor an external PSK is available.
    #[error("no pre-shared key configured")]
    NoPsk,

    /// The supplied ticket cannot be used.
    #[error("invalid ticket: {0}")]
    InvalidTicket(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An argument to a public call was unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The operation requires an established connection.
    #[error("connection not established")]
    NotEstablished,

    /// The peer sent an alert.
    #[error("alert received: {0}")]
    AlertReceived(AlertDescription),

    /// The connection was shut down; reconnect with
    /// [`Connection::connect`](crate::Connection::connect).
    #[error("connection shut down")]
    ShutDown,
}

impl Error {
    pub(crate) fn protocol(alert: AlertDescription, reason: impl Into<String>) -> Self {
        Error::Protocol {
            alert,
            reason: reason.into(),
        }
    }

    pub(crate) fn unexpected(reason: impl Into<String>) -> Self {
        Error::protocol(AlertDescription::UnexpectedMessage, reason)
    }

    pub(crate) fn illegal(reason: impl Into<String>) -> Self {
        Error::protocol(AlertDescription::IllegalParameter, reason)
    }

    /// True for transport conditions the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::WouldBlock | Error::Timeout)
    }

    /// The alert to send to the peer for this error, if any.
    pub fn alert(&self) -> Option<AlertDescription> {
        match self {
            Error::Decode(_) => Some(AlertDescription::DecodeError),
            Error::Protocol { alert, .. } => Some(*alert),
            Error::Crypto { alert } => Some(*alert),
            Error::Internal(_) => Some(AlertDescription::InternalError),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            io::ErrorKind::TimedOut => Error::Timeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Error::Closed,
            _ => Error::Io(e),
        }
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(e: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        let reason = match e {
            nom::Err::Incomplete(_) => "truncated message".to_string(),
            nom::Err::Error(e) | nom::Err::Failure(e) => format!("{:?}", e.code),
        };
        Error::Decode(reason)
    }
}
