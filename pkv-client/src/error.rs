//! # Client Errors
//!
//! Purpose: One error type for every failure the client can surface, split by
//! how far a failure spreads.
//!
//! ## Scope
//! - Connection-scoped: `Protocol`, `ConnectionClosed`. Every request pending
//!   on the failed connection receives a clone, in submission order.
//! - Caller-scoped: everything else. Sibling requests are unaffected.
//!
//! The client never retries on its own; a blind retry on a pipelined
//! connection could repeat a side-effecting command.

use std::sync::Arc;

use pkv_common::{EncodeError, ProtocolError};

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
///
/// `Clone` so a single connection failure can be delivered to every pending
/// request; I/O errors are shared behind an `Arc` for that reason.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Network failure while connecting.
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),

    /// Command could not be encoded; nothing was sent.
    #[error("cannot encode command: {0}")]
    Encoding(#[from] EncodeError),

    /// Inbound bytes could not be framed; the connection was closed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Server answered this command with an error reply.
    #[error("server error: {message}")]
    Remote { message: String },

    /// Reply shape did not match what the command returns.
    #[error("unexpected {actual} reply, expected {expected}")]
    UnexpectedReply {
        expected: &'static str,
        actual: &'static str,
    },

    /// Connection closed before the reply arrived, or was already closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// No connection became available within the acquire timeout.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Pool was closed and hands out no more connections.
    #[error("connection pool closed")]
    PoolClosed,

    /// Reply did not arrive within the command timeout.
    #[error("command timed out")]
    CommandTimeout,

    /// Address is not in `host:port` form.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Configuration rejected during validation or parsing.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// True for failures that took the whole connection down.
    pub fn is_connection_scoped(&self) -> bool {
        matches!(self, ClientError::Protocol(_) | ClientError::ConnectionClosed)
    }

    /// Returns the server's message for `Remote` errors.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            ClientError::Remote { message } => Some(message),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_classification() {
        assert!(ClientError::ConnectionClosed.is_connection_scoped());
        assert!(ClientError::Protocol(ProtocolError::InvalidInteger).is_connection_scoped());
        assert!(!ClientError::CommandTimeout.is_connection_scoped());
        assert!(!ClientError::PoolExhausted.is_connection_scoped());
        assert!(!ClientError::Remote { message: "ERR".into() }.is_connection_scoped());
    }

    #[test]
    fn display_includes_server_message() {
        let err = ClientError::Remote {
            message: "WRONGTYPE Operation against a key".into(),
        };
        assert_eq!(err.to_string(), "server error: WRONGTYPE Operation against a key");
        assert_eq!(err.remote_message(), Some("WRONGTYPE Operation against a key"));
    }

    #[test]
    fn io_errors_are_cloneable() {
        let err = ClientError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
