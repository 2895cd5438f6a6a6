//! # Codec Errors
//!
//! Purpose: Describe why a command could not be encoded or why an inbound
//! byte stream could not be framed as a reply.
//!
//! ## Notes
//! - `EncodeError` is raised before any I/O and is always the caller's fault.
//! - `ProtocolError` means the stream can no longer be trusted to frame
//!   correctly; the owning connection must be torn down.

/// Errors raised while rendering a command into wire bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A command needs at least its name token.
    #[error("cannot encode an empty command")]
    EmptyCommand,
}

/// Errors raised while framing inbound reply bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// First byte of a frame is not one of `+ - : $ *`.
    #[error("invalid frame type byte {0:#04x}")]
    InvalidTypeTag(u8),

    /// Length or count below the nil sentinel (-1).
    #[error("invalid frame length {0}")]
    InvalidLength(i64),

    /// Integer line or length header is not ASCII decimal.
    #[error("invalid integer in frame header")]
    InvalidInteger,

    /// Bulk payload is not followed by CRLF.
    #[error("bulk string payload not terminated by CRLF")]
    MissingCrlf,

    /// Status or error line is not valid UTF-8.
    #[error("status line is not valid utf-8")]
    InvalidUtf8,

    /// Bulk string declares more bytes than the client accepts.
    #[error("bulk string too long: {len} bytes exceeds {max} byte limit")]
    BulkTooLarge { len: usize, max: usize },

    /// No line terminator within the accepted header length.
    #[error("frame header exceeds {0} bytes without CRLF")]
    LineTooLong(usize),

    /// Arrays nested deeper than the client accepts.
    #[error("array nesting exceeds depth {0}")]
    NestingTooDeep(usize),
}

/// Result type for encoding.
pub type EncodeResult<T> = Result<T, EncodeError>;
