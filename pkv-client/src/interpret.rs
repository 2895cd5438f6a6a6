//! # Reply Interpreters
//!
//! Purpose: Turn a decoded `Reply` into the typed result a command promises.
//!
//! An interpreter only sees non-error replies; the connection converts
//! `Reply::Error` into `ClientError::Remote` before calling it. Any other shape
//! the interpreter does not expect becomes `ClientError::UnexpectedReply`.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use pkv_common::{Command, Reply};

use crate::error::{ClientError, ClientResult};

/// Converts a reply into a typed result.
pub type Interpreter<T> = fn(Reply) -> ClientResult<T>;

/// A command paired with the interpreter for its reply.
///
/// Built by the functions in [`crate::commands`] and executed through
/// `Client::execute`, `ConnectionPool::execute`, or `Connection::send`.
#[derive(Debug)]
pub struct Request<T> {
    /// Encoded on submit.
    pub command: Command,
    /// Applied to the matched reply.
    pub interpret: Interpreter<T>,
}

impl<T> Request<T> {
    /// Pairs a command with its interpreter.
    pub fn new(command: Command, interpret: Interpreter<T>) -> Self {
        Request { command, interpret }
    }
}

/// TTL state returned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

pub(crate) fn check_error(reply: Reply) -> ClientResult<Reply> {
    match reply {
        Reply::Error(message) => Err(ClientError::Remote { message }),
        other => Ok(other),
    }
}

/// Builds the mismatch error for `reply`.
pub fn unexpected<T>(expected: &'static str, reply: &Reply) -> ClientResult<T> {
    Err(ClientError::UnexpectedReply {
        expected,
        actual: reply.kind(),
    })
}

/// Passes the reply through untouched.
pub fn raw(reply: Reply) -> ClientResult<Reply> {
    Ok(reply)
}

/// Expects `+OK`.
pub fn ok(reply: Reply) -> ClientResult<()> {
    match reply {
        Reply::Status(ref text) if text == "OK" => Ok(()),
        other => unexpected("OK status", &other),
    }
}

/// `+OK` means applied, nil means a SET condition was not met.
pub fn ok_or_nil(reply: Reply) -> ClientResult<bool> {
    match reply {
        Reply::Status(ref text) if text == "OK" => Ok(true),
        Reply::Bulk(None) => Ok(false),
        other => unexpected("OK status or nil", &other),
    }
}

/// Any status line as text.
pub fn status(reply: Reply) -> ClientResult<String> {
    match reply {
        Reply::Status(text) => Ok(text),
        other => unexpected("status", &other),
    }
}

/// Integer reply.
pub fn integer(reply: Reply) -> ClientResult<i64> {
    match reply {
        Reply::Integer(value) => Ok(value),
        other => unexpected("integer", &other),
    }
}

/// Integer reply used as a flag: `1` is true, `0` is false.
pub fn boolean(reply: Reply) -> ClientResult<bool> {
    match reply {
        Reply::Integer(1) => Ok(true),
        Reply::Integer(0) => Ok(false),
        other => unexpected("integer 0 or 1", &other),
    }
}

/// Bulk string, nil maps to `None`.
pub fn optional_bytes(reply: Reply) -> ClientResult<Option<Bytes>> {
    match reply {
        Reply::Bulk(value) => Ok(value),
        other => unexpected("bulk string", &other),
    }
}

/// Present bulk string or status payload.
pub fn bytes(reply: Reply) -> ClientResult<Bytes> {
    match reply {
        Reply::Bulk(Some(data)) => Ok(data),
        Reply::Status(text) => Ok(Bytes::from(text)),
        other => unexpected("bulk string", &other),
    }
}

/// Bulk string holding a decimal float, as HINCRBYFLOAT returns.
pub fn float(reply: Reply) -> ClientResult<f64> {
    let parsed = match &reply {
        Reply::Bulk(Some(data)) => std::str::from_utf8(data)
            .ok()
            .and_then(|text| text.parse::<f64>().ok()),
        _ => None,
    };
    match parsed {
        Some(value) => Ok(value),
        None => unexpected("bulk float", &reply),
    }
}

/// Array of present bulk strings; a nil array is empty.
pub fn bytes_list(reply: Reply) -> ClientResult<Vec<Bytes>> {
    match reply {
        Reply::Array(Some(items)) => items.into_iter().map(bytes).collect(),
        Reply::Array(None) => Ok(Vec::new()),
        other => unexpected("array of bulk strings", &other),
    }
}

/// Array of bulk strings where nil entries stay `None` (HMGET).
pub fn optional_bytes_list(reply: Reply) -> ClientResult<Vec<Option<Bytes>>> {
    match reply {
        Reply::Array(Some(items)) => items.into_iter().map(optional_bytes).collect(),
        other => unexpected("array of bulk strings", &other),
    }
}

/// Flat `[field, value, field, value, ...]` array as a map (HGETALL).
pub fn map(reply: Reply) -> ClientResult<HashMap<Bytes, Bytes>> {
    let items = match reply {
        Reply::Array(Some(items)) if items.len() % 2 == 0 => items,
        other => return unexpected("even-length array", &other),
    };
    let mut out = HashMap::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        out.insert(bytes(field)?, bytes(value)?);
    }
    Ok(out)
}

/// TTL reply in seconds.
pub fn ttl_seconds(reply: Reply) -> ClientResult<KeyTtl> {
    ttl_with(reply, Duration::from_secs)
}

/// TTL reply in milliseconds.
pub fn ttl_millis(reply: Reply) -> ClientResult<KeyTtl> {
    ttl_with(reply, Duration::from_millis)
}

fn ttl_with(reply: Reply, unit: fn(u64) -> Duration) -> ClientResult<KeyTtl> {
    match reply {
        Reply::Integer(-2) => Ok(KeyTtl::Missing),
        Reply::Integer(-1) => Ok(KeyTtl::NoExpiry),
        Reply::Integer(value) if value >= 0 => Ok(KeyTtl::ExpiresIn(unit(value as u64))),
        other => unexpected("ttl integer", &other),
    }
}
