//! # Command Builders
//!
//! Purpose: Build each supported command as a [`Request`]: the encoded
//! arguments plus the interpreter for its reply.
//!
//! Builders never touch the network. Run the result with
//! `Client::execute`, `ConnectionPool::execute`, or `Connection::send`; the
//! thin async methods on `Client` do exactly that.
//!
//! Keys, members, fields, and values are opaque bytes (`&[u8]`).

use std::time::Duration;

use pkv_common::{Command, CommandName};

use crate::interpret::Request;

pub mod hashes;
pub mod keys;
pub mod sets;
pub mod strings;

pub use hashes::*;
pub use keys::*;
pub use sets::*;
pub use strings::*;

fn keyed(name: CommandName, key: &[u8]) -> Command {
    Command::new(name).arg(key)
}

/// Whole seconds, rounded up so a sub-second ttl never becomes 0.
fn seconds(ttl: Duration) -> i64 {
    let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Whole milliseconds, rounded up like [`seconds`].
fn millis(ttl: Duration) -> i64 {
    let partial = ttl.subsec_nanos() % 1_000_000 > 0;
    i64::try_from(ttl.as_millis() + u128::from(partial)).unwrap_or(i64::MAX)
}

fn timestamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// `PING [message]`. Returns `PONG` or the echoed message.
pub fn ping(message: Option<&[u8]>) -> Request<bytes::Bytes> {
    let mut command = Command::new(CommandName::Ping);
    if let Some(message) = message {
        command = command.arg(message);
    }
    Request::new(command, crate::interpret::bytes)
}
