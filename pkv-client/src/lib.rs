//! # PipeKV Async Client
//!
//! Purpose: Provide an async Redis-compatible client that pipelines many
//! commands over each pooled TCP connection.
//!
//! ## Design Principles
//! 1. **Pipelining**: Commands are written without waiting for earlier
//!    replies; replies are matched back in FIFO order.
//! 2. **Object Pool Pattern**: A bounded pool shares connections between
//!    tasks and replaces the ones that die.
//! 3. **One Primitive**: Every command is a [`Request`] run through the same
//!    `submit` path; the typed methods on [`Client`] are thin wrappers.
//! 4. **Protocol Clarity**: RESP2 framing lives in `pkv-common`, shared with
//!    server-side tooling.
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> pkv_client::ClientResult<()> {
//! let client = pkv_client::Client::connect("127.0.0.1:6379")?;
//! client.sadd(b"fruits", &[b"apple", b"pear"]).await?;
//! assert!(client.sismember(b"fruits", b"apple").await?);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connection;
mod error;
mod interpret;
mod pool;

pub mod commands;
pub mod scan;

pub use client::Client;
pub use config::{ClientConfig, ReconnectPolicy};
pub use connection::{Connection, ConnectionId, ConnectionState, ReplyFuture};
pub use error::{ClientError, ClientResult};
pub use interpret::{KeyTtl, Request};
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use scan::{HashEntry, ScanCursor, ScanPage, ScanParams};

/// Reply interpreters for use with `Connection::submit` and custom requests.
pub mod interpreters {
    pub use crate::interpret::{
        boolean, bytes, bytes_list, float, integer, map, ok, ok_or_nil, optional_bytes,
        optional_bytes_list, raw, status, ttl_millis, ttl_seconds, unexpected, Interpreter,
    };
    pub use crate::scan::{scan_entries, scan_values};
}

pub use pkv_common::{Command, CommandName, EncodeError, Keyword, ProtocolError, Reply};
