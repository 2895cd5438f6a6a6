//! # Cursor Scans
//!
//! Purpose: Page through a keyspace, set, or hash with the SCAN family.
//!
//! The cursor is an opaque token owned by the server. The client only ever
//! echoes back the token from the previous page; it never parses it. A page
//! may be empty while more remain, so iteration stops on `more == false`
//! alone.

use std::future::Future;

use bytes::Bytes;
use pkv_common::{Command, Keyword, Reply};

use crate::error::ClientResult;
use crate::interpret::{bytes, unexpected};

const START_TOKEN: &[u8] = b"0";

/// Server-issued continuation token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanCursor(Option<Bytes>);

impl ScanCursor {
    /// Cursor that starts a new iteration.
    pub fn start() -> Self {
        ScanCursor(None)
    }

    /// True for the start cursor (and for the terminal cursor, which the
    /// server reports with the same token).
    pub fn is_start(&self) -> bool {
        self.0.is_none()
    }

    fn from_token(token: Bytes) -> Self {
        if &token[..] == START_TOKEN {
            ScanCursor(None)
        } else {
            ScanCursor(Some(token))
        }
    }

    fn token(&self) -> Bytes {
        match &self.0 {
            Some(token) => token.clone(),
            None => Bytes::from_static(START_TOKEN),
        }
    }
}

/// Cursor, MATCH pattern, and COUNT hint for one scan call.
#[derive(Debug, Clone, Default)]
pub struct ScanParams {
    cursor: ScanCursor,
    pattern: Option<Bytes>,
    count: Option<u64>,
}

impl ScanParams {
    /// Parameters for the first page.
    pub fn new() -> Self {
        ScanParams::default()
    }

    /// Continues from `cursor`.
    pub fn cursor(mut self, cursor: ScanCursor) -> Self {
        self.cursor = cursor;
        self
    }

    /// Restricts results to entries matching a glob pattern.
    pub fn pattern(mut self, pattern: impl AsRef<[u8]>) -> Self {
        self.pattern = Some(Bytes::copy_from_slice(pattern.as_ref()));
        self
    }

    /// Hints how much work the server does per page.
    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Current cursor.
    pub fn current(&self) -> &ScanCursor {
        &self.cursor
    }

    /// Appends `<cursor> [MATCH pattern] [COUNT n]`.
    pub fn apply(&self, command: Command) -> Command {
        let mut command = command.arg_bytes(self.cursor.token());
        if let Some(pattern) = &self.pattern {
            command = command.keyword(Keyword::Match).arg_bytes(pattern.clone());
        }
        if let Some(count) = self.count {
            command = command.keyword(Keyword::Count).arg_int(count.min(i64::MAX as u64) as i64);
        }
        command
    }
}

/// One field/value pair from HSCAN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashEntry {
    pub field: Bytes,
    pub value: Bytes,
}

/// One page of scan results.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage<T> {
    /// Entries in this page. May be empty even when `more` is true.
    pub entries: Vec<T>,
    /// Cursor for the next call.
    pub cursor: ScanCursor,
    /// False once the server returned the terminal cursor.
    pub more: bool,
}

fn split_page(reply: Reply) -> ClientResult<(ScanCursor, Vec<Reply>)> {
    let mut parts = match reply {
        Reply::Array(Some(parts)) if parts.len() == 2 => parts,
        other => return unexpected("[cursor, items] array", &other),
    };
    let items = match parts.pop() {
        Some(Reply::Array(Some(items))) => items,
        Some(Reply::Array(None)) => Vec::new(),
        Some(other) => return unexpected("array of scan items", &other),
        None => return unexpected("array of scan items", &Reply::Array(None)),
    };
    let cursor = match parts.pop() {
        Some(Reply::Bulk(Some(token))) => ScanCursor::from_token(token),
        Some(other) => return unexpected("bulk cursor", &other),
        None => return unexpected("bulk cursor", &Reply::Array(None)),
    };
    Ok((cursor, items))
}

/// Page of single values (SCAN, SSCAN).
pub fn scan_values(reply: Reply) -> ClientResult<ScanPage<Bytes>> {
    let (cursor, items) = split_page(reply)?;
    let entries = items.into_iter().map(bytes).collect::<ClientResult<Vec<_>>>()?;
    Ok(ScanPage {
        entries,
        more: !cursor.is_start(),
        cursor,
    })
}

/// Page of field/value pairs (HSCAN).
pub fn scan_entries(reply: Reply) -> ClientResult<ScanPage<HashEntry>> {
    let (cursor, items) = split_page(reply)?;
    if items.len() % 2 != 0 {
        return unexpected("even number of hash scan items", &Reply::array(items));
    }
    let mut entries = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        entries.push(HashEntry {
            field: bytes(field)?,
            value: bytes(value)?,
        });
    }
    Ok(ScanPage {
        entries,
        more: !cursor.is_start(),
        cursor,
    })
}

/// Follows cursors from `params` until the terminal page and collects every
/// entry. `fetch` issues one scan call.
///
/// Entries may repeat if the collection changes during the scan.
pub async fn scan_all<T, F, Fut>(params: ScanParams, mut fetch: F) -> ClientResult<Vec<T>>
where
    F: FnMut(ScanParams) -> Fut,
    Fut: Future<Output = ClientResult<ScanPage<T>>>,
{
    let mut params = params;
    let mut out = Vec::new();
    loop {
        let page = fetch(params.clone()).await?;
        out.extend(page.entries);
        if !page.more {
            return Ok(out);
        }
        params = params.cursor(page.cursor);
    }
}
