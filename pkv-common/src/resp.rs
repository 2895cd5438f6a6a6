//! # RESP2 Encoding and Parsing
//!
//! Purpose: Encode client commands as arrays of bulk strings and decode
//! server replies incrementally as bytes arrive from the socket.
//!
//! ## Design Principles
//! 1. **Binary-Safe**: Arguments and bulk payloads are raw bytes, never text.
//! 2. **Resumable Parsing**: `ReplyDecoder` moves completed array elements out
//!    of the buffer and keeps them on a stack, so a retry only re-scans the
//!    element that was cut short.
//! 3. **Zero-Copy Payloads**: Bulk strings are split off the read buffer as
//!    `Bytes` instead of being copied.
//! 4. **Fail Fast**: Invalid framing returns `ProtocolError` immediately.
//!
//! ## Wire Format
//!
//! ```text
//! request:  *<argc>\r\n ( $<len>\r\n <bytes>\r\n ){argc}
//! status:   +OK\r\n
//! error:    -ERR message\r\n
//! integer:  :42\r\n
//! bulk:     $5\r\nhello\r\n      nil: $-1\r\n
//! array:    *2\r\n<reply><reply> nil: *-1\r\n
//! ```

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{EncodeError, EncodeResult, ProtocolError};
use crate::keyword::{CommandName, Keyword};

/// Largest bulk string accepted from the server (same as the server default).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest header line (type byte + decimal + CRLF) accepted before giving up.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Deepest array nesting accepted from the server.
pub const MAX_DEPTH: usize = 64;

/// One decoded server reply.
///
/// `Bulk(None)` and `Array(None)` are the protocol nil values; they are
/// distinct from an empty bulk string and an empty array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK` style status line.
    Status(String),
    /// `-ERR ...` error line.
    Error(String),
    /// `:123` integer line.
    Integer(i64),
    /// `$...` bulk string, `None` for nil.
    Bulk(Option<Bytes>),
    /// `*...` array, `None` for nil.
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Builds a present bulk string reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(Some(data.into()))
    }

    /// Builds a present array reply.
    pub fn array(items: Vec<Reply>) -> Self {
        Reply::Array(Some(items))
    }

    /// True for nil bulk strings and nil arrays.
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Bulk(None) | Reply::Array(None))
    }

    /// Returns the payload of a status line or present bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Status(text) => Some(text.as_bytes()),
            Reply::Bulk(Some(data)) => Some(data),
            _ => None,
        }
    }

    /// Returns the value of an integer reply.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Short name of the variant, used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(Some(_)) => "bulk",
            Reply::Bulk(None) => "nil bulk",
            Reply::Array(Some(_)) => "array",
            Reply::Array(None) => "nil array",
        }
    }

    /// Encodes the reply in server framing.
    ///
    /// The client never sends replies; this exists for fakes and tooling
    /// that need to speak the server side of the protocol.
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Reply::Status(text) => {
                out.put_u8(b'+');
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Error(text) => {
                out.put_u8(b'-');
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Integer(value) => {
                out.put_u8(b':');
                push_i64(out, *value);
                out.extend_from_slice(b"\r\n");
            }
            Reply::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
            Reply::Bulk(Some(data)) => push_bulk(out, data),
            Reply::Array(None) => out.extend_from_slice(b"*-1\r\n"),
            Reply::Array(Some(items)) => {
                out.put_u8(b'*');
                push_i64(out, items.len() as i64);
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(text) => f.write_str(text),
            Reply::Error(msg) => write!(f, "(error) {}", msg),
            Reply::Integer(value) => write!(f, "(integer) {}", value),
            Reply::Bulk(Some(data)) => write!(f, "{:?}", String::from_utf8_lossy(data)),
            Reply::Bulk(None) | Reply::Array(None) => f.write_str("(nil)"),
            Reply::Array(Some(items)) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A request: the command name followed by binary-safe arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Starts a command with its name token.
    pub fn new(name: CommandName) -> Self {
        Command {
            args: vec![Bytes::from_static(name.as_bytes())],
        }
    }

    /// Wraps a raw token list. The list may be empty; `encode` rejects it.
    pub fn from_args(args: Vec<Bytes>) -> Self {
        Command { args }
    }

    /// Appends one opaque argument.
    pub fn arg(mut self, value: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(value.as_ref()));
        self
    }

    /// Appends an argument that is already a `Bytes` handle.
    pub fn arg_bytes(mut self, value: Bytes) -> Self {
        self.args.push(value);
        self
    }

    /// Appends every argument from an iterator.
    pub fn args<I, A>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        for value in values {
            self.args.push(Bytes::copy_from_slice(value.as_ref()));
        }
        self
    }

    /// Appends an option keyword.
    pub fn keyword(mut self, keyword: Keyword) -> Self {
        self.args.push(Bytes::from_static(keyword.as_bytes()));
        self
    }

    /// Appends a signed integer rendered as ASCII decimal.
    pub fn arg_int(mut self, value: i64) -> Self {
        let mut buf = BytesMut::with_capacity(20);
        push_i64(&mut buf, value);
        self.args.push(buf.freeze());
        self
    }

    /// Appends a float rendered in its shortest round-trip form.
    pub fn arg_float(mut self, value: f64) -> Self {
        self.args.push(Bytes::from(value.to_string()));
        self
    }

    /// Returns the command name token, if any.
    pub fn name(&self) -> Option<&[u8]> {
        self.args.first().map(|arg| &arg[..])
    }

    /// Returns every token including the name.
    pub fn tokens(&self) -> &[Bytes] {
        &self.args
    }

    /// Number of tokens including the name.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// True when the command has no tokens at all.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Number of bytes `encode` will append.
    pub fn encoded_len(&self) -> usize {
        let mut total = 1 + decimal_len(self.args.len() as u64) + 2;
        for arg in &self.args {
            total += 1 + decimal_len(arg.len() as u64) + 2 + arg.len() + 2;
        }
        total
    }

    /// Appends the command as an array of bulk strings.
    pub fn encode(&self, out: &mut BytesMut) -> EncodeResult<()> {
        if self.args.is_empty() {
            return Err(EncodeError::EmptyCommand);
        }
        out.reserve(self.encoded_len());
        out.put_u8(b'*');
        push_i64(out, self.args.len() as i64);
        out.extend_from_slice(b"\r\n");
        for arg in &self.args {
            push_bulk(out, arg);
        }
        Ok(())
    }

    /// Encodes into a fresh buffer.
    pub fn to_bytes(&self) -> EncodeResult<Bytes> {
        let mut out = BytesMut::new();
        self.encode(&mut out)?;
        Ok(out.freeze())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

struct PartialArray {
    remaining: usize,
    items: Vec<Reply>,
}

/// Incremental reply decoder.
///
/// Feed it the connection's read buffer after every read. Completed frames
/// are consumed from the buffer; an incomplete frame is left in place and
/// `Ok(None)` is returned.
#[derive(Default)]
pub struct ReplyDecoder {
    stack: Vec<PartialArray>,
}

enum Header {
    Value(Reply, usize),
    Bulk { header_len: usize, len: usize },
    Array(usize, usize),
}

impl ReplyDecoder {
    /// Creates an idle decoder.
    pub fn new() -> Self {
        ReplyDecoder { stack: Vec::new() }
    }

    /// True when no partially decoded array is held.
    pub fn is_idle(&self) -> bool {
        self.stack.is_empty()
    }

    /// Drops any partially decoded state.
    pub fn reset(&mut self) {
        self.stack.clear();
    }

    /// Decodes one top-level reply from the front of `buf`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Reply>, ProtocolError> {
        'frames: loop {
            let mut value = match parse_header(&buf[..])? {
                None => return Ok(None),
                Some(Header::Value(reply, consumed)) => {
                    buf.advance(consumed);
                    reply
                }
                Some(Header::Bulk { header_len, len }) => {
                    if buf.len() < header_len + len + 2 {
                        return Ok(None);
                    }
                    if &buf[header_len + len..header_len + len + 2] != b"\r\n" {
                        return Err(ProtocolError::MissingCrlf);
                    }
                    buf.advance(header_len);
                    let data = buf.split_to(len).freeze();
                    buf.advance(2);
                    Reply::Bulk(Some(data))
                }
                Some(Header::Array(0, consumed)) => {
                    buf.advance(consumed);
                    Reply::Array(Some(Vec::new()))
                }
                Some(Header::Array(count, consumed)) => {
                    if self.stack.len() >= MAX_DEPTH {
                        return Err(ProtocolError::NestingTooDeep(MAX_DEPTH));
                    }
                    buf.advance(consumed);
                    self.stack.push(PartialArray {
                        remaining: count,
                        // Counts come from the wire; cap the up-front allocation.
                        items: Vec::with_capacity(count.min(1024)),
                    });
                    continue 'frames;
                }
            };

            while let Some(top) = self.stack.last_mut() {
                top.items.push(value);
                top.remaining -= 1;
                if top.remaining > 0 {
                    continue 'frames;
                }
                let items = std::mem::take(&mut top.items);
                self.stack.pop();
                value = Reply::Array(Some(items));
            }
            return Ok(Some(value));
        }
    }
}

/// Decodes one reply from the front of `src` without keeping state.
///
/// Returns the reply and the number of bytes it occupied, or `None` when
/// `src` holds only part of a reply.
pub fn decode(src: &[u8]) -> Result<Option<(Reply, usize)>, ProtocolError> {
    let mut buf = BytesMut::from(src);
    let mut decoder = ReplyDecoder::new();
    Ok(decoder
        .decode(&mut buf)?
        .map(|reply| (reply, src.len() - buf.len())))
}

fn parse_header(buf: &[u8]) -> Result<Option<Header>, ProtocolError> {
    let tag = match buf.first() {
        Some(tag) => *tag,
        None => return Ok(None),
    };
    if !matches!(tag, b'+' | b'-' | b':' | b'$' | b'*') {
        return Err(ProtocolError::InvalidTypeTag(tag));
    }

    let cr = match find_crlf(buf) {
        Some(cr) => cr,
        None if buf.len() > MAX_LINE_LEN => return Err(ProtocolError::LineTooLong(MAX_LINE_LEN)),
        None => return Ok(None),
    };
    let line = &buf[1..cr];
    let consumed = cr + 2;

    let header = match tag {
        b'+' => Header::Value(Reply::Status(parse_text(line)?), consumed),
        b'-' => Header::Value(Reply::Error(parse_text(line)?), consumed),
        b':' => Header::Value(Reply::Integer(parse_i64(line)?), consumed),
        b'$' => match parse_i64(line)? {
            -1 => Header::Value(Reply::Bulk(None), consumed),
            len if len < -1 => return Err(ProtocolError::InvalidLength(len)),
            len => {
                let len = len as usize;
                if len > MAX_BULK_LEN {
                    return Err(ProtocolError::BulkTooLarge {
                        len,
                        max: MAX_BULK_LEN,
                    });
                }
                Header::Bulk {
                    header_len: consumed,
                    len,
                }
            }
        },
        _ => match parse_i64(line)? {
            -1 => Header::Value(Reply::Array(None), consumed),
            count if count < -1 => return Err(ProtocolError::InvalidLength(count)),
            count => Header::Array(count as usize, consumed),
        },
    };
    Ok(Some(header))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    let limit = buf.len().min(MAX_LINE_LEN + 1);
    buf[..limit].windows(2).position(|pair| pair == b"\r\n")
}

fn parse_text(line: &[u8]) -> Result<String, ProtocolError> {
    String::from_utf8(line.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

fn parse_i64(data: &[u8]) -> Result<i64, ProtocolError> {
    let (negative, digits) = match data.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some(_) => (false, data),
        None => return Err(ProtocolError::InvalidInteger),
    };
    if digits.is_empty() {
        return Err(ProtocolError::InvalidInteger);
    }

    // Accumulate negatively so i64::MIN parses without overflow.
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ProtocolError::InvalidInteger);
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_sub((b - b'0') as i64))
            .ok_or(ProtocolError::InvalidInteger)?;
    }

    if negative {
        Ok(value)
    } else {
        value.checked_neg().ok_or(ProtocolError::InvalidInteger)
    }
}

fn push_bulk(out: &mut BytesMut, data: &[u8]) {
    out.put_u8(b'$');
    push_i64(out, data.len() as i64);
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

fn push_i64(out: &mut BytesMut, value: i64) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    let mut rest = value.unsigned_abs();
    if rest == 0 {
        buf[0] = b'0';
        len = 1;
    }
    while rest > 0 {
        buf[len] = b'0' + (rest % 10) as u8;
        rest /= 10;
        len += 1;
    }
    if value < 0 {
        out.put_u8(b'-');
    }
    for idx in (0..len).rev() {
        out.put_u8(buf[idx]);
    }
}

fn decimal_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 10 {
        value /= 10;
        len += 1;
    }
    len
}
