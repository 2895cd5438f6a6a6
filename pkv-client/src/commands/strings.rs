//! String commands.

use std::time::Duration;

use bytes::Bytes;
use pkv_common::{Command, CommandName, Keyword};

use super::{keyed, millis, seconds};
use crate::interpret::{self, Request};

/// Expiry attached by `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// `EX seconds`, with a partial second rounded up.
    Seconds(Duration),
    /// `PX milliseconds`
    Millis(Duration),
}

/// Existence condition for `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// `NX`: only set if the key does not exist.
    IfAbsent,
    /// `XX`: only set if the key already exists.
    IfPresent,
}

/// Options for [`set_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetOptions {
    pub expiry: Option<Expiry>,
    pub condition: Option<SetCondition>,
}

impl SetOptions {
    /// Sets an expiry.
    pub fn expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Sets an existence condition.
    pub fn condition(mut self, condition: SetCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// `GET key`.
pub fn get(key: &[u8]) -> Request<Option<Bytes>> {
    Request::new(keyed(CommandName::Get, key), interpret::optional_bytes)
}

/// `SET key value`.
pub fn set(key: &[u8], value: &[u8]) -> Request<()> {
    Request::new(keyed(CommandName::Set, key).arg(value), interpret::ok)
}

/// `SET key value [EX s | PX ms] [NX | XX]`. False when the condition was
/// not met and nothing was written.
pub fn set_with(key: &[u8], value: &[u8], options: SetOptions) -> Request<bool> {
    let mut command = keyed(CommandName::Set, key).arg(value);
    match options.expiry {
        Some(Expiry::Seconds(ttl)) => {
            command = command.keyword(Keyword::Ex).arg_int(seconds(ttl))
        }
        Some(Expiry::Millis(ttl)) => {
            command = command.keyword(Keyword::Px).arg_int(millis(ttl))
        }
        None => {}
    }
    match options.condition {
        Some(SetCondition::IfAbsent) => command = command.keyword(Keyword::Nx),
        Some(SetCondition::IfPresent) => command = command.keyword(Keyword::Xx),
        None => {}
    }
    Request::new(command, interpret::ok_or_nil)
}

/// `INCR key`. Returns the new value.
pub fn incr(key: &[u8]) -> Request<i64> {
    Request::new(keyed(CommandName::Incr, key), interpret::integer)
}

/// `INCRBY key delta`.
pub fn incr_by(key: &[u8], delta: i64) -> Request<i64> {
    Request::new(keyed(CommandName::IncrBy, key).arg_int(delta), interpret::integer)
}

/// `APPEND key value`. Returns the new length.
pub fn append(key: &[u8], value: &[u8]) -> Request<i64> {
    Request::new(keyed(CommandName::Append, key).arg(value), interpret::integer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkv_common::Reply;

    #[test]
    fn set_options_are_encoded_in_order() {
        let options = SetOptions::default()
            .expiry(Expiry::Seconds(Duration::from_secs(60)))
            .condition(SetCondition::IfAbsent);
        assert_eq!(
            set_with(b"k", b"v", options).command.to_string(),
            "SET k v EX 60 NX"
        );

        let options = SetOptions::default()
            .expiry(Expiry::Millis(Duration::from_millis(1500)))
            .condition(SetCondition::IfPresent);
        assert_eq!(
            set_with(b"k", b"v", options).command.to_string(),
            "SET k v PX 1500 XX"
        );
        assert_eq!(set(b"k", b"v").command.to_string(), "SET k v");
    }

    #[test]
    fn sub_second_expiry_rounds_up() {
        let options = SetOptions::default().expiry(Expiry::Seconds(Duration::from_millis(500)));
        assert_eq!(set_with(b"k", b"v", options).command.to_string(), "SET k v EX 1");
    }

    #[test]
    fn conditional_set_reports_skips() {
        let request = set_with(b"k", b"v", SetOptions::default().condition(SetCondition::IfAbsent));
        assert!(!(request.interpret)(Reply::Bulk(None)).unwrap());
        assert!((request.interpret)(Reply::Status("OK".into())).unwrap());
    }

    #[test]
    fn get_keeps_nil_and_empty_apart() {
        let request = get(b"k");
        assert_eq!((request.interpret)(Reply::Bulk(None)).unwrap(), None);
        assert_eq!(
            (request.interpret)(Reply::bulk(Bytes::new())).unwrap(),
            Some(Bytes::new())
        );
    }
}
