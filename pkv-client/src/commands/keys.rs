//! Keyspace commands.

use std::time::Duration;

use bytes::Bytes;
use pkv_common::{Command, CommandName, Keyword};

use super::{keyed, millis, seconds, timestamp};
use crate::interpret::{self, KeyTtl, Request};
use crate::scan::{scan_values, ScanPage, ScanParams};

/// `DEL key [key ...]`. Returns how many keys were removed.
pub fn del(keys: &[&[u8]]) -> Request<i64> {
    Request::new(Command::new(CommandName::Del).args(keys), interpret::integer)
}

/// `EXISTS key`.
pub fn exists(key: &[u8]) -> Request<bool> {
    Request::new(keyed(CommandName::Exists, key), interpret::boolean)
}

/// `EXPIRE key seconds`. False if the key does not exist.
pub fn expire(key: &[u8], ttl: Duration) -> Request<bool> {
    Request::new(
        keyed(CommandName::Expire, key).arg_int(seconds(ttl)),
        interpret::boolean,
    )
}

/// `EXPIREAT key unix-seconds`.
pub fn expire_at(key: &[u8], unix_seconds: u64) -> Request<bool> {
    Request::new(
        keyed(CommandName::ExpireAt, key).arg_int(timestamp(unix_seconds)),
        interpret::boolean,
    )
}

/// `PEXPIRE key milliseconds`.
pub fn pexpire(key: &[u8], ttl: Duration) -> Request<bool> {
    Request::new(
        keyed(CommandName::PExpire, key).arg_int(millis(ttl)),
        interpret::boolean,
    )
}

/// `PEXPIREAT key unix-milliseconds`.
pub fn pexpire_at(key: &[u8], unix_millis: u64) -> Request<bool> {
    Request::new(
        keyed(CommandName::PExpireAt, key).arg_int(timestamp(unix_millis)),
        interpret::boolean,
    )
}

/// `PERSIST key`. False if the key had no expiry or does not exist.
pub fn persist(key: &[u8]) -> Request<bool> {
    Request::new(keyed(CommandName::Persist, key), interpret::boolean)
}

/// `TTL key`.
pub fn ttl(key: &[u8]) -> Request<KeyTtl> {
    Request::new(keyed(CommandName::Ttl, key), interpret::ttl_seconds)
}

/// `PTTL key`.
pub fn pttl(key: &[u8]) -> Request<KeyTtl> {
    Request::new(keyed(CommandName::PTtl, key), interpret::ttl_millis)
}

/// `KEYS pattern`.
pub fn keys(pattern: &[u8]) -> Request<Vec<Bytes>> {
    Request::new(keyed(CommandName::Keys, pattern), interpret::bytes_list)
}

/// `RANDOMKEY`. `None` when the database is empty.
pub fn random_key() -> Request<Option<Bytes>> {
    Request::new(Command::new(CommandName::RandomKey), interpret::optional_bytes)
}

/// `RENAME key newkey`.
pub fn rename(key: &[u8], new_key: &[u8]) -> Request<()> {
    Request::new(keyed(CommandName::Rename, key).arg(new_key), interpret::ok)
}

/// `RENAMENX key newkey`. False if `new_key` already exists.
pub fn rename_nx(key: &[u8], new_key: &[u8]) -> Request<bool> {
    Request::new(keyed(CommandName::RenameNx, key).arg(new_key), interpret::boolean)
}

/// `TYPE key`, e.g. `string`, `set`, `hash`, or `none`.
pub fn key_type(key: &[u8]) -> Request<String> {
    Request::new(keyed(CommandName::Type, key), interpret::status)
}

/// `DUMP key`. Serialized value, `None` if the key does not exist.
pub fn dump(key: &[u8]) -> Request<Option<Bytes>> {
    Request::new(keyed(CommandName::Dump, key), interpret::optional_bytes)
}

/// `RESTORE key ttl payload [REPLACE]`. A `None` ttl restores without expiry.
pub fn restore(key: &[u8], ttl: Option<Duration>, payload: &[u8], replace: bool) -> Request<()> {
    let mut command = keyed(CommandName::Restore, key)
        .arg_int(ttl.map(millis).unwrap_or(0))
        .arg(payload);
    if replace {
        command = command.keyword(Keyword::Replace);
    }
    Request::new(command, interpret::ok)
}

/// `MOVE key db`.
pub fn move_key(key: &[u8], db: u32) -> Request<bool> {
    Request::new(
        keyed(CommandName::Move, key).arg_int(i64::from(db)),
        interpret::boolean,
    )
}

/// `MIGRATE host port key db timeout`. Moves the key to another server.
pub fn migrate(host: &[u8], port: u16, key: &[u8], db: u32, timeout: Duration) -> Request<()> {
    let command = Command::new(CommandName::Migrate)
        .arg(host)
        .arg_int(i64::from(port))
        .arg(key)
        .arg_int(i64::from(db))
        .arg_int(millis(timeout));
    Request::new(command, interpret::ok)
}

/// `SCAN cursor [MATCH pattern] [COUNT n]`.
pub fn scan(params: &ScanParams) -> Request<ScanPage<Bytes>> {
    Request::new(params.apply(Command::new(CommandName::Scan)), scan_values)
}
