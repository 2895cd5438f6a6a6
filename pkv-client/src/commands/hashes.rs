//! Hash commands.

use std::collections::HashMap;

use bytes::Bytes;
use pkv_common::CommandName;

use super::keyed;
use crate::interpret::{self, Request};
use crate::scan::{scan_entries, HashEntry, ScanPage, ScanParams};

/// `HSET key field value`. True if the field was created, false if updated.
pub fn hset(key: &[u8], field: &[u8], value: &[u8]) -> Request<bool> {
    Request::new(
        keyed(CommandName::HSet, key).arg(field).arg(value),
        interpret::boolean,
    )
}

/// `HGET key field`.
pub fn hget(key: &[u8], field: &[u8]) -> Request<Option<Bytes>> {
    Request::new(keyed(CommandName::HGet, key).arg(field), interpret::optional_bytes)
}

/// `HEXISTS key field`.
pub fn hexists(key: &[u8], field: &[u8]) -> Request<bool> {
    Request::new(keyed(CommandName::HExists, key).arg(field), interpret::boolean)
}

/// `HSETNX key field value`. False if the field already existed.
pub fn hsetnx(key: &[u8], field: &[u8], value: &[u8]) -> Request<bool> {
    Request::new(
        keyed(CommandName::HSetNx, key).arg(field).arg(value),
        interpret::boolean,
    )
}

/// `HMGET key field [field ...]`. Missing fields come back as `None`.
pub fn hmget(key: &[u8], fields: &[&[u8]]) -> Request<Vec<Option<Bytes>>> {
    Request::new(
        keyed(CommandName::HMGet, key).args(fields),
        interpret::optional_bytes_list,
    )
}

/// `HMSET key field value [field value ...]`.
pub fn hmset(key: &[u8], pairs: &[(&[u8], &[u8])]) -> Request<()> {
    let mut command = keyed(CommandName::HMSet, key);
    for (field, value) in pairs {
        command = command.arg(field).arg(value);
    }
    Request::new(command, interpret::ok)
}

/// `HLEN key`.
pub fn hlen(key: &[u8]) -> Request<i64> {
    Request::new(keyed(CommandName::HLen, key), interpret::integer)
}

/// `HGETALL key`.
pub fn hgetall(key: &[u8]) -> Request<HashMap<Bytes, Bytes>> {
    Request::new(keyed(CommandName::HGetAll, key), interpret::map)
}

/// `HKEYS key`.
pub fn hkeys(key: &[u8]) -> Request<Vec<Bytes>> {
    Request::new(keyed(CommandName::HKeys, key), interpret::bytes_list)
}

/// `HVALS key`.
pub fn hvals(key: &[u8]) -> Request<Vec<Bytes>> {
    Request::new(keyed(CommandName::HVals, key), interpret::bytes_list)
}

/// `HDEL key field [field ...]`. Returns how many fields were removed.
pub fn hdel(key: &[u8], fields: &[&[u8]]) -> Request<i64> {
    Request::new(keyed(CommandName::HDel, key).args(fields), interpret::integer)
}

/// `HINCRBY key field delta`.
pub fn hincrby(key: &[u8], field: &[u8], delta: i64) -> Request<i64> {
    Request::new(
        keyed(CommandName::HIncrBy, key).arg(field).arg_int(delta),
        interpret::integer,
    )
}

/// `HINCRBYFLOAT key field delta`.
pub fn hincrbyfloat(key: &[u8], field: &[u8], delta: f64) -> Request<f64> {
    Request::new(
        keyed(CommandName::HIncrByFloat, key).arg(field).arg_float(delta),
        interpret::float,
    )
}

/// `HSCAN key cursor [MATCH pattern] [COUNT n]`.
pub fn hscan(key: &[u8], params: &ScanParams) -> Request<ScanPage<HashEntry>> {
    Request::new(params.apply(keyed(CommandName::HScan, key)), scan_entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkv_common::Reply;

    #[test]
    fn hset_reports_created_or_updated() {
        let request = hset(b"h", b"f1", b"v1");
        assert_eq!(request.command.to_string(), "HSET h f1 v1");
        assert!((request.interpret)(Reply::Integer(1)).unwrap());
        assert!(!(request.interpret)(Reply::Integer(0)).unwrap());
    }

    #[test]
    fn hmset_flattens_pairs() {
        let pairs: [(&[u8], &[u8]); 2] = [(b"f1", b"v1"), (b"f2", b"v2")];
        assert_eq!(hmset(b"h", &pairs).command.to_string(), "HMSET h f1 v1 f2 v2");
    }

    #[test]
    fn hincrbyfloat_round_trips_decimal() {
        let request = hincrbyfloat(b"h", b"f", 2.5);
        assert_eq!(request.command.to_string(), "HINCRBYFLOAT h f 2.5");
        assert_eq!((request.interpret)(Reply::bulk(&b"7.5"[..])).unwrap(), 7.5);
    }
}
