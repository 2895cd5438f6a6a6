//! Set commands.

use bytes::Bytes;
use pkv_common::{Command, CommandName};

use super::keyed;
use crate::interpret::{self, Request};
use crate::scan::{scan_values, ScanPage, ScanParams};

/// `SADD key member [member ...]`. Returns how many members were new.
pub fn sadd(key: &[u8], members: &[&[u8]]) -> Request<i64> {
    Request::new(keyed(CommandName::SAdd, key).args(members), interpret::integer)
}

/// `SCARD key`.
pub fn scard(key: &[u8]) -> Request<i64> {
    Request::new(keyed(CommandName::SCard, key), interpret::integer)
}

/// `SISMEMBER key member`.
pub fn sismember(key: &[u8], member: &[u8]) -> Request<bool> {
    Request::new(keyed(CommandName::SIsMember, key).arg(member), interpret::boolean)
}

/// `SMEMBERS key`.
pub fn smembers(key: &[u8]) -> Request<Vec<Bytes>> {
    Request::new(keyed(CommandName::SMembers, key), interpret::bytes_list)
}

/// `SRANDMEMBER key`. `None` for an empty or missing set.
pub fn srandmember(key: &[u8]) -> Request<Option<Bytes>> {
    Request::new(keyed(CommandName::SRandMember, key), interpret::optional_bytes)
}

/// `SRANDMEMBER key count`. A negative count allows repeats.
pub fn srandmember_count(key: &[u8], count: i64) -> Request<Vec<Bytes>> {
    Request::new(
        keyed(CommandName::SRandMember, key).arg_int(count),
        interpret::bytes_list,
    )
}

/// `SREM key member [member ...]`. Returns how many members were removed.
pub fn srem(key: &[u8], members: &[&[u8]]) -> Request<i64> {
    Request::new(keyed(CommandName::SRem, key).args(members), interpret::integer)
}

/// `SMOVE source destination member`.
pub fn smove(source: &[u8], destination: &[u8], member: &[u8]) -> Request<bool> {
    Request::new(
        keyed(CommandName::SMove, source).arg(destination).arg(member),
        interpret::boolean,
    )
}

/// `SPOP key`.
pub fn spop(key: &[u8]) -> Request<Option<Bytes>> {
    Request::new(keyed(CommandName::SPop, key), interpret::optional_bytes)
}

/// `SDIFF key [key ...]`.
pub fn sdiff(keys: &[&[u8]]) -> Request<Vec<Bytes>> {
    Request::new(Command::new(CommandName::SDiff).args(keys), interpret::bytes_list)
}

/// `SDIFFSTORE destination key [key ...]`. Returns the stored cardinality.
pub fn sdiffstore(destination: &[u8], keys: &[&[u8]]) -> Request<i64> {
    Request::new(
        keyed(CommandName::SDiffStore, destination).args(keys),
        interpret::integer,
    )
}

/// `SINTER key [key ...]`.
pub fn sinter(keys: &[&[u8]]) -> Request<Vec<Bytes>> {
    Request::new(Command::new(CommandName::SInter).args(keys), interpret::bytes_list)
}

/// `SINTERSTORE destination key [key ...]`.
pub fn sinterstore(destination: &[u8], keys: &[&[u8]]) -> Request<i64> {
    Request::new(
        keyed(CommandName::SInterStore, destination).args(keys),
        interpret::integer,
    )
}

/// `SUNION key [key ...]`.
pub fn sunion(keys: &[&[u8]]) -> Request<Vec<Bytes>> {
    Request::new(Command::new(CommandName::SUnion).args(keys), interpret::bytes_list)
}

/// `SUNIONSTORE destination key [key ...]`.
pub fn sunionstore(destination: &[u8], keys: &[&[u8]]) -> Request<i64> {
    Request::new(
        keyed(CommandName::SUnionStore, destination).args(keys),
        interpret::integer,
    )
}

/// `SSCAN key cursor [MATCH pattern] [COUNT n]`.
pub fn sscan(key: &[u8], params: &ScanParams) -> Request<ScanPage<Bytes>> {
    Request::new(params.apply(keyed(CommandName::SScan, key)), scan_values)
}
