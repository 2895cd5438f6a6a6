//! # Async Client API
//!
//! Purpose: Expose one async method per supported command on top of the
//! connection pool.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides pooling, pipelining, and protocol
//!    details.
//! 2. **Borrow-Friendly API**: Accept `&[u8]` to avoid unnecessary copies.
//! 3. **Thin Call Sites**: Every method builds a [`Request`] and runs it
//!    through [`Client::execute`]; nothing else happens per command.
//! 4. **Cheap Clones**: Clones share the same pool.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use pkv_common::{Command, Reply};

use crate::commands::{self, SetOptions};
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::interpret::{KeyTtl, Request};
use crate::pool::{ConnectionPool, PoolStatus, PooledConnection};
use crate::scan::{scan_all, HashEntry, ScanPage, ScanParams};

/// Async client handle.
#[derive(Clone, Debug)]
pub struct Client {
    pool: ConnectionPool,
}

impl Client {
    /// Creates a client for `addr` with default settings.
    pub fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        Self::with_config(ClientConfig::new(addr))
    }

    /// Creates a client using a custom configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        Ok(Client {
            pool: ConnectionPool::new(config)?,
        })
    }

    /// Underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Pool occupancy.
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Borrows one connection for explicit pipelining.
    pub async fn connection(&self) -> ClientResult<PooledConnection> {
        self.pool.acquire().await
    }

    /// Runs a prepared request on a pooled connection.
    pub async fn execute<T: Send + 'static>(&self, request: Request<T>) -> ClientResult<T> {
        self.pool.execute(request).await
    }

    /// Sends an arbitrary command and returns the raw reply.
    ///
    /// Server error replies still surface as `ClientError::Remote`.
    pub async fn raw(&self, command: Command) -> ClientResult<Reply> {
        self.pool.submit(command, crate::interpret::raw).await
    }

    /// Stops the pool. Later calls fail with `PoolClosed`.
    pub fn close(&self) {
        self.pool.close();
    }

    // --- keys -------------------------------------------------------------

    pub async fn del(&self, keys: &[&[u8]]) -> ClientResult<i64> {
        self.execute(commands::del(keys)).await
    }

    pub async fn exists(&self, key: &[u8]) -> ClientResult<bool> {
        self.execute(commands::exists(key)).await
    }

    pub async fn expire(&self, key: &[u8], ttl: Duration) -> ClientResult<bool> {
        self.execute(commands::expire(key, ttl)).await
    }

    pub async fn expire_at(&self, key: &[u8], unix_seconds: u64) -> ClientResult<bool> {
        self.execute(commands::expire_at(key, unix_seconds)).await
    }

    pub async fn pexpire(&self, key: &[u8], ttl: Duration) -> ClientResult<bool> {
        self.execute(commands::pexpire(key, ttl)).await
    }

    pub async fn pexpire_at(&self, key: &[u8], unix_millis: u64) -> ClientResult<bool> {
        self.execute(commands::pexpire_at(key, unix_millis)).await
    }

    pub async fn persist(&self, key: &[u8]) -> ClientResult<bool> {
        self.execute(commands::persist(key)).await
    }

    pub async fn ttl(&self, key: &[u8]) -> ClientResult<KeyTtl> {
        self.execute(commands::ttl(key)).await
    }

    pub async fn pttl(&self, key: &[u8]) -> ClientResult<KeyTtl> {
        self.execute(commands::pttl(key)).await
    }

    pub async fn keys(&self, pattern: &[u8]) -> ClientResult<Vec<Bytes>> {
        self.execute(commands::keys(pattern)).await
    }

    pub async fn random_key(&self) -> ClientResult<Option<Bytes>> {
        self.execute(commands::random_key()).await
    }

    pub async fn rename(&self, key: &[u8], new_key: &[u8]) -> ClientResult<()> {
        self.execute(commands::rename(key, new_key)).await
    }

    pub async fn rename_nx(&self, key: &[u8], new_key: &[u8]) -> ClientResult<bool> {
        self.execute(commands::rename_nx(key, new_key)).await
    }

    pub async fn key_type(&self, key: &[u8]) -> ClientResult<String> {
        self.execute(commands::key_type(key)).await
    }

    pub async fn dump(&self, key: &[u8]) -> ClientResult<Option<Bytes>> {
        self.execute(commands::dump(key)).await
    }

    pub async fn restore(
        &self,
        key: &[u8],
        ttl: Option<Duration>,
        payload: &[u8],
        replace: bool,
    ) -> ClientResult<()> {
        self.execute(commands::restore(key, ttl, payload, replace)).await
    }

    pub async fn move_key(&self, key: &[u8], db: u32) -> ClientResult<bool> {
        self.execute(commands::move_key(key, db)).await
    }

    pub async fn migrate(
        &self,
        host: &[u8],
        port: u16,
        key: &[u8],
        db: u32,
        timeout: Duration,
    ) -> ClientResult<()> {
        self.execute(commands::migrate(host, port, key, db, timeout)).await
    }

    pub async fn scan(&self, params: &ScanParams) -> ClientResult<ScanPage<Bytes>> {
        self.execute(commands::scan(params)).await
    }

    /// Every key matching `params`, following cursors to the end.
    pub async fn scan_all(&self, params: ScanParams) -> ClientResult<Vec<Bytes>> {
        scan_all(params, |page| async move { self.scan(&page).await }).await
    }

    // --- strings ----------------------------------------------------------

    pub async fn ping(&self, message: Option<&[u8]>) -> ClientResult<Bytes> {
        self.execute(commands::ping(message)).await
    }

    pub async fn get(&self, key: &[u8]) -> ClientResult<Option<Bytes>> {
        self.execute(commands::get(key)).await
    }

    pub async fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        self.execute(commands::set(key, value)).await
    }

    /// SET with expiry and condition. False when the condition was not met.
    pub async fn set_with(
        &self,
        key: &[u8],
        value: &[u8],
        options: SetOptions,
    ) -> ClientResult<bool> {
        self.execute(commands::set_with(key, value, options)).await
    }

    pub async fn incr(&self, key: &[u8]) -> ClientResult<i64> {
        self.execute(commands::incr(key)).await
    }

    pub async fn incr_by(&self, key: &[u8], delta: i64) -> ClientResult<i64> {
        self.execute(commands::incr_by(key, delta)).await
    }

    pub async fn append(&self, key: &[u8], value: &[u8]) -> ClientResult<i64> {
        self.execute(commands::append(key, value)).await
    }

    // --- sets -------------------------------------------------------------

    pub async fn sadd(&self, key: &[u8], members: &[&[u8]]) -> ClientResult<i64> {
        self.execute(commands::sadd(key, members)).await
    }

    pub async fn scard(&self, key: &[u8]) -> ClientResult<i64> {
        self.execute(commands::scard(key)).await
    }

    pub async fn sismember(&self, key: &[u8], member: &[u8]) -> ClientResult<bool> {
        self.execute(commands::sismember(key, member)).await
    }

    pub async fn smembers(&self, key: &[u8]) -> ClientResult<Vec<Bytes>> {
        self.execute(commands::smembers(key)).await
    }

    pub async fn srandmember(&self, key: &[u8]) -> ClientResult<Option<Bytes>> {
        self.execute(commands::srandmember(key)).await
    }

    pub async fn srandmember_count(&self, key: &[u8], count: i64) -> ClientResult<Vec<Bytes>> {
        self.execute(commands::srandmember_count(key, count)).await
    }

    pub async fn srem(&self, key: &[u8], members: &[&[u8]]) -> ClientResult<i64> {
        self.execute(commands::srem(key, members)).await
    }

    pub async fn smove(
        &self,
        source: &[u8],
        destination: &[u8],
        member: &[u8],
    ) -> ClientResult<bool> {
        self.execute(commands::smove(source, destination, member)).await
    }

    pub async fn spop(&self, key: &[u8]) -> ClientResult<Option<Bytes>> {
        self.execute(commands::spop(key)).await
    }

    pub async fn sdiff(&self, keys: &[&[u8]]) -> ClientResult<Vec<Bytes>> {
        self.execute(commands::sdiff(keys)).await
    }

    pub async fn sdiffstore(&self, destination: &[u8], keys: &[&[u8]]) -> ClientResult<i64> {
        self.execute(commands::sdiffstore(destination, keys)).await
    }

    pub async fn sinter(&self, keys: &[&[u8]]) -> ClientResult<Vec<Bytes>> {
        self.execute(commands::sinter(keys)).await
    }

    pub async fn sinterstore(&self, destination: &[u8], keys: &[&[u8]]) -> ClientResult<i64> {
        self.execute(commands::sinterstore(destination, keys)).await
    }

    pub async fn sunion(&self, keys: &[&[u8]]) -> ClientResult<Vec<Bytes>> {
        self.execute(commands::sunion(keys)).await
    }

    pub async fn sunionstore(&self, destination: &[u8], keys: &[&[u8]]) -> ClientResult<i64> {
        self.execute(commands::sunionstore(destination, keys)).await
    }

    pub async fn sscan(&self, key: &[u8], params: &ScanParams) -> ClientResult<ScanPage<Bytes>> {
        self.execute(commands::sscan(key, params)).await
    }

    /// Every member of the set matching `params`.
    pub async fn sscan_all(&self, key: &[u8], params: ScanParams) -> ClientResult<Vec<Bytes>> {
        scan_all(params, |page| async move { self.sscan(key, &page).await }).await
    }

    // --- hashes -----------------------------------------------------------

    pub async fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> ClientResult<bool> {
        self.execute(commands::hset(key, field, value)).await
    }

    pub async fn hget(&self, key: &[u8], field: &[u8]) -> ClientResult<Option<Bytes>> {
        self.execute(commands::hget(key, field)).await
    }

    pub async fn hexists(&self, key: &[u8], field: &[u8]) -> ClientResult<bool> {
        self.execute(commands::hexists(key, field)).await
    }

    pub async fn hsetnx(&self, key: &[u8], field: &[u8], value: &[u8]) -> ClientResult<bool> {
        self.execute(commands::hsetnx(key, field, value)).await
    }

    pub async fn hmget(&self, key: &[u8], fields: &[&[u8]]) -> ClientResult<Vec<Option<Bytes>>> {
        self.execute(commands::hmget(key, fields)).await
    }

    pub async fn hmset(&self, key: &[u8], pairs: &[(&[u8], &[u8])]) -> ClientResult<()> {
        self.execute(commands::hmset(key, pairs)).await
    }

    pub async fn hlen(&self, key: &[u8]) -> ClientResult<i64> {
        self.execute(commands::hlen(key)).await
    }

    pub async fn hgetall(&self, key: &[u8]) -> ClientResult<HashMap<Bytes, Bytes>> {
        self.execute(commands::hgetall(key)).await
    }

    pub async fn hkeys(&self, key: &[u8]) -> ClientResult<Vec<Bytes>> {
        self.execute(commands::hkeys(key)).await
    }

    pub async fn hvals(&self, key: &[u8]) -> ClientResult<Vec<Bytes>> {
        self.execute(commands::hvals(key)).await
    }

    pub async fn hdel(&self, key: &[u8], fields: &[&[u8]]) -> ClientResult<i64> {
        self.execute(commands::hdel(key, fields)).await
    }

    pub async fn hincrby(&self, key: &[u8], field: &[u8], delta: i64) -> ClientResult<i64> {
        self.execute(commands::hincrby(key, field, delta)).await
    }

    pub async fn hincrbyfloat(&self, key: &[u8], field: &[u8], delta: f64) -> ClientResult<f64> {
        self.execute(commands::hincrbyfloat(key, field, delta)).await
    }

    pub async fn hscan(
        &self,
        key: &[u8],
        params: &ScanParams,
    ) -> ClientResult<ScanPage<HashEntry>> {
        self.execute(commands::hscan(key, params)).await
    }

    /// Every field/value pair of the hash matching `params`.
    pub async fn hscan_all(&self, key: &[u8], params: ScanParams) -> ClientResult<Vec<HashEntry>> {
        scan_all(params, |page| async move { self.hscan(key, &page).await }).await
    }
}
