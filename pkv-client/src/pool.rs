//! # Connection Pool
//!
//! Purpose: Share a bounded set of pipelined connections between tasks and
//! replace the ones that die.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving connections or
//!    updating tags, never across an await.
//! 3. **Bounded Waiting**: A semaphore caps concurrent borrowers; `acquire`
//!    waits for a permit up to `acquire_timeout`, then fails.
//! 4. **RAII Release**: `PooledConnection` returns its connection on drop.
//!
//! ## Reconnect
//! Every pooled connection reports its own closure over a channel. A
//! background task tags the slot: an idle connection is removed, a borrowed
//! one is marked broken and discarded on release. `ReconnectPolicy::Eager`
//! opens a replacement right away; `Lazy` leaves that to the next `acquire`.

use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use pkv_common::{Command, EncodeError, Reply};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::connection::{Connection, ConnectionEvent, ConnectionId};
use crate::error::{ClientError, ClientResult};
use crate::interpret::Request;

/// Pool-side view of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotTag {
    Idle,
    InUse,
    Broken,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    /// Ready connections waiting in the idle list.
    pub idle: usize,
    /// Connections currently borrowed.
    pub in_use: usize,
    /// Connects in progress.
    pub connecting: usize,
    /// Borrowed connections that closed and will be discarded on release.
    pub broken: usize,
    /// Configured maximum.
    pub max: usize,
}

struct PoolState {
    idle: VecDeque<Connection>,
    tags: HashMap<ConnectionId, SlotTag>,
    connecting: usize,
    closed: bool,
}

impl PoolState {
    /// Connections that are open or opening. Broken ones are already dead.
    fn live(&self) -> usize {
        let open = self
            .tags
            .values()
            .filter(|tag| **tag != SlotTag::Broken)
            .count();
        open + self.connecting
    }
}

struct PoolInner {
    config: ClientConfig,
    state: Mutex<PoolState>,
    permits: Arc<Semaphore>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().expect("pool mutex poisoned")
    }

    /// Opens a connection while counting it as `connecting`.
    async fn open(&self) -> ClientResult<Connection> {
        self.lock().connecting += 1;
        let _slot = ConnectingSlot(self);
        let events = Some(self.events.clone());
        let conn = Connection::connect_with_events(&self.config, events).await;
        match &conn {
            Ok(conn) => {
                debug!(conn = conn.id(), addr = %self.config.addr, "pool opened connection")
            }
            Err(err) => warn!(addr = %self.config.addr, error = %err, "pool connect failed"),
        }
        conn
    }

    fn handle_closed(self: &Arc<Self>, id: ConnectionId) {
        let replenish = {
            let mut state = self.lock();
            match state.tags.get(&id).copied() {
                Some(SlotTag::Idle) => {
                    state.tags.remove(&id);
                    state.idle.retain(|conn| conn.id() != id);
                    debug!(conn = id, "removed closed idle connection");
                }
                Some(SlotTag::InUse) => {
                    state.tags.insert(id, SlotTag::Broken);
                    debug!(conn = id, "borrowed connection closed; marked broken");
                }
                Some(SlotTag::Broken) | None => return,
            }
            self.config.reconnect == ReconnectPolicy::Eager
                && !state.closed
                && state.live() < self.config.max_connections
        };

        if replenish {
            tokio::spawn(replenish_one(self.clone()));
        }
    }

    fn release(self: &Arc<Self>, conn: Connection) {
        let id = conn.id();
        let mut state = self.lock();
        let tag = state.tags.remove(&id);
        let ready = conn.is_ready();
        let keep = !state.closed
            && tag == Some(SlotTag::InUse)
            && ready
            && state.live() < self.config.max_connections;
        if keep {
            state.tags.insert(id, SlotTag::Idle);
            state.idle.push_back(conn);
            return;
        }
        // Still tagged in use: the events task will find no tag for this id,
        // so the replacement starts here.
        let replenish = self.config.reconnect == ReconnectPolicy::Eager
            && !state.closed
            && tag == Some(SlotTag::InUse)
            && !ready
            && state.live() < self.config.max_connections;
        drop(state);
        debug!(conn = id, "discarding released connection");
        conn.close();
        if replenish {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(replenish_one(self.clone()));
            }
        }
    }
}

struct ConnectingSlot<'a>(&'a PoolInner);

impl Drop for ConnectingSlot<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.connecting = state.connecting.saturating_sub(1);
    }
}

async fn replenish_one(inner: Arc<PoolInner>) {
    let conn = match inner.open().await {
        Ok(conn) => conn,
        Err(_) => return,
    };
    let mut state = inner.lock();
    if state.closed || state.live() >= inner.config.max_connections {
        drop(state);
        conn.close();
        return;
    }
    debug!(conn = conn.id(), "replacement connection ready");
    state.tags.insert(conn.id(), SlotTag::Idle);
    state.idle.push_back(conn);
}

async fn watch_events(
    pool: Weak<PoolInner>,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
) {
    while let Some(event) = events.recv().await {
        let inner = match pool.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        match event {
            ConnectionEvent::Closed(id) => inner.handle_closed(id),
        }
    }
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates a pool. Connections are opened on demand.
    ///
    /// Must be called from within a Tokio runtime; the pool spawns a task that
    /// tracks connection closures.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::Config("connection pool requires a Tokio runtime".into()))?;

        let (events, rx) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(config.max_connections));
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_connections),
            tags: HashMap::with_capacity(config.max_connections),
            connecting: 0,
            closed: false,
        };
        let inner = Arc::new(PoolInner {
            config,
            state: Mutex::new(state),
            permits,
            events,
        });
        runtime.spawn(watch_events(Arc::downgrade(&inner), rx));

        debug!(
            addr = %inner.config.addr,
            max = inner.config.max_connections,
            reconnect = ?inner.config.reconnect,
            "pool created"
        );
        Ok(ConnectionPool { inner })
    }

    /// Configuration the pool was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Opens connections until `count` (capped at the maximum) are live.
    pub async fn prefill(&self, count: usize) -> ClientResult<()> {
        let target = count.min(self.inner.config.max_connections);
        loop {
            {
                let state = self.inner.lock();
                if state.closed {
                    return Err(ClientError::PoolClosed);
                }
                if state.live() >= target {
                    return Ok(());
                }
            }
            let conn = self.inner.open().await?;
            let mut state = self.inner.lock();
            state.tags.insert(conn.id(), SlotTag::Idle);
            state.idle.push_back(conn);
        }
    }

    /// Borrows a connection, waiting up to `acquire_timeout` when every
    /// connection is in use.
    pub async fn acquire(&self) -> ClientResult<PooledConnection> {
        let permits = self.inner.permits.clone();
        let permit = match self.inner.config.acquire_timeout {
            Some(limit) => tokio::time::timeout(limit, permits.acquire_owned())
                .await
                .map_err(|_| ClientError::PoolExhausted)?,
            None => permits.acquire_owned().await,
        }
        .map_err(|_| ClientError::PoolClosed)?;

        loop {
            let candidate = {
                let mut state = self.inner.lock();
                if state.closed {
                    return Err(ClientError::PoolClosed);
                }
                match state.idle.pop_front() {
                    Some(conn) if conn.is_ready() => {
                        state.tags.insert(conn.id(), SlotTag::InUse);
                        Some(conn)
                    }
                    Some(conn) => {
                        state.tags.remove(&conn.id());
                        debug!(conn = conn.id(), "dropping stale idle connection");
                        continue;
                    }
                    None => None,
                }
            };
            if let Some(conn) = candidate {
                return Ok(PooledConnection::new(self.inner.clone(), conn, permit));
            }
            break;
        }

        let conn = self.inner.open().await?;
        {
            let mut state = self.inner.lock();
            if state.closed {
                drop(state);
                conn.close();
                return Err(ClientError::PoolClosed);
            }
            state.tags.insert(conn.id(), SlotTag::InUse);
        }
        Ok(PooledConnection::new(self.inner.clone(), conn, permit))
    }

    /// Acquires a connection, submits one command, and releases the
    /// connection once the result is available.
    pub async fn submit<T, F>(&self, command: Command, interpret: F) -> ClientResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Reply) -> ClientResult<T> + Send + 'static,
    {
        if command.is_empty() {
            return Err(EncodeError::EmptyCommand.into());
        }
        let conn = self.acquire().await?;
        conn.submit(command, interpret).await
    }

    /// Runs a prepared [`Request`] on a pooled connection.
    pub async fn execute<T: Send + 'static>(&self, request: Request<T>) -> ClientResult<T> {
        self.submit(request.command, request.interpret).await
    }

    /// Stops handing out connections and closes the idle ones. Borrowed
    /// connections are closed when released.
    pub fn close(&self) {
        let idle: Vec<Connection> = {
            let mut state = self.inner.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle: Vec<Connection> = state.idle.drain(..).collect();
            for conn in &idle {
                state.tags.remove(&conn.id());
            }
            idle
        };
        self.inner.permits.close();
        debug!(addr = %self.inner.config.addr, closed_idle = idle.len(), "pool closed");
        for conn in idle {
            conn.close();
        }
    }

    /// True once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Current occupancy.
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.lock();
        let mut status = PoolStatus {
            idle: 0,
            in_use: 0,
            connecting: state.connecting,
            broken: 0,
            max: self.inner.config.max_connections,
        };
        for tag in state.tags.values() {
            match tag {
                SlotTag::Idle => status.idle += 1,
                SlotTag::InUse => status.in_use += 1,
                SlotTag::Broken => status.broken += 1,
            }
        }
        status
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("addr", &self.inner.config.addr)
            .field("status", &self.status())
            .finish()
    }
}

/// RAII wrapper returning a connection to the pool on drop.
///
/// Dereferences to [`Connection`], so several commands can be pipelined on
/// one borrow.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection, permit: OwnedSemaphorePermit) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            _permit: permit,
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection exists until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
