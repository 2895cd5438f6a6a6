//! # Pipelined Connection
//!
//! Purpose: Keep many requests in flight on one TCP connection and hand each
//! decoded reply to the request that produced it.
//!
//! ## Design Principles
//! 1. **FIFO Matching**: The protocol has no request ids. Replies arrive in
//!    the order commands were written, so the pending queue is a `VecDeque`
//!    popped from the front, never searched.
//! 2. **Enqueue Before Write**: The writer task appends a request's completion
//!    to the queue before its bytes reach the socket, so a reply can never
//!    arrive ahead of its entry.
//! 3. **Split Ownership**: The reader task alone owns the decoder and read
//!    buffer; the writer task alone owns the outbound channel and write
//!    buffer. Only the queue is shared, behind a short-lived mutex.
//! 4. **Fail Everything, In Order**: When the connection dies, every pending
//!    request is completed with the failure in queue order; none is left
//!    waiting.
//!
//! ## Lifecycle
//!
//! ```text
//! Connecting --connect ok--> Ready --close()--> Closing --drained--> Closed
//!                              |                                    ^
//!                              +--- eof / io error / bad frame -----+
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use pkv_common::{Command, Reply, ReplyDecoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::interpret::{check_error, Request};

/// Upper bound on bytes gathered into one write.
const MAX_WRITE_BATCH: usize = 64 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier, used in logs and by the pool.
pub type ConnectionId = u64;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP connect in progress. `connect` resolves only once the socket is
    /// up, so a `Connection` handle never reports this state; the pool
    /// counts in-flight connects in [`PoolStatus::connecting`].
    ///
    /// [`PoolStatus::connecting`]: crate::PoolStatus::connecting
    Connecting,
    /// Accepting and pipelining submits.
    Ready,
    /// No new submits; outstanding replies are still delivered.
    Closing,
    /// Terminal. Every undelivered request has been failed.
    Closed,
}

/// Notifications the pool listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionEvent {
    Closed(ConnectionId),
}

type Completion = Box<dyn FnOnce(ClientResult<Reply>) + Send>;

struct PendingRequest {
    complete: Completion,
}

impl PendingRequest {
    fn fail(self, err: ClientError) {
        (self.complete)(Err(err));
    }
}

enum WriterMessage {
    Request { bytes: Bytes, pending: PendingRequest },
    Shutdown,
}

struct QueueState {
    state: ConnectionState,
    pending: VecDeque<PendingRequest>,
    write_closed: bool,
}

enum Matched {
    More,
    Drained,
    Unsolicited,
}

struct Shared {
    id: ConnectionId,
    addr: String,
    queue: Mutex<QueueState>,
    closed: watch::Sender<bool>,
    consecutive_timeouts: AtomicU32,
    max_consecutive_timeouts: Option<u32>,
    events: Option<mpsc::UnboundedSender<ConnectionEvent>>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.queue.lock().expect("connection mutex poisoned")
    }

    fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Appends to the tail, or hands the request back if the connection is gone.
    fn enqueue(&self, pending: PendingRequest) -> Option<PendingRequest> {
        let mut queue = self.lock();
        match queue.state {
            ConnectionState::Ready | ConnectionState::Closing => {
                queue.pending.push_back(pending);
                None
            }
            ConnectionState::Connecting | ConnectionState::Closed => Some(pending),
        }
    }

    /// Completes the head of the queue with `reply`.
    fn complete_next(&self, reply: Reply) -> Matched {
        let (head, drained) = {
            let mut queue = self.lock();
            let head = queue.pending.pop_front();
            let drained = queue.state == ConnectionState::Closing
                && queue.write_closed
                && queue.pending.is_empty();
            (head, drained)
        };
        let head = match head {
            Some(head) => head,
            None => return Matched::Unsolicited,
        };

        self.consecutive_timeouts.store(0, Ordering::Relaxed);
        (head.complete)(check_error(reply));
        if drained {
            Matched::Drained
        } else {
            Matched::More
        }
    }

    /// Moves Ready to Closing. Returns false if already closing or closed.
    fn begin_close(&self) -> bool {
        let mut queue = self.lock();
        if queue.state == ConnectionState::Ready {
            queue.state = ConnectionState::Closing;
            true
        } else {
            false
        }
    }

    /// Records that the write half is shut down. Returns true when nothing is
    /// left to read.
    fn mark_write_closed(&self) -> bool {
        let mut queue = self.lock();
        queue.write_closed = true;
        if queue.state == ConnectionState::Ready {
            queue.state = ConnectionState::Closing;
        }
        queue.pending.is_empty()
    }

    /// Moves to Closed and fails every pending request with `err`, in order.
    fn fail(&self, err: ClientError) {
        let drained: Vec<PendingRequest> = {
            let mut queue = self.lock();
            if queue.state == ConnectionState::Closed {
                return;
            }
            queue.state = ConnectionState::Closed;
            queue.pending.drain(..).collect()
        };

        debug!(
            conn = self.id,
            addr = %self.addr,
            failed = drained.len(),
            reason = %err,
            "connection closed"
        );
        self.closed.send_replace(true);
        for pending in drained {
            pending.fail(err.clone());
        }
        if let Some(events) = &self.events {
            let _ = events.send(ConnectionEvent::Closed(self.id));
        }
    }

    fn record_timeout(&self) {
        let count = self.consecutive_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(limit) = self.max_consecutive_timeouts {
            if count >= limit {
                warn!(
                    conn = self.id,
                    timeouts = count,
                    "timeout limit reached; closing connection"
                );
                self.fail(ClientError::ConnectionClosed);
            }
        }
    }
}

/// One pipelined connection to the server.
///
/// Created by [`Connection::connect`] or by the pool. Dropping the handle
/// closes the connection gracefully: queued writes are flushed and
/// outstanding replies still reach their futures.
pub struct Connection {
    shared: Arc<Shared>,
    writer: mpsc::UnboundedSender<WriterMessage>,
    command_timeout: Option<Duration>,
}

impl Connection {
    /// Connects to `config.addr` and starts the reader and writer tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn connect(config: &ClientConfig) -> ClientResult<Self> {
        Self::connect_with_events(config, None).await
    }

    pub(crate) async fn connect_with_events(
        config: &ClientConfig,
        events: Option<mpsc::UnboundedSender<ConnectionEvent>>,
    ) -> ClientResult<Self> {
        let stream = connect_stream(config).await?;
        if config.nodelay {
            // Disable Nagle to keep request latency low for small payloads.
            stream.set_nodelay(true)?;
        }

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let (closed, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            id,
            addr: config.addr.clone(),
            queue: Mutex::new(QueueState {
                state: ConnectionState::Ready,
                pending: VecDeque::new(),
                write_closed: false,
            }),
            closed,
            consecutive_timeouts: AtomicU32::new(0),
            max_consecutive_timeouts: config.max_consecutive_timeouts,
            events,
        });

        let (read_half, write_half) = stream.into_split();
        let (writer, outbound) = mpsc::unbounded_channel();
        tokio::spawn(read_loop(shared.clone(), read_half, config.read_buffer_capacity));
        tokio::spawn(write_loop(shared.clone(), write_half, outbound));

        debug!(conn = id, addr = %config.addr, "connected");
        Ok(Connection {
            shared,
            writer,
            command_timeout: config.command_timeout,
        })
    }

    /// Identifier used in logs and pool bookkeeping.
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// True while the connection accepts submits.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Number of requests written or queued for write but not yet answered.
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Queues `command` for write and returns a future for its reply.
    ///
    /// Returns immediately. Futures resolve in submission order. Dropping a
    /// future does not withdraw the command; its reply is still consumed and
    /// discarded so later replies stay aligned.
    pub fn submit<T, F>(&self, command: Command, interpret: F) -> ReplyFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(Reply) -> ClientResult<T> + Send + 'static,
    {
        if command.is_empty() {
            return ReplyFuture::ready(Err(pkv_common::EncodeError::EmptyCommand.into()));
        }
        if self.state() != ConnectionState::Ready {
            return ReplyFuture::ready(Err(ClientError::ConnectionClosed));
        }

        let mut buf = BytesMut::with_capacity(command.encoded_len());
        if let Err(err) = command.encode(&mut buf) {
            return ReplyFuture::ready(Err(err.into()));
        }

        let (tx, rx) = oneshot::channel();
        let pending = PendingRequest {
            complete: Box::new(move |result: ClientResult<Reply>| {
                // The receiver is gone if the caller gave up; the reply is dropped.
                let _ = tx.send(result.and_then(interpret));
            }),
        };

        let message = WriterMessage::Request {
            bytes: buf.freeze(),
            pending,
        };
        if let Err(mpsc::error::SendError(message)) = self.writer.send(message) {
            if let WriterMessage::Request { pending, .. } = message {
                pending.fail(ClientError::ConnectionClosed);
            }
        }

        ReplyFuture {
            inner: ReplyInner::Waiting {
                rx,
                deadline: self.command_timeout.map(|limit| Box::pin(tokio::time::sleep(limit))),
                shared: self.shared.clone(),
            },
        }
    }

    /// Submits a prepared [`Request`].
    pub fn send<T: Send + 'static>(&self, request: Request<T>) -> ReplyFuture<T> {
        self.submit(request.command, request.interpret)
    }

    /// Stops accepting submits and shuts the write half once queued writes
    /// are flushed. Outstanding replies are still delivered.
    pub fn close(&self) {
        if self.shared.begin_close() {
            debug!(conn = self.shared.id, "closing connection");
            let _ = self.writer.send(WriterMessage::Shutdown);
        }
    }

    /// Closes immediately, failing every pending request with
    /// `ConnectionClosed`.
    pub fn abort(&self) {
        self.shared.fail(ClientError::ConnectionClosed);
    }

    /// Waits until the connection reaches `Closed`.
    pub async fn closed(&self) {
        let mut closed = self.shared.closed.subscribe();
        while !*closed.borrow_and_update() {
            if closed.changed().await.is_err() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("addr", &self.shared.addr)
            .field("state", &self.state())
            .finish()
    }
}

async fn connect_stream(config: &ClientConfig) -> ClientResult<TcpStream> {
    let connect = TcpStream::connect(config.addr.as_str());
    let stream = match config.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")
        })??,
        None => connect.await?,
    };
    Ok(stream)
}

async fn read_loop(shared: Arc<Shared>, mut reader: OwnedReadHalf, capacity: usize) {
    let mut closed = shared.closed.subscribe();
    let mut buffer = BytesMut::with_capacity(capacity);
    let mut decoder = ReplyDecoder::new();

    loop {
        loop {
            match decoder.decode(&mut buffer) {
                Ok(Some(reply)) => match shared.complete_next(reply) {
                    Matched::More => {}
                    Matched::Drained => {
                        shared.fail(ClientError::ConnectionClosed);
                        return;
                    }
                    Matched::Unsolicited => {
                        warn!(
                            conn = shared.id,
                            "reply with no pending request; closing connection"
                        );
                        shared.fail(ClientError::ConnectionClosed);
                        return;
                    }
                },
                Ok(None) => break,
                Err(err) => {
                    warn!(conn = shared.id, error = %err, "malformed reply; closing connection");
                    shared.fail(ClientError::Protocol(err));
                    return;
                }
            }
        }

        if *closed.borrow() {
            return;
        }
        tokio::select! {
            result = reader.read_buf(&mut buffer) => match result {
                Ok(0) => {
                    debug!(conn = shared.id, "connection reset by peer");
                    shared.fail(ClientError::ConnectionClosed);
                    return;
                }
                Ok(n) => trace!(conn = shared.id, bytes = n, "read"),
                Err(err) => {
                    warn!(conn = shared.id, error = %err, "read failed");
                    shared.fail(ClientError::ConnectionClosed);
                    return;
                }
            },
            _ = closed.changed() => return,
        }
    }
}

async fn write_loop(
    shared: Arc<Shared>,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<WriterMessage>,
) {
    let mut closed = shared.closed.subscribe();
    let mut batch = BytesMut::with_capacity(8 * 1024);

    'run: loop {
        if *closed.borrow() {
            break 'run;
        }
        let mut next = tokio::select! {
            message = outbound.recv() => message,
            _ = closed.changed() => break 'run,
        };

        // Gather everything already queued into one write, in order.
        let mut shutdown = false;
        let mut commands = 0usize;
        loop {
            match next {
                Some(WriterMessage::Request { bytes, pending }) => match shared.enqueue(pending) {
                    None => {
                        batch.extend_from_slice(&bytes);
                        commands += 1;
                    }
                    Some(rejected) => rejected.fail(ClientError::ConnectionClosed),
                },
                Some(WriterMessage::Shutdown) | None => {
                    shutdown = true;
                    break;
                }
            }
            if batch.len() >= MAX_WRITE_BATCH {
                break;
            }
            next = match outbound.try_recv() {
                Ok(message) => Some(message),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => None,
            };
        }

        if !batch.is_empty() {
            trace!(conn = shared.id, commands, bytes = batch.len(), "write batch");
            let result = tokio::select! {
                result = writer.write_all(&batch) => result,
                _ = closed.changed() => break 'run,
            };
            batch.clear();
            if let Err(err) = result {
                warn!(conn = shared.id, error = %err, "write failed");
                shared.fail(ClientError::ConnectionClosed);
                break 'run;
            }
        }

        if shutdown {
            let _ = writer.shutdown().await;
            if shared.mark_write_closed() {
                shared.fail(ClientError::ConnectionClosed);
            }
            break 'run;
        }
    }

    // Nothing more will be written; fail whatever is still queued.
    outbound.close();
    while let Ok(message) = outbound.try_recv() {
        if let WriterMessage::Request { pending, .. } = message {
            pending.fail(ClientError::ConnectionClosed);
        }
    }
}

enum ReplyInner<T> {
    Ready(ClientResult<T>),
    Waiting {
        rx: oneshot::Receiver<ClientResult<T>>,
        deadline: Option<Pin<Box<Sleep>>>,
        shared: Arc<Shared>,
    },
    Done,
}

/// Future for one submitted command's typed result.
///
/// Resolves with the interpreted reply, the connection's failure, or
/// `CommandTimeout` once the configured deadline passes. A timeout leaves
/// the connection open; the late reply is matched and discarded.
#[must_use = "the reply is discarded unless the future is awaited"]
pub struct ReplyFuture<T> {
    inner: ReplyInner<T>,
}

// No field is structurally pinned; the result is moved out by value.
impl<T> Unpin for ReplyFuture<T> {}

impl<T> ReplyFuture<T> {
    fn ready(result: ClientResult<T>) -> Self {
        ReplyFuture {
            inner: ReplyInner::Ready(result),
        }
    }
}

impl<T> Future for ReplyFuture<T> {
    type Output = ClientResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let output = match &mut this.inner {
            ReplyInner::Ready(_) => None,
            ReplyInner::Waiting {
                rx,
                deadline,
                shared,
            } => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Some(result),
                Poll::Ready(Err(_)) => Some(Err(ClientError::ConnectionClosed)),
                Poll::Pending => {
                    let expired = match deadline.as_mut() {
                        Some(sleep) => sleep.as_mut().poll(cx).is_ready(),
                        None => false,
                    };
                    if !expired {
                        return Poll::Pending;
                    }
                    trace!(conn = shared.id, "command timed out");
                    shared.record_timeout();
                    Some(Err(ClientError::CommandTimeout))
                }
            },
            ReplyInner::Done => panic!("ReplyFuture polled after completion"),
        };

        match std::mem::replace(&mut this.inner, ReplyInner::Done) {
            ReplyInner::Ready(result) => Poll::Ready(result),
            _ => Poll::Ready(output.unwrap_or(Err(ClientError::ConnectionClosed))),
        }
    }
}
