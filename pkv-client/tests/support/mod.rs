//! In-process fake servers for the integration tests.
//!
//! `FakeServer` listens on a loopback port and hands every decoded command to
//! a handler that answers with a list of `Action`s. Output is buffered per
//! connection and only written on `Action::Flush`, so a test can hold replies
//! back and release them in arbitrary chunks.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use pkv_common::{Reply, ReplyDecoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the server does in response to one command.
#[derive(Debug, Clone)]
pub enum Action {
    /// Buffer an encoded reply.
    Send(Reply),
    /// Buffer raw bytes, malformed or otherwise.
    Raw(Vec<u8>),
    /// Write the buffer in pieces of at most `chunk` bytes.
    Flush { chunk: usize },
    /// Pause before the next action.
    Sleep(Duration),
    /// Drop the socket.
    Close,
}

/// Buffers `reply` and writes it immediately.
pub fn reply(reply: Reply) -> Vec<Action> {
    vec![Action::Send(reply), Action::Flush { chunk: usize::MAX }]
}

pub fn ok() -> Vec<Action> {
    reply(Reply::Status("OK".into()))
}

pub fn integer(value: i64) -> Vec<Action> {
    reply(Reply::Integer(value))
}

pub fn bulk(data: &[u8]) -> Reply {
    Reply::bulk(Bytes::copy_from_slice(data))
}

type Handler = dyn Fn(&[Bytes]) -> Vec<Action> + Send + Sync;

pub struct FakeServer {
    pub addr: String,
    accepted: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Vec<Bytes>>>>,
    kill: Arc<watch::Sender<u64>>,
}

impl FakeServer {
    /// Starts a server whose replies are produced by `handler`.
    pub async fn start<H>(handler: H) -> FakeServer
    where
        H: Fn(&[Bytes]) -> Vec<Action> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let (kill, _) = watch::channel(0u64);
        let kill = Arc::new(kill);
        let handler: Arc<Handler> = Arc::new(handler);

        let server = FakeServer {
            addr,
            accepted: accepted.clone(),
            received: received.clone(),
            kill: kill.clone(),
        };

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    stream,
                    handler.clone(),
                    received.clone(),
                    kill.subscribe(),
                ));
            }
        });

        server
    }

    /// Starts a server that always answers with `reply`.
    pub async fn constant(answer: Reply) -> FakeServer {
        FakeServer::start(move |_| reply(answer.clone())).await
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Every command received so far, across connections.
    pub fn received(&self) -> Vec<Vec<Bytes>> {
        self.received.lock().unwrap().clone()
    }

    /// Drops every open connection.
    pub fn kill_connections(&self) {
        self.kill.send_modify(|generation| *generation += 1);
    }
}

async fn serve(
    mut stream: TcpStream,
    handler: Arc<Handler>,
    received: Arc<Mutex<Vec<Vec<Bytes>>>>,
    mut kill: watch::Receiver<u64>,
) {
    let mut input = BytesMut::with_capacity(4096);
    let mut output = BytesMut::new();
    let mut decoder = ReplyDecoder::new();

    loop {
        while let Ok(Some(frame)) = decoder.decode(&mut input) {
            let args = match frame {
                Reply::Array(Some(items)) => items
                    .into_iter()
                    .filter_map(|item| match item {
                        Reply::Bulk(Some(data)) => Some(data),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
                _ => return,
            };
            received.lock().unwrap().push(args.clone());

            for action in handler(&args) {
                match action {
                    Action::Send(reply) => reply.encode(&mut output),
                    Action::Raw(raw) => output.extend_from_slice(&raw),
                    Action::Flush { chunk } => {
                        let data = output.split().freeze();
                        for piece in data.chunks(chunk.max(1)) {
                            if stream.write_all(piece).await.is_err() {
                                return;
                            }
                            if chunk != usize::MAX {
                                tokio::time::sleep(Duration::from_millis(1)).await;
                            }
                        }
                    }
                    Action::Sleep(delay) => tokio::time::sleep(delay).await,
                    Action::Close => return,
                }
            }
        }

        tokio::select! {
            read = stream.read_buf(&mut input) => match read {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            },
            _ = kill.changed() => return,
        }
    }
}

fn arg_str(args: &[Bytes], idx: usize) -> String {
    args.get(idx)
        .map(|arg| String::from_utf8_lossy(arg).to_ascii_uppercase())
        .unwrap_or_default()
}

/// Small in-memory store speaking enough of the protocol for end-to-end
/// command tests.
#[derive(Default)]
pub struct MemoryStore {
    strings: HashMap<Bytes, Bytes>,
    sets: HashMap<Bytes, BTreeSet<Bytes>>,
    hashes: HashMap<Bytes, BTreeMap<Bytes, Bytes>>,
}

impl MemoryStore {
    pub async fn serve() -> FakeServer {
        let store = Arc::new(Mutex::new(MemoryStore::default()));
        FakeServer::start(move |args| reply(store.lock().unwrap().apply(args))).await
    }

    fn wrong_type() -> Reply {
        Reply::Error("WRONGTYPE Operation against a key holding the wrong kind of value".into())
    }

    fn exists(&self, key: &Bytes) -> bool {
        self.strings.contains_key(key)
            || self.sets.contains_key(key)
            || self.hashes.contains_key(key)
    }

    fn combine(&self, op: &str, keys: &[Bytes]) -> BTreeSet<Bytes> {
        let mut sets = keys
            .iter()
            .map(|key| self.sets.get(key).cloned().unwrap_or_default());
        let first = sets.next().unwrap_or_default();
        sets.fold(first, |acc, set| match op {
            "SDIFF" => acc.difference(&set).cloned().collect(),
            "SINTER" => acc.intersection(&set).cloned().collect(),
            _ => acc.union(&set).cloned().collect(),
        })
    }

    fn apply(&mut self, args: &[Bytes]) -> Reply {
        let name = arg_str(args, 0);
        let key = args.get(1).cloned().unwrap_or_default();
        match name.as_str() {
            "PING" => match args.get(1) {
                Some(msg) => Reply::bulk(msg.clone()),
                None => Reply::Status("PONG".into()),
            },
            "SET" => {
                self.strings.insert(key, args[2].clone());
                Reply::Status("OK".into())
            }
            "GET" => Reply::Bulk(self.strings.get(&key).cloned()),
            "INCR" => {
                let current = self
                    .strings
                    .get(&key)
                    .and_then(|v| std::str::from_utf8(v).ok()?.parse::<i64>().ok())
                    .unwrap_or(0);
                self.strings.insert(key, Bytes::from((current + 1).to_string()));
                Reply::Integer(current + 1)
            }
            "DEL" => {
                let mut removed = 0;
                for key in &args[1..] {
                    let hit = self.strings.remove(key).is_some()
                        | self.sets.remove(key).is_some()
                        | self.hashes.remove(key).is_some();
                    removed += hit as i64;
                }
                Reply::Integer(removed)
            }
            "EXISTS" => Reply::Integer(self.exists(&key) as i64),
            "TYPE" => {
                let kind = if self.strings.contains_key(&key) {
                    "string"
                } else if self.sets.contains_key(&key) {
                    "set"
                } else if self.hashes.contains_key(&key) {
                    "hash"
                } else {
                    "none"
                };
                Reply::Status(kind.into())
            }
            "SADD" => {
                if self.strings.contains_key(&key) || self.hashes.contains_key(&key) {
                    return Self::wrong_type();
                }
                let set = self.sets.entry(key).or_default();
                let added = args[2..].iter().filter(|m| set.insert((*m).clone())).count();
                Reply::Integer(added as i64)
            }
            "SREM" => {
                let removed = match self.sets.get_mut(&key) {
                    Some(set) => args[2..].iter().filter(|m| set.remove(*m)).count(),
                    None => 0,
                };
                if self.sets.get(&key).map_or(false, |set| set.is_empty()) {
                    self.sets.remove(&key);
                }
                Reply::Integer(removed as i64)
            }
            "SCARD" => Reply::Integer(self.sets.get(&key).map_or(0, |set| set.len()) as i64),
            "SISMEMBER" => Reply::Integer(
                self.sets.get(&key).map_or(false, |set| set.contains(&args[2])) as i64,
            ),
            "SMEMBERS" => Reply::array(
                self.sets
                    .get(&key)
                    .map(|set| set.iter().cloned().map(Reply::bulk).collect())
                    .unwrap_or_default(),
            ),
            "SDIFF" | "SINTER" | "SUNION" => {
                let result = self.combine(&name, &args[1..]);
                Reply::array(result.into_iter().map(Reply::bulk).collect())
            }
            "SDIFFSTORE" | "SINTERSTORE" | "SUNIONSTORE" => {
                let result = self.combine(&name[..name.len() - "STORE".len()], &args[2..]);
                let len = result.len() as i64;
                if result.is_empty() {
                    self.sets.remove(&key);
                } else {
                    self.sets.insert(key, result);
                }
                Reply::Integer(len)
            }
            "SRANDMEMBER" => {
                let members: Vec<Bytes> = self
                    .sets
                    .get(&key)
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default();
                match args.get(2) {
                    None => Reply::Bulk(members.first().cloned()),
                    Some(count) => {
                        let count: usize = String::from_utf8_lossy(count).parse().unwrap_or(0);
                        Reply::array(members.into_iter().take(count).map(Reply::bulk).collect())
                    }
                }
            }
            "SMOVE" => {
                let moved = self
                    .sets
                    .get_mut(&key)
                    .map_or(false, |set| set.remove(&args[3]));
                if moved {
                    self.sets.entry(args[2].clone()).or_default().insert(args[3].clone());
                }
                Reply::Integer(moved as i64)
            }
            "SPOP" => {
                let popped = self.sets.get_mut(&key).and_then(|set| {
                    let first = set.iter().next().cloned()?;
                    set.remove(&first);
                    Some(first)
                });
                if self.sets.get(&key).map_or(false, |set| set.is_empty()) {
                    self.sets.remove(&key);
                }
                Reply::Bulk(popped)
            }
            "SSCAN" => {
                let members: Vec<Bytes> = self
                    .sets
                    .get(&key)
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default();
                scan_page(&members, &args[2..], |member| vec![Reply::bulk(member.clone())])
            }
            "HSET" => {
                if self.strings.contains_key(&key) || self.sets.contains_key(&key) {
                    return Self::wrong_type();
                }
                let hash = self.hashes.entry(key).or_default();
                Reply::Integer(hash.insert(args[2].clone(), args[3].clone()).is_none() as i64)
            }
            "HSETNX" => {
                let hash = self.hashes.entry(key).or_default();
                if hash.contains_key(&args[2]) {
                    Reply::Integer(0)
                } else {
                    hash.insert(args[2].clone(), args[3].clone());
                    Reply::Integer(1)
                }
            }
            "HEXISTS" => Reply::Integer(
                self.hashes.get(&key).map_or(false, |h| h.contains_key(&args[2])) as i64,
            ),
            "HKEYS" | "HVALS" => Reply::array(
                self.hashes
                    .get(&key)
                    .map(|hash| {
                        hash.iter()
                            .map(|(f, v)| {
                                Reply::bulk(if name == "HKEYS" { f.clone() } else { v.clone() })
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            "HINCRBYFLOAT" => {
                let hash = self.hashes.entry(key).or_default();
                let delta: f64 = String::from_utf8_lossy(&args[3]).parse().unwrap_or(0.0);
                let current = hash
                    .get(&args[2])
                    .and_then(|v| std::str::from_utf8(v).ok()?.parse::<f64>().ok())
                    .unwrap_or(0.0);
                let value = Bytes::from((current + delta).to_string());
                hash.insert(args[2].clone(), value.clone());
                Reply::bulk(value)
            }
            "HMSET" => {
                let hash = self.hashes.entry(key).or_default();
                for pair in args[2..].chunks(2) {
                    hash.insert(pair[0].clone(), pair[1].clone());
                }
                Reply::Status("OK".into())
            }
            "HGET" => Reply::Bulk(self.hashes.get(&key).and_then(|h| h.get(&args[2]).cloned())),
            "HMGET" => Reply::array(
                args[2..]
                    .iter()
                    .map(|field| {
                        Reply::Bulk(self.hashes.get(&key).and_then(|h| h.get(field).cloned()))
                    })
                    .collect(),
            ),
            "HLEN" => Reply::Integer(self.hashes.get(&key).map_or(0, |h| h.len()) as i64),
            "HDEL" => {
                let removed = match self.hashes.get_mut(&key) {
                    Some(hash) => args[2..].iter().filter(|f| hash.remove(*f).is_some()).count(),
                    None => 0,
                };
                Reply::Integer(removed as i64)
            }
            "HGETALL" => Reply::array(
                self.hashes
                    .get(&key)
                    .map(|hash| {
                        hash.iter()
                            .flat_map(|(f, v)| [Reply::bulk(f.clone()), Reply::bulk(v.clone())])
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            "HINCRBY" => {
                let hash = self.hashes.entry(key).or_default();
                let delta: i64 = String::from_utf8_lossy(&args[3]).parse().unwrap_or(0);
                let current = hash
                    .get(&args[2])
                    .and_then(|v| std::str::from_utf8(v).ok()?.parse::<i64>().ok())
                    .unwrap_or(0);
                hash.insert(args[2].clone(), Bytes::from((current + delta).to_string()));
                Reply::Integer(current + delta)
            }
            "HSCAN" => {
                let entries: Vec<(Bytes, Bytes)> = self
                    .hashes
                    .get(&key)
                    .map(|hash| hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
                    .unwrap_or_default();
                scan_page(&entries, &args[2..], |(field, value)| {
                    vec![Reply::bulk(field.clone()), Reply::bulk(value.clone())]
                })
            }
            other => Reply::Error(format!("ERR unknown command '{}'", other)),
        }
    }
}

/// Serves a cursor page over `items` using the position as the cursor.
fn scan_page<T>(items: &[T], options: &[Bytes], render: impl Fn(&T) -> Vec<Reply>) -> Reply {
    let start: usize = String::from_utf8_lossy(&options[0]).parse().unwrap_or(0);
    let mut count = 10usize;
    let mut rest = options[1..].chunks(2);
    while let Some([name, value]) = rest.next() {
        if name.eq_ignore_ascii_case(b"COUNT") {
            count = String::from_utf8_lossy(value).parse().unwrap_or(10);
        }
    }
    let end = (start + count.max(1)).min(items.len());
    let page: Vec<Reply> = items[start.min(end)..end]
        .iter()
        .flat_map(|item| render(item))
        .collect();
    let next = if end >= items.len() { 0 } else { end };
    Reply::array(vec![Reply::bulk(Bytes::from(next.to_string())), Reply::array(page)])
}
