//! Single-process, in-memory implementations of every host trait, shared by
//! this crate's test suite. Each type is cheaply `Clone`-able (an `Arc`
//! around shared state) so a test can create several handles that behave
//! like independent tabs/workers talking to the same backing host.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Instant as StdInstant;

use parking_lot::Mutex;

use crate::host::{
    Broadcast, BroadcastReceiver, BroadcastSender, Clock, CommitWrite, Durability, HostError,
    Instant, KvStore, LockEntry, LockMode, LockOpts, LockQuery, NamedLocks,
};
use crate::store::record::{BlockRecord, TxRecord};

// ---------------------------------------------------------------------
// KvStore
// ---------------------------------------------------------------------

#[derive(Default)]
struct PathState {
    blocks: std::collections::BTreeMap<u64, BlockRecord>,
    tx: std::collections::BTreeMap<u64, TxRecord>,
}

/// In-memory stand-in for the `blocks`/`tx` object-store pair.
#[derive(Clone, Default)]
pub struct MemKv {
    paths: Arc<Mutex<HashMap<String, PathState>>>,
}

impl MemKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemKv {
    async fn get_block(&self, path: &str, offset: u64) -> Result<Option<BlockRecord>, HostError> {
        let paths = self.paths.lock();
        Ok(paths
            .get(path)
            .and_then(|p| p.blocks.get(&offset))
            .cloned())
    }

    async fn get_all_blocks(&self, path: &str) -> Result<Vec<BlockRecord>, HostError> {
        let paths = self.paths.lock();
        Ok(paths
            .get(path)
            .map(|p| p.blocks.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_all_tx_desc(&self, path: &str) -> Result<Vec<TxRecord>, HostError> {
        let paths = self.paths.lock();
        Ok(paths
            .get(path)
            .map(|p| p.tx.values().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_tx_from(&self, path: &str, from_tx_id: u64) -> Result<Vec<TxRecord>, HostError> {
        let paths = self.paths.lock();
        Ok(paths
            .get(path)
            .map(|p| {
                p.tx
                    .range(from_tx_id..)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn commit(&self, write: CommitWrite, _durability: Durability) -> Result<(), HostError> {
        let mut paths = self.paths.lock();
        let state = paths.entry(write.path.clone()).or_default();
        for block in write.puts {
            state.blocks.insert(block.offset, block);
        }
        state.tx.insert(write.tx.tx_id, write.tx);
        if let Some(below) = write.gc_tx_below {
            state.tx.retain(|&tx_id, _| tx_id >= below);
        }
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> Result<(), HostError> {
        self.paths.lock().remove(path);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// NamedLocks
// ---------------------------------------------------------------------

struct LockTable {
    held: HashMap<String, Vec<LockMode>>,
    waiters: HashMap<String, Vec<Waker>>,
}

/// In-memory stand-in for `navigator.locks`. Every clone shares the same
/// backing table, so two `MemLocks` handles behave like two tabs
/// negotiating the same named locks.
#[derive(Clone)]
pub struct MemLocks {
    inner: Arc<Mutex<LockTable>>,
}

impl Default for MemLocks {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LockTable {
                held: HashMap::new(),
                waiters: HashMap::new(),
            })),
        }
    }
}

impl MemLocks {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemLockGuard {
    inner: Arc<Mutex<LockTable>>,
    name: String,
    mode: LockMode,
}

impl Drop for MemLockGuard {
    fn drop(&mut self) {
        let mut table = self.inner.lock();
        if let Some(modes) = table.held.get_mut(&self.name) {
            if let Some(pos) = modes.iter().position(|m| *m == self.mode) {
                modes.remove(pos);
            }
            if modes.is_empty() {
                table.held.remove(&self.name);
            }
        }
        if let Some(wakers) = table.waiters.remove(&self.name) {
            for w in wakers {
                w.wake();
            }
        }
    }
}

fn can_acquire(held: Option<&Vec<LockMode>>, mode: LockMode) -> bool {
    match held {
        None => true,
        Some(modes) if modes.is_empty() => true,
        Some(modes) => mode == LockMode::Shared && !modes.contains(&LockMode::Exclusive),
    }
}

struct LockRequestFut {
    table: Arc<Mutex<LockTable>>,
    name: String,
    mode: LockMode,
    opts: LockOpts,
}

impl Future for LockRequestFut {
    type Output = Result<Option<MemLockGuard>, HostError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut table = this.table.lock();

        if this.opts.steal {
            table.held.remove(&this.name);
        }

        if can_acquire(table.held.get(&this.name), this.mode) {
            table
                .held
                .entry(this.name.clone())
                .or_default()
                .push(this.mode);
            return Poll::Ready(Ok(Some(MemLockGuard {
                inner: this.table.clone(),
                name: this.name.clone(),
                mode: this.mode,
            })));
        }

        if this.opts.poll {
            return Poll::Ready(Ok(None));
        }

        table
            .waiters
            .entry(this.name.clone())
            .or_default()
            .push(cx.waker().clone());
        Poll::Pending
    }
}

impl NamedLocks for MemLocks {
    type Guard = MemLockGuard;

    async fn request(
        &self,
        name: &str,
        mode: LockMode,
        opts: LockOpts,
    ) -> Result<Option<Self::Guard>, HostError> {
        LockRequestFut {
            table: self.inner.clone(),
            name: name.to_string(),
            mode,
            opts,
        }
        .await
    }

    fn query(&self) -> LockQuery {
        let table = self.inner.lock();
        let held = table
            .held
            .iter()
            .flat_map(|(name, modes)| {
                modes.iter().map(move |mode| LockEntry {
                    name: name.clone(),
                    mode: *mode,
                })
            })
            .collect();
        let pending = table
            .waiters
            .keys()
            .map(|name| LockEntry {
                name: name.clone(),
                // the waiter queue doesn't track which mode each waiter
                // wants; reported as Shared since that's the common case
                // for view-lock readers queued behind an exclusive writer.
                mode: LockMode::Shared,
            })
            .collect();
        LockQuery { held, pending }
    }
}

// ---------------------------------------------------------------------
// Broadcast
// ---------------------------------------------------------------------

struct ChannelState {
    subscribers: HashMap<u64, Arc<Mutex<VecDeque<Vec<u8>>>>>,
    wakers: HashMap<u64, Vec<Waker>>,
}

#[derive(Clone, Default)]
pub struct MemBroadcast {
    channels: Arc<Mutex<HashMap<String, ChannelState>>>,
    next_id: Arc<AtomicU64>,
}

impl MemBroadcast {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemBroadcastSender {
    channels: Arc<Mutex<HashMap<String, ChannelState>>>,
    channel: String,
    agent_id: u64,
}

impl BroadcastSender for MemBroadcastSender {
    async fn send(&self, payload: Vec<u8>) -> Result<(), HostError> {
        let mut channels = self.channels.lock();
        let Some(state) = channels.get_mut(&self.channel) else {
            return Ok(());
        };
        for (&id, queue) in state.subscribers.iter() {
            if id == self.agent_id {
                continue;
            }
            queue.lock().push_back(payload.clone());
        }
        for (&id, wakers) in state.wakers.iter_mut() {
            if id == self.agent_id {
                continue;
            }
            for w in wakers.drain(..) {
                w.wake();
            }
        }
        Ok(())
    }
}

pub struct MemBroadcastReceiver {
    channels: Arc<Mutex<HashMap<String, ChannelState>>>,
    channel: String,
    agent_id: u64,
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

struct RecvFut<'a> {
    channels: &'a Arc<Mutex<HashMap<String, ChannelState>>>,
    channel: &'a str,
    agent_id: u64,
    queue: &'a Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl Future for RecvFut<'_> {
    type Output = Result<Vec<u8>, HostError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(msg) = self.queue.lock().pop_front() {
            return Poll::Ready(Ok(msg));
        }
        let mut channels = self.channels.lock();
        if let Some(state) = channels.get_mut(self.channel) {
            state
                .wakers
                .entry(self.agent_id)
                .or_default()
                .push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl BroadcastReceiver for MemBroadcastReceiver {
    async fn recv(&mut self) -> Result<Vec<u8>, HostError> {
        RecvFut {
            channels: &self.channels,
            channel: &self.channel,
            agent_id: self.agent_id,
            queue: &self.queue,
        }
        .await
    }

    fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.queue.lock().pop_front()
    }
}

impl Broadcast for MemBroadcast {
    type Sender = MemBroadcastSender;
    type Receiver = MemBroadcastReceiver;

    fn open(&self, channel: &str) -> (Self::Sender, Self::Receiver) {
        // Sender and receiver share one `agent_id` so a post through the
        // sender half is excluded from the receiver half of the same `open`
        // call, the way one `BroadcastChannel` object never delivers its own
        // message back to itself.
        let agent_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| ChannelState {
                subscribers: HashMap::new(),
                wakers: HashMap::new(),
            })
            .subscribers
            .insert(agent_id, queue.clone());
        let sender = MemBroadcastSender {
            channels: self.channels.clone(),
            channel: channel.to_string(),
            agent_id,
        };
        let receiver = MemBroadcastReceiver {
            channels: self.channels.clone(),
            channel: channel.to_string(),
            agent_id,
            queue,
        };
        (sender, receiver)
    }
}

// ---------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------

#[derive(Clone)]
pub struct MemClock {
    start: StdInstant,
}

impl Default for MemClock {
    fn default() -> Self {
        Self {
            start: StdInstant::now(),
        }
    }
}

impl MemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for MemClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.start.elapsed().as_millis() as u64)
    }
}
