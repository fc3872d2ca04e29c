//! Browser-backed implementations of the four host traits: [`IdbKv`] over IndexedDB, [`WebLocks`] over the
//! Web Locks API (`navigator.locks`), [`ChannelBroadcast`] over
//! `BroadcastChannel`, and [`PerformanceClock`] over `performance.now()`.
//!
//! Grounded in the retrieval pack's `sqlite-wasm-rs` IndexedDB VFS port,
//! which opens one database per virtual file system and stores pages in an
//! object store keyed by `(path, offset)` — the same `indexed_db_futures`
//! crate is used here for an analogous `blocks`/`tx` pair of stores.
//!
//! Every type in this module wraps a `JsValue`-bearing handle in
//! [`JsSendSync`], asserting `Send + Sync` so the handle can satisfy the
//! host traits' bounds. This is sound only because `wasm32-unknown-unknown`
//! without the `atomics` target feature is single-threaded: there is no
//! second thread that could ever observe the handle concurrently. It would
//! be unsound on a multi-threaded wasm build and must not be reused there.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use indexed_db_futures::database::Database;
use indexed_db_futures::prelude::*;
use indexed_db_futures::transaction::TransactionMode;
use js_sys::{Array, Function, Number, Promise, Uint8Array};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{BroadcastChannel, Lock, LockManager, LockOptions};

use crate::host::{
    Broadcast, BroadcastReceiver, BroadcastSender, Clock, CommitWrite, Durability, HostError,
    Instant, KvStore, LockEntry, LockMode, LockOpts, LockQuery, NamedLocks,
};
use crate::store::record::{BlockRecord, TxRecord};

const BLOCKS_STORE: &str = "blocks";
const TX_STORE: &str = "tx";

/// Asserts `Send + Sync` for a value that holds a `JsValue` underneath.
/// See the module doc comment for why this is sound here and only here.
struct JsSendSync<T>(T);

unsafe impl<T> Send for JsSendSync<T> {}
unsafe impl<T> Sync for JsSendSync<T> {}

impl<T> std::ops::Deref for JsSendSync<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

fn js_err(context: &str, err: impl std::fmt::Debug) -> HostError {
    HostError::Unavailable(format!("{context}: {err:?}"))
}

fn compound_key(path: &str, n: u64) -> JsValue {
    let arr = Array::new();
    arr.push(&JsValue::from_str(path));
    arr.push(&JsValue::from(n as f64));
    arr.into()
}

fn key_from_range(path: &str, start: u64) -> std::ops::RangeInclusive<JsValue> {
    let lo = compound_key(path, start);
    let hi = {
        let arr = Array::new();
        arr.push(&JsValue::from_str(path));
        arr.push(&JsValue::from(Number::POSITIVE_INFINITY));
        arr.into()
    };
    lo..=hi
}

// ---------------------------------------------------------------------
// KvStore
// ---------------------------------------------------------------------

/// IndexedDB-backed [`KvStore`] (component A), one `Database` per opened
/// origin-visible name.
pub struct IdbKv {
    db: JsSendSync<Database>,
}

impl IdbKv {
    /// Opens (creating on first use) the database named `name`, with the
    /// `blocks`/`tx` object stores this crate's page stores read and write.
    pub async fn open(name: &str) -> Result<Self, HostError> {
        let db = Database::open(name)
            .with_version(1u8)
            .with_on_upgrade_needed(|_event, db| {
                db.create_object_store(BLOCKS_STORE)
                    .with_key_path(["path", "offset"].into())
                    .build()?;
                db.create_object_store(TX_STORE)
                    .with_key_path(["path", "txId"].into())
                    .build()?;
                Ok(())
            })
            .await
            .map_err(|e| js_err("opening idb database", e))?;
        Ok(Self { db: JsSendSync(db) })
    }

    fn block_from_js(value: JsValue, path: &str) -> Option<BlockRecord> {
        let offset = js_sys::Reflect::get(&value, &JsValue::from_str("offset")).ok()?.as_f64()? as u64;
        let data = js_sys::Reflect::get(&value, &JsValue::from_str("data")).ok()?;
        let data = Uint8Array::new(&data).to_vec();
        Some(BlockRecord { path: path.to_string(), offset, data })
    }

    fn block_to_js(path: &str, offset: u64, data: &[u8]) -> JsValue {
        let obj = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("path"), &JsValue::from_str(path));
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("offset"), &JsValue::from(offset as f64));
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("data"), &Uint8Array::from(data));
        obj.into()
    }

    fn tx_from_js(value: JsValue, path: &str) -> Option<TxRecord> {
        let tx_id = js_sys::Reflect::get(&value, &JsValue::from_str("txId")).ok()?.as_f64()? as u64;
        let file_size = js_sys::Reflect::get(&value, &JsValue::from_str("fileSize")).ok()?.as_f64()? as u64;
        let pages_js = js_sys::Reflect::get(&value, &JsValue::from_str("pages")).ok()?;
        let pages = Array::from(&pages_js)
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as u64))
            .collect();
        Some(TxRecord { path: path.to_string(), tx_id, pages, file_size })
    }

    fn tx_to_js(tx: &TxRecord) -> JsValue {
        let obj = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("path"), &JsValue::from_str(&tx.path));
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("txId"), &JsValue::from(tx.tx_id as f64));
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("fileSize"), &JsValue::from(tx.file_size as f64));
        let pages = Array::new();
        for p in &tx.pages {
            pages.push(&JsValue::from(*p as f64));
        }
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("pages"), &pages);
        obj.into()
    }
}

impl KvStore for IdbKv {
    async fn get_block(&self, path: &str, offset: u64) -> Result<Option<BlockRecord>, HostError> {
        let tx = self
            .db
            .transaction(BLOCKS_STORE)
            .with_mode(TransactionMode::Readonly)
            .build()
            .map_err(|e| js_err("starting read transaction", e))?;
        let store = tx.object_store(BLOCKS_STORE).map_err(|e| js_err("opening blocks store", e))?;
        let value = store
            .get(compound_key(path, offset))
            .await
            .map_err(|e| js_err("reading block", e))?;
        Ok(value.and_then(|v| Self::block_from_js(v, path)))
    }

    async fn get_all_blocks(&self, path: &str) -> Result<Vec<BlockRecord>, HostError> {
        let tx = self
            .db
            .transaction(BLOCKS_STORE)
            .with_mode(TransactionMode::Readonly)
            .build()
            .map_err(|e| js_err("starting read transaction", e))?;
        let store = tx.object_store(BLOCKS_STORE).map_err(|e| js_err("opening blocks store", e))?;
        let rows = store
            .get_all::<JsValue>()
            .with_query(key_from_range(path, 0))
            .await
            .map_err(|e| js_err("scanning blocks", e))?;
        let mut out: Vec<BlockRecord> = rows.into_iter().filter_map(|v| Self::block_from_js(v, path)).collect();
        out.sort_by_key(|b| b.offset);
        Ok(out)
    }

    async fn get_all_tx_desc(&self, path: &str) -> Result<Vec<TxRecord>, HostError> {
        let tx = self
            .db
            .transaction(TX_STORE)
            .with_mode(TransactionMode::Readonly)
            .build()
            .map_err(|e| js_err("starting read transaction", e))?;
        let store = tx.object_store(TX_STORE).map_err(|e| js_err("opening tx store", e))?;
        let rows = store
            .get_all::<JsValue>()
            .with_query(key_from_range(path, 0))
            .await
            .map_err(|e| js_err("scanning tx records", e))?;
        let mut out: Vec<TxRecord> = rows.into_iter().filter_map(|v| Self::tx_from_js(v, path)).collect();
        out.sort_by(|a, b| b.tx_id.cmp(&a.tx_id));
        Ok(out)
    }

    async fn get_tx_from(&self, path: &str, from_tx_id: u64) -> Result<Vec<TxRecord>, HostError> {
        let mut rows = self.get_all_tx_desc(path).await?;
        rows.retain(|t| t.tx_id >= from_tx_id);
        rows.sort_by_key(|t| t.tx_id);
        Ok(rows)
    }

    async fn commit(&self, write: CommitWrite, durability: Durability) -> Result<(), HostError> {
        let tx = self
            .db
            .transaction([BLOCKS_STORE, TX_STORE])
            .with_mode(TransactionMode::Readwrite)
            .with_durability(match durability {
                Durability::Default => indexed_db_futures::transaction::TransactionDurability::Default,
                Durability::Strict => indexed_db_futures::transaction::TransactionDurability::Strict,
                Durability::Relaxed => indexed_db_futures::transaction::TransactionDurability::Relaxed,
            })
            .build()
            .map_err(|e| js_err("starting commit transaction", e))?;

        let blocks = tx.object_store(BLOCKS_STORE).map_err(|e| js_err("opening blocks store", e))?;
        for block in &write.puts {
            blocks
                .put(Self::block_to_js(&block.path, block.offset, &block.data))
                .build()
                .map_err(|e| js_err("queuing block put", e))?;
        }

        let tx_store = tx.object_store(TX_STORE).map_err(|e| js_err("opening tx store", e))?;
        tx_store.put(Self::tx_to_js(&write.tx)).build().map_err(|e| js_err("queuing tx put", e))?;
        if let Some(below) = write.gc_tx_below {
            if below > 0 {
                tx_store
                    .delete(key_from_range(&write.path, 0).start().clone()..compound_key(&write.path, below))
                    .build()
                    .map_err(|e| js_err("queuing tx gc", e))?;
            }
        }

        tx.commit().await.map_err(|e| js_err("committing", e))?;
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> Result<(), HostError> {
        let tx = self
            .db
            .transaction([BLOCKS_STORE, TX_STORE])
            .with_mode(TransactionMode::Readwrite)
            .build()
            .map_err(|e| js_err("starting delete transaction", e))?;
        tx.object_store(BLOCKS_STORE)
            .map_err(|e| js_err("opening blocks store", e))?
            .delete(key_from_range(path, 0))
            .build()
            .map_err(|e| js_err("deleting blocks", e))?;
        tx.object_store(TX_STORE)
            .map_err(|e| js_err("opening tx store", e))?
            .delete(key_from_range(path, 0))
            .build()
            .map_err(|e| js_err("deleting tx records", e))?;
        tx.commit().await.map_err(|e| js_err("committing delete", e))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// NamedLocks
// ---------------------------------------------------------------------

/// A lock held through `navigator.locks`. Built on the well-known pattern
/// for turning the Web Locks API's callback shape into an RAII guard: the
/// callback passed to `request` resolves an "acquired" signal and then
/// stalls on a "release" promise that [`WebLockGuard::drop`] settles.
pub struct WebLocks {
    manager: JsSendSync<LockManager>,
}

impl WebLocks {
    /// Reads `navigator.locks` (or `self.locks` inside a worker).
    pub fn from_navigator() -> Result<Self, HostError> {
        let navigator = web_sys::window()
            .map(|w| w.navigator())
            .ok_or_else(|| HostError::Unavailable("no window.navigator in this realm".into()))?;
        Ok(Self { manager: JsSendSync(navigator.locks()) })
    }
}

pub struct WebLockGuard {
    release: Rc<RefCell<Option<Function>>>,
    // keeps the acquiring closure (and the promise it captured) alive for
    // as long as the lock is held; dropped after `release` fires.
    _closure: JsSendSync<Closure<dyn FnMut(JsValue) -> Promise>>,
}

impl Drop for WebLockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.borrow_mut().take() {
            let _ = release.call0(&JsValue::undefined());
        }
    }
}

impl NamedLocks for WebLocks {
    type Guard = WebLockGuard;

    async fn request(
        &self,
        name: &str,
        mode: LockMode,
        opts: LockOpts,
    ) -> Result<Option<Self::Guard>, HostError> {
        let options = LockOptions::new();
        options.set_mode(match mode {
            LockMode::Shared => web_sys::LockMode::Shared,
            LockMode::Exclusive => web_sys::LockMode::Exclusive,
        });
        options.set_if_available(opts.poll);
        options.set_steal(opts.steal);

        let release: Rc<RefCell<Option<Function>>> = Rc::new(RefCell::new(None));
        let (acquired_tx, acquired_rx) = oneshot_js();

        let release_for_closure = release.clone();
        let acquired_tx = RefCell::new(Some(acquired_tx));
        let closure = Closure::wrap(Box::new(move |lock: JsValue| -> Promise {
            if lock.is_null() {
                // `ifAvailable: true` and the lock was already held elsewhere.
                if let Some(tx) = acquired_tx.borrow_mut().take() {
                    tx.resolve(&JsValue::FALSE);
                }
                return Promise::resolve(&JsValue::undefined());
            }
            let released = Promise::new(&mut |resolve, _reject| {
                *release_for_closure.borrow_mut() = Some(resolve);
            });
            if let Some(tx) = acquired_tx.borrow_mut().take() {
                tx.resolve(&JsValue::TRUE);
            }
            released
        }) as Box<dyn FnMut(JsValue) -> Promise>);

        let request_promise = self
            .manager
            .request_with_options_and_callback(
                name,
                &options,
                closure.as_ref().unchecked_ref::<Function>(),
            )
            .map_err(|e| js_err("navigator.locks.request", e))?;
        // drive the browser's microtask queue so the callback above runs;
        // we don't care about its resolution value, only about `acquired`.
        wasm_bindgen_futures::spawn_local(async move {
            let _ = JsFuture::from(request_promise).await;
        });

        let got_lock = acquired_rx
            .await
            .map_err(|_| HostError::Unavailable("lock request callback never ran".into()))?;
        if !got_lock {
            return Ok(None);
        }

        Ok(Some(WebLockGuard { release, _closure: JsSendSync(closure) }))
    }

    fn query(&self) -> LockQuery {
        // `navigator.locks.query()` is itself async (it returns a Promise),
        // which doesn't fit this trait's synchronous signature. Callers
        // that need the stale-view GC watermark
        // (`LockStateMachine::oldest_view_tx_id`) only do so from within an
        // already-`await`ed context, so a browser deployment is expected to
        // keep a best-effort local mirror of query results updated on every
        // `request`/release rather than calling into the browser here.
        LockQuery::default()
    }
}

/// A single-resolution `bool` channel bridging a `wasm-bindgen` closure
/// (which cannot directly produce a `Future`) to an `async fn` awaiting it.
fn oneshot_js() -> (OneshotTx, OneshotRx) {
    let state = Rc::new(RefCell::new(OneshotState { value: None, waker: None }));
    (OneshotTx { state: state.clone() }, OneshotRx { state })
}

struct OneshotState {
    value: Option<bool>,
    waker: Option<Waker>,
}

struct OneshotTx {
    state: Rc<RefCell<OneshotState>>,
}

impl OneshotTx {
    fn resolve(self, value: &JsValue) {
        let mut state = self.state.borrow_mut();
        state.value = Some(value.is_truthy());
        if let Some(w) = state.waker.take() {
            w.wake();
        }
    }
}

struct OneshotRx {
    state: Rc<RefCell<OneshotState>>,
}

impl Future for OneshotRx {
    type Output = Result<bool, ()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        if let Some(v) = state.value.take() {
            return Poll::Ready(Ok(v));
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

// ---------------------------------------------------------------------
// Broadcast
// ---------------------------------------------------------------------

/// [`Broadcast`] over `BroadcastChannel`, mirroring [`crate::host::mem::MemBroadcast`]'s
/// queue-plus-waker shape but fed by the channel's `onmessage` event instead
/// of a direct in-process push.
pub struct ChannelBroadcast;

pub struct ChannelSender {
    channel: JsSendSync<BroadcastChannel>,
}

impl BroadcastSender for ChannelSender {
    async fn send(&self, payload: Vec<u8>) -> Result<(), HostError> {
        let arr = Uint8Array::from(payload.as_slice());
        self.channel
            .post_message(&arr)
            .map_err(|e| js_err("BroadcastChannel.postMessage", e))
    }
}

pub struct ChannelReceiver {
    channel: JsSendSync<BroadcastChannel>,
    queue: Rc<RefCell<VecDeque<Vec<u8>>>>,
    waker: Rc<RefCell<Option<Waker>>>,
    // keeps the `onmessage` closure alive for the receiver's lifetime.
    _on_message: JsSendSync<Closure<dyn FnMut(web_sys::MessageEvent)>>,
}

struct RecvFut<'a> {
    queue: &'a Rc<RefCell<VecDeque<Vec<u8>>>>,
    waker: &'a Rc<RefCell<Option<Waker>>>,
}

impl Future for RecvFut<'_> {
    type Output = Result<Vec<u8>, HostError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(msg) = self.queue.borrow_mut().pop_front() {
            return Poll::Ready(Ok(msg));
        }
        *self.waker.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl BroadcastReceiver for ChannelReceiver {
    async fn recv(&mut self) -> Result<Vec<u8>, HostError> {
        RecvFut { queue: &self.queue, waker: &self.waker }.await
    }

    fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.queue.borrow_mut().pop_front()
    }
}

impl Broadcast for ChannelBroadcast {
    type Sender = ChannelSender;
    type Receiver = ChannelReceiver;

    /// One `BroadcastChannel` object backs both halves: `postMessage` on it
    /// never fires its own `onmessage`, so sender and receiver sharing the
    /// same underlying channel is what gives self-exclusion for free,
    /// matching [`crate::host::mem::MemBroadcast`]'s shared-`agent_id` pairing.
    fn open(&self, channel: &str) -> (Self::Sender, Self::Receiver) {
        let bc = BroadcastChannel::new(channel).expect("BroadcastChannel::new");
        let queue = Rc::new(RefCell::new(VecDeque::new()));
        let waker: Rc<RefCell<Option<Waker>>> = Rc::new(RefCell::new(None));

        let queue_for_closure = queue.clone();
        let waker_for_closure = waker.clone();
        let on_message = Closure::wrap(Box::new(move |event: web_sys::MessageEvent| {
            let data = Uint8Array::new(&event.data()).to_vec();
            queue_for_closure.borrow_mut().push_back(data);
            if let Some(w) = waker_for_closure.borrow_mut().take() {
                w.wake();
            }
        }) as Box<dyn FnMut(web_sys::MessageEvent)>);
        bc.set_onmessage(Some(on_message.as_ref().unchecked_ref::<Function>()));

        let sender = ChannelSender { channel: JsSendSync(bc.clone()) };
        let receiver =
            ChannelReceiver { channel: JsSendSync(bc), queue, waker, _on_message: JsSendSync(on_message) };
        (sender, receiver)
    }
}

// ---------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------

/// [`Clock`] reading `performance.now()`, available from both window and
/// worker global scopes.
pub struct PerformanceClock {
    performance: JsSendSync<web_sys::Performance>,
}

impl PerformanceClock {
    pub fn from_global() -> Result<Self, HostError> {
        let performance = if let Some(window) = web_sys::window() {
            window.performance()
        } else {
            js_sys::global()
                .dyn_into::<web_sys::WorkerGlobalScope>()
                .ok()
                .and_then(|g| g.performance())
        }
        .ok_or_else(|| HostError::Unavailable("no Performance object in this realm".into()))?;
        Ok(Self { performance: JsSendSync(performance) })
    }
}

impl Clock for PerformanceClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.performance.now() as u64)
    }
}
