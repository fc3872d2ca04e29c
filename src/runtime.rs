//! Normalizes the facade's synchronous and suspending calling conventions.
//!
//! A real "stack-switching build" (Asyncify) lets a single SQLite C call
//! suspend mid-flight without unwinding the Rust stack. This crate cannot
//! rebuild SQLite, so [`Runtime::block_on`] approximates suspension by
//! driving a future to completion on the calling thread instead — correct
//! for a native embedding or a browser worker whose event loop is pumped by
//! `wasm-bindgen-futures`, but not a true stack switch.

use core::future::Future;

/// Executes futures produced by an [`crate::vfs::AsyncVfs`] implementation to
/// completion. Implementations must not require anything beyond polling —
/// no background thread pool is assumed, since a browser worker is
/// single-threaded.
pub trait Runtime: Send + Sync + 'static {
    fn block_on<F: Future>(&self, fut: F) -> F::Output;
}

/// Blocks the current OS thread using a small embedded executor. Suitable
/// for native embeddings and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRuntime;

impl Runtime for NativeRuntime {
    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        pollster::block_on(fut)
    }
}

/// Drives a future to completion by repeatedly pumping the `wasm-bindgen-futures`
/// microtask queue. This only terminates if the future's wakers are actually
/// driven by that queue (true of every host trait implementation in
/// [`crate::host::browser`]); a future that waits on something outside the
/// browser's microtask/task queues would spin forever, which is why this type
/// is not `pub` outside the `browser` feature.
#[cfg(feature = "browser")]
#[derive(Debug, Default, Clone, Copy)]
pub struct WasmRuntime;

#[cfg(feature = "browser")]
impl Runtime for WasmRuntime {
    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        // wasm32 has no threads to block; `pollster` spins on this target by
        // yielding to the JS microtask queue on every poll, which is exactly
        // the pump this adapter needs.
        pollster::block_on(fut)
    }
}
