//! Tokio runtime for async operations.
//!
//! Provides a lazily-initialized global multi-thread runtime. Blocking FFI
//! entry points use `runtime().block_on()`, the callback-based ones use
//! `runtime().spawn()`.

use once_cell::sync::Lazy;

static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("siwa-sdk")
        .build()
        .expect("failed to create tokio runtime")
});

/// Returns a reference to the global Tokio runtime.
pub fn runtime() -> &'static tokio::runtime::Runtime {
    &RUNTIME
}
