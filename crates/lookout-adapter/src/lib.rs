//! lookout-adapter: Chrome DevTools Protocol debugger adapter.
//!
//! [`CdpHandler`] bridges a single-threaded script engine and one remote
//! CDP client. Client requests may arrive on any thread; everything that
//! touches the engine is queued and replayed on the engine thread from its
//! pause callback.

pub mod console;
pub mod convert;
pub mod error;
pub mod remote_objects;
pub mod scripts;
pub mod virtual_breakpoints;

mod debugger;
mod handler;
mod pause;
mod profiler;
mod queues;
mod runtime;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use error::AdapterError;
pub use handler::{AdapterOptions, CdpHandler, MessageCallback, UnregisterCallback};
pub use remote_objects::{RemoteObjectsTable, BACKTRACE_GROUP, CONSOLE_GROUP, DEFAULT_GROUP};
pub use virtual_breakpoints::BEFORE_SCRIPT_WITH_SOURCE_MAP;

/// Lock `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
