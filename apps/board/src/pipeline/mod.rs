// Recruitment pipeline state tracker.
// The Entity Store is the single writable resource; the engine, the bulk
// dispatcher and the loader in `board` are its only writers.

pub mod board;
pub mod bulk;
pub mod engine;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod selection;
pub mod stage;
pub mod stats;
pub mod store;

#[cfg(test)]
pub mod testing;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use error::PipelineError;

/// Locks a mutex, recovering the guard if a previous holder panicked.
/// Every writer leaves the guarded state consistent between statements.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
