//! Support utilities
//!
//! Clock, timeout racing, memoization, panic isolation and logging.

mod guard;
pub mod logger;
mod memo;
mod timeout;
mod timer;

pub use guard::{guard, guard_call, guard_sync, panic_message};
pub use memo::{Memo, Memoizer};
pub use timeout::{timeout, timeout_message};
pub use timer::{clock, sleep, time, Timed};

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// User callbacks never run while one of these locks is held, so a poisoned
// lock still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
