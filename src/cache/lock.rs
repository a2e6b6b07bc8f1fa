use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Locks the store state, taking over the guard when a panicking task left
/// the mutex poisoned. Entry state is only ever written whole, so a poisoned
/// guard still holds consistent entries.
pub(crate) fn lock_state<'a, T>(lock: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            lock_kind = "mutex.lock",
            result = "poisoned_recovered",
            "Recovered from poisoned cache store lock"
        );
        poisoned.into_inner()
    })
}
