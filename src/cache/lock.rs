use std::sync::{Mutex, MutexGuard};

use metrics::counter;
use tracing::warn;

pub const METRIC_LOCK_POISONED: &str = "headpress_cache_lock_poisoned_total";

/// Acquire a cache mutex, recovering the guard if a previous holder panicked.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            result = "poisoned_recovered",
            "Recovered from poisoned cache lock"
        );
        counter!(METRIC_LOCK_POISONED, "module" => target).increment(1);
        poisoned.into_inner()
    })
}
