//! Best-effort cache monitoring.
//!
//! Engines publish hit/miss/evict/expire signals into a bounded in-memory
//! queue. A background task drains the queue and records `metrics` counters.
//! Publishing never blocks: contention or a full queue drops the signal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tracing::debug;

use super::category::ContentCategory;

pub const DEFAULT_SIGNAL_QUEUE_LEN: usize = 4096;
const DRAIN_BATCH_LIMIT: usize = 1024;

pub const METRIC_HIT: &str = "headpress_cache_hit_total";
pub const METRIC_MISS: &str = "headpress_cache_miss_total";
pub const METRIC_EVICT: &str = "headpress_cache_evict_total";
pub const METRIC_EXPIRE: &str = "headpress_cache_expire_total";
pub const METRIC_DROPPED: &str = "headpress_cache_signal_dropped_total";
pub const METRIC_QUEUE_LEN: &str = "headpress_cache_signal_queue_len";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Hit,
    Miss,
    /// Removed to make room for a new entry.
    Evict,
    /// Removed because its TTL elapsed.
    Expire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSignal {
    pub category: ContentCategory,
    pub kind: SignalKind,
}

/// Bounded queue of monitoring signals.
pub struct SignalQueue {
    queue: Mutex<VecDeque<CacheSignal>>,
    max_len: usize,
    dropped: AtomicU64,
}

impl SignalQueue {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_SIGNAL_QUEUE_LEN)
    }

    pub fn with_limit(max_len: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            max_len: max_len.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a signal, dropping it if the queue is full or busy.
    pub fn publish(&self, signal: CacheSignal) {
        let mut queue = match self.queue.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if queue.len() >= self.max_len {
            drop(queue);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        queue.push_back(signal);
    }

    /// Remove up to `limit` signals in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<CacheSignal> {
        let mut queue = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = limit.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        match self.queue.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signals dropped since the last call.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

impl Default for SignalQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-category publisher handed to an engine when monitoring is enabled.
#[derive(Clone)]
pub struct CacheMonitor {
    category: ContentCategory,
    queue: Arc<SignalQueue>,
}

impl CacheMonitor {
    pub fn new(category: ContentCategory, queue: Arc<SignalQueue>) -> Self {
        Self { category, queue }
    }

    pub fn record(&self, kind: SignalKind) {
        self.queue.publish(CacheSignal {
            category: self.category,
            kind,
        });
    }
}

/// Drain pending signals into the metrics recorder. Returns how many were recorded.
pub fn flush(queue: &SignalQueue) -> usize {
    let dropped = queue.take_dropped();
    if dropped > 0 {
        counter!(METRIC_DROPPED).increment(dropped);
    }

    let signals = queue.drain(DRAIN_BATCH_LIMIT);
    for signal in &signals {
        let name = match signal.kind {
            SignalKind::Hit => METRIC_HIT,
            SignalKind::Miss => METRIC_MISS,
            SignalKind::Evict => METRIC_EVICT,
            SignalKind::Expire => METRIC_EXPIRE,
        };
        counter!(name, "category" => signal.category.as_str()).increment(1);
    }

    gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
    signals.len()
}

/// Spawn the task that periodically flushes `queue`.
pub fn spawn_drain(queue: Arc<SignalQueue>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let recorded = flush(&queue);
            if recorded > 0 {
                debug!(
                    target = "headpress::cache::monitor",
                    recorded, "Flushed cache signals"
                );
            }
        }
    })
}
