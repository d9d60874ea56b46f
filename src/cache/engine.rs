//! TTL cache engine.
//!
//! A string-keyed store with per-entry expiry and access-recency eviction.
//! Expired entries are treated as absent on every read path and are removed
//! proactively by [`TtlCache::purge_expired`], which the background sweeper
//! calls on a fixed cadence.
//!
//! Eviction scans every entry for the oldest `last_accessed_at`, which is O(n)
//! per insert at capacity. Category capacities stay in the low thousands; a
//! linked-list LRU becomes worthwhile if they are raised far beyond that.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::trace;

use super::category::{CachePolicy, ContentCategory};
use super::clock::{Clock, SystemClock};
use super::entry::CacheEntry;
use super::lock::mutex_lock;
use super::monitor::{CacheMonitor, SignalKind};

const SOURCE: &str = "cache::engine";

/// Point-in-time counters and size of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub size: usize,
    pub max_entries: usize,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

enum Lookup<V> {
    Hit(V),
    Expired,
    Missing,
}

pub struct TtlCache<V> {
    category: ContentCategory,
    policy: CachePolicy,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
    counters: Counters,
    monitor: Option<CacheMonitor>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(category: ContentCategory, policy: CachePolicy) -> Self {
        Self::with_clock(category, policy, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(category: ContentCategory, policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            category,
            policy,
            entries: Mutex::new(HashMap::new()),
            clock,
            counters: Counters::default(),
            monitor: None,
        }
    }

    /// Attach a monitoring publisher. Ignored when the policy disables monitoring.
    pub fn with_monitor(mut self, monitor: CacheMonitor) -> Self {
        if self.policy.monitoring_enabled {
            self.monitor = Some(monitor);
        }
        self
    }

    pub fn category(&self) -> ContentCategory {
        self.category
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Return a live value, recording a hit; expired or missing keys record a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");

        let lookup = match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch(now);
                Lookup::Hit(entry.value.clone())
            }
            Some(_) => Lookup::Expired,
            None => Lookup::Missing,
        };
        if matches!(lookup, Lookup::Expired) {
            entries.remove(key);
        }
        drop(entries);

        match lookup {
            Lookup::Hit(value) => {
                self.signal(SignalKind::Hit);
                Some(value)
            }
            Lookup::Expired => {
                self.signal(SignalKind::Expire);
                self.signal(SignalKind::Miss);
                None
            }
            Lookup::Missing => {
                self.signal(SignalKind::Miss);
                None
            }
        }
    }

    /// Store `value` under the category TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.policy.ttl);
    }

    /// Store `value` with an explicit TTL. At capacity, expired entries are
    /// dropped first; if none were, the entry accessed least recently is evicted.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = self.clock.now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "set");

        let mut expired = 0;
        let mut evicted = None;
        if !entries.contains_key(&key) && entries.len() >= self.policy.max_entries {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            expired = before - entries.len();

            if entries.len() >= self.policy.max_entries {
                evicted = least_recently_accessed(&entries);
                if let Some(victim) = evicted.as_ref() {
                    entries.remove(victim);
                }
            }
        }
        entries.insert(key, CacheEntry::new(value, ttl, now));
        drop(entries);

        for _ in 0..expired {
            self.signal(SignalKind::Expire);
        }
        if let Some(victim) = evicted {
            trace!(
                target = "headpress::cache::engine",
                category = %self.category,
                key = %victim,
                "Evicted least recently accessed entry"
            );
            self.signal(SignalKind::Evict);
        }
    }

    /// Remove `key`. Returns whether an entry was present; absent keys are a no-op.
    pub fn delete(&self, key: &str) -> bool {
        mutex_lock(&self.entries, SOURCE, "delete")
            .remove(key)
            .is_some()
    }

    /// Remove every key starting with `prefix`, returning how many were removed.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut entries = mutex_lock(&self.entries, SOURCE, "delete_prefix");
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Remove everything, returning how many entries were held.
    pub fn clear(&self) -> usize {
        let mut entries = mutex_lock(&self.entries, SOURCE, "clear");
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Whether a live entry exists. Does not count as an access.
    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now();
        mutex_lock(&self.entries, SOURCE, "has")
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Snapshot of live keys.
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now();
        mutex_lock(&self.entries, SOURCE, "keys")
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of live entries.
    pub fn size(&self) -> usize {
        let now = self.clock.now();
        mutex_lock(&self.entries, SOURCE, "size")
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Drop every expired entry in one pass, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "purge_expired");
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        drop(entries);

        for _ in 0..removed {
            self.signal(SignalKind::Expire);
        }
        removed
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            size: self.size(),
            max_entries: self.policy.max_entries,
            ttl_seconds: self.policy.ttl.as_secs(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
        }
    }

    fn signal(&self, kind: SignalKind) {
        let counter = match kind {
            SignalKind::Hit => &self.counters.hits,
            SignalKind::Miss => &self.counters.misses,
            SignalKind::Evict => &self.counters.evictions,
            SignalKind::Expire => &self.counters.expirations,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Some(monitor) = self.monitor.as_ref() {
            monitor.record(kind);
        }
    }
}

fn least_recently_accessed<V>(entries: &HashMap<String, CacheEntry<V>>) -> Option<String> {
    entries
        .iter()
        .min_by_key(|(_, entry)| (entry.last_accessed_at, entry.stored_at))
        .map(|(key, _)| key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::monitor::SignalQueue;

    fn engine(max_entries: usize) -> (TtlCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = TtlCache::with_clock(
            ContentCategory::Posts,
            CachePolicy::new(Duration::from_secs(300), max_entries),
            clock.clone(),
        );
        (cache, clock)
    }

    #[test]
    fn cache_warms_then_serves_then_expires() {
        let (cache, clock) = engine(10);

        cache.set_with_ttl("post:abc", "P".to_string(), Duration::from_secs(300));
        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get("post:abc").as_deref(), Some("P"));

        clock.advance(Duration::from_secs(2));
        assert!(cache.get("post:abc").is_none());
    }

    #[test]
    fn expired_entries_are_absent_before_any_sweep() {
        let (cache, clock) = engine(10);
        cache.set("a", "1".to_string());
        cache.set_with_ttl("b", "2".to_string(), Duration::from_secs(3600));

        clock.advance(Duration::from_secs(301));

        assert!(!cache.has("a"));
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn hit_and_miss_counters() {
        let (cache, _clock) = engine(10);
        cache.set("a", "1".to_string());

        assert!(cache.get("a").is_some());
        assert!(cache.get("a").is_some());
        assert!(cache.get("missing").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn eviction_never_exceeds_capacity() {
        let (cache, clock) = engine(3);
        for i in 0..4 {
            cache.set(format!("k{i}"), i.to_string());
            clock.advance(Duration::from_secs(1));
        }

        assert_eq!(cache.size(), 3);
        assert!(!cache.has("k0"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn eviction_prefers_least_recently_accessed_over_oldest_insert() {
        let (cache, clock) = engine(2);
        cache.set("first", "1".to_string());
        clock.advance(Duration::from_secs(1));
        cache.set("second", "2".to_string());
        clock.advance(Duration::from_secs(1));

        // Reading `first` makes `second` the stalest entry.
        assert!(cache.get("first").is_some());
        clock.advance(Duration::from_secs(1));
        cache.set("third", "3".to_string());

        assert!(cache.has("first"));
        assert!(!cache.has("second"));
        assert!(cache.has("third"));
    }

    #[test]
    fn insert_at_capacity_reclaims_expired_before_evicting() {
        let (cache, clock) = engine(2);
        cache.set_with_ttl("stale", "1".to_string(), Duration::from_secs(10));
        clock.advance(Duration::from_secs(1));
        cache.set("live", "2".to_string());
        clock.advance(Duration::from_secs(1));

        // `live` is least recently accessed, but `stale` has already expired.
        assert!(cache.get("stale").is_some());
        clock.advance(Duration::from_secs(30));
        cache.set("fresh", "3".to_string());

        assert!(cache.has("live"));
        assert!(cache.has("fresh"));
        let stats = cache.stats();
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn overwrite_at_capacity_does_not_evict() {
        let (cache, _clock) = engine(2);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.set("a", "updated".to_string());

        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get("a").as_deref(), Some("updated"));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn delete_is_idempotent() {
        let (cache, _clock) = engine(10);
        cache.set("a", "1".to_string());

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn delete_prefix_only_touches_matching_keys() {
        let (cache, _clock) = engine(10);
        cache.set("list:1", "a".to_string());
        cache.set("list:2", "b".to_string());
        cache.set("post:x", "c".to_string());

        assert_eq!(cache.delete_prefix("list:"), 2);
        assert_eq!(cache.keys(), vec!["post:x".to_string()]);
    }

    #[test]
    fn purge_removes_only_expired() {
        let (cache, clock) = engine(10);
        cache.set("short", "1".to_string());
        cache.set_with_ttl("long", "2".to_string(), Duration::from_secs(3600));
        clock.advance(Duration::from_secs(600));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.clear(), 1);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn monitor_receives_signals_when_enabled() {
        let queue = Arc::new(SignalQueue::new());
        let (cache, _clock) = engine(10);
        let cache = cache.with_monitor(CacheMonitor::new(ContentCategory::Posts, queue.clone()));

        cache.set("a", "1".to_string());
        let _ = cache.get("a");
        let _ = cache.get("b");

        let kinds: Vec<_> = queue.drain(10).into_iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SignalKind::Hit, SignalKind::Miss]);
    }

    #[test]
    fn monitor_is_skipped_when_policy_disables_it() {
        let queue = Arc::new(SignalQueue::new());
        let cache: TtlCache<u8> = TtlCache::new(
            ContentCategory::Tags,
            CachePolicy::new(Duration::from_secs(60), 4).without_monitoring(),
        )
        .with_monitor(CacheMonitor::new(ContentCategory::Tags, queue.clone()));

        let _ = cache.get("missing");

        assert!(queue.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }
}
