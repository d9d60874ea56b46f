use std::time::Duration;

use time::OffsetDateTime;

/// A stored value plus the bookkeeping used for expiry and eviction.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: OffsetDateTime,
    pub ttl: Duration,
    pub access_count: u64,
    pub last_accessed_at: OffsetDateTime,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration, now: OffsetDateTime) -> Self {
        Self {
            value,
            stored_at: now,
            ttl,
            access_count: 0,
            last_accessed_at: now,
        }
    }

    /// An entry is logically absent once strictly more than `ttl` has elapsed.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        let age = now - self.stored_at;
        age > self.ttl
    }

    pub fn touch(&mut self, now: OffsetDateTime) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = now;
    }
}
