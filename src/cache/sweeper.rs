//! Background expiry sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::registry::CacheRegistry;

/// Purge expired entries from every initialized engine.
///
/// Each engine is purged in a single pass, and the task yields between
/// engines so request handlers are never starved by a long sweep.
pub async fn sweep_expired(registry: &CacheRegistry) -> usize {
    let started_at = Instant::now();
    let mut removed = 0;

    for engine in registry.initialized() {
        let purged = engine.purge_expired();
        if purged > 0 {
            debug!(
                target = "headpress::cache::sweeper",
                category = %engine.category(),
                purged,
                "Purged expired entries"
            );
        }
        removed += purged;
        tokio::task::yield_now().await;
    }

    if removed > 0 {
        info!(
            target = "headpress::cache::sweeper",
            removed,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Cache sweep complete"
        );
    }
    removed
}

/// Spawn the periodic sweep. The first sweep runs one interval after start.
pub fn spawn_sweeper(registry: Arc<CacheRegistry>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            sweep_expired(&registry).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::category::ContentCategory;
    use crate::cache::clock::ManualClock;
    use crate::cache::config::CacheConfig;
    use crate::cache::value::CachedContent;

    fn empty_terms() -> CachedContent {
        CachedContent::Terms(Arc::new(Vec::new()))
    }

    #[tokio::test]
    async fn sweep_removes_expired_entries_across_categories() {
        let clock = Arc::new(ManualClock::starting_now());
        let registry = CacheRegistry::with_clock(CacheConfig::default(), clock.clone());

        let posts = registry.get_cache(ContentCategory::Posts);
        let tags = registry.get_cache(ContentCategory::Tags);
        posts.set("list:a", empty_terms());
        posts.set("list:b", empty_terms());
        tags.set("all", empty_terms());

        clock.advance(Duration::from_secs(301));

        assert_eq!(sweep_expired(&registry).await, 2);
        assert_eq!(posts.stats().expirations, 2);
        assert_eq!(tags.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sweeper_runs_on_interval() {
        let clock = Arc::new(ManualClock::starting_now());
        let registry = Arc::new(CacheRegistry::with_clock(
            CacheConfig::default(),
            clock.clone(),
        ));
        let posts = registry.get_cache(ContentCategory::Posts);
        posts.set("post:x", empty_terms());
        clock.advance(Duration::from_secs(301));

        let handle = spawn_sweeper(registry.clone(), Duration::from_secs(300));
        tokio::time::sleep(Duration::from_secs(301)).await;

        assert_eq!(posts.stats().expirations, 1);
        handle.abort();
    }
}
