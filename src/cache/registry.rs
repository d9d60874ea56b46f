//! Per-category cache registry.
//!
//! Owns one [`TtlCache`] per [`ContentCategory`]. Engines are created on
//! first access and live as long as the registry. The registry is built
//! explicitly at startup and shared behind an `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use super::category::ContentCategory;
use super::clock::{Clock, SystemClock};
use super::config::CacheConfig;
use super::engine::{EngineStats, TtlCache};
use super::monitor::{CacheMonitor, SignalQueue};
use super::value::CachedContent;

/// Engine type stored by the registry.
pub type ContentCache = TtlCache<CachedContent>;

/// Aggregate view returned by [`CacheRegistry::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_entries: usize,
    pub categories: BTreeMap<ContentCategory, EngineStats>,
}

pub struct CacheRegistry {
    config: CacheConfig,
    engines: DashMap<ContentCategory, Arc<ContentCache>>,
    clock: Arc<dyn Clock>,
    signals: Arc<SignalQueue>,
}

impl CacheRegistry {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let signals = Arc::new(SignalQueue::with_limit(config.monitor_queue_len));
        Self {
            config,
            engines: DashMap::new(),
            clock,
            signals,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Queue drained by the monitoring task.
    pub fn signals(&self) -> &Arc<SignalQueue> {
        &self.signals
    }

    /// Return the engine for `category`, creating it on first use.
    pub fn get_cache(&self, category: ContentCategory) -> Arc<ContentCache> {
        if let Some(engine) = self.engines.get(&category) {
            return engine.clone();
        }

        self.engines
            .entry(category)
            .or_insert_with(|| Arc::new(self.build_engine(category)))
            .clone()
    }

    /// Engine for `category` only if it has been created already.
    pub fn existing(&self, category: ContentCategory) -> Option<Arc<ContentCache>> {
        self.engines.get(&category).map(|engine| engine.clone())
    }

    /// Engines created so far, in category order.
    pub fn initialized(&self) -> Vec<Arc<ContentCache>> {
        let mut engines: Vec<_> = self
            .engines
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        engines.sort_by_key(|engine| engine.category());
        engines
    }

    /// Clear one category, returning how many entries were removed.
    pub fn clear(&self, category: ContentCategory) -> usize {
        self.existing(category).map_or(0, |engine| engine.clear())
    }

    /// Clear every category engine, returning how many entries were removed.
    pub fn clear_all(&self) -> usize {
        self.initialized().iter().map(|engine| engine.clear()).sum()
    }

    /// Live entry count per category. Categories not yet used report zero.
    pub fn sizes(&self) -> BTreeMap<ContentCategory, usize> {
        ContentCategory::ALL
            .into_iter()
            .map(|category| {
                let size = self.existing(category).map_or(0, |engine| engine.size());
                (category, size)
            })
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let categories: BTreeMap<_, _> = ContentCategory::ALL
            .into_iter()
            .map(|category| {
                let stats = match self.existing(category) {
                    Some(engine) => engine.stats(),
                    None => {
                        let policy = self.config.policy(category);
                        EngineStats {
                            size: 0,
                            max_entries: policy.max_entries,
                            ttl_seconds: policy.ttl.as_secs(),
                            hits: 0,
                            misses: 0,
                            evictions: 0,
                            expirations: 0,
                        }
                    }
                };
                (category, stats)
            })
            .collect();

        RegistryStats {
            total_entries: categories.values().map(|stats| stats.size).sum(),
            categories,
        }
    }

    fn build_engine(&self, category: ContentCategory) -> ContentCache {
        let policy = self.config.policy(category);
        TtlCache::with_clock(category, policy, self.clock.clone())
            .with_monitor(CacheMonitor::new(category, self.signals.clone()))
    }
}
