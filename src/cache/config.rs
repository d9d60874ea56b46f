//! Cache configuration.
//!
//! Resolved once at startup from the `[cache]` section of `headpress.toml`.
//! Category policies cannot change afterwards; a new policy needs a restart.

use std::collections::BTreeMap;
use std::time::Duration;

use super::category::{CachePolicy, ContentCategory};
use super::monitor::DEFAULT_SIGNAL_QUEUE_LEN;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_MONITOR_DRAIN_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Policy per category.
    pub policies: BTreeMap<ContentCategory, CachePolicy>,
    /// Cadence of the background expiry sweep.
    pub sweep_interval: Duration,
    /// Maximum pending monitoring signals before new ones are dropped.
    pub monitor_queue_len: usize,
    /// Cadence of the monitoring drain task.
    pub monitor_drain_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policies: ContentCategory::ALL
                .into_iter()
                .map(|category| (category, category.default_policy()))
                .collect(),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            monitor_queue_len: DEFAULT_SIGNAL_QUEUE_LEN,
            monitor_drain_interval: Duration::from_millis(DEFAULT_MONITOR_DRAIN_INTERVAL_MS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            policies: settings.policies.clone(),
            sweep_interval: settings.sweep_interval,
            monitor_queue_len: settings.monitor_queue_len.get(),
            monitor_drain_interval: settings.monitor_drain_interval,
        }
    }
}

impl CacheConfig {
    pub fn policy(&self, category: ContentCategory) -> CachePolicy {
        self.policies
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_policy())
    }

    /// Replace the policy for one category.
    pub fn with_policy(mut self, category: ContentCategory, policy: CachePolicy) -> Self {
        self.policies.insert(category, policy);
        self
    }
}
