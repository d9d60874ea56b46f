//! Headpress content cache.
//!
//! A process-local cache with one TTL engine per content category:
//!
//! - **Engine** (`TtlCache`): per-entry expiry, access-recency eviction,
//!   hit/miss accounting
//! - **Registry** (`CacheRegistry`): lazily created engine per category with a
//!   fixed policy, aggregate statistics and global/partial clears
//! - **Sweeper**: periodic purge of expired entries
//! - **Monitor**: bounded side channel feeding `metrics` counters
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! sweep_interval_seconds = 300
//!
//! [cache.posts]
//! ttl_seconds = 300
//! max_entries = 1000
//! ```

mod category;
mod clock;
mod config;
mod engine;
mod entry;
pub mod keys;
mod lock;
pub mod monitor;
mod registry;
mod sweeper;
mod value;

pub use category::{CachePolicy, ContentCategory, UnknownCategory};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use engine::{EngineStats, TtlCache};
pub use entry::CacheEntry;
pub use lock::METRIC_LOCK_POISONED;
pub use monitor::{CacheMonitor, CacheSignal, SignalKind, SignalQueue};
pub use registry::{CacheRegistry, ContentCache, RegistryStats};
pub use sweeper::{spawn_sweeper, sweep_expired};
pub use value::CachedContent;
