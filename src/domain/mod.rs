//! Content model shared by the fetch, cache, and invalidation layers.

pub mod entities;
pub mod error;
pub mod slug;
pub mod types;
