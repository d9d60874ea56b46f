//! Content orchestration: resilient fetch, fallback, merge, and invalidation.

pub mod admin;
pub mod content;
pub mod error;
pub mod fallback;
pub mod fetch;
pub mod invalidation;
pub mod merge;
pub mod sources;
