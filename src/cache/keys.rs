//! Cache key construction.
//!
//! Keys are plain strings namespaced by a prefix so that related entries can
//! be dropped together (see [`InvalidationTarget::Prefix`]).
//!
//! [`InvalidationTarget::Prefix`]: crate::application::invalidation::InvalidationTarget::Prefix

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::domain::types::PostQuery;

pub const POST_PREFIX: &str = "post:";
pub const LIST_PREFIX: &str = "list:";
pub const RELATED_PREFIX: &str = "related:";
pub const SEARCH_PREFIX: &str = "search:";
pub const MEDIA_PREFIX: &str = "media:";

/// Key for the whole taxonomy listing of a category (`categories`, `tags`).
pub const TAXONOMY_KEY: &str = "all";

/// Compute a hash for any hashable value.
pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

pub fn post_key(slug: &str) -> String {
    format!("{POST_PREFIX}{}", slug.trim().to_ascii_lowercase())
}

/// Listing key; searches live in their own category under a separate prefix.
pub fn list_key(query: &PostQuery) -> String {
    let prefix = if query.is_search() {
        SEARCH_PREFIX
    } else {
        LIST_PREFIX
    };
    format!("{prefix}{:016x}", hash_value(&query.normalized()))
}

pub fn related_key(post_id: u64, limit: usize) -> String {
    format!("{RELATED_PREFIX}{post_id}:{limit}")
}

pub fn media_key(media_id: u64) -> String {
    format!("{MEDIA_PREFIX}{media_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_keys_are_case_and_whitespace_insensitive() {
        assert_eq!(post_key("Hello-World "), "post:hello-world");
        assert_eq!(post_key("abc"), "post:abc");
    }

    #[test]
    fn equivalent_queries_share_a_key() {
        let a = PostQuery {
            search: Some("  rust ".to_string()),
            ..PostQuery::default()
        };
        let b = PostQuery {
            search: Some("rust".to_string()),
            ..PostQuery::default()
        };

        assert_eq!(list_key(&a), list_key(&b));
        assert!(list_key(&a).starts_with(SEARCH_PREFIX));
    }

    #[test]
    fn plain_listing_uses_list_prefix() {
        let query = PostQuery {
            page: 2,
            ..PostQuery::default()
        };
        assert!(list_key(&query).starts_with(LIST_PREFIX));
        assert_ne!(list_key(&query), list_key(&PostQuery::default()));
    }

    #[test]
    fn related_key_includes_limit() {
        assert_eq!(related_key(42, 3), "related:42:3");
        assert_ne!(related_key(42, 3), related_key(42, 6));
    }
}
