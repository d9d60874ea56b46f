//! Fixed content categories and their default cache policies.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content categories cached by the registry. The set is fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Posts,
    Categories,
    Tags,
    Media,
    Search,
}

impl ContentCategory {
    pub const ALL: [ContentCategory; 5] = [
        ContentCategory::Posts,
        ContentCategory::Categories,
        ContentCategory::Tags,
        ContentCategory::Media,
        ContentCategory::Search,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentCategory::Posts => "posts",
            ContentCategory::Categories => "categories",
            ContentCategory::Tags => "tags",
            ContentCategory::Media => "media",
            ContentCategory::Search => "search",
        }
    }

    /// Default policy reflecting how often each kind of content changes.
    pub fn default_policy(self) -> CachePolicy {
        match self {
            ContentCategory::Posts => CachePolicy::new(Duration::from_secs(5 * 60), 1000),
            ContentCategory::Categories => CachePolicy::new(Duration::from_secs(60 * 60), 100),
            ContentCategory::Tags => CachePolicy::new(Duration::from_secs(60 * 60), 500),
            ContentCategory::Media => CachePolicy::new(Duration::from_secs(60 * 60), 200),
            ContentCategory::Search => CachePolicy::new(Duration::from_secs(10 * 60), 500),
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown content category `{0}`")]
pub struct UnknownCategory(pub String);

impl FromStr for ContentCategory {
    type Err = UnknownCategory;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "posts" | "post" => Ok(ContentCategory::Posts),
            "categories" | "category" => Ok(ContentCategory::Categories),
            "tags" | "tag" => Ok(ContentCategory::Tags),
            "media" => Ok(ContentCategory::Media),
            "search" => Ok(ContentCategory::Search),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Expiry and capacity policy for one category engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub max_entries: usize,
    pub monitoring_enabled: bool,
}

impl CachePolicy {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            monitoring_enabled: true,
        }
    }

    pub fn without_monitoring(mut self) -> Self {
        self.monitoring_enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_singular_and_plural_names() {
        assert_eq!("posts".parse::<ContentCategory>(), Ok(ContentCategory::Posts));
        assert_eq!("Tag".parse::<ContentCategory>(), Ok(ContentCategory::Tags));
        assert_eq!(" search ".parse::<ContentCategory>(), Ok(ContentCategory::Search));
        assert!("downloads".parse::<ContentCategory>().is_err());
    }

    #[test]
    fn taxonomy_outlives_posts() {
        let posts = ContentCategory::Posts.default_policy();
        let tags = ContentCategory::Tags.default_policy();
        let search = ContentCategory::Search.default_policy();

        assert_eq!(posts.ttl, Duration::from_secs(300));
        assert_eq!(posts.max_entries, 1000);
        assert!(tags.ttl > search.ttl);
        assert!(search.ttl > posts.ttl);
    }

    #[test]
    fn display_matches_as_str() {
        for category in ContentCategory::ALL {
            assert_eq!(category.to_string(), category.as_str());
        }
    }
}
