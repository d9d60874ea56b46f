use std::fmt;

use serde::{Deserialize, Serialize};

/// Publication state reported by the CMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Publish,
    Future,
    Draft,
    Pending,
    Private,
    Trash,
    #[serde(other)]
    Other,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Publish => "publish",
            PostStatus::Future => "future",
            PostStatus::Draft => "draft",
            PostStatus::Pending => "pending",
            PostStatus::Private => "private",
            PostStatus::Trash => "trash",
            PostStatus::Other => "other",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

/// Parameters of a post listing or search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(default)]
pub struct PostQuery {
    pub page: u32,
    pub per_page: u32,
    pub search: Option<String>,
    pub categories: Vec<u64>,
    pub tags: Vec<u64>,
    pub exclude: Vec<u64>,
}

impl Default for PostQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            search: None,
            categories: Vec::new(),
            tags: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl PostQuery {
    pub fn is_search(&self) -> bool {
        self.search
            .as_deref()
            .is_some_and(|term| !term.trim().is_empty())
    }

    /// Canonical form: trimmed lowercase search, sorted id filters, page and
    /// page size clamped to what the CMS accepts.
    pub fn normalized(&self) -> PostQuery {
        PostQuery {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
            search: self
                .search
                .as_deref()
                .map(|term| term.trim().to_lowercase())
                .filter(|term| !term.is_empty()),
            categories: sorted_ids(&self.categories),
            tags: sorted_ids(&self.tags),
            exclude: sorted_ids(&self.exclude),
        }
    }
}

fn sorted_ids(ids: &[u64]) -> Vec<u64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Content change notification pushed by the CMS webhook plugin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentNotification {
    pub post_id: u64,
    #[serde(default)]
    pub post_title: Option<String>,
    #[serde(default)]
    pub post_name: Option<String>,
    pub post_status: PostStatus,
    pub post_type: String,
    #[serde(default)]
    pub old_slug: Option<String>,
    #[serde(default)]
    pub new_slug: Option<String>,
    /// Unix seconds or a formatted date, depending on plugin version.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub user_login: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

impl ContentNotification {
    /// Slugs whose cached copies are affected, without duplicates or blanks.
    pub fn affected_slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = [&self.old_slug, &self.new_slug, &self.post_name]
            .into_iter()
            .flatten()
            .map(|slug| slug.trim().to_ascii_lowercase())
            .filter(|slug| !slug.is_empty())
            .collect();
        slugs.sort();
        slugs.dedup();
        slugs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_maps_to_other() {
        let status: PostStatus = serde_json::from_str("\"auto-draft\"").expect("status");
        assert_eq!(status, PostStatus::Other);
    }

    #[test]
    fn normalized_query_is_canonical() {
        let query = PostQuery {
            page: 0,
            per_page: 500,
            search: Some("  Rust ".to_string()),
            categories: vec![3, 1, 3],
            ..PostQuery::default()
        };
        let normalized = query.normalized();

        assert_eq!(normalized.page, 1);
        assert_eq!(normalized.per_page, MAX_PER_PAGE);
        assert_eq!(normalized.search.as_deref(), Some("rust"));
        assert_eq!(normalized.categories, vec![1, 3]);
    }

    #[test]
    fn blank_search_is_not_a_search() {
        let query = PostQuery {
            search: Some("   ".to_string()),
            ..PostQuery::default()
        };
        assert!(!query.is_search());
        assert_eq!(query.normalized().search, None);
    }

    #[test]
    fn notification_parses_minimal_payload() {
        let payload = r#"{
            "post_id": 12,
            "post_status": "publish",
            "post_type": "post",
            "old_slug": "Old-Slug",
            "new_slug": "new-slug",
            "post_name": "new-slug",
            "timestamp": 1700000000
        }"#;
        let notification: ContentNotification =
            serde_json::from_str(payload).expect("notification");

        assert_eq!(notification.post_id, 12);
        assert_eq!(notification.affected_slugs(), vec!["new-slug", "old-slug"]);
    }
}
