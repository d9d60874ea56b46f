//! Administrative cache actions and revalidation requests.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::application::error::AppError;
use crate::application::invalidation::{
    InvalidationEvent, InvalidationGateway, InvalidationTarget, plan_clear_all,
};
use crate::cache::keys::{LIST_PREFIX, post_key};
use crate::cache::{ContentCategory, RegistryStats};
use crate::domain::slug::normalize_slug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    ClearAll,
    /// Whole posts category, or one post by slug.
    ClearPosts(Option<String>),
    /// Downloads are cached in the media category.
    ClearDownloads,
    ClearCategory(ContentCategory),
    Stats,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdminActionError {
    #[error("action must not be empty")]
    Empty,
    #[error("unknown action `{0}`")]
    Unknown(String),
    #[error("invalid argument for `{action}`: {message}")]
    InvalidArgument {
        action: &'static str,
        message: String,
    },
}

impl FromStr for AdminAction {
    type Err = AdminActionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err(AdminActionError::Empty);
        }

        let (name, argument) = match value.split_once(':') {
            Some((name, argument)) => (name, Some(argument.trim())),
            None => (value, None),
        };

        match (name.to_ascii_lowercase().as_str(), argument) {
            ("clear-all", None) => Ok(AdminAction::ClearAll),
            ("clear-downloads", None) => Ok(AdminAction::ClearDownloads),
            ("stats", None) => Ok(AdminAction::Stats),
            ("clear-posts", None) => Ok(AdminAction::ClearPosts(None)),
            ("clear-posts", Some(slug)) => normalize_slug(slug)
                .map(|slug| AdminAction::ClearPosts(Some(slug)))
                .map_err(|err| AdminActionError::InvalidArgument {
                    action: "clear-posts",
                    message: err.to_string(),
                }),
            ("clear", Some(category)) => category
                .parse::<ContentCategory>()
                .map(AdminAction::ClearCategory)
                .map_err(|err| AdminActionError::InvalidArgument {
                    action: "clear",
                    message: err.to_string(),
                }),
            _ => Err(AdminActionError::Unknown(value.to_string())),
        }
    }
}

/// JSON body returned by the management endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AdminResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RegistryStats>,
}

impl AdminResponse {
    fn cleared(message: impl Into<String>, removed: usize) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            removed: Some(removed),
            stats: None,
        }
    }
}

/// Revalidation parameters, as sent by the CMS or an operator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevalidateRequest {
    pub path: Option<String>,
    pub tag: Option<String>,
    #[serde(default)]
    pub all: Option<bool>,
}

/// What a request path names on the public site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevalidatePath {
    Listing,
    Post(String),
}

/// Classify a public site path. Listings are the home page, `/blog`,
/// pagination, taxonomy archives and search; `/<slug>` and `/blog/<slug>`
/// name a post.
pub fn classify_path(path: &str) -> Result<RevalidatePath, AppError> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();

    match segments.as_slice() {
        [] | ["blog"] | ["page", _] | ["blog", "page", _] => Ok(RevalidatePath::Listing),
        ["category" | "tag" | "search", ..] => Ok(RevalidatePath::Listing),
        [slug] | ["blog", slug] => Ok(RevalidatePath::Post(normalize_slug(slug)?)),
        _ => Err(AppError::validation(format!(
            "path `{path}` does not name a post or listing"
        ))),
    }
}

impl RevalidateRequest {
    /// Events for this request. `all` wins over `path` and `tag`, which may
    /// be combined.
    pub fn plan(&self, received_at: OffsetDateTime) -> Result<Vec<InvalidationEvent>, AppError> {
        if self.all == Some(true) {
            return Ok(plan_clear_all("revalidate: all", received_at));
        }

        let mut events = Vec::new();

        if let Some(path) = self.path.as_deref().filter(|path| !path.trim().is_empty()) {
            let reason = format!("revalidate: path {path}");
            let target = match classify_path(path)? {
                RevalidatePath::Listing => InvalidationTarget::Prefix(LIST_PREFIX.to_string()),
                RevalidatePath::Post(slug) => InvalidationTarget::Key(post_key(&slug)),
            };
            events.push(InvalidationEvent::new(
                ContentCategory::Posts,
                target,
                reason,
                received_at,
            ));
        }

        if let Some(tag) = self.tag.as_deref().filter(|tag| !tag.trim().is_empty()) {
            let category = tag.parse::<ContentCategory>()?;
            events.push(InvalidationEvent::new(
                category,
                InvalidationTarget::All,
                format!("revalidate: tag {category}"),
                received_at,
            ));
        }

        if events.is_empty() {
            return Err(AppError::validation(
                "one of `path`, `tag` or `all=true` is required",
            ));
        }
        Ok(events)
    }
}

/// Executes management actions against the gateway.
pub struct AdminService {
    gateway: Arc<InvalidationGateway>,
}

impl AdminService {
    pub fn new(gateway: Arc<InvalidationGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<InvalidationGateway> {
        &self.gateway
    }

    pub fn execute(&self, action: &AdminAction) -> AdminResponse {
        let response = match action {
            AdminAction::ClearAll => {
                let removed = self.gateway.clear_all("admin: clear-all");
                AdminResponse::cleared("All caches cleared", removed)
            }
            AdminAction::ClearPosts(None) => {
                let removed = self.gateway.invalidate(
                    ContentCategory::Posts,
                    InvalidationTarget::All,
                    "admin: clear-posts",
                );
                AdminResponse::cleared("Posts cache cleared", removed)
            }
            AdminAction::ClearPosts(Some(slug)) => {
                let removed = self.gateway.invalidate(
                    ContentCategory::Posts,
                    InvalidationTarget::Key(post_key(slug)),
                    "admin: clear-posts",
                );
                AdminResponse::cleared(format!("Post `{slug}` cleared"), removed)
            }
            AdminAction::ClearDownloads => {
                let removed = self.gateway.invalidate(
                    ContentCategory::Media,
                    InvalidationTarget::All,
                    "admin: clear-downloads",
                );
                AdminResponse::cleared("Downloads cache cleared", removed)
            }
            AdminAction::ClearCategory(category) => {
                let removed = self.gateway.invalidate(
                    *category,
                    InvalidationTarget::All,
                    "admin: clear category",
                );
                AdminResponse::cleared(format!("{category} cache cleared"), removed)
            }
            AdminAction::Stats => {
                return AdminResponse {
                    success: true,
                    message: None,
                    removed: None,
                    stats: Some(self.gateway.registry().stats()),
                };
            }
        };

        info!(
            target = "headpress::application::admin",
            action = ?action,
            removed = response.removed.unwrap_or_default(),
            "Admin cache action executed"
        );
        response
    }

    /// Apply a revalidation request, returning how many entries it removed.
    pub fn revalidate(&self, request: &RevalidateRequest) -> Result<usize, AppError> {
        let events = request.plan(self.gateway.now())?;
        let removed = self.gateway.apply_all(&events);
        info!(
            target = "headpress::application::admin",
            events = events.len(),
            removed,
            "Revalidation applied"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, CacheRegistry, CachedContent};

    fn service() -> AdminService {
        let registry = Arc::new(CacheRegistry::new(CacheConfig::default()));
        AdminService::new(Arc::new(InvalidationGateway::new(registry)))
    }

    fn filler() -> CachedContent {
        CachedContent::Terms(Arc::new(Vec::new()))
    }

    #[test]
    fn parses_actions() {
        assert_eq!("clear-all".parse::<AdminAction>(), Ok(AdminAction::ClearAll));
        assert_eq!("clear-posts".parse::<AdminAction>(), Ok(AdminAction::ClearPosts(None)));
        assert_eq!(
            "clear-posts:Hello-World".parse::<AdminAction>(),
            Ok(AdminAction::ClearPosts(Some("hello-world".to_string())))
        );
        assert_eq!("clear-downloads".parse::<AdminAction>(), Ok(AdminAction::ClearDownloads));
        assert_eq!(
            "clear:tags".parse::<AdminAction>(),
            Ok(AdminAction::ClearCategory(ContentCategory::Tags))
        );
        assert_eq!(" stats ".parse::<AdminAction>(), Ok(AdminAction::Stats));
    }

    #[test]
    fn rejects_unknown_actions() {
        assert_eq!("".parse::<AdminAction>(), Err(AdminActionError::Empty));
        assert!(matches!(
            "drop-tables".parse::<AdminAction>(),
            Err(AdminActionError::Unknown(_))
        ));
        assert!(matches!(
            "clear:comments".parse::<AdminAction>(),
            Err(AdminActionError::InvalidArgument { action: "clear", .. })
        ));
        assert!(matches!(
            "stats:extra".parse::<AdminAction>(),
            Err(AdminActionError::Unknown(_))
        ));
    }

    #[test]
    fn clear_posts_without_slug_empties_category() {
        let service = service();
        let posts = service.gateway().registry().get_cache(ContentCategory::Posts);
        for slug in ["a", "b", "c", "d", "e"] {
            posts.set(post_key(slug), filler());
        }

        let response = service.execute(&"clear-posts".parse().expect("action"));

        assert_eq!(response.removed, Some(5));
        assert_eq!(posts.size(), 0);
    }

    #[test]
    fn clear_downloads_targets_media() {
        let service = service();
        let registry = service.gateway().registry().clone();
        registry.get_cache(ContentCategory::Media).set("media:1", filler());
        registry.get_cache(ContentCategory::Posts).set("post:a", filler());

        service.execute(&AdminAction::ClearDownloads);

        let sizes = registry.sizes();
        assert_eq!(sizes[&ContentCategory::Media], 0);
        assert_eq!(sizes[&ContentCategory::Posts], 1);
    }

    #[test]
    fn stats_report_every_category() {
        let response = service().execute(&AdminAction::Stats);
        let stats = response.stats.expect("stats");
        assert_eq!(stats.categories.len(), ContentCategory::ALL.len());
    }

    #[test]
    fn classifies_paths() {
        assert_eq!(classify_path("/").unwrap(), RevalidatePath::Listing);
        assert_eq!(classify_path("/blog/page/2").unwrap(), RevalidatePath::Listing);
        assert_eq!(classify_path("/tag/rust").unwrap(), RevalidatePath::Listing);
        assert_eq!(
            classify_path("/blog/Hello").unwrap(),
            RevalidatePath::Post("hello".to_string())
        );
        assert_eq!(
            classify_path("/hello?preview=1").unwrap(),
            RevalidatePath::Post("hello".to_string())
        );
        assert!(classify_path("/a/b/c").is_err());
    }

    #[test]
    fn revalidate_requires_a_target() {
        let err = service()
            .revalidate(&RevalidateRequest::default())
            .expect_err("no target");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn revalidate_post_path_removes_one_post() {
        let service = service();
        let posts = service.gateway().registry().get_cache(ContentCategory::Posts);
        posts.set(post_key("hello"), filler());
        posts.set(post_key("other"), filler());

        let removed = service
            .revalidate(&RevalidateRequest {
                path: Some("/blog/hello".to_string()),
                ..RevalidateRequest::default()
            })
            .expect("revalidated");

        assert_eq!(removed, 1);
        assert!(posts.has(&post_key("other")));
    }

    #[test]
    fn revalidate_unknown_tag_is_rejected() {
        let err = service()
            .revalidate(&RevalidateRequest {
                tag: Some("comments".to_string()),
                ..RevalidateRequest::default()
            })
            .expect_err("unknown tag");
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
