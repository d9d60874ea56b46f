#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use headpress::application::admin::AdminService;
use headpress::application::content::ContentService;
use headpress::application::fetch::{Backend, FetchError};
use headpress::application::invalidation::InvalidationGateway;
use headpress::application::merge::MergeOrchestrator;
use headpress::application::sources::PrimarySource;
use headpress::cache::{CacheConfig, CacheRegistry};
use headpress::config::SecuritySettings;
use headpress::domain::entities::{Media, Post, Term};
use headpress::domain::types::{PostQuery, PostStatus};
use headpress::infra::http::HttpState;
use time::macros::datetime;

pub const REVALIDATE_SECRET: &str = "revalidate-secret";
pub const WEBHOOK_SECRET: &str = "webhook-secret";
pub const ADMIN_TOKEN: &str = "admin-token";

pub fn post(id: u64, slug: &str, category_ids: Vec<u64>) -> Post {
    Post {
        id,
        slug: slug.to_string(),
        status: PostStatus::Publish,
        title: format!("Post {id}"),
        content: "<p>body</p>".to_string(),
        excerpt: "<p>excerpt</p>".to_string(),
        published_at: datetime!(2024-01-01 00:00 UTC),
        modified_at: datetime!(2024-01-02 00:00 UTC),
        author: None,
        featured_media: None,
        category_ids,
        tag_ids: Vec::new(),
        categories: Vec::new(),
        tags: Vec::new(),
    }
}

pub fn term(id: u64, slug: &str) -> Term {
    Term {
        id,
        name: slug.to_string(),
        slug: slug.to_string(),
        count: 1,
        description: None,
    }
}

/// In-memory primary source that counts upstream calls.
pub struct StubCms {
    posts: Vec<Post>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl StubCms {
    pub fn new(posts: Vec<Post>) -> Self {
        Self {
            posts,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::status(Backend::CmsRest, 503));
        }
        Ok(())
    }
}

#[async_trait]
impl PrimarySource for StubCms {
    async fn posts(&self, query: &PostQuery) -> Result<Vec<Post>, FetchError> {
        self.enter()?;
        Ok(self
            .posts
            .iter()
            .filter(|post| {
                query.categories.is_empty()
                    || post.category_ids.iter().any(|id| query.categories.contains(id))
            })
            .filter(|post| !query.exclude.contains(&post.id))
            .take(query.per_page as usize)
            .cloned()
            .collect())
    }

    async fn post_by_slug(&self, slug: &str) -> Result<Option<Post>, FetchError> {
        self.enter()?;
        Ok(self.posts.iter().find(|post| post.slug == slug).cloned())
    }

    async fn post_by_id(&self, id: u64) -> Result<Option<Post>, FetchError> {
        self.enter()?;
        Ok(self.posts.iter().find(|post| post.id == id).cloned())
    }

    async fn categories(&self) -> Result<Vec<Term>, FetchError> {
        self.enter()?;
        Ok(vec![term(1, "rust"), term(2, "web")])
    }

    async fn tags(&self) -> Result<Vec<Term>, FetchError> {
        self.enter()?;
        Ok(vec![term(10, "async")])
    }

    async fn media(&self, id: u64) -> Result<Option<Media>, FetchError> {
        self.enter()?;
        Ok((id == 9).then(|| Media {
            id,
            source_url: "https://cdn.example.com/9.png".to_string(),
            alt_text: String::new(),
            mime_type: Some("image/png".to_string()),
            width: None,
            height: None,
        }))
    }
}

pub fn sample_posts() -> Vec<Post> {
    vec![
        post(1, "hello-world", vec![1]),
        post(2, "second-post", vec![1]),
        post(3, "third-post", vec![2]),
    ]
}

pub struct Harness {
    pub cms: Arc<StubCms>,
    pub registry: Arc<CacheRegistry>,
    pub state: HttpState,
}

pub fn harness() -> Harness {
    let cms = Arc::new(StubCms::new(sample_posts()));
    let registry = Arc::new(CacheRegistry::new(CacheConfig::default()));
    let merge = MergeOrchestrator::new(cms.clone(), None, Duration::from_secs(8));
    let content = Arc::new(ContentService::new(
        registry.clone(),
        cms.clone(),
        merge,
        None,
    ));
    let admin = Arc::new(AdminService::new(Arc::new(InvalidationGateway::new(
        registry.clone(),
    ))));
    let security = SecuritySettings {
        revalidate_secret: Some(REVALIDATE_SECRET.to_string()),
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        admin_token: Some(ADMIN_TOKEN.to_string()),
    };

    Harness {
        cms,
        registry,
        state: HttpState {
            content,
            admin,
            security: Arc::new(security),
        },
    }
}
