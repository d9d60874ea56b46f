//! Cached content operations exposed to the rendering layer.
//!
//! Each operation consults its category cache first and fetches on a miss.
//! Failures are logged and reported as an empty result or `None`; they are
//! never cached.

use std::sync::Arc;

use tracing::{debug, error};

use crate::application::fallback::{Answered, fetch_with_fallback};
use crate::application::fetch::FetchError;
use crate::application::merge::MergeOrchestrator;
use crate::application::sources::{PrimarySource, RecommendationSource};
use crate::cache::keys::{TAXONOMY_KEY, list_key, media_key, post_key, related_key};
use crate::cache::{CacheRegistry, CachedContent, ContentCategory};
use crate::domain::entities::{Media, MergedPost, Post, RelatedPost, Term};
use crate::domain::slug::normalize_slug;
use crate::domain::types::{MAX_PER_PAGE, PostQuery};

pub struct ContentService {
    registry: Arc<CacheRegistry>,
    primary: Arc<dyn PrimarySource>,
    merge: MergeOrchestrator,
    recommendations: Option<Arc<dyn RecommendationSource>>,
}

impl ContentService {
    pub fn new(
        registry: Arc<CacheRegistry>,
        primary: Arc<dyn PrimarySource>,
        merge: MergeOrchestrator,
        recommendations: Option<Arc<dyn RecommendationSource>>,
    ) -> Self {
        Self {
            registry,
            primary,
            merge,
            recommendations,
        }
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    /// Post listing; searches are cached in their own category.
    pub async fn fetch_posts(&self, query: &PostQuery) -> Arc<Vec<Post>> {
        let query = query.normalized();
        let category = if query.is_search() {
            ContentCategory::Search
        } else {
            ContentCategory::Posts
        };
        let cache = self.registry.get_cache(category);
        let key = list_key(&query);

        if let Some(CachedContent::Posts(posts)) = cache.get(&key) {
            return posts;
        }

        match self.primary.posts(&query).await {
            Ok(posts) => {
                let posts = Arc::new(posts);
                cache.set(&key, CachedContent::Posts(posts.clone()));
                posts
            }
            Err(err) => {
                log_primary_failure("fetch_posts", &key, &err);
                Arc::new(Vec::new())
            }
        }
    }

    /// Single post with optional enrichment. `None` for unknown or invalid
    /// slugs and for primary failures.
    pub async fn fetch_post_by_slug(&self, slug: &str) -> Option<Arc<MergedPost>> {
        let slug = match normalize_slug(slug) {
            Ok(slug) => slug,
            Err(err) => {
                debug!(
                    target = "headpress::application::content",
                    slug,
                    error = %err,
                    "Rejected post lookup"
                );
                return None;
            }
        };
        let cache = self.registry.get_cache(ContentCategory::Posts);
        let key = post_key(&slug);

        if let Some(CachedContent::Post(post)) = cache.get(&key) {
            return Some(post);
        }

        match self.merge.fetch_merged(&slug).await {
            Ok(Some(merged)) => {
                let merged = Arc::new(merged);
                cache.set(&key, CachedContent::Post(merged.clone()));
                Some(merged)
            }
            Ok(None) => None,
            Err(err) => {
                log_primary_failure("fetch_post_by_slug", &key, &err);
                None
            }
        }
    }

    pub async fn fetch_categories(&self) -> Arc<Vec<Term>> {
        self.fetch_terms(ContentCategory::Categories).await
    }

    pub async fn fetch_tags(&self) -> Arc<Vec<Term>> {
        self.fetch_terms(ContentCategory::Tags).await
    }

    /// Related posts from the recommendation service, falling back to
    /// taxonomy overlap when it is unavailable or has nothing.
    pub async fn fetch_related_posts(&self, post_id: u64, limit: usize) -> Arc<Vec<RelatedPost>> {
        let limit = limit.min(MAX_PER_PAGE as usize);
        if limit == 0 {
            return Arc::new(Vec::new());
        }

        let cache = self.registry.get_cache(ContentCategory::Posts);
        let key = related_key(post_id, limit);

        if let Some(CachedContent::Related(related)) = cache.get(&key) {
            return related;
        }

        // A list naming only the post itself counts as empty and falls back.
        let recommended = async {
            match &self.recommendations {
                Some(source) => source
                    .recommendations(post_id, limit)
                    .await
                    .map(|recommendations| {
                        let mut posts = recommendations.posts;
                        posts.retain(|candidate| candidate.id != post_id);
                        posts
                    }),
                None => Ok(Vec::new()),
            }
        };

        let result = fetch_with_fallback::<RelatedPost, RelatedPost, Post, _, _, _>(
            recommended,
            || self.related_by_taxonomy(post_id, limit),
        )
        .await;

        match result {
            Ok((mut related, answered)) => {
                related.retain(|candidate| candidate.id != post_id);
                related.truncate(limit);
                debug!(
                    target = "headpress::application::content",
                    post_id,
                    count = related.len(),
                    source = match answered {
                        Answered::Primary => "recommendations",
                        Answered::Secondary => "taxonomy",
                    },
                    "Resolved related posts"
                );
                let related = Arc::new(related);
                // Empty lists stay uncached; the post may be unknown or not yet published.
                if !related.is_empty() {
                    cache.set(&key, CachedContent::Related(related.clone()));
                }
                related
            }
            Err(err) => {
                log_primary_failure("fetch_related_posts", &key, &err);
                Arc::new(Vec::new())
            }
        }
    }

    pub async fn fetch_media(&self, media_id: u64) -> Option<Arc<Media>> {
        let cache = self.registry.get_cache(ContentCategory::Media);
        let key = media_key(media_id);

        if let Some(CachedContent::Media(media)) = cache.get(&key) {
            return Some(media);
        }

        match self.primary.media(media_id).await {
            Ok(Some(media)) => {
                let media = Arc::new(media);
                cache.set(&key, CachedContent::Media(media.clone()));
                Some(media)
            }
            Ok(None) => None,
            Err(err) => {
                log_primary_failure("fetch_media", &key, &err);
                None
            }
        }
    }

    async fn fetch_terms(&self, category: ContentCategory) -> Arc<Vec<Term>> {
        let cache = self.registry.get_cache(category);

        if let Some(CachedContent::Terms(terms)) = cache.get(TAXONOMY_KEY) {
            return terms;
        }

        let result = match category {
            ContentCategory::Tags => self.primary.tags().await,
            _ => self.primary.categories().await,
        };

        match result {
            Ok(terms) => {
                let terms = Arc::new(terms);
                cache.set(TAXONOMY_KEY, CachedContent::Terms(terms.clone()));
                terms
            }
            Err(err) => {
                log_primary_failure("fetch_terms", TAXONOMY_KEY, &err);
                Arc::new(Vec::new())
            }
        }
    }

    /// Posts sharing the categories of `post_id`, or its tags when no
    /// category neighbour exists.
    async fn related_by_taxonomy(&self, post_id: u64, limit: usize) -> Result<Vec<Post>, FetchError> {
        let Some(post) = self.primary.post_by_id(post_id).await? else {
            return Ok(Vec::new());
        };

        let base = PostQuery {
            per_page: limit as u32,
            exclude: vec![post.id],
            ..PostQuery::default()
        };

        if !post.category_ids.is_empty() {
            let by_category = self
                .primary
                .posts(&PostQuery {
                    categories: post.category_ids.clone(),
                    ..base.clone()
                })
                .await?;
            if !by_category.is_empty() {
                return Ok(by_category);
            }
        }

        if post.tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.primary
            .posts(&PostQuery {
                tags: post.tag_ids.clone(),
                ..base
            })
            .await
    }
}

fn log_primary_failure(operation: &'static str, key: &str, err: &FetchError) {
    error!(
        target = "headpress::application::content",
        operation,
        key,
        backend = %err.backend,
        kind = %err.kind,
        error = %err,
        "Content fetch failed; serving empty result"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;
    use crate::application::fetch::Backend;
    use crate::cache::CacheConfig;
    use crate::domain::entities::Recommendations;
    use crate::domain::types::PostStatus;

    fn post(id: u64, slug: &str, categories: Vec<u64>, tags: Vec<u64>) -> Post {
        Post {
            id,
            slug: slug.to_string(),
            status: PostStatus::Publish,
            title: slug.to_uppercase(),
            content: String::new(),
            excerpt: String::new(),
            published_at: OffsetDateTime::UNIX_EPOCH,
            modified_at: OffsetDateTime::UNIX_EPOCH,
            author: None,
            featured_media: None,
            category_ids: categories,
            tag_ids: tags,
            categories: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[derive(Default)]
    struct FakeCms {
        posts: Vec<Post>,
        fail: bool,
        calls: AtomicUsize,
        queries: Mutex<Vec<PostQuery>>,
    }

    impl FakeCms {
        fn outcome<T>(&self, value: T) -> Result<T, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(FetchError::status(Backend::CmsRest, 503))
            } else {
                Ok(value)
            }
        }
    }

    #[async_trait]
    impl PrimarySource for FakeCms {
        async fn posts(&self, query: &PostQuery) -> Result<Vec<Post>, FetchError> {
            self.queries
                .lock()
                .expect("queries lock")
                .push(query.clone());
            let matches = self
                .posts
                .iter()
                .filter(|post| !query.exclude.contains(&post.id))
                .filter(|post| {
                    query.categories.is_empty()
                        || post.category_ids.iter().any(|id| query.categories.contains(id))
                })
                .filter(|post| {
                    query.tags.is_empty() || post.tag_ids.iter().any(|id| query.tags.contains(id))
                })
                .cloned()
                .collect();
            self.outcome(matches)
        }

        async fn post_by_slug(&self, slug: &str) -> Result<Option<Post>, FetchError> {
            let found = self.posts.iter().find(|post| post.slug == slug).cloned();
            self.outcome(found)
        }

        async fn post_by_id(&self, id: u64) -> Result<Option<Post>, FetchError> {
            let found = self.posts.iter().find(|post| post.id == id).cloned();
            self.outcome(found)
        }

        async fn categories(&self) -> Result<Vec<Term>, FetchError> {
            self.outcome(vec![Term {
                id: 1,
                name: "Rust".to_string(),
                slug: "rust".to_string(),
                count: 2,
                description: None,
            }])
        }

        async fn tags(&self) -> Result<Vec<Term>, FetchError> {
            self.outcome(Vec::new())
        }

        async fn media(&self, _id: u64) -> Result<Option<Media>, FetchError> {
            self.outcome(None)
        }
    }

    struct FakeRecommendations(Result<Vec<RelatedPost>, FetchError>);

    #[async_trait]
    impl RecommendationSource for FakeRecommendations {
        async fn recommendations(
            &self,
            _post_id: u64,
            _limit: usize,
        ) -> Result<Recommendations, FetchError> {
            self.0.clone().map(|posts| Recommendations {
                posts,
                metadata: None,
            })
        }
    }

    fn service(
        cms: Arc<FakeCms>,
        recommendations: Option<Arc<dyn RecommendationSource>>,
    ) -> ContentService {
        let registry = Arc::new(CacheRegistry::new(CacheConfig::default()));
        let merge = MergeOrchestrator::new(cms.clone(), None, Duration::from_secs(8));
        ContentService::new(registry, cms, merge, recommendations)
    }

    fn blog() -> Vec<Post> {
        vec![
            post(1, "first", vec![10], vec![]),
            post(2, "second", vec![10], vec![]),
            post(3, "third", vec![20], vec![5]),
            post(4, "fourth", vec![30], vec![5]),
        ]
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let cms = Arc::new(FakeCms {
            posts: blog(),
            ..FakeCms::default()
        });
        let service = service(cms.clone(), None);

        let first = service.fetch_post_by_slug("First").await.expect("found");
        let second = service.fetch_post_by_slug("first").await.expect("found");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cms.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_empty_and_not_cached() {
        let cms = Arc::new(FakeCms {
            posts: blog(),
            fail: true,
            ..FakeCms::default()
        });
        let service = service(cms.clone(), None);

        assert!(service.fetch_posts(&PostQuery::default()).await.is_empty());
        assert!(service.fetch_post_by_slug("first").await.is_none());
        assert!(service.fetch_categories().await.is_empty());
        assert_eq!(service.registry().stats().total_entries, 0);
    }

    #[tokio::test]
    async fn searches_are_cached_in_search_category() {
        let cms = Arc::new(FakeCms {
            posts: blog(),
            ..FakeCms::default()
        });
        let service = service(cms, None);

        service
            .fetch_posts(&PostQuery {
                search: Some("rust".to_string()),
                ..PostQuery::default()
            })
            .await;
        service.fetch_posts(&PostQuery::default()).await;

        let sizes = service.registry().sizes();
        assert_eq!(sizes[&ContentCategory::Search], 1);
        assert_eq!(sizes[&ContentCategory::Posts], 1);
    }

    #[tokio::test]
    async fn taxonomy_fallback_excludes_the_post_itself() {
        let cms = Arc::new(FakeCms {
            posts: blog(),
            ..FakeCms::default()
        });
        let service = service(cms, None);

        let related = service.fetch_related_posts(1, 5).await;

        assert_eq!(
            related.iter().map(|post| post.id).collect::<Vec<_>>(),
            vec![2]
        );
    }

    #[tokio::test]
    async fn taxonomy_fallback_uses_tags_when_categories_have_no_neighbours() {
        let cms = Arc::new(FakeCms {
            posts: blog(),
            ..FakeCms::default()
        });
        let service = service(cms.clone(), None);

        let related = service.fetch_related_posts(3, 5).await;

        assert_eq!(
            related.iter().map(|post| post.id).collect::<Vec<_>>(),
            vec![4]
        );
        let queries = cms.queries.lock().expect("queries lock");
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].tags, vec![5]);
    }

    #[tokio::test]
    async fn recommendations_win_when_they_have_results() {
        let cms = Arc::new(FakeCms {
            posts: blog(),
            ..FakeCms::default()
        });
        let recommended = RelatedPost::from(&post(4, "fourth", vec![], vec![]));
        let service = service(
            cms.clone(),
            Some(Arc::new(FakeRecommendations(Ok(vec![recommended])))),
        );

        let related = service.fetch_related_posts(1, 3).await;

        assert_eq!(related[0].slug, "fourth");
        assert_eq!(cms.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_recommendations_fall_back_to_taxonomy() {
        let cms = Arc::new(FakeCms {
            posts: blog(),
            ..FakeCms::default()
        });
        let service = service(
            cms,
            Some(Arc::new(FakeRecommendations(Err(FetchError::network(
                Backend::Recommendations,
                "refused",
            ))))),
        );

        let related = service.fetch_related_posts(1, 3).await;

        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, 2);
    }

    #[tokio::test]
    async fn self_only_recommendations_fall_back_to_taxonomy() {
        let cms = Arc::new(FakeCms {
            posts: blog(),
            ..FakeCms::default()
        });
        let itself = RelatedPost::from(&post(1, "first", vec![], vec![]));
        let service = service(
            cms,
            Some(Arc::new(FakeRecommendations(Ok(vec![itself])))),
        );

        let related = service.fetch_related_posts(1, 3).await;

        assert_eq!(
            related.iter().map(|post| post.id).collect::<Vec<_>>(),
            vec![2]
        );
    }

    #[tokio::test]
    async fn unknown_post_has_no_related_and_is_not_cached() {
        let cms = Arc::new(FakeCms {
            posts: blog(),
            ..FakeCms::default()
        });
        let service = service(cms.clone(), None);

        assert!(service.fetch_related_posts(99, 3).await.is_empty());
        assert!(service.fetch_related_posts(99, 3).await.is_empty());

        assert_eq!(cms.calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.registry().sizes()[&ContentCategory::Posts], 0);
    }

    #[tokio::test]
    async fn zero_limit_skips_every_source() {
        let cms = Arc::new(FakeCms::default());
        let service = service(cms.clone(), None);

        assert!(service.fetch_related_posts(1, 0).await.is_empty());
        assert_eq!(cms.calls.load(Ordering::SeqCst), 0);
    }
}
