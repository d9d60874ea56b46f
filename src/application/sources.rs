//! Seams between content orchestration and the backends that answer it.

use async_trait::async_trait;

use crate::application::fetch::FetchError;
use crate::domain::entities::{Enrichment, Media, Post, Recommendations, Term};
use crate::domain::types::PostQuery;

/// Low-latency source of the authoritative post fields.
#[async_trait]
pub trait PrimarySource: Send + Sync {
    async fn posts(&self, query: &PostQuery) -> Result<Vec<Post>, FetchError>;

    async fn post_by_slug(&self, slug: &str) -> Result<Option<Post>, FetchError>;

    async fn post_by_id(&self, id: u64) -> Result<Option<Post>, FetchError>;

    async fn categories(&self) -> Result<Vec<Term>, FetchError>;

    async fn tags(&self) -> Result<Vec<Term>, FetchError>;

    async fn media(&self, id: u64) -> Result<Option<Media>, FetchError>;
}

/// Slower source of optional fields for a single post.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// `Ok(None)` when the source has nothing for `slug`.
    async fn enrichment(&self, slug: &str) -> Result<Option<Enrichment>, FetchError>;
}

#[async_trait]
pub trait RecommendationSource: Send + Sync {
    async fn recommendations(
        &self,
        post_id: u64,
        limit: usize,
    ) -> Result<Recommendations, FetchError>;
}
