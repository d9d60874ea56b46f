use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{parse_timestamp, send_json};
use crate::application::fetch::{Backend, FetchError, ResilientFetcher};
use crate::application::sources::RecommendationSource;
use crate::domain::entities::{RecommendationMetadata, Recommendations, RelatedPost};

const BACKEND: Backend = Backend::Recommendations;

/// Client for the related-posts service.
pub struct RecommendationClient {
    client: Client,
    endpoint: Url,
    fetcher: ResilientFetcher,
}

impl RecommendationClient {
    pub fn new(client: Client, endpoint: Url, fetcher: ResilientFetcher) -> Self {
        Self {
            client,
            endpoint,
            fetcher,
        }
    }
}

#[async_trait]
impl RecommendationSource for RecommendationClient {
    async fn recommendations(
        &self,
        post_id: u64,
        limit: usize,
    ) -> Result<Recommendations, FetchError> {
        let body = RecommendationRequest { post_id, limit };
        let response: RecommendationResponse = self
            .fetcher
            .request(|| send_json(BACKEND, self.client.post(self.endpoint.clone()).json(&body)))
            .await?;
        response.into_recommendations()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationRequest {
    post_id: u64,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct RecommendationResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    posts: Vec<WireRelated>,
    #[serde(default)]
    metadata: Option<RecommendationMetadata>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct WireRelated {
    id: u64,
    slug: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    excerpt: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default, alias = "featuredImage")]
    featured_image: Option<String>,
}

impl RecommendationResponse {
    fn into_recommendations(self) -> Result<Recommendations, FetchError> {
        if !self.success {
            let message = self
                .message
                .unwrap_or_else(|| "service reported failure".to_string());
            return Err(FetchError::decode(BACKEND, message));
        }
        let posts = self
            .posts
            .into_iter()
            .map(|post| RelatedPost {
                id: post.id,
                slug: post.slug,
                title: post.title,
                excerpt: post.excerpt.filter(|text| !text.is_empty()),
                published_at: post.date.as_deref().and_then(parse_timestamp),
                featured_image: post.featured_image.filter(|url| !url.is_empty()),
            })
            .collect();
        Ok(Recommendations {
            posts,
            metadata: self.metadata,
        })
    }
}
