//! GraphQL endpoint of the CMS, used for enrichment only.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::send_json;
use crate::application::fetch::{Backend, FetchError, ResilientFetcher};
use crate::application::sources::EnrichmentSource;
use crate::domain::entities::{Enrichment, Media, SeoMetadata, Term};

const BACKEND: Backend = Backend::CmsGraphql;

const ENRICHMENT_QUERY: &str = r#"
query PostEnrichment($slug: ID!) {
  post(id: $slug, idType: SLUG) {
    featuredImage { node { databaseId sourceUrl altText mimeType mediaDetails { width height } } }
    categories { nodes { databaseId name slug count description } }
    tags { nodes { databaseId name slug count description } }
    seo {
      title
      metaDesc
      canonical
      opengraphTitle
      opengraphDescription
      opengraphImage { sourceUrl }
      twitterTitle
      twitterDescription
      schema { raw }
    }
  }
}
"#;

pub struct GraphqlSource {
    client: Client,
    endpoint: Url,
    fetcher: ResilientFetcher,
}

impl GraphqlSource {
    pub fn new(client: Client, endpoint: Url, fetcher: ResilientFetcher) -> Self {
        Self {
            client,
            endpoint,
            fetcher,
        }
    }
}

#[async_trait]
impl EnrichmentSource for GraphqlSource {
    async fn enrichment(&self, slug: &str) -> Result<Option<Enrichment>, FetchError> {
        let body = json!({
            "query": ENRICHMENT_QUERY,
            "variables": { "slug": slug },
        });
        let response: GqlResponse = self
            .fetcher
            .request(|| send_json(BACKEND, self.client.post(self.endpoint.clone()).json(&body)))
            .await?;
        response.into_enrichment()
    }
}

#[derive(Debug, Deserialize)]
struct GqlResponse {
    data: Option<GqlData>,
    #[serde(default)]
    errors: Vec<GqlError>,
}

#[derive(Debug, Deserialize)]
struct GqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GqlData {
    post: Option<GqlPost>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlPost {
    featured_image: Option<Edge<GqlMedia>>,
    categories: Option<Nodes<GqlTerm>>,
    tags: Option<Nodes<GqlTerm>>,
    seo: Option<GqlSeo>,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlMedia {
    database_id: u64,
    source_url: Option<String>,
    alt_text: Option<String>,
    mime_type: Option<String>,
    media_details: Option<GqlMediaDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct GqlMediaDetails {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlTerm {
    database_id: u64,
    name: String,
    slug: String,
    count: Option<u64>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlSeo {
    title: Option<String>,
    meta_desc: Option<String>,
    canonical: Option<String>,
    opengraph_title: Option<String>,
    opengraph_description: Option<String>,
    opengraph_image: Option<GqlImage>,
    twitter_title: Option<String>,
    twitter_description: Option<String>,
    schema: Option<GqlSchema>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlImage {
    source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GqlSchema {
    raw: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

impl GqlResponse {
    fn into_enrichment(self) -> Result<Option<Enrichment>, FetchError> {
        let Some(data) = self.data else {
            let message = self
                .errors
                .into_iter()
                .map(|err| err.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FetchError::invalid(BACKEND, message));
        };
        // Partial errors alongside data are tolerated.
        Ok(data.post.map(GqlPost::into_enrichment))
    }
}

impl GqlPost {
    fn into_enrichment(self) -> Enrichment {
        let featured_image = self
            .featured_image
            .and_then(|edge| edge.node)
            .and_then(GqlMedia::into_media);
        let terms = |nodes: Option<Nodes<GqlTerm>>| {
            nodes
                .map(|nodes| nodes.nodes.into_iter().map(Term::from).collect())
                .unwrap_or_default()
        };

        Enrichment {
            seo: self.seo.map(SeoMetadata::from),
            featured_image,
            categories: terms(self.categories),
            tags: terms(self.tags),
        }
    }
}

impl GqlMedia {
    fn into_media(self) -> Option<Media> {
        let source_url = non_empty(self.source_url)?;
        let details = self.media_details.unwrap_or_default();
        Some(Media {
            id: self.database_id,
            source_url,
            alt_text: self.alt_text.unwrap_or_default(),
            mime_type: self.mime_type,
            width: details.width,
            height: details.height,
        })
    }
}

impl From<GqlTerm> for Term {
    fn from(term: GqlTerm) -> Self {
        Term {
            id: term.database_id,
            name: term.name,
            slug: term.slug,
            count: term.count.unwrap_or_default(),
            description: non_empty(term.description),
        }
    }
}

impl From<GqlSeo> for SeoMetadata {
    fn from(seo: GqlSeo) -> Self {
        // Schema arrives as a JSON string; keep it verbatim if it is not JSON.
        let schema = seo.schema.and_then(|schema| non_empty(schema.raw)).map(|raw| {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        });

        SeoMetadata {
            title: non_empty(seo.title),
            description: non_empty(seo.meta_desc),
            canonical: non_empty(seo.canonical),
            og_title: non_empty(seo.opengraph_title),
            og_description: non_empty(seo.opengraph_description),
            og_image: seo.opengraph_image.and_then(|image| non_empty(image.source_url)),
            twitter_title: non_empty(seo.twitter_title),
            twitter_description: non_empty(seo.twitter_description),
            schema,
        }
    }
}
