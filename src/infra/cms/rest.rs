//! CMS REST API (`/wp-json/wp/v2`), the primary source.

use std::collections::BTreeMap;
use std::future::Future;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;
use url::Url;

use super::{classify, parse_timestamp, read_json, send_json_optional};
use crate::application::fetch::{Backend, FetchError, ResilientFetcher};
use crate::application::sources::PrimarySource;
use crate::domain::entities::{Author, Media, Post, Term};
use crate::domain::types::{PostQuery, PostStatus};

const BACKEND: Backend = Backend::CmsRest;
const API_PATH: &str = "wp-json/wp/v2/";
const TAXONOMY_PAGE_SIZE: usize = 100;
/// Upper bound on taxonomy pages read per listing.
const MAX_TAXONOMY_PAGES: u32 = 50;
/// Error code returned when a listing page is past the last one.
const INVALID_PAGE_CODE: &str = "rest_post_invalid_page_number";

pub struct RestSource {
    client: Client,
    api_base: Url,
    fetcher: ResilientFetcher,
}

impl RestSource {
    pub fn new(client: Client, site: &Url, fetcher: ResilientFetcher) -> Result<Self, url::ParseError> {
        let mut site = site.clone();
        if !site.path().ends_with('/') {
            let path = format!("{}/", site.path());
            site.set_path(&path);
        }
        let api_base = site.join(API_PATH)?;
        Ok(Self {
            client,
            api_base,
            fetcher,
        })
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url, FetchError> {
        let mut url = self
            .api_base
            .join(path)
            .map_err(|err| FetchError::invalid(BACKEND, format!("bad path `{path}`: {err}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn list_posts(&self, url: Url) -> Result<Vec<Post>, FetchError> {
        let wire: Vec<WpPost> = self
            .fetcher
            .request(|| fetch_page(self.client.get(url.clone())))
            .await?;
        wire.into_iter().map(Post::try_from).collect()
    }

    async fn list_terms(&self, taxonomy: &str) -> Result<Vec<Term>, FetchError> {
        let wire: Vec<WpTerm> = collect_pages(taxonomy, |page| async move {
            let url = self.endpoint(
                taxonomy,
                &[
                    ("page", page.to_string()),
                    ("per_page", TAXONOMY_PAGE_SIZE.to_string()),
                    ("hide_empty", "true".to_string()),
                ],
            )?;
            self.fetcher
                .request(|| fetch_page(self.client.get(url.clone())))
                .await
        })
        .await?;
        Ok(wire.into_iter().map(Term::from).collect())
    }
}

/// Read pages from 1 until one comes back short of [`TAXONOMY_PAGE_SIZE`].
async fn collect_pages<T, F, Fut>(listing: &str, mut fetch: F) -> Result<Vec<T>, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, FetchError>>,
{
    let mut items = Vec::new();
    for page in 1..=MAX_TAXONOMY_PAGES {
        let batch = fetch(page).await?;
        let short = batch.len() < TAXONOMY_PAGE_SIZE;
        items.extend(batch);
        if short {
            return Ok(items);
        }
    }
    warn!(
        target = "headpress::infra::cms::rest",
        listing,
        pages = MAX_TAXONOMY_PAGES,
        "Listing page limit reached; remaining terms were not read"
    );
    Ok(items)
}

/// A page number past the end is an empty page, not an error.
async fn fetch_page<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<Vec<T>, FetchError> {
    let response = request.send().await.map_err(|err| classify(BACKEND, err))?;
    if response.status() == StatusCode::BAD_REQUEST {
        let body = response.text().await.map_err(|err| classify(BACKEND, err))?;
        if body.contains(INVALID_PAGE_CODE) {
            return Ok(Vec::new());
        }
        return Err(FetchError::status(BACKEND, StatusCode::BAD_REQUEST.as_u16()));
    }
    read_json(BACKEND, response).await
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn listing_params(query: &PostQuery) -> Vec<(&'static str, String)> {
    let query = query.normalized();
    let mut params = vec![
        ("_embed", "1".to_string()),
        ("page", query.page.to_string()),
        ("per_page", query.per_page.to_string()),
    ];
    if let Some(search) = query.search {
        params.push(("search", search));
    }
    if !query.categories.is_empty() {
        params.push(("categories", join_ids(&query.categories)));
    }
    if !query.tags.is_empty() {
        params.push(("tags", join_ids(&query.tags)));
    }
    if !query.exclude.is_empty() {
        params.push(("exclude", join_ids(&query.exclude)));
    }
    params
}

#[async_trait]
impl PrimarySource for RestSource {
    async fn posts(&self, query: &PostQuery) -> Result<Vec<Post>, FetchError> {
        let url = self.endpoint("posts", &listing_params(query))?;
        self.list_posts(url).await
    }

    async fn post_by_slug(&self, slug: &str) -> Result<Option<Post>, FetchError> {
        let url = self.endpoint(
            "posts",
            &[("slug", slug.to_string()), ("_embed", "1".to_string())],
        )?;
        Ok(self.list_posts(url).await?.into_iter().next())
    }

    async fn post_by_id(&self, id: u64) -> Result<Option<Post>, FetchError> {
        let url = self.endpoint(&format!("posts/{id}"), &[("_embed", "1".to_string())])?;
        let wire: Option<WpPost> = self
            .fetcher
            .request(|| send_json_optional(BACKEND, self.client.get(url.clone())))
            .await?;
        wire.map(Post::try_from).transpose()
    }

    async fn categories(&self) -> Result<Vec<Term>, FetchError> {
        self.list_terms("categories").await
    }

    async fn tags(&self) -> Result<Vec<Term>, FetchError> {
        self.list_terms("tags").await
    }

    async fn media(&self, id: u64) -> Result<Option<Media>, FetchError> {
        let url = self.endpoint(&format!("media/{id}"), &[])?;
        let wire: Option<WpMedia> = self
            .fetcher
            .request(|| send_json_optional(BACKEND, self.client.get(url.clone())))
            .await?;
        Ok(wire.and_then(WpMedia::into_media))
    }
}

#[derive(Debug, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct WpPost {
    id: u64,
    slug: String,
    status: PostStatus,
    title: Rendered,
    content: Rendered,
    excerpt: Rendered,
    date_gmt: String,
    modified_gmt: String,
    #[serde(default)]
    categories: Vec<u64>,
    #[serde(default)]
    tags: Vec<u64>,
    #[serde(default, rename = "_embedded")]
    embedded: Option<WpEmbedded>,
}

#[derive(Debug, Default, Deserialize)]
struct WpEmbedded {
    #[serde(default)]
    author: Vec<WpAuthor>,
    #[serde(default, rename = "wp:featuredmedia")]
    featured_media: Vec<WpMedia>,
    #[serde(default, rename = "wp:term")]
    terms: Vec<Vec<WpTerm>>,
}

#[derive(Debug, Deserialize)]
struct WpAuthor {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    avatar_urls: BTreeMap<String, String>,
}

/// Embedded media may be an error object when the attachment is private,
/// so every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WpMedia {
    id: u64,
    source_url: String,
    alt_text: String,
    mime_type: Option<String>,
    media_details: Option<WpMediaDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WpMediaDetails {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WpTerm {
    id: u64,
    name: String,
    slug: String,
    #[serde(default)]
    taxonomy: String,
    #[serde(default)]
    count: u64,
    #[serde(default)]
    description: Option<String>,
}

impl WpMedia {
    fn into_media(self) -> Option<Media> {
        if self.id == 0 || self.source_url.is_empty() {
            return None;
        }
        let details = self.media_details.unwrap_or_default();
        Some(Media {
            id: self.id,
            source_url: self.source_url,
            alt_text: self.alt_text,
            mime_type: self.mime_type,
            width: details.width,
            height: details.height,
        })
    }
}

impl From<WpTerm> for Term {
    fn from(term: WpTerm) -> Self {
        Term {
            id: term.id,
            name: term.name,
            slug: term.slug,
            count: term.count,
            description: term.description.filter(|text| !text.is_empty()),
        }
    }
}

impl From<WpAuthor> for Author {
    fn from(author: WpAuthor) -> Self {
        // Largest avatar wins; keys are pixel sizes.
        let avatar_url = author
            .avatar_urls
            .iter()
            .max_by_key(|(size, _)| size.parse::<u32>().unwrap_or_default())
            .map(|(_, url)| url.clone());
        Author {
            id: author.id,
            name: author.name,
            slug: author.slug,
            avatar_url,
        }
    }
}

impl TryFrom<WpPost> for Post {
    type Error = FetchError;

    fn try_from(wire: WpPost) -> Result<Self, Self::Error> {
        let published_at = parse_timestamp(&wire.date_gmt).ok_or_else(|| {
            FetchError::decode(BACKEND, format!("post {}: bad date_gmt", wire.id))
        })?;
        let modified_at = parse_timestamp(&wire.modified_gmt).ok_or_else(|| {
            FetchError::decode(BACKEND, format!("post {}: bad modified_gmt", wire.id))
        })?;

        let embedded = wire.embedded.unwrap_or_default();
        let author = embedded.author.into_iter().next().map(Author::from);
        let featured_media = embedded
            .featured_media
            .into_iter()
            .next()
            .and_then(WpMedia::into_media);

        let mut categories = Vec::new();
        let mut tags = Vec::new();
        for term in embedded.terms.into_iter().flatten() {
            match term.taxonomy.as_str() {
                "category" => categories.push(Term::from(term)),
                "post_tag" => tags.push(Term::from(term)),
                _ => {}
            }
        }

        Ok(Post {
            id: wire.id,
            slug: wire.slug,
            status: wire.status,
            title: wire.title.rendered,
            content: wire.content.rendered,
            excerpt: wire.excerpt.rendered,
            published_at,
            modified_at,
            author,
            featured_media,
            category_ids: wire.categories,
            tag_ids: wire.tags,
            categories,
            tags,
        })
    }
}
