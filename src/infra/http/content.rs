//! Read-only JSON views over [`ContentService`] for the rendering layer.
//!
//! Upstream failures have already been turned into empty lists or `None`
//! by the service, so these handlers only fail on bad input.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;

use crate::application::{
    content::ContentService,
    error::{AppError, HttpError},
};
use crate::domain::entities::{Media, MergedPost, Post, RelatedPost, Term};
use crate::domain::types::{DEFAULT_PER_PAGE, PostQuery};

use super::HttpState;

const DEFAULT_RELATED_LIMIT: usize = 3;

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/api/posts", get(list_posts))
        .route("/api/posts/{slug}", get(post_by_slug))
        .route("/api/related/{post_id}", get(related_posts))
        .route("/api/categories", get(categories))
        .route("/api/tags", get(tags))
        .route("/api/media/{media_id}", get(media))
}

/// Listing parameters; id filters are comma separated.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListingQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    search: Option<String>,
    categories: Option<String>,
    tags: Option<String>,
    exclude: Option<String>,
}

fn parse_ids(field: &str, raw: Option<&str>) -> Result<Vec<u64>, AppError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| AppError::validation(format!("{field}: `{part}` is not an id")))
        })
        .collect()
}

impl TryFrom<ListingQuery> for PostQuery {
    type Error = AppError;

    fn try_from(query: ListingQuery) -> Result<Self, Self::Error> {
        Ok(PostQuery {
            page: query.page.unwrap_or(1),
            per_page: query.per_page.unwrap_or(DEFAULT_PER_PAGE),
            categories: parse_ids("categories", query.categories.as_deref())?,
            tags: parse_ids("tags", query.tags.as_deref())?,
            exclude: parse_ids("exclude", query.exclude.as_deref())?,
            search: query.search,
        })
    }
}

fn service(state: &HttpState) -> &ContentService {
    state.content.as_ref()
}

fn not_found(what: &'static str, detail: String) -> HttpError {
    HttpError::new(
        "infra::http::content",
        StatusCode::NOT_FOUND,
        what,
        detail,
    )
}

async fn list_posts(
    State(state): State<HttpState>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Arc<Vec<Post>>>, AppError> {
    let query = PostQuery::try_from(query)?;
    Ok(Json(service(&state).fetch_posts(&query).await))
}

async fn post_by_slug(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
) -> Result<Json<Arc<MergedPost>>, HttpError> {
    service(&state)
        .fetch_post_by_slug(&slug)
        .await
        .map(Json)
        .ok_or_else(|| not_found("Post not found", format!("no post for slug `{slug}`")))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedQuery {
    limit: Option<usize>,
}

async fn related_posts(
    State(state): State<HttpState>,
    Path(post_id): Path<u64>,
    Query(query): Query<RelatedQuery>,
) -> Json<Arc<Vec<RelatedPost>>> {
    let limit = query.limit.unwrap_or(DEFAULT_RELATED_LIMIT);
    Json(service(&state).fetch_related_posts(post_id, limit).await)
}

async fn categories(State(state): State<HttpState>) -> Json<Arc<Vec<Term>>> {
    Json(service(&state).fetch_categories().await)
}

async fn tags(State(state): State<HttpState>) -> Json<Arc<Vec<Term>>> {
    Json(service(&state).fetch_tags().await)
}

async fn media(
    State(state): State<HttpState>,
    Path(media_id): Path<u64>,
) -> Result<Json<Arc<Media>>, HttpError> {
    service(&state)
        .fetch_media(media_id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("Media not found", format!("no media with id {media_id}")))
}
