use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::HeaderMap,
    middleware,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::application::{
    admin::RevalidateRequest, error::AppError, invalidation::InvalidationSummary,
};
use crate::domain::types::ContentNotification;

use super::{
    HttpState, content, header_str, health,
    middleware::{log_responses, set_request_context},
    secret_matches,
};

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/revalidate", get(revalidate).post(revalidate))
        .route("/api/webhooks/content", post(content_webhook))
        .merge(content::routes())
        .route("/health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RevalidateQuery {
    secret: Option<String>,
    path: Option<String>,
    tag: Option<String>,
    all: Option<bool>,
}

#[derive(Debug, Serialize)]
struct RevalidateBody {
    success: bool,
    revalidated: bool,
    removed: usize,
}

async fn revalidate(
    State(state): State<HttpState>,
    Query(query): Query<RevalidateQuery>,
) -> Result<Json<RevalidateBody>, AppError> {
    if !secret_matches(
        state.security.revalidate_secret.as_deref(),
        query.secret.as_deref(),
    ) {
        return Err(AppError::Unauthorized);
    }

    let request = RevalidateRequest {
        path: query.path,
        tag: query.tag,
        all: query.all,
    };
    let removed = state.admin.revalidate(&request)?;
    Ok(Json(RevalidateBody {
        success: true,
        revalidated: true,
        removed,
    }))
}

#[derive(Debug, Serialize)]
struct WebhookBody {
    success: bool,
    #[serde(flatten)]
    summary: InvalidationSummary,
}

async fn content_webhook(
    State(state): State<HttpState>,
    headers: HeaderMap,
    payload: Result<Json<ContentNotification>, JsonRejection>,
) -> Result<Json<WebhookBody>, AppError> {
    if !secret_matches(
        state.security.webhook_secret.as_deref(),
        header_str(&headers, WEBHOOK_SECRET_HEADER),
    ) {
        return Err(AppError::Unauthorized);
    }

    let Json(notification) =
        payload.map_err(|rejection| AppError::validation(rejection.body_text()))?;
    let summary = state
        .admin
        .gateway()
        .handle_notification(&notification);
    Ok(Json(WebhookBody {
        success: true,
        summary,
    }))
}
