use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderMap,
    middleware,
    routing::get,
};
use serde::Deserialize;

use crate::application::{
    admin::{AdminAction, AdminResponse},
    error::AppError,
};

use super::{
    HttpState, bearer_token, health,
    middleware::{log_responses, set_request_context},
    secret_matches,
};

pub fn build_admin_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/cache", get(cache_action).post(cache_action))
        .route("/health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ActionParams {
    action: Option<String>,
}

/// `?action=` for GET; a JSON body `{"action": ...}` takes precedence on POST.
async fn cache_action(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Query(query): Query<ActionParams>,
    body: Option<Json<ActionParams>>,
) -> Result<Json<AdminResponse>, AppError> {
    if !secret_matches(state.security.admin_token.as_deref(), bearer_token(&headers)) {
        return Err(AppError::Unauthorized);
    }

    let raw = body
        .and_then(|Json(params)| params.action)
        .or(query.action)
        .unwrap_or_default();
    let action = raw
        .parse::<AdminAction>()
        .map_err(|err| AppError::validation(err.to_string()))?;

    Ok(Json(state.admin.execute(&action)))
}
