mod admin;
mod content;
mod middleware;
mod public;

pub use admin::build_admin_router;
pub use public::build_router;

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, header::AUTHORIZATION},
};
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::application::{admin::AdminService, content::ContentService};
use crate::config::SecuritySettings;

/// State shared by the public and admin routers.
#[derive(Clone)]
pub struct HttpState {
    pub content: Arc<ContentService>,
    pub admin: Arc<AdminService>,
    pub security: Arc<SecuritySettings>,
}

/// Compare a caller-supplied secret with the configured one. An unset secret
/// matches nothing.
pub(crate) fn secret_matches(expected: Option<&str>, provided: Option<&str>) -> bool {
    match (expected, provided) {
        (Some(expected), Some(provided)) => {
            bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
        }
        _ => false,
    }
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value: &HeaderValue| value.to_str().ok())
        .map(str::trim)
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, AUTHORIZATION.as_str())?.strip_prefix("Bearer ")
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    cached_entries: usize,
}

async fn health(State(state): State<HttpState>) -> Json<HealthBody> {
    let cached_entries = state.content.registry().sizes().values().sum();
    Json(HealthBody {
        status: "ok",
        cached_entries,
    })
}
