//! HTTP adapters for the CMS and the recommendation service.
//!
//! Each adapter wraps its calls in a [`ResilientFetcher`] and maps the wire
//! format into domain entities.

mod graphql;
mod recommendations;
mod rest;

use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

pub use graphql::GraphqlSource;
pub use recommendations::RecommendationClient;
pub use rest::RestSource;

use crate::application::fetch::{Backend, FetchError, FetchErrorKind, ResilientFetcher};
use crate::application::sources::{EnrichmentSource, PrimarySource, RecommendationSource};
use crate::config::Settings;
use crate::infra::error::InfraError;

/// Adapters built from configuration.
pub struct CmsSources {
    pub primary: Arc<dyn PrimarySource>,
    pub enrichment: Option<Arc<dyn EnrichmentSource>>,
    pub recommendations: Option<Arc<dyn RecommendationSource>>,
}

impl CmsSources {
    pub fn from_settings(settings: &Settings) -> Result<Self, InfraError> {
        let cms = &settings.cms;
        let rest_base = cms.rest_base_url.clone().ok_or_else(|| {
            InfraError::configuration("cms.rest_base_url is required to serve content")
        })?;

        let client = Client::builder()
            .user_agent(cms.user_agent.clone())
            .connect_timeout(cms.connect_timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        let primary = RestSource::new(
            client.clone(),
            &rest_base,
            ResilientFetcher::new(Backend::CmsRest, settings.fetch.primary()),
        )
        .map_err(|err| InfraError::configuration(format!("cms.rest_base_url: {err}")))?;

        let enrichment = cms.graphql_url.clone().map(|endpoint| {
            Arc::new(GraphqlSource::new(
                client.clone(),
                endpoint,
                ResilientFetcher::new(Backend::CmsGraphql, settings.fetch.enrichment()),
            )) as Arc<dyn EnrichmentSource>
        });

        let recommendations = cms.recommendations_url.clone().map(|endpoint| {
            Arc::new(RecommendationClient::new(
                client.clone(),
                endpoint,
                ResilientFetcher::new(Backend::Recommendations, settings.fetch.recommendations()),
            )) as Arc<dyn RecommendationSource>
        });

        Ok(Self {
            primary: Arc::new(primary),
            enrichment,
            recommendations,
        })
    }
}

/// Map a transport failure onto the fetch taxonomy.
pub(crate) fn classify(backend: Backend, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::new(backend, FetchErrorKind::Timeout, err.to_string())
    } else if let Some(status) = err.status() {
        FetchError::status(backend, status.as_u16())
    } else if err.is_decode() {
        FetchError::decode(backend, err.to_string())
    } else if err.is_builder() {
        FetchError::invalid(backend, err.to_string())
    } else {
        FetchError::network(backend, err.to_string())
    }
}

/// Send `request` and decode a JSON body from a success response.
pub(crate) async fn send_json<T: DeserializeOwned>(
    backend: Backend,
    request: RequestBuilder,
) -> Result<T, FetchError> {
    let response = request.send().await.map_err(|err| classify(backend, err))?;
    read_json(backend, response).await
}

/// Like [`send_json`], with 404 mapped to `None`.
pub(crate) async fn send_json_optional<T: DeserializeOwned>(
    backend: Backend,
    request: RequestBuilder,
) -> Result<Option<T>, FetchError> {
    let response = request.send().await.map_err(|err| classify(backend, err))?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    read_json(backend, response).await.map(Some)
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    backend: Backend,
    response: Response,
) -> Result<T, FetchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::status(backend, status.as_u16()));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|err| classify(backend, err))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| FetchError::decode(backend, format!("failed to parse body: {err}")))
}

/// Parse a CMS timestamp: RFC 3339, or the offset-less GMT form used by
/// `date_gmt`/`modified_gmt`.
pub(crate) fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(parsed);
    }
    PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            value,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        )
    })
    .ok()
    .map(PrimitiveDateTime::assume_utc)
}
