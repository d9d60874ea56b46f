//! Concurrent primary + enrichment fetch for a single post.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::application::fetch::FetchError;
use crate::application::sources::{EnrichmentSource, PrimarySource};
use crate::domain::entities::{Enrichment, MergedPost, Post};

pub const DEFAULT_MERGE_DEADLINE: Duration = Duration::from_secs(8);

enum FirstDone<P, E> {
    Primary(P),
    Enrichment(E),
}

pub struct MergeOrchestrator {
    primary: Arc<dyn PrimarySource>,
    enrichment: Option<Arc<dyn EnrichmentSource>>,
    deadline: Duration,
}

impl MergeOrchestrator {
    pub fn new(
        primary: Arc<dyn PrimarySource>,
        enrichment: Option<Arc<dyn EnrichmentSource>>,
        deadline: Duration,
    ) -> Self {
        Self {
            primary,
            enrichment,
            deadline,
        }
    }

    /// Fetch `slug` from both sources at once.
    ///
    /// A primary failure fails the call and `Ok(None)` means the post does not
    /// exist. Enrichment that fails, is missing, or is still pending when the
    /// deadline passes yields [`MergedPost::PrimaryOnly`].
    pub async fn fetch_merged(&self, slug: &str) -> Result<Option<MergedPost>, FetchError> {
        let Some(source) = self.enrichment.as_ref() else {
            return Ok(self
                .primary
                .post_by_slug(slug)
                .await?
                .map(MergedPost::PrimaryOnly));
        };

        let started_at = Instant::now();
        let primary = self.primary.post_by_slug(slug);
        let enrichment = tokio::time::timeout_at(started_at + self.deadline, source.enrichment(slug));
        tokio::pin!(primary);
        tokio::pin!(enrichment);

        let first = tokio::select! {
            post = &mut primary => FirstDone::Primary(post),
            outcome = &mut enrichment => FirstDone::Enrichment(outcome),
        };

        let (post, early) = match first {
            FirstDone::Primary(post) => (post, None),
            FirstDone::Enrichment(outcome) => (primary.await, Some(outcome)),
        };

        let Some(post) = post? else {
            return Ok(None);
        };

        let outcome = match early {
            Some(outcome) => outcome,
            None => enrichment.await,
        };

        let merged = match outcome {
            Ok(Ok(Some(extra))) if !extra.is_empty() => merge(post, extra),
            Ok(Ok(_)) => {
                debug!(
                    target = "headpress::application::merge",
                    slug,
                    "No enrichment available"
                );
                MergedPost::PrimaryOnly(post)
            }
            Ok(Err(err)) => {
                warn!(
                    target = "headpress::application::merge",
                    slug,
                    backend = %err.backend,
                    error = %err,
                    "Enrichment failed; serving primary fields only"
                );
                MergedPost::PrimaryOnly(post)
            }
            Err(_) => {
                warn!(
                    target = "headpress::application::merge",
                    slug,
                    deadline_ms = self.deadline.as_millis() as u64,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Enrichment missed merge deadline; serving primary fields only"
                );
                MergedPost::PrimaryOnly(post)
            }
        };

        Ok(Some(merged))
    }
}

/// Fill gaps in the primary fields from the enrichment. Primary values win.
fn merge(mut post: Post, enrichment: Enrichment) -> MergedPost {
    if post.featured_media.is_none() {
        post.featured_media = enrichment.featured_image.clone();
    }
    if post.categories.is_empty() {
        post.categories = enrichment.categories.clone();
    }
    if post.tags.is_empty() {
        post.tags = enrichment.tags.clone();
    }
    MergedPost::Merged { post, enrichment }
}
