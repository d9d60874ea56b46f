//! Primary-then-secondary lookup for list-shaped results.

use std::future::Future;

use tracing::{debug, warn};

use crate::application::fetch::FetchError;

/// Which source produced a [`fetch_with_fallback`] result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answered {
    Primary,
    Secondary,
}

/// Await `primary`; when it fails or yields nothing, call `secondary` instead.
///
/// Items from either side are converted into `T`. The chain fails only if
/// both sources fail, in which case the secondary's error is returned. A
/// primary that answered with an empty list is not a failure, so a secondary
/// error after it yields that empty list.
pub async fn fetch_with_fallback<T, A, B, P, S, SF>(
    primary: P,
    secondary: S,
) -> Result<(Vec<T>, Answered), FetchError>
where
    P: Future<Output = Result<Vec<A>, FetchError>>,
    S: FnOnce() -> SF,
    SF: Future<Output = Result<Vec<B>, FetchError>>,
    A: Into<T>,
    B: Into<T>,
{
    let primary_failed = match primary.await {
        Ok(items) if !items.is_empty() => {
            return Ok((normalize(items), Answered::Primary));
        }
        Ok(_) => {
            debug!(
                target = "headpress::application::fallback",
                "Primary source returned nothing; trying secondary"
            );
            false
        }
        Err(err) => {
            warn!(
                target = "headpress::application::fallback",
                backend = %err.backend,
                error = %err,
                "Primary source failed; trying secondary"
            );
            true
        }
    };

    match secondary().await {
        Ok(items) => Ok((normalize(items), Answered::Secondary)),
        Err(err) if primary_failed => Err(err),
        Err(err) => {
            warn!(
                target = "headpress::application::fallback",
                backend = %err.backend,
                error = %err,
                "Secondary source failed after empty primary result"
            );
            Ok((Vec::new(), Answered::Primary))
        }
    }
}

fn normalize<T, U: Into<T>>(items: Vec<U>) -> Vec<T> {
    items.into_iter().map(Into::into).collect()
}
