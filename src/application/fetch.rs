//! Resilient outbound fetch.
//!
//! Every call to a content backend goes through [`ResilientFetcher`], which
//! bounds each attempt with a timeout, retries transient failures with
//! exponential backoff and records one [`FetchAttempt`] per try.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Upper bound on retries accepted from configuration.
pub const MAX_RETRIES: u32 = 10;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

pub const METRIC_FETCH_ATTEMPT_MS: &str = "headpress_fetch_attempt_ms";
pub const METRIC_FETCH_RETRY: &str = "headpress_fetch_retry_total";

/// Named upstream a request is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// CMS REST API, the primary source.
    CmsRest,
    /// CMS GraphQL API, used for SEO and taxonomy enrichment.
    CmsGraphql,
    Recommendations,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::CmsRest => "cms_rest",
            Backend::CmsGraphql => "cms_graphql",
            Backend::Recommendations => "recommendations",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Network,
    /// Upstream answered with a non-success HTTP status.
    Status(u16),
    /// Response body did not match the expected shape.
    Decode,
    /// The request could not be built from the caller's input.
    Invalid,
}

impl FetchErrorKind {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchErrorKind::Timeout | FetchErrorKind::Network => true,
            FetchErrorKind::Status(status) => (500..600).contains(status),
            FetchErrorKind::Decode | FetchErrorKind::Invalid => false,
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::Timeout => f.write_str("timeout"),
            FetchErrorKind::Network => f.write_str("network error"),
            FetchErrorKind::Status(status) => write!(f, "status {status}"),
            FetchErrorKind::Decode => f.write_str("decode error"),
            FetchErrorKind::Invalid => f.write_str("invalid request"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{backend} request failed ({kind}): {message}")]
pub struct FetchError {
    pub backend: Backend,
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(backend: Backend, kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            backend,
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(backend: Backend, after: Duration) -> Self {
        Self::new(
            backend,
            FetchErrorKind::Timeout,
            format!("no response within {} ms", after.as_millis()),
        )
    }

    pub fn network(backend: Backend, message: impl Into<String>) -> Self {
        Self::new(backend, FetchErrorKind::Network, message)
    }

    pub fn status(backend: Backend, status: u16) -> Self {
        Self::new(
            backend,
            FetchErrorKind::Status(status),
            format!("upstream returned {status}"),
        )
    }

    pub fn decode(backend: Backend, message: impl Into<String>) -> Self {
        Self::new(backend, FetchErrorKind::Decode, message)
    }

    pub fn invalid(backend: Backend, message: impl Into<String>) -> Self {
        Self::new(backend, FetchErrorKind::Invalid, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Retry bound and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base: Duration::ZERO,
        }
    }

    /// First attempt plus retries, with retries capped at [`MAX_RETRIES`].
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.min(MAX_RETRIES) + 1
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based):
    /// `backoff_base * 2^attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Bound on a single attempt.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl FetchOptions {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Error,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::Error => "error",
        }
    }
}

/// One outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchAttempt {
    pub backend: Backend,
    /// 1-based.
    pub attempt: u32,
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
}

/// Final result together with every attempt made to reach it.
#[derive(Debug)]
pub struct FetchReport<T> {
    pub result: Result<T, FetchError>,
    pub attempts: Vec<FetchAttempt>,
}

/// Timeout/retry wrapper bound to one backend.
#[derive(Debug, Clone, Copy)]
pub struct ResilientFetcher {
    backend: Backend,
    options: FetchOptions,
}

impl ResilientFetcher {
    pub fn new(backend: Backend, options: FetchOptions) -> Self {
        Self { backend, options }
    }

    /// Run `call` until it succeeds, fails terminally, or the retry budget is
    /// spent. The last error is returned on exhaustion.
    pub async fn request<T, F, Fut>(&self, call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.request_with_report(call).await.result
    }

    pub async fn request_with_report<T, F, Fut>(&self, mut call: F) -> FetchReport<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.options.retry.max_attempts();
        let mut attempts = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started_at = Instant::now();
            // On timeout the in-flight future is dropped here.
            let result = match tokio::time::timeout(self.options.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::timeout(self.backend, self.options.timeout)),
            };
            let elapsed = started_at.elapsed();

            let outcome = match &result {
                Ok(_) => AttemptOutcome::Success,
                Err(err) if err.kind == FetchErrorKind::Timeout => AttemptOutcome::Timeout,
                Err(_) => AttemptOutcome::Error,
            };
            attempts.push(self.record(attempt, elapsed, outcome));

            let err = match result {
                Ok(value) => {
                    return FetchReport {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= max_attempts {
                warn!(
                    target = "headpress::application::fetch",
                    backend = %self.backend,
                    attempt,
                    retryable = err.is_retryable(),
                    error = %err,
                    "Fetch failed"
                );
                return FetchReport {
                    result: Err(err),
                    attempts,
                };
            }

            let delay = self.options.retry.delay_after(attempt);
            debug!(
                target = "headpress::application::fetch",
                backend = %self.backend,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after transient failure"
            );
            counter!(METRIC_FETCH_RETRY, "backend" => self.backend.as_str()).increment(1);
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, attempt: u32, elapsed: Duration, outcome: AttemptOutcome) -> FetchAttempt {
        histogram!(
            METRIC_FETCH_ATTEMPT_MS,
            "backend" => self.backend.as_str(),
            "outcome" => outcome.as_str()
        )
        .record(elapsed.as_secs_f64() * 1000.0);

        debug!(
            target = "headpress::application::fetch",
            backend = %self.backend,
            attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            outcome = outcome.as_str(),
            "Fetch attempt finished"
        );

        FetchAttempt {
            backend: self.backend,
            attempt,
            elapsed,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fetcher(max_retries: u32) -> ResilientFetcher {
        ResilientFetcher::new(
            Backend::CmsRest,
            FetchOptions::new(
                Duration::from_secs(1),
                RetryPolicy {
                    max_retries,
                    backoff_base: Duration::from_secs(1),
                },
            ),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_retry_budget_is_capped() {
        let policy = RetryPolicy {
            max_retries: u32::MAX,
            backoff_base: Duration::from_millis(1),
        };
        assert_eq!(policy.max_attempts(), MAX_RETRIES + 1);

        let fetcher = ResilientFetcher::new(
            Backend::CmsRest,
            FetchOptions::new(Duration::from_secs(1), policy),
        );
        let report = fetcher
            .request_with_report(|| async { Ok::<_, FetchError>(7) })
            .await;
        assert_eq!(report.result.expect("first attempt succeeds"), 7);
        assert_eq!(report.attempts.len(), 1);

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let report = fetcher
            .request_with_report(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(FetchError::status(Backend::CmsRest, 503)) }
            })
            .await;
        assert!(report.result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }

    #[test]
    fn classification_splits_client_and_server_errors() {
        assert!(FetchError::timeout(Backend::CmsRest, Duration::from_secs(1)).is_retryable());
        assert!(FetchError::network(Backend::CmsRest, "reset").is_retryable());
        assert!(FetchError::status(Backend::CmsRest, 503).is_retryable());
        assert!(!FetchError::status(Backend::CmsRest, 404).is_retryable());
        assert!(!FetchError::status(Backend::CmsRest, 429).is_retryable());
        assert!(!FetchError::decode(Backend::CmsRest, "bad json").is_retryable());
        assert!(!FetchError::invalid(Backend::CmsRest, "empty slug").is_retryable());
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.max_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let started_at = Instant::now();

        let report = fetcher(2)
            .request_with_report(|| {
                let calls = calls.clone();
                async move {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 | 1 => Err(FetchError::network(Backend::CmsRest, "connection reset")),
                        _ => Ok("post"),
                    }
                }
            })
            .await;

        assert_eq!(report.result.expect("third attempt succeeds"), "post");
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(
            report
                .attempts
                .iter()
                .map(|attempt| attempt.outcome)
                .collect::<Vec<_>>(),
            vec![
                AttemptOutcome::Error,
                AttemptOutcome::Error,
                AttemptOutcome::Success
            ]
        );
        assert!(started_at.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let report = fetcher(2)
            .request_with_report(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(FetchError::status(Backend::CmsRest, 404))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(
            report.result.expect_err("terminal").kind,
            FetchErrorKind::Status(404)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_attempts_are_abandoned_and_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let report = fetcher(1)
            .request_with_report(|| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        std::future::pending::<()>().await;
                    }
                    Ok(42)
                }
            })
            .await;

        assert_eq!(report.result.expect("second attempt"), 42);
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::Timeout);
        assert!(report.attempts[0].elapsed >= Duration::from_secs(1));
        assert!(report.attempts[0].elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_surfaces_last_error() {
        let calls = Arc::new(AtomicU32::new(0));

        let err = fetcher(2)
            .request(|| {
                let calls = calls.clone();
                async move {
                    let status = 500 + calls.fetch_add(1, Ordering::SeqCst) as u16;
                    Err::<(), _>(FetchError::status(Backend::CmsRest, status))
                }
            })
            .await
            .expect_err("all attempts fail");

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.kind, FetchErrorKind::Status(502));
    }
}
