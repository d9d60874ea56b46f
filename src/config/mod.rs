//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    num::NonZeroUsize,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::fetch::{FetchOptions, MAX_RETRIES, RetryPolicy};
use crate::cache::{CachePolicy, ContentCategory};

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "headpress";
const ENV_PREFIX: &str = "HEADPRESS";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_USER_AGENT: &str = concat!("headpress/", env!("CARGO_PKG_VERSION"));
const DEFAULT_PRIMARY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_ENRICHMENT_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_RECOMMENDATIONS_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
const DEFAULT_MERGE_DEADLINE_MS: u64 = 8_000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_MONITOR_QUEUE_LEN: u64 = 4_096;
const DEFAULT_MONITOR_DRAIN_INTERVAL_MS: u64 = 1_000;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cms: CmsSettings,
    pub fetch: FetchSettings,
    pub merge: MergeSettings,
    pub cache: CacheSettings,
    pub security: SecuritySettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CmsSettings {
    /// Site root; `/wp-json/wp/v2` is appended by the REST adapter.
    /// Required to serve.
    pub rest_base_url: Option<Url>,
    pub graphql_url: Option<Url>,
    /// When unset, related posts always come from taxonomy overlap.
    pub recommendations_url: Option<Url>,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub primary_timeout: Duration,
    pub enrichment_timeout: Duration,
    pub recommendations_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl FetchSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
        }
    }

    pub fn primary(&self) -> FetchOptions {
        FetchOptions::new(self.primary_timeout, self.retry_policy())
    }

    /// Enrichment is bounded by the merge deadline, so it is not retried.
    pub fn enrichment(&self) -> FetchOptions {
        FetchOptions::new(self.enrichment_timeout, RetryPolicy::none())
    }

    /// A failure here falls back to taxonomy lookup, so it is not retried.
    pub fn recommendations(&self) -> FetchOptions {
        FetchOptions::new(self.recommendations_timeout, RetryPolicy::none())
    }
}

#[derive(Debug, Clone)]
pub struct MergeSettings {
    pub deadline: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub policies: BTreeMap<ContentCategory, CachePolicy>,
    pub sweep_interval: Duration,
    pub monitor_queue_len: NonZeroUsize,
    pub monitor_drain_interval: Duration,
}

/// Shared secrets. An unset secret disables the endpoint it guards.
#[derive(Clone, Default)]
pub struct SecuritySettings {
    pub revalidate_secret: Option<String>,
    pub webhook_secret: Option<String>,
    pub admin_token: Option<String>,
}

impl std::fmt::Debug for SecuritySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("SecuritySettings")
            .field("revalidate_secret", &redact(&self.revalidate_secret))
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("admin_token", &redact(&self.admin_token))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::CheckConfig) | None => {}
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cms: RawCmsSettings,
    fetch: RawFetchSettings,
    merge: RawMergeSettings,
    cache: RawCacheSettings,
    security: RawSecuritySettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.cms_rest_base_url.as_ref() {
            self.cms.rest_base_url = Some(url.clone());
        }
        if let Some(url) = overrides.cms_graphql_url.as_ref() {
            self.cms.graphql_url = Some(url.clone());
        }
        if let Some(url) = overrides.cms_recommendations_url.as_ref() {
            self.cms.recommendations_url = Some(url.clone());
        }
        if let Some(timeout) = overrides.fetch_primary_timeout_ms {
            self.fetch.primary_timeout_ms = Some(timeout);
        }
        if let Some(retries) = overrides.fetch_max_retries {
            self.fetch.max_retries = Some(retries);
        }
        if let Some(deadline) = overrides.merge_deadline_ms {
            self.merge.deadline_ms = Some(deadline);
        }
        if let Some(interval) = overrides.cache_sweep_interval_seconds {
            self.cache.sweep_interval_seconds = Some(interval);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cms,
            fetch,
            merge,
            cache,
            security,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cms: build_cms_settings(cms)?,
            fetch: build_fetch_settings(fetch)?,
            merge: build_merge_settings(merge)?,
            cache: build_cache_settings(cache)?,
            security: build_security_settings(security),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;
    if public_addr == admin_addr {
        return Err(LoadError::invalid(
            "server.admin_port",
            "admin listener must not share the public address",
        ));
    }

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);

    Ok(ServerSettings {
        public_addr,
        admin_addr,
        graceful_shutdown: positive_duration(
            graceful_secs,
            Duration::from_secs,
            "server.graceful_shutdown_seconds",
        )?,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cms_settings(cms: RawCmsSettings) -> Result<CmsSettings, LoadError> {
    let rest_base_url = parse_optional_url(cms.rest_base_url, "cms.rest_base_url")?;
    let graphql_url = match parse_optional_url(cms.graphql_url, "cms.graphql_url")? {
        Some(url) => Some(url),
        None => rest_base_url
            .as_ref()
            .map(|base| {
                let candidate = format!("{}/graphql", base.as_str().trim_end_matches('/'));
                Url::parse(&candidate)
            })
            .transpose()
            .map_err(|err| LoadError::invalid("cms.graphql_url", err.to_string()))?,
    };
    let recommendations_url =
        parse_optional_url(cms.recommendations_url, "cms.recommendations_url")?;

    let connect_timeout = positive_duration(
        cms.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
        Duration::from_millis,
        "cms.connect_timeout_ms",
    )?;

    let user_agent = cms
        .user_agent
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    Ok(CmsSettings {
        rest_base_url,
        graphql_url,
        recommendations_url,
        connect_timeout,
        user_agent,
    })
}

fn build_fetch_settings(fetch: RawFetchSettings) -> Result<FetchSettings, LoadError> {
    Ok(FetchSettings {
        primary_timeout: positive_duration(
            fetch.primary_timeout_ms.unwrap_or(DEFAULT_PRIMARY_TIMEOUT_MS),
            Duration::from_millis,
            "fetch.primary_timeout_ms",
        )?,
        enrichment_timeout: positive_duration(
            fetch
                .enrichment_timeout_ms
                .unwrap_or(DEFAULT_ENRICHMENT_TIMEOUT_MS),
            Duration::from_millis,
            "fetch.enrichment_timeout_ms",
        )?,
        recommendations_timeout: positive_duration(
            fetch
                .recommendations_timeout_ms
                .unwrap_or(DEFAULT_RECOMMENDATIONS_TIMEOUT_MS),
            Duration::from_millis,
            "fetch.recommendations_timeout_ms",
        )?,
        max_retries: bounded_retries(fetch.max_retries.unwrap_or(DEFAULT_MAX_RETRIES))?,
        backoff_base: Duration::from_millis(
            fetch.backoff_base_ms.unwrap_or(DEFAULT_BACKOFF_BASE_MS),
        ),
    })
}

fn bounded_retries(value: u32) -> Result<u32, LoadError> {
    if value > MAX_RETRIES {
        return Err(LoadError::invalid(
            "fetch.max_retries",
            format!("must be at most {MAX_RETRIES}, got {value}"),
        ));
    }
    Ok(value)
}

fn build_merge_settings(merge: RawMergeSettings) -> Result<MergeSettings, LoadError> {
    Ok(MergeSettings {
        deadline: positive_duration(
            merge.deadline_ms.unwrap_or(DEFAULT_MERGE_DEADLINE_MS),
            Duration::from_millis,
            "merge.deadline_ms",
        )?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let RawCacheSettings {
        sweep_interval_seconds,
        monitor_queue_len,
        monitor_drain_interval_ms,
        posts,
        categories,
        tags,
        media,
        search,
    } = cache;

    let mut policies = BTreeMap::new();
    for (category, raw) in [
        (ContentCategory::Posts, posts),
        (ContentCategory::Categories, categories),
        (ContentCategory::Tags, tags),
        (ContentCategory::Media, media),
        (ContentCategory::Search, search),
    ] {
        policies.insert(category, build_category_policy(category, raw)?);
    }

    let queue_len = monitor_queue_len.unwrap_or(DEFAULT_MONITOR_QUEUE_LEN);
    let monitor_queue_len = usize::try_from(queue_len)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| LoadError::invalid("cache.monitor_queue_len", "must be greater than zero"))?;

    Ok(CacheSettings {
        policies,
        sweep_interval: positive_duration(
            sweep_interval_seconds.unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
            Duration::from_secs,
            "cache.sweep_interval_seconds",
        )?,
        monitor_queue_len,
        monitor_drain_interval: positive_duration(
            monitor_drain_interval_ms.unwrap_or(DEFAULT_MONITOR_DRAIN_INTERVAL_MS),
            Duration::from_millis,
            "cache.monitor_drain_interval_ms",
        )?,
    })
}

fn build_category_policy(
    category: ContentCategory,
    raw: RawCategoryPolicy,
) -> Result<CachePolicy, LoadError> {
    let defaults = category.default_policy();

    let ttl = match raw.ttl_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "cache.<category>.ttl_seconds",
                format!("{category}: must be greater than zero"),
            ));
        }
        Some(seconds) => Duration::from_secs(seconds),
        None => defaults.ttl,
    };

    let max_entries = match raw.max_entries {
        Some(0) => {
            return Err(LoadError::invalid(
                "cache.<category>.max_entries",
                format!("{category}: must be greater than zero"),
            ));
        }
        Some(value) => usize::try_from(value).map_err(|_| {
            LoadError::invalid(
                "cache.<category>.max_entries",
                format!("{category}: value exceeds supported range for usize"),
            )
        })?,
        None => defaults.max_entries,
    };

    let policy = CachePolicy::new(ttl, max_entries);
    Ok(if raw.monitoring.unwrap_or(defaults.monitoring_enabled) {
        policy
    } else {
        policy.without_monitoring()
    })
}

fn build_security_settings(security: RawSecuritySettings) -> SecuritySettings {
    let non_empty = |value: Option<String>| {
        value.and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
    };

    SecuritySettings {
        revalidate_secret: non_empty(security.revalidate_secret),
        webhook_secret: non_empty(security.webhook_secret),
        admin_token: non_empty(security.admin_token),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCmsSettings {
    rest_base_url: Option<String>,
    graphql_url: Option<String>,
    recommendations_url: Option<String>,
    connect_timeout_ms: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFetchSettings {
    primary_timeout_ms: Option<u64>,
    enrichment_timeout_ms: Option<u64>,
    recommendations_timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    backoff_base_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMergeSettings {
    deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    sweep_interval_seconds: Option<u64>,
    monitor_queue_len: Option<u64>,
    monitor_drain_interval_ms: Option<u64>,
    posts: RawCategoryPolicy,
    categories: RawCategoryPolicy,
    tags: RawCategoryPolicy,
    media: RawCategoryPolicy,
    search: RawCategoryPolicy,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCategoryPolicy {
    ttl_seconds: Option<u64>,
    max_entries: Option<u64>,
    monitoring: Option<bool>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawSecuritySettings {
    revalidate_secret: Option<String>,
    webhook_secret: Option<String>,
    admin_token: Option<String>,
}

impl std::fmt::Debug for RawSecuritySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSecuritySettings").finish_non_exhaustive()
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_optional_url(value: Option<String>, key: &'static str) -> Result<Option<Url>, LoadError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let url = Url::parse(trimmed)
        .map_err(|err| LoadError::invalid(key, format!("invalid URL `{trimmed}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "URL scheme must be http or https"));
    }
    Ok(Some(url))
}

fn positive_duration(
    value: u64,
    unit: fn(u64) -> Duration,
    key: &'static str,
) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(unit(value))
}
