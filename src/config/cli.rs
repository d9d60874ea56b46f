use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the headpress binary.
#[derive(Debug, Parser)]
#[command(
    name = "headpress",
    version,
    about = "Caching content gateway for a headless CMS"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "HEADPRESS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public and administrative HTTP listeners.
    Serve(Box<ServeArgs>),
    /// Resolve and validate configuration, print a summary, and exit.
    #[command(name = "check-config")]
    CheckConfig,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the CMS REST API base URL.
    #[arg(long = "cms-rest-base-url", value_name = "URL")]
    pub cms_rest_base_url: Option<String>,

    /// Override the CMS GraphQL endpoint.
    #[arg(long = "cms-graphql-url", value_name = "URL")]
    pub cms_graphql_url: Option<String>,

    /// Override the recommendation service endpoint.
    #[arg(long = "cms-recommendations-url", value_name = "URL")]
    pub cms_recommendations_url: Option<String>,

    /// Override the per-attempt timeout for primary fetches.
    #[arg(long = "fetch-primary-timeout-ms", value_name = "MILLIS")]
    pub fetch_primary_timeout_ms: Option<u64>,

    /// Override the number of retries after a failed attempt.
    #[arg(long = "fetch-max-retries", value_name = "COUNT")]
    pub fetch_max_retries: Option<u32>,

    /// Override how long a post lookup waits for enrichment.
    #[arg(long = "merge-deadline-ms", value_name = "MILLIS")]
    pub merge_deadline_ms: Option<u64>,

    /// Override the expiry sweep interval.
    #[arg(long = "cache-sweep-interval-seconds", value_name = "SECONDS")]
    pub cache_sweep_interval_seconds: Option<u64>,
}
