use std::{process, sync::Arc};

use headpress::{
    application::{
        admin::AdminService, content::ContentService, error::AppError,
        invalidation::InvalidationGateway, merge::MergeOrchestrator,
    },
    cache::{self, CacheConfig, CacheRegistry, ContentCategory},
    config,
    infra::{
        cms::CmsSources,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::{sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::CheckConfig => check_config(&settings),
    }
}

fn check_config(settings: &config::Settings) -> Result<(), AppError> {
    // Building the adapters validates the CMS section beyond parsing.
    CmsSources::from_settings(settings)?;

    info!(
        target = "headpress::check_config",
        public_addr = %settings.server.public_addr,
        admin_addr = %settings.server.admin_addr,
        graphql = settings.cms.graphql_url.is_some(),
        recommendations = settings.cms.recommendations_url.is_some(),
        merge_deadline_ms = settings.merge.deadline.as_millis(),
        "Configuration is valid"
    );
    for (category, policy) in &settings.cache.policies {
        info!(
            target = "headpress::check_config",
            category = %category,
            ttl_seconds = policy.ttl.as_secs(),
            max_entries = policy.max_entries,
            monitoring = policy.monitoring_enabled,
            "Cache policy"
        );
    }
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let registry = Arc::new(CacheRegistry::new(CacheConfig::from(&settings.cache)));
    let sources = CmsSources::from_settings(&settings)?;

    let merge = MergeOrchestrator::new(
        sources.primary.clone(),
        sources.enrichment.clone(),
        settings.merge.deadline,
    );
    let content = Arc::new(ContentService::new(
        registry.clone(),
        sources.primary,
        merge,
        sources.recommendations,
    ));
    let gateway = Arc::new(InvalidationGateway::new(registry.clone()));
    let admin = Arc::new(AdminService::new(gateway));

    if settings.security.revalidate_secret.is_none() {
        warn!(
            target = "headpress::serve",
            "security.revalidate_secret is unset; /api/revalidate rejects every request"
        );
    }

    let sweeper = cache::spawn_sweeper(registry.clone(), settings.cache.sweep_interval);
    let drain = cache::monitor::spawn_drain(
        registry.signals().clone(),
        settings.cache.monitor_drain_interval,
    );

    warm_up(&content).await;

    let state = HttpState {
        content,
        admin,
        security: Arc::new(settings.security.clone()),
    };
    let result = serve_http(&settings, state).await;

    sweeper.abort();
    let _ = sweeper.await;
    drain.abort();
    let _ = drain.await;
    cache::monitor::flush(registry.signals());

    result
}

/// Prime the taxonomy caches; failures only leave them cold.
async fn warm_up(content: &ContentService) {
    let categories = content.fetch_categories().await;
    let tags = content.fetch_tags().await;
    info!(
        target = "headpress::serve",
        categories = categories.len(),
        tags = tags.len(),
        cached = ?content.registry().sizes().get(&ContentCategory::Categories),
        "Taxonomy caches warmed"
    );
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let public_router = http::build_router(state.clone());
    let admin_router = http::build_admin_router(state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "headpress::serve",
        public_addr = %settings.server.public_addr,
        admin_addr = %settings.server.admin_addr,
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target = "headpress::serve", "Shutdown requested");
        }
        let _ = shutdown_tx.send(true);
    });

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));

    let servers = async {
        try_join!(public_server, admin_server)
            .map(|_| ())
            .map_err(|err| AppError::unexpected(format!("server error: {err}")))
    };
    let grace = settings.server.graceful_shutdown;
    let deadline = async move {
        wait_for_shutdown(shutdown_rx).await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = servers => result,
        () = deadline => {
            warn!(
                target = "headpress::serve",
                grace_seconds = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    // A closed channel also means shutdown.
    let _ = rx.wait_for(|stop| *stop).await;
}
