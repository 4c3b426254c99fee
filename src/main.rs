//! Custodian - rule-driven media library maintenance service
//!
//! Main entry point: loads configuration, connects the database, wires up
//! whichever external sources are configured and serves the REST API while
//! the job scheduler runs scans and action passes in the background.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use custodian::config::Config;
use custodian::db::Database;
use custodian::jobs::{self, JobContext, ScheduleRegistry};
use custodian::media::{MediaReconciler, ReconcilerConfig};
use custodian::services::{
    OverseerrClient, PlexClient, QbittorrentClient, ServarrClient, ServarrEndpoint, TautulliClient,
};
use custodian::{api, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env()?);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "custodian=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Custodian");

    let db = Database::connect(&config.database_path).await?;
    db.migrate().await?;
    tracing::info!("Database connected and migrated");

    // At least one Servarr instance is required; everything else degrades
    let radarr = endpoint(&config.radarr_url, &config.radarr_api_key);
    let sonarr = endpoint(&config.sonarr_url, &config.sonarr_api_key);
    if radarr.is_none() && sonarr.is_none() {
        anyhow::bail!("Neither RADARR_URL nor SONARR_URL is configured");
    }
    let library = Arc::new(ServarrClient::new(radarr, sonarr));

    let mut reconciler = MediaReconciler::new(
        library.clone(),
        ReconcilerConfig {
            concurrency: config.scan_concurrency,
            source_timeout: Duration::from_secs(config.source_timeout_secs),
        },
    );

    if let (Some(url), Some(key)) = (&config.tautulli_url, &config.tautulli_api_key) {
        reconciler =
            reconciler.with_watch_tracker(Arc::new(TautulliClient::new(url.clone(), key.clone())));
        tracing::info!("Tautulli watch tracker configured");
    }
    if let (Some(url), Some(token)) = (&config.plex_url, &config.plex_token) {
        reconciler =
            reconciler.with_media_server(Arc::new(PlexClient::new(url.clone(), token.clone())));
        tracing::info!("Plex media server configured");
    }
    if let (Some(url), Some(key)) = (&config.overseerr_url, &config.overseerr_api_key) {
        reconciler = reconciler
            .with_request_broker(Arc::new(OverseerrClient::new(url.clone(), key.clone())));
        tracing::info!("Overseerr request broker configured");
    }
    if let (Some(url), Some(user), Some(pass)) = (
        &config.qbittorrent_url,
        &config.qbittorrent_username,
        &config.qbittorrent_password,
    ) {
        reconciler = reconciler.with_download_manager(Arc::new(QbittorrentClient::new(
            url.clone(),
            user.clone(),
            pass.clone(),
        )));
        tracing::info!("qBittorrent download manager configured");
    }
    let reconciler = Arc::new(reconciler);

    let registry = Arc::new(ScheduleRegistry::new());
    let ctx = Arc::new(JobContext::new(
        db.clone(),
        reconciler.clone(),
        library,
        config.clone(),
    ));
    let scheduler = jobs::start_scheduler(ctx, registry.clone()).await?;

    let state = AppState {
        config: config.clone(),
        db,
        reconciler,
        registry,
        scheduler,
    };

    let app = api::router()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn endpoint(url: &Option<String>, api_key: &Option<String>) -> Option<ServarrEndpoint> {
    match (url, api_key) {
        (Some(url), Some(key)) => Some(ServarrEndpoint {
            base_url: url.trim_end_matches('/').to_string(),
            api_key: key.clone(),
        }),
        _ => None,
    }
}
