//! Title card production pipeline and coordination engine.
//!
//! Boots the reference SQLite store, wires the coordination services
//! (Resolver, Render Coordinator, Uploader, Card-Type Loader) into an
//! `AppContext`, registers the default Scheduler jobs, and serves the
//! minimal HTTP surface of §6.

mod app;
mod assets;
mod blueprint;
mod cardtype;
mod config;
mod connectors;
mod context;
mod error;
mod model;
mod render;
mod resolver;
mod scheduler;
mod security;
mod snapshot;
mod store;
mod uploader;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use app::AppState;
use config::Config;
use context::AppContext;
use scheduler::jobs::{BackupJob, FetchSourcesJob, RefreshEpisodesJob, SetIdsJob, SnapshotJob, SyncJob, TranslateJob, WatchedSyncJob};
use scheduler::Scheduler;
use security::CredentialCipher;
use store::sqlite::Store;

/// The default cron schedule for every job this binary registers.
/// `build_cards`/`load_cards` are deliberately absent — they require
/// an injected `RenderBackend`/`MediaServer` wiring this binary does
/// not fabricate on its own (§1); an embedder that supplies a real
/// `RenderBackend` registers those two and adds them here.
const DEFAULT_SCHEDULES: &[(&str, &str)] = &[
    ("sync", "0 0 * * * *"),
    ("refresh_episodes", "0 15 * * * *"),
    ("set_ids", "0 30 * * * *"),
    ("translate", "0 45 0 * * *"),
    ("fetch_sources", "0 0 1 * * *"),
    ("watched_sync", "0 */15 * * * *"),
    ("snapshot", "0 0 3 * * *"),
    ("backup", "0 0 4 * * *"),
];

struct IdentityCompressor;

impl assets::compression::JpegCompressor for IdentityCompressor {
    fn recompress(&self, bytes: &[u8], _quality: u8) -> Result<Vec<u8>, error::TcmError> {
        Ok(bytes.to_vec())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "tcm_core=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("configuration loaded");

    let credential_key = std::env::var("TCM_CREDENTIAL_KEY").unwrap_or_else(|_| {
        tracing::warn!("TCM_CREDENTIAL_KEY not set, generating an ephemeral key for this process only");
        CredentialCipher::generate_key()
    });
    let credential_cipher = CredentialCipher::from_base64_key(&credential_key)?;

    let database_url = format!("sqlite://{}?mode=rwc", config.database_path.display());
    let store = Store::connect(&database_url, credential_cipher).await?;
    tracing::info!(path = %config.database_path.display(), "store connected");

    let connectors = Arc::new(connectors::ConnectorRegistry::new());
    let card_types = Arc::new(cardtype::CardTypeLoader::new(
        reqwest::Client::new(),
        "https://raw.githubusercontent.com".to_string(),
        config.asset_directory.join("card_types"),
    ));

    // The real re-encode kernel behind `JpegCompressor` is injected by
    // whatever embeds this crate (§1 Non-goal); this binary's own
    // default never needs one since it doesn't register `load_cards`.
    let compressor: Arc<dyn assets::compression::JpegCompressor> = Arc::new(IdentityCompressor);

    let ctx = Arc::new(AppContext::new(config.clone(), &store, connectors, card_types, compressor));

    let mut scheduler = Scheduler::new(ctx.job_runs.clone());
    scheduler.register(Arc::new(SyncJob { ctx: ctx.clone() }));
    scheduler.register(Arc::new(RefreshEpisodesJob { ctx: ctx.clone() }));
    scheduler.register(Arc::new(SetIdsJob { ctx: ctx.clone() }));
    scheduler.register(Arc::new(TranslateJob { ctx: ctx.clone() }));
    scheduler.register(Arc::new(FetchSourcesJob { ctx: ctx.clone() }));
    scheduler.register(Arc::new(WatchedSyncJob { ctx: ctx.clone() }));
    scheduler.register(Arc::new(SnapshotJob { ctx: ctx.clone() }));
    // No user-facing config *file* exists in this core (§1), so
    // `config_path` has nothing to point at yet; the database half of
    // the backup contract is exercised regardless.
    scheduler.register(Arc::new(BackupJob { ctx: ctx.clone(), database_path: config.database_path.clone(), config_path: None }));
    let scheduler = Arc::new(scheduler);

    let _cron_driver = scheduler.clone().start(DEFAULT_SCHEDULES).await?;
    tracing::info!("scheduler started");

    let state = AppState { ctx, scheduler };
    let http_app = app::router()
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.http_host, config.http_port).parse()?;
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, http_app).await?;

    Ok(())
}
