use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use yt_pulse::api::{YouTubeClient, build_http_client};
use yt_pulse::config::Config;
use yt_pulse::db::SqliteStore;
use yt_pulse::google_oauth::{CredentialVault, GoogleOauthEndpoints, TokenCipher};
use yt_pulse::router::{PulseState, pulse_router};
use yt_pulse::service::{OrchestratorSettings, SyncOrchestrator, sync_actor};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.loglevel,
        reporting_type = %cfg.reporting_type,
        connection_batch_size = cfg.connection_batch_size,
    );
    if cfg.cron_secret.as_deref().is_none_or(|s| s.trim().is_empty()) {
        warn!("PULSE_CRON_SECRET is not set; /cron/sync will reject every request");
    }

    // configuration errors are fatal before anything touches a connection
    let cipher = TokenCipher::from_base64_key(cfg.require_encryption_key()?)?;
    let (client_id, client_secret) = cfg.require_client_credentials()?;

    let store = SqliteStore::connect(&cfg.database_url).await?;

    let endpoints = GoogleOauthEndpoints::new(
        client_id,
        client_secret,
        &cfg.token_uri,
        build_http_client(&cfg, false)?,
    )?;
    let vault = CredentialVault::new(cipher, endpoints, store.clone(), cfg.token_skew());
    let youtube = YouTubeClient::new(build_http_client(&cfg, true)?, &cfg);

    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        vault,
        youtube,
        OrchestratorSettings::from_config(&cfg),
    );
    let handle = sync_actor::spawn(orchestrator).await?;

    let state = PulseState::new(
        handle.clone(),
        store,
        Arc::from(cfg.pulse_key.as_str()),
        cfg.cron_secret.as_deref().map(Arc::from),
    );
    let app = pulse_router(state);

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    handle.stop();
    Ok(())
}
