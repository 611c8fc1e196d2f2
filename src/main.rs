use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &drivehub::config::CONFIG;

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
        listen = %cfg.listen,
        loglevel = %cfg.loglevel,
        sync_concurrency = cfg.sync_concurrency,
    );

    // Missing or malformed encryption key refuses to start the process.
    let codec = Arc::new(drivehub::crypto::CredentialCodec::from_config()?);

    let store = drivehub::db::open(&cfg.database_url, codec).await?;

    let registry = Arc::new(drivehub::connectors::ConnectorRegistry::from_config(cfg)?);
    info!(providers = ?registry.available(), "configured providers");

    let sync = drivehub::sync::SyncService::new(store.clone(), registry.clone(), cfg.sync_concurrency);

    let state = drivehub::server::HubState::new(store, registry, sync);
    let app = drivehub::server::hub_router(state);

    let listener = TcpListener::bind(&cfg.listen).await?;
    info!("HTTP server listening on {}", cfg.listen);
    axum::serve(listener, app).await?;
    Ok(())
}
