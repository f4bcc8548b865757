//! Skilllink API Server

use anyhow::Context;
use skilllink_api::{AppState, routes};
use skilllink_config::{LogFormat, LoggingConfig, StorageBackend, SystemConfig};
use skilllink_core::{JobStore, ProviderKey};
use skilllink_db::{MemoryJobRepo, PgJobRepo, create_pool, run_migrations};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("SKILLLINK_CONFIG").unwrap_or_else(|_| "skilllink.kdl".to_string());
    let config = SystemConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path))?
        .with_env_overrides(|key| std::env::var(key).ok());

    init_tracing(&config.logging);
    info!(config = %config_path, "Configuration loaded");

    let session_ttl = chrono::Duration::minutes(i64::from(config.sessions.ttl_minutes));
    let provider_key =
        ProviderKey::new(config.provider_key()?).context("invalid sessions provider-key")?;
    let state = match config.storage_backend()? {
        StorageBackend::Postgres => {
            let url = config
                .database
                .url
                .as_deref()
                .context("database url not configured")?;

            info!("Connecting to database...");
            let pool = create_pool(url, config.database.max_connections).await?;
            run_migrations(&pool).await?;
            info!("Database connected");

            let store: Arc<dyn JobStore> = Arc::new(PgJobRepo::new(pool.clone()));
            AppState::new(store, session_ttl, provider_key).with_pool(pool)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; jobs are lost on restart");
            AppState::new(Arc::new(MemoryJobRepo::new()), session_ttl, provider_key)
        }
    };

    spawn_session_sweeper(&state);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = config.server.listen;
    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Periodically drop expired sessions, so tokens that are never used again
/// do not pile up between sign-ins.
fn spawn_session_sweeper(state: &AppState) {
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sessions.purge_expired().await;
        }
    });
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
