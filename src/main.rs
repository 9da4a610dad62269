//! Jobboard server

use anyhow::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobboard::{
    api::{self, AppState},
    cache::create_cache,
    config::{resolve_config_path, Config},
    db,
    services::CredentialDecryptor,
};

const RATE_LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
const CHANNEL_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobboard=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting jobboard {}", env!("CARGO_PKG_VERSION"));

    let config_path = resolve_config_path(std::env::args().skip(1));
    let config = Config::load_with_env(&config_path)?;
    tracing::info!("Configuration loaded from {}", config_path.display());

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    let cache = create_cache(&config.cache).await?;
    tracing::info!("Cache initialized: {}", cache.backend_name());

    let credentials = Arc::new(CredentialDecryptor::load_or_generate(
        &config.auth.private_key_path,
    )?);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let expiry_interval = Duration::from_secs(config.subscriptions.expiry_check_interval_seconds.max(1));
    let state = AppState::build(config, pool.clone(), cache, credentials);

    let cancel = state.shutdown.clone();
    let mut tasks = Vec::new();

    {
        let limiter = state.user_service.rate_limiter().clone();
        tasks.push(spawn_periodic(
            "rate limiter cleanup",
            RATE_LIMITER_CLEANUP_INTERVAL,
            cancel.clone(),
            move || {
                let limiter = limiter.clone();
                async move {
                    let removed = limiter.cleanup().await;
                    if removed > 0 {
                        tracing::debug!("Rate limiter dropped {} stale entries", removed);
                    }
                }
            },
        ));
    }
    {
        let users = state.user_service.clone();
        tasks.push(spawn_periodic(
            "session cleanup",
            SESSION_CLEANUP_INTERVAL,
            cancel.clone(),
            move || {
                let users = users.clone();
                async move {
                    match users.cleanup_expired_sessions().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!("Removed {} expired sessions", n),
                        Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                    }
                }
            },
        ));
    }
    {
        let hub = state.notifications.clone();
        tasks.push(spawn_periodic(
            "notification channel prune",
            CHANNEL_PRUNE_INTERVAL,
            cancel.clone(),
            move || {
                let hub = hub.clone();
                async move {
                    hub.prune();
                }
            },
        ));
    }
    tasks.push(
        state
            .subscription_service
            .clone()
            .spawn_expiry_task(expiry_interval, cancel.clone()),
    );

    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(cancel.clone()))
    .await?;

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    pool.close().await;
    tracing::info!("Server stopped");

    Ok(())
}

/// Run `job` every `interval` until `cancel` fires.
fn spawn_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    cancel: CancellationToken,
    job: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => job().await,
            }
        }
        tracing::debug!("Background task '{}' stopped", name);
    })
}

/// Resolves on Ctrl-C, SIGTERM, or when `cancel` fires elsewhere.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => {},
    }

    tracing::info!("Shutdown signal received");
    // SSE streams and background tasks end with the token
    cancel.cancel();
}
