use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

mod app;
mod http;
mod telegram;

use app::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("CATALOG_CONFIG").ok();
    let config = catalog_core::config::CatalogConfig::load(config_path.as_deref())?;
    config.catalog.validate()?;

    let log_dir = std::env::var("LOG_DIR").ok();
    let (alert_rx, _worker_guard) = catalog_logging::init(
        Arc::new(std::sync::Mutex::new(rusqlite::Connection::open(&config.database.url)?)),
        log_dir.as_deref(),
    )?;

    let state = Arc::new(AppState::new(config)?);

    tokio::spawn(catalog_logging::run_alert_dispatcher(alert_rx, state.alert_sinks()));

    let (shutdown_tx, crm_handle, monitor_handle) = state.spawn_background_workers();

    let disable_bot = state.config.telegram.disable_bot;
    let longpoll_handle = if disable_bot {
        info!("DISABLE_TELEGRAM_BOT=true, webhook-only mode");
        None
    } else {
        info!("DISABLE_TELEGRAM_BOT=false, starting the long-polling dispatcher alongside the webhook route");
        Some(tokio::spawn(telegram::longpoll::run(state.clone())))
    };

    let webhook_path = state.config.telegram.webhook_path.clone();
    let router = Router::new()
        .route("/health", get(http::health::health_handler))
        .route(&webhook_path, post(telegram::webhook::telegram_webhook_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(%addr, webhook_path, "catalog gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain sequence (`spec.md` §5): stop accepting new turns (axum has
    // already returned) → drain in-flight turns → stop C9/C10 → flush
    // logger → release index handles.
    info!("shutting down: signalling background workers to drain");
    let _ = shutdown_tx.send(true);

    let drain = Duration::from_secs(catalog_core::config::DEFAULT_DRAIN_TIMEOUT_SECS);
    if tokio::time::timeout(drain, async {
        let _ = crm_handle.await;
        let _ = monitor_handle.await;
    })
    .await
    .is_err()
    {
        warn!("background workers did not drain within the shutdown budget");
    }
    if let Some(handle) = longpoll_handle {
        handle.abort();
    }

    info!("catalog gateway shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    #[test]
    fn catalog_config_validate_compiles() {
        // Ensures `catalog_core::config::CatalogConfig` stays linked into
        // this binary's test target even as `main` itself is untestable.
        let cfg = catalog_core::config::CatalogSearchConfig::default();
        assert!(cfg.validate().is_ok());
    }
}
