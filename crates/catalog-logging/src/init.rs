use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::dispatcher::alert_channel;
use crate::layer::HybridLayer;
use crate::types::CriticalAlert;

/// Installs the process-wide subscriber: a `DEBUG/INFO` fmt layer over
/// stdout (or a daily-rotating file, matching `danielmriley-aigent`'s
/// `tracing-appender` usage) plus the `HybridLayer` durable/alert sink.
/// Returns the alert receiver for the caller to hand to
/// [`crate::dispatcher::run_alert_dispatcher`], and a guard that must be
/// held for the process lifetime to keep the non-blocking file writer
/// flushing.
pub fn init(
    db: Arc<Mutex<Connection>>,
    log_dir: Option<&str>,
) -> crate::error::Result<(tokio::sync::mpsc::Receiver<CriticalAlert>, Option<WorkerGuard>)> {
    let (alert_tx, alert_rx) = alert_channel();
    let hybrid = HybridLayer::new(db, alert_tx)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (fmt_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "catalog.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (
                tracing_subscriber::fmt::layer().with_writer(non_blocking).boxed(),
                Some(guard),
            )
        }
        None => (tracing_subscriber::fmt::layer().boxed(), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(hybrid)
        .init();

    Ok((alert_rx, guard))
}
