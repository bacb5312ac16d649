use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::types::CriticalAlert;

/// Out-of-band channel a CRITICAL alert can be fanned out to. `catalog-notify`
/// provides the Telegram and email implementations; this crate only defines
/// the seam so it never depends on the notifier crate.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: &CriticalAlert);
}

/// How many CRITICAL alerts may be in flight before `try_send` starts
/// shedding them (`spec.md` §4.11's bounded buffer).
pub const ALERT_CHANNEL_CAPACITY: usize = 64;

pub fn alert_channel() -> (
    tokio::sync::mpsc::Sender<CriticalAlert>,
    tokio::sync::mpsc::Receiver<CriticalAlert>,
) {
    tokio::sync::mpsc::channel(ALERT_CHANNEL_CAPACITY)
}

/// Drains the alert channel and fans each alert out to every sink
/// concurrently. Same shape as `catalog-notify`'s proactive delivery loop:
/// a plain `while let Some(..) = rx.recv().await` with per-item logging and
/// a final log line when the channel closes.
pub async fn run_alert_dispatcher(
    mut rx: tokio::sync::mpsc::Receiver<CriticalAlert>,
    sinks: Vec<Arc<dyn AlertSink>>,
) {
    info!("critical alert dispatcher started");
    while let Some(alert) = rx.recv().await {
        if sinks.is_empty() {
            warn!(target = %alert.target, "critical alert raised with no configured sinks");
            continue;
        }
        for sink in &sinks {
            sink.send(&alert).await;
        }
    }
    info!("critical alert dispatcher exiting (channel closed)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl AlertSink for CountingSink {
        async fn send(&self, _alert: &CriticalAlert) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn dispatcher_fans_out_to_every_sink() {
        let (tx, rx) = alert_channel();
        let count = Arc::new(AtomicUsize::new(0));
        let sinks: Vec<Arc<dyn AlertSink>> = vec![
            Arc::new(CountingSink(count.clone())),
            Arc::new(CountingSink(count.clone())),
        ];

        let handle = tokio::spawn(run_alert_dispatcher(rx, sinks));
        tx.send(CriticalAlert {
            target: "catalog_crm".to_string(),
            message: "lead sync exhausted retries".to_string(),
            occurred_at: "2026-01-01T00:00:00Z".to_string(),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
