use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::db;
use crate::types::{CriticalAlert, LogSeverity};

/// Custom target events use to reach the `BUSINESS` sink without a matching
/// `tracing::Level` (`tracing` has no such level — `spec.md` §4.11).
pub const BUSINESS_TARGET: &str = "business";

/// Captures `WARNING/ERROR/CRITICAL` events plus anything logged against
/// [`BUSINESS_TARGET`] and persists them to `system_logs`. `CRITICAL`
/// additionally goes out over a bounded channel to the alert dispatcher;
/// the send is a non-blocking `try_send` so a stalled alert channel can
/// never back-pressure request handling (`spec.md` §4.11).
pub struct HybridLayer {
    db: Arc<Mutex<Connection>>,
    alerts: tokio::sync::mpsc::Sender<CriticalAlert>,
}

impl HybridLayer {
    pub fn new(db: Arc<Mutex<Connection>>, alerts: tokio::sync::mpsc::Sender<CriticalAlert>) -> crate::error::Result<Self> {
        {
            let conn = db.lock().unwrap();
            db::init_db(&conn)?;
        }
        Ok(Self { db, alerts })
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: serde_json::Map<String, serde_json::Value>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.into());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.fields.insert(field.name().to_string(), rendered.into());
        }
    }
}

impl<S: Subscriber> Layer<S> for HybridLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let target = event.metadata().target();
        // `tracing::error!` is this codebase's CRITICAL signal (durable log
        // + alert); plain `WARNING` is durable-only. There is no separate
        // non-critical `ERROR` call site anywhere in the workspace.
        let severity = match (*event.metadata().level(), target == BUSINESS_TARGET) {
            (_, true) => LogSeverity::Business,
            (Level::ERROR, false) => LogSeverity::Critical,
            (Level::WARN, false) => LogSeverity::Warning,
            _ => return,
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let fields = if visitor.fields.is_empty() {
            None
        } else {
            serde_json::to_string(&visitor.fields).ok()
        };

        {
            let conn = self.db.lock().unwrap();
            if let Err(e) = db::insert_log(&conn, severity, target, &visitor.message, fields.as_deref()) {
                eprintln!("catalog-logging: failed to persist log record: {e}");
            }
        }

        if severity == LogSeverity::Critical {
            let alert = CriticalAlert {
                target: target.to_string(),
                message: visitor.message,
                occurred_at: Utc::now().to_rfc3339(),
            };
            if self.alerts.try_send(alert).is_err() {
                eprintln!("catalog-logging: alert channel full or closed, dropping CRITICAL alert");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn harness() -> (Arc<Mutex<Connection>>, tokio::sync::mpsc::Receiver<CriticalAlert>, impl tracing::Subscriber) {
        let db = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let layer = HybridLayer::new(db.clone(), tx).unwrap();
        let subscriber = tracing_subscriber::registry().with(layer);
        (db, rx, subscriber)
    }

    #[test]
    fn warning_is_persisted_but_does_not_alert() {
        let (db, mut rx, subscriber) = harness();
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("low disk space");
        });

        let conn = db.lock().unwrap();
        let rows = conn
            .prepare(db::LOG_SELECT_SQL)
            .unwrap()
            .query_map([], db::row_to_log_record)
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].severity, LogSeverity::Warning);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn error_is_persisted_and_alerts() {
        let (db, mut rx, subscriber) = harness();
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("lead sync exhausted retries");
        });

        let conn = db.lock().unwrap();
        let rows = conn
            .prepare(db::LOG_SELECT_SQL)
            .unwrap()
            .query_map([], db::row_to_log_record)
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].severity, LogSeverity::Critical);
        drop(conn);

        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.message, "lead sync exhausted retries");
    }

    #[test]
    fn business_target_is_persisted_regardless_of_level() {
        let (db, _rx, subscriber) = harness();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "business", "lead created");
        });

        let conn = db.lock().unwrap();
        let rows = conn
            .prepare(db::LOG_SELECT_SQL)
            .unwrap()
            .query_map([], db::row_to_log_record)
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].severity, LogSeverity::Business);
    }

    #[test]
    fn plain_info_is_ignored() {
        let (db, _rx, subscriber) = harness();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("just chatting");
        });

        let conn = db.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM system_logs", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
    }
}
