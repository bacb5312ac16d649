use rusqlite::{params, Connection, Result};

use crate::types::{LogRecord, LogSeverity};

pub(crate) fn row_to_log_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogRecord> {
    let severity: String = row.get(1)?;
    Ok(LogRecord {
        id: row.get(0)?,
        severity: severity.parse().unwrap_or(LogSeverity::Error),
        target: row.get(2)?,
        message: row.get(3)?,
        fields: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub(crate) const LOG_SELECT_SQL: &str =
    "SELECT id, severity, target, message, fields, created_at FROM system_logs";

/// Durable sink for `WARNING/ERROR/CRITICAL/BUSINESS` events. Safe to call
/// on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS system_logs (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            severity   TEXT NOT NULL,
            target     TEXT NOT NULL,
            message    TEXT NOT NULL,
            fields     TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
        CREATE INDEX IF NOT EXISTS idx_system_logs_severity ON system_logs(severity);",
    )
}

pub(crate) fn insert_log(
    conn: &Connection,
    severity: LogSeverity,
    target: &str,
    message: &str,
    fields: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO system_logs (severity, target, message, fields) VALUES (?1, ?2, ?3, ?4)",
        params![severity.to_string(), target, message, fields],
    )?;
    Ok(())
}
