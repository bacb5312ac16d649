use rusqlite::{Connection, Result};

use crate::types::UsageRecord;

pub(crate) fn row_to_usage_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<UsageRecord> {
    Ok(UsageRecord {
        provider: row.get(0)?,
        model: row.get(1)?,
        year: row.get(2)?,
        month: row.get(3)?,
        total_tokens: row.get::<_, i64>(4)? as u64,
        price_per_1k: row.get(5)?,
        currency: row.get(6)?,
    })
}

pub(crate) const USAGE_SELECT_SQL: &str =
    "SELECT provider, model, year, month, total_tokens, price_per_1k, currency FROM usage_statistics";

/// Initialise the monthly usage rollup table. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS usage_statistics (
            provider        TEXT NOT NULL,
            model           TEXT NOT NULL,
            year            INTEGER NOT NULL,
            month           INTEGER NOT NULL,
            total_tokens    INTEGER NOT NULL DEFAULT 0,
            price_per_1k    REAL NOT NULL,
            currency        TEXT NOT NULL DEFAULT 'USD',
            PRIMARY KEY (provider, model, year, month)
        );",
    )
}
