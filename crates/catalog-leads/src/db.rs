use rusqlite::Connection;

use crate::error::Result;
use crate::types::{Lead, LeadStatus};

pub fn row_to_lead(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lead> {
    let status: String = row.get(9)?;
    Ok(Lead {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        last_name: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        whatsapp: row.get(5)?,
        company: row.get(6)?,
        question: row.get(7)?,
        source: row.get(8)?,
        status: status.parse().unwrap_or(LeadStatus::Failed),
        sync_attempts: row.get::<_, i64>(10)? as u32,
        last_attempt_at: row.get(11)?,
        crm_id: row.get(12)?,
        auto_created: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

pub const LEAD_SELECT_SQL: &str = "SELECT id, chat_id, last_name, phone, email, whatsapp, company, \
     question, source, status, sync_attempts, last_attempt_at, crm_id, auto_created, \
     created_at, updated_at FROM leads";

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS leads (
            id              TEXT PRIMARY KEY,
            chat_id         TEXT NOT NULL,
            last_name       TEXT NOT NULL,
            phone           TEXT,
            email           TEXT,
            whatsapp        TEXT,
            company         TEXT,
            question        TEXT,
            source          TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending_sync',
            sync_attempts   INTEGER NOT NULL DEFAULT 0,
            last_attempt_at TEXT,
            crm_id          TEXT,
            auto_created    INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );
        CREATE INDEX IF NOT EXISTS idx_leads_chat_status ON leads(chat_id, status);
        CREATE INDEX IF NOT EXISTS idx_leads_pending_sync ON leads(status, sync_attempts);",
    )?;
    Ok(())
}
