use rusqlite::{Connection, Result};

use crate::error;
use crate::types::CompanyService;

pub(crate) fn row_to_service(row: &rusqlite::Row<'_>) -> rusqlite::Result<CompanyService> {
    let keywords_json: String = row.get(4)?;
    let keywords: Vec<String> = serde_json::from_str(&keywords_json).unwrap_or_default();
    Ok(CompanyService {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        keywords,
        active: row.get::<_, i32>(5)? != 0,
    })
}

pub(crate) const SERVICE_SELECT_SQL: &str =
    "SELECT id, title, description, category, keywords_json, active FROM company_services";

/// Initialise the services, company info, and FTS5 tables. Safe to call on
/// every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS company_services (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            title         TEXT NOT NULL,
            description   TEXT NOT NULL,
            category      TEXT NOT NULL,
            keywords_json TEXT NOT NULL DEFAULT '[]',
            active        INTEGER NOT NULL DEFAULT 1
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS company_services_fts
            USING fts5(title, description, category, keywords, content='', tokenize='unicode61');

        CREATE TABLE IF NOT EXISTS company_info (
            id         INTEGER PRIMARY KEY CHECK (id = 1),
            content    TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )
}

/// Index or re-index one service row in the FTS5 table. `content=''` makes
/// this an external-content table with no rowid binding, so sync is a
/// plain delete-then-insert keyed by the service id, same manual-sync
/// discipline as the memory store's fact index.
pub(crate) fn sync_fts(conn: &Connection, service: &CompanyService) -> error::Result<()> {
    conn.execute(
        "DELETE FROM company_services_fts WHERE rowid = ?1",
        rusqlite::params![service.id],
    )?;
    conn.execute(
        "INSERT INTO company_services_fts (rowid, title, description, category, keywords)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            service.id,
            service.title,
            service.description,
            service.category,
            service.keywords.join(" "),
        ],
    )?;
    Ok(())
}

pub(crate) fn remove_fts(conn: &Connection, id: i64) -> error::Result<()> {
    conn.execute(
        "DELETE FROM company_services_fts WHERE rowid = ?1",
        rusqlite::params![id],
    )?;
    Ok(())
}
