use rusqlite::{Connection, Result};

use crate::types::Prompt;

pub(crate) fn row_to_prompt(row: &rusqlite::Row<'_>) -> rusqlite::Result<Prompt> {
    Ok(Prompt {
        name: row.get(0)?,
        content: row.get(1)?,
        version: row.get(2)?,
        active: row.get::<_, i32>(3)? != 0,
        role: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Initialise the prompts table. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS prompts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            content     TEXT NOT NULL,
            version     INTEGER NOT NULL,
            active      INTEGER NOT NULL DEFAULT 0,
            role        TEXT NOT NULL DEFAULT 'system',
            created_at  TEXT NOT NULL,
            UNIQUE(name, version)
        );
        CREATE INDEX IF NOT EXISTS idx_prompts_active ON prompts (name, active);",
    )
}
