use catalog_core::types::ChatId;
use rusqlite::{Connection, Result};

use crate::types::User;

/// Map a SELECT row (column order from `USER_SELECT_SQL`) to a `User`.
pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        chat_id: ChatId(row.get(1)?),
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        username: row.get(4)?,
        phone: row.get(5)?,
        email: row.get(6)?,
        last_inactivity_probe_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub(crate) const USER_SELECT_SQL: &str =
    "SELECT id, chat_id, first_name, last_name, username, phone, email,
            last_inactivity_probe_at, created_at, updated_at
     FROM users WHERE id = ?1";

/// Initialise the users table. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                         TEXT PRIMARY KEY NOT NULL,
            chat_id                    TEXT NOT NULL UNIQUE,
            first_name                 TEXT,
            last_name                  TEXT,
            username                   TEXT,
            phone                      TEXT,
            email                      TEXT,
            last_inactivity_probe_at   TEXT,
            created_at                 TEXT NOT NULL,
            updated_at                 TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_chat_id ON users (chat_id);",
    )
}
