use catalog_core::types::ChatId;
use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::USER_SELECT_SQL;
use crate::error::{Result, UserError};
use crate::types::User;

/// Insert a brand-new user row. The id is generated here so the caller
/// immediately has the canonical id without a follow-up query.
pub fn create_user(conn: &Connection, chat_id: &ChatId) -> Result<User> {
    let now = Utc::now().to_rfc3339();
    let user = User {
        id: Uuid::now_v7().to_string(),
        chat_id: chat_id.clone(),
        first_name: None,
        last_name: None,
        username: None,
        phone: None,
        email: None,
        last_inactivity_probe_at: None,
        created_at: now.clone(),
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO users (id, chat_id, first_name, last_name, username, phone, email,
            last_inactivity_probe_at, created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
        params![
            user.id,
            user.chat_id.as_str(),
            user.first_name,
            user.last_name,
            user.username,
            user.phone,
            user.email,
            user.last_inactivity_probe_at,
            user.created_at,
            user.updated_at,
        ],
    )?;
    Ok(user)
}

/// Load a user by primary key. Returns `None` instead of an error when absent
/// so callers decide whether missing is exceptional in their context.
pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(USER_SELECT_SQL)?;
    match stmt.query_row(params![user_id], crate::db::row_to_user) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(UserError::DatabaseError(e)),
    }
}

/// Look up a user by the platform-agnostic `chat_id`. Hot path: called on
/// every inbound message.
pub fn find_user_by_chat_id(conn: &Connection, chat_id: &ChatId) -> Result<Option<User>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, first_name, last_name, username, phone, email,
                last_inactivity_probe_at, created_at, updated_at
         FROM users WHERE chat_id = ?1",
    )?;
    match stmt.query_row(params![chat_id.as_str()], crate::db::row_to_user) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(UserError::DatabaseError(e)),
    }
}

/// Persist all mutable fields of an existing user. Always bumps `updated_at`.
pub fn update_user(conn: &Connection, user: &User) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE users SET
            first_name=?2, last_name=?3, username=?4, phone=?5, email=?6,
            last_inactivity_probe_at=?7, updated_at=?8
         WHERE id=?1",
        params![
            user.id,
            user.first_name,
            user.last_name,
            user.username,
            user.phone,
            user.email,
            user.last_inactivity_probe_at,
            now,
        ],
    )?;
    Ok(())
}
