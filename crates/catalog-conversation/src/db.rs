use std::str::FromStr;

use rusqlite::{Connection, Result};

use crate::types::{Conversation, ConversationStatus, Message, Role};

pub(crate) fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let status: String = row.get(3)?;
    Ok(Conversation {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        platform: row.get(2)?,
        status: ConversationStatus::from_str(&status).unwrap_or(ConversationStatus::Open),
        metadata: row.get(4)?,
        started_at: row.get(5)?,
        ended_at: row.get(6)?,
    })
}

pub(crate) const CONVERSATION_SELECT_SQL: &str =
    "SELECT id, chat_id, platform, status, metadata, started_at, ended_at FROM conversations";

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: Role::from_str(&role).unwrap_or(Role::User),
        content: row.get(3)?,
        metadata: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub(crate) const MESSAGE_SELECT_SQL: &str =
    "SELECT id, conversation_id, role, content, metadata, created_at FROM messages";

/// Initialise the conversation and message tables. Safe to call on every
/// startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY NOT NULL,
            chat_id     TEXT NOT NULL,
            platform    TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'open',
            metadata    TEXT,
            started_at  TEXT NOT NULL,
            ended_at    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_chat_id
            ON conversations (chat_id, status);

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            metadata        TEXT,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages (conversation_id, created_at);",
    )
}
