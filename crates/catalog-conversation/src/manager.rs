use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use dashmap::DashMap;
use rusqlite::{params, Connection};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::{row_to_conversation, row_to_message, CONVERSATION_SELECT_SQL, MESSAGE_SELECT_SQL};
use crate::error::{ConversationError, Result};
use crate::types::{Conversation, ConversationStatus, Message, Role};

/// Append-only conversation log (`spec.md` §4.5 C5).
///
/// `append` serializes concurrent writers on the same conversation through a
/// per-conversation `tokio::sync::Mutex`, keyed in a `DashMap` the same way
/// the gateway keys its client tables — this is the ordering guarantee named
/// in `spec.md` §5: distinct conversations proceed fully in parallel, a
/// single conversation's turns are processed one at a time.
pub struct ConversationManager {
    db: Arc<StdMutex<Connection>>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl ConversationManager {
    pub fn new(db: Arc<StdMutex<Connection>>) -> Result<Self> {
        {
            let conn = db.lock().unwrap();
            crate::db::init_db(&conn)?;
        }
        Ok(Self {
            db,
            locks: DashMap::new(),
        })
    }

    /// Return the chat's open conversation, creating one if none exists.
    #[instrument(skip(self), fields(chat_id))]
    pub fn open_or_get(&self, chat_id: &str, platform: &str) -> Result<Conversation> {
        let conn = self.db.lock().unwrap();
        let existing = conn.query_row(
            &format!(
                "{CONVERSATION_SELECT_SQL} WHERE chat_id = ?1 AND status = 'open' \
                 ORDER BY started_at DESC LIMIT 1"
            ),
            params![chat_id],
            row_to_conversation,
        );
        match existing {
            Ok(conversation) => {
                debug!("reusing open conversation");
                Ok(conversation)
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                let id = Uuid::now_v7().to_string();
                let now = Utc::now().to_rfc3339();
                conn.execute(
                    "INSERT INTO conversations (id, chat_id, platform, status, metadata, started_at)
                     VALUES (?1, ?2, ?3, 'open', NULL, ?4)",
                    params![id, chat_id, platform, now],
                )?;
                Ok(Conversation {
                    id,
                    chat_id: chat_id.to_string(),
                    platform: platform.to_string(),
                    status: ConversationStatus::Open,
                    metadata: None,
                    started_at: now,
                    ended_at: None,
                })
            }
            Err(e) => Err(ConversationError::Database(e)),
        }
    }

    /// Close a conversation so the next message opens a fresh one.
    pub fn close(&self, conversation_id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE conversations SET status = 'closed', ended_at = ?1 WHERE id = ?2",
            params![now, conversation_id],
        )?;
        if rows == 0 {
            return Err(ConversationError::NotFound(conversation_id.to_string()));
        }
        Ok(())
    }

    /// Append one turn, serialized against other appends on the same
    /// conversation.
    #[instrument(skip(self, content), fields(conversation_id, role = %role))]
    pub async fn append(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Option<&str>,
    ) -> Result<Message> {
        let lock = self
            .locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let conn = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO messages (conversation_id, role, content, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![conversation_id, role.to_string(), content, metadata, now],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            metadata: metadata.map(str::to_string),
            created_at: now,
        })
    }

    /// The last `limit` messages, oldest first, for attaching to an LLM call.
    pub fn recent_window(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{MESSAGE_SELECT_SQL} WHERE conversation_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![conversation_id, limit as i64], row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().rev().collect())
    }

    /// Timestamp of the most recent message in a conversation, if any.
    pub fn latest_activity(&self, conversation_id: &str) -> Result<Option<String>> {
        let conn = self.db.lock().unwrap();
        let ts: Option<String> = conn.query_row(
            "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |r| r.get(0),
        )?;
        Ok(ts)
    }

    /// Every open conversation paired with its most recent message
    /// timestamp (falling back to `started_at` for a conversation with no
    /// messages yet), ordered oldest-activity-first — what the Inactivity
    /// Monitor (C10) scans (`spec.md` §4.10).
    pub fn open_conversations_by_activity(&self) -> Result<Vec<(Conversation, String)>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.chat_id, c.platform, c.status, c.metadata, c.started_at, c.ended_at,
                    COALESCE(
                        (SELECT MAX(m.created_at) FROM messages m WHERE m.conversation_id = c.id),
                        c.started_at
                    ) AS activity
             FROM conversations c WHERE c.status = 'open'
             ORDER BY activity ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let conversation = row_to_conversation(row)?;
                let activity: String = row.get(7)?;
                Ok((conversation, activity))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager() -> ConversationManager {
        let conn = Connection::open_in_memory().unwrap();
        ConversationManager::new(Arc::new(StdMutex::new(conn))).unwrap()
    }

    #[test]
    fn open_or_get_reuses_existing_open_conversation() {
        let mgr = test_manager();
        let first = mgr.open_or_get("chat-1", "telegram").unwrap();
        let second = mgr.open_or_get("chat-1", "telegram").unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn open_or_get_separates_distinct_chats() {
        let mgr = test_manager();
        let a = mgr.open_or_get("chat-a", "telegram").unwrap();
        let b = mgr.open_or_get("chat-b", "telegram").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn close_then_open_or_get_starts_fresh_conversation() {
        let mgr = test_manager();
        let first = mgr.open_or_get("chat-1", "telegram").unwrap();
        mgr.close(&first.id).unwrap();
        let second = mgr.open_or_get("chat-1", "telegram").unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn append_then_recent_window_is_chronological() {
        let mgr = test_manager();
        let conversation = mgr.open_or_get("chat-1", "telegram").unwrap();
        mgr.append(&conversation.id, Role::User, "hello", None)
            .await
            .unwrap();
        mgr.append(&conversation.id, Role::Assistant, "hi there", None)
            .await
            .unwrap();
        mgr.append(&conversation.id, Role::User, "what products do you have?", None)
            .await
            .unwrap();

        let window = mgr.recent_window(&conversation.id, 20).unwrap();
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].content, "hello");
        assert_eq!(window[2].content, "what products do you have?");
    }

    #[tokio::test]
    async fn recent_window_caps_at_limit() {
        let mgr = test_manager();
        let conversation = mgr.open_or_get("chat-1", "telegram").unwrap();
        for i in 0..25 {
            mgr.append(&conversation.id, Role::User, &format!("turn {i}"), None)
                .await
                .unwrap();
        }
        let window = mgr.recent_window(&conversation.id, 20).unwrap();
        assert_eq!(window.len(), 20);
        assert_eq!(window[19].content, "turn 24");
    }

    #[test]
    fn open_conversations_by_activity_orders_oldest_first() {
        let mgr = test_manager();
        let a = mgr.open_or_get("chat-a", "telegram").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = mgr.open_or_get("chat-b", "telegram").unwrap();

        let scanned = mgr.open_conversations_by_activity().unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].0.id, a.id);
        assert_eq!(scanned[1].0.id, b.id);
    }

    #[tokio::test]
    async fn latest_activity_tracks_most_recent_append() {
        let mgr = test_manager();
        let conversation = mgr.open_or_get("chat-1", "telegram").unwrap();
        assert!(mgr.latest_activity(&conversation.id).unwrap().is_none());
        mgr.append(&conversation.id, Role::User, "hello", None)
            .await
            .unwrap();
        assert!(mgr.latest_activity(&conversation.id).unwrap().is_some());
    }
}
