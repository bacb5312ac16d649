use catalog_core::types::ChatId;
use serde::{Deserialize, Serialize};

/// A user entity, keyed on the platform-agnostic `chat_id` (`spec.md` §3 User).
///
/// Created on first inbound message; never deleted while referenced by a
/// lead or a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// UUIDv7 — time-sortable, useful for log correlation.
    pub id: String,
    pub chat_id: ChatId,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,

    pub phone: Option<String>,
    pub email: Option<String>,

    /// Timestamp of the last inactivity probe sent for the current idle
    /// episode — prevents the monitor (C10) from re-qualifying the same
    /// episode into more than one auto-created lead.
    pub last_inactivity_probe_at: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Best-effort display name assembled from whatever name parts are known.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => format!("{f} {l}"),
            (Some(f), None) => f.clone(),
            (None, Some(l)) => l.clone(),
            (None, None) => self
                .username
                .clone()
                .unwrap_or_else(|| self.chat_id.as_str().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_user() -> User {
        User {
            id: "u1".into(),
            chat_id: ChatId::from("123"),
            first_name: None,
            last_name: None,
            username: None,
            phone: None,
            email: None,
            last_inactivity_probe_at: None,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn display_name_falls_back_to_chat_id() {
        assert_eq!(base_user().display_name(), "123");
    }

    #[test]
    fn display_name_prefers_full_name() {
        let mut u = base_user();
        u.first_name = Some("Ada".into());
        u.last_name = Some("Lovelace".into());
        assert_eq!(u.display_name(), "Ada Lovelace");
    }
}
