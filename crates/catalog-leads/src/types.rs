use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    PendingSync,
    Synced,
    Failed,
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingSync => write!(f, "pending_sync"),
            Self::Synced => write!(f, "synced"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_sync" => Ok(Self::PendingSync),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown lead status: {other}")),
        }
    }
}

/// `spec.md` §3 Lead. `sync_attempts` is capped at 2 by C9's worker loop,
/// never by this type — a type-level cap would make the "2 failed attempts
/// then CRITICAL alert" transition unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub chat_id: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub company: Option<String>,
    pub question: Option<String>,
    pub source: String,
    pub status: LeadStatus,
    pub sync_attempts: u32,
    pub last_attempt_at: Option<String>,
    pub crm_id: Option<String>,
    pub auto_created: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields the orchestrator extracts from a CONTACT-intent turn, before
/// validation and persistence.
#[derive(Debug, Clone, Default)]
pub struct LeadDraft {
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub company: Option<String>,
    pub question: Option<String>,
    pub source: String,
    pub auto_created: bool,
}
