use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Platform-agnostic stable user handle — the contract is that `ChatId`,
/// not a platform's own user id, is what every other component keys on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChatId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Primary key for a `Conversation` row (UUIDv7 — time-sortable for log correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Primary key for a `Lead` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

impl LeadId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for LeadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The role attached to a stored message (`spec.md` §3 Message).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// The classifier's output label (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Product,
    Service,
    CompanyInfo,
    Contact,
    General,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PRODUCT" => Ok(Intent::Product),
            "SERVICE" => Ok(Intent::Service),
            "COMPANY_INFO" => Ok(Intent::CompanyInfo),
            "CONTACT" => Ok(Intent::Contact),
            "GENERAL" => Ok(Intent::General),
            other => Err(format!("unknown intent: {other}")),
        }
    }
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::Product,
        Intent::Service,
        Intent::CompanyInfo,
        Intent::Contact,
        Intent::General,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Intent::Product => "PRODUCT",
            Intent::Service => "SERVICE",
            Intent::CompanyInfo => "COMPANY_INFO",
            Intent::Contact => "CONTACT",
            Intent::General => "GENERAL",
        }
    }
}

/// The platform a conversation/lead originated on (`spec.md` §3 Lead.source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Telegram,
    SalesIqChat,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Telegram => write!(f, "TG"),
            Platform::SalesIqChat => write!(f, "SalesIQ Chat"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "TG" => Ok(Platform::Telegram),
            "SalesIQ Chat" => Ok(Platform::SalesIqChat),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_roundtrips_through_label() {
        for intent in Intent::ALL {
            let parsed: Intent = intent.label().parse().unwrap();
            assert_eq!(parsed, intent);
        }
    }

    #[test]
    fn platform_roundtrips() {
        assert_eq!("TG".parse::<Platform>().unwrap().to_string(), "TG");
        assert_eq!(
            "SalesIQ Chat".parse::<Platform>().unwrap().to_string(),
            "SalesIQ Chat"
        );
    }
}
