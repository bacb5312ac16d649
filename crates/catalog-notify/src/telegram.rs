use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::warn;

use catalog_core::config::NotificationsConfig;
use catalog_leads::{Lead, LeadNotifier};
use catalog_logging::{AlertSink, CriticalAlert};

use crate::format::{escape_markdown_v2, split_chunks_smart};

/// Thin send-only Telegram notifier — not a bot dispatcher (`spec.md` §1/§6:
/// the long-polling transport itself stays an external collaborator).
/// Notifies the manager chat and every admin id independently, so one bad
/// chat id never suppresses the rest.
pub struct TelegramNotifier {
    bot_token: String,
    manager_chat_id: Option<String>,
    admin_ids: Vec<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, notifications: NotificationsConfig) -> Self {
        Self {
            bot_token,
            manager_chat_id: notifications.manager_telegram_chat_id,
            admin_ids: notifications.admin_telegram_ids.0,
        }
    }

    fn targets(&self) -> Vec<String> {
        let mut targets = self.admin_ids.clone();
        if let Some(manager) = &self.manager_chat_id {
            if !targets.contains(manager) {
                targets.push(manager.clone());
            }
        }
        targets
    }

    /// A fresh `Bot` per call — scoped acquisition released on every exit
    /// path (`spec.md` §5), not a long-lived shared session.
    async fn send_to(&self, chat_id_raw: &str, text: &str) {
        let Ok(numeric_id) = chat_id_raw.parse::<i64>() else {
            warn!(chat_id = chat_id_raw, "telegram notifier: invalid chat id");
            return;
        };
        let bot = Bot::new(&self.bot_token);
        let chat_id = ChatId(numeric_id);

        for (i, chunk) in split_chunks_smart(text).into_iter().enumerate() {
            let escaped = escape_markdown_v2(&chunk);
            let sent = bot.send_message(chat_id, &escaped).parse_mode(ParseMode::MarkdownV2).await;
            if sent.is_err() {
                if let Err(e) = bot.send_message(chat_id, &chunk).await {
                    warn!(error = %e, chunk_index = i, "telegram notifier: fallback send failed");
                }
            }
        }
    }

    async fn broadcast(&self, text: &str) {
        let targets = self.targets();
        if targets.is_empty() {
            warn!("telegram notifier: no manager chat id or admin ids configured, dropping notification");
            return;
        }
        for target in targets {
            self.send_to(&target, text).await;
        }
    }
}

#[async_trait]
impl LeadNotifier for TelegramNotifier {
    async fn notify_lead_captured(&self, lead: &Lead) {
        let text = format!(
            "New lead captured\nName: {}\nPhone: {}\nEmail: {}\nSource: {}",
            lead.last_name,
            lead.phone.as_deref().unwrap_or("-"),
            lead.email.as_deref().unwrap_or("-"),
            lead.source,
        );
        self.broadcast(&text).await;
    }
}

#[async_trait]
impl AlertSink for TelegramNotifier {
    async fn send(&self, alert: &CriticalAlert) {
        let text = format!("CRITICAL [{}]: {}", alert.target, alert.message);
        self.broadcast(&text).await;
    }
}
