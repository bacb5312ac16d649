use std::sync::Arc;
use std::time::Duration;

use catalog_core::types::ChatId;
use catalog_leads::{LeadDraft, LeadNotifier, LeadStore};
use catalog_users::resolver::UserResolver;
use catalog_vector::CatalogEngine;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use catalog_conversation::ConversationManager;

use crate::qualify::qualifies_for_probe;

/// How many prior turns are inspected for a qualifying signal.
const QUALIFYING_WINDOW: usize = 5;

/// Periodic scanner over open conversations (`spec.md` §4.10 C10). Same
/// `tokio::select!` tick-loop shape as `catalog-crm::CrmWorker`, at the
/// 10-minute cadence named in `spec.md` §4.10.
pub struct InactivityMonitor {
    conversations: Arc<ConversationManager>,
    users: Arc<UserResolver>,
    leads: Arc<LeadStore>,
    catalog: Arc<CatalogEngine>,
    inactivity_threshold_minutes: u64,
    notifier: Option<Arc<dyn LeadNotifier>>,
}

impl InactivityMonitor {
    pub fn new(
        conversations: Arc<ConversationManager>,
        users: Arc<UserResolver>,
        leads: Arc<LeadStore>,
        catalog: Arc<CatalogEngine>,
        inactivity_threshold_minutes: u64,
        notifier: Option<Arc<dyn LeadNotifier>>,
    ) -> Self {
        Self {
            conversations,
            users,
            leads,
            catalog,
            inactivity_threshold_minutes,
            notifier,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("inactivity monitor started");
        let mut interval = tokio::time::interval(Duration::from_secs(
            catalog_core::config::INACTIVITY_SCAN_INTERVAL_SECS,
        ));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("inactivity monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        if let Err(e) = self.scan_idle_conversations().await {
            error!(err = %e, "inactivity scan failed");
        }
        // Secondary duty (`spec.md` §4.3/§4.10): reclaim superseded/failed
        // catalog version directories on the same cadence, logged
        // independently so the two responsibilities stay observable apart.
        match self.catalog.garbage_collect() {
            Ok(0) => {}
            Ok(n) => info!(reclaimed = n, "catalog version garbage collection"),
            Err(e) => error!(err = %e, "catalog version garbage collection failed"),
        }
    }

    async fn scan_idle_conversations(&self) -> crate::error::Result<()> {
        let threshold = chrono::Duration::minutes(self.inactivity_threshold_minutes as i64);
        let now = Utc::now();

        for (conversation, activity) in self.conversations.open_conversations_by_activity()? {
            let Ok(last_activity) = DateTime::parse_from_rfc3339(&activity) else {
                continue;
            };
            if now.signed_duration_since(last_activity.with_timezone(&Utc)) < threshold {
                // Ordered oldest-first: once one conversation is not yet
                // idle enough, none of the rest are either.
                break;
            }

            self.maybe_probe(&conversation).await?;
        }
        Ok(())
    }

    /// One idle conversation past the threshold. MUST NOT create a second
    /// lead for the same idle episode (`spec.md` §4.10) — guarded by
    /// comparing `last_inactivity_probe_at` against this conversation's
    /// `started_at` rather than just "is it set", so a probe from a prior
    /// (now-closed) conversation never suppresses this one.
    async fn maybe_probe(&self, conversation: &catalog_conversation::Conversation) -> crate::error::Result<()> {
        let chat_id = ChatId::from(conversation.chat_id.clone());
        let resolved = self.users.resolve(&chat_id)?;
        let mut user = resolved.into_user();

        if let Some(probed_at) = &user.last_inactivity_probe_at {
            if probed_at.as_str() >= conversation.started_at.as_str() {
                return Ok(());
            }
        }

        let recent = self
            .conversations
            .recent_window(&conversation.id, QUALIFYING_WINDOW)
            .unwrap_or_default();

        if qualifies_for_probe(&recent) {
            let draft = LeadDraft {
                last_name: user.last_name.clone().or_else(|| user.first_name.clone()),
                phone: user.phone.clone(),
                email: user.email.clone(),
                source: conversation.platform.clone(),
                auto_created: true,
                ..Default::default()
            };
            match self.leads.create_or_update(&conversation.chat_id, &draft) {
                Ok(lead) => {
                    info!(lead_id = %lead.id, chat_id = %conversation.chat_id, "auto-created lead from inactivity probe");
                    if let Some(notifier) = &self.notifier {
                        notifier.notify_lead_captured(&lead).await;
                    }
                }
                Err(e) => warn!(chat_id = %conversation.chat_id, err = %e, "insufficient contact details for an auto-created lead, skipping"),
            }
        }

        user.last_inactivity_probe_at = Some(Utc::now().to_rfc3339());
        self.users.update_user(&user)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_conversation::Role;
    use rusqlite::Connection;
    use std::sync::Mutex as StdMutex;

    fn monitor(dir: &std::path::Path, threshold_minutes: u64) -> InactivityMonitor {
        let conversations = Arc::new(ConversationManager::new(Arc::new(StdMutex::new(Connection::open_in_memory().unwrap()))).unwrap());
        let users_conn = Connection::open_in_memory().unwrap();
        catalog_users::db::init_db(&users_conn).unwrap();
        let users = Arc::new(UserResolver::new(Arc::new(StdMutex::new(users_conn))));
        let leads = Arc::new(LeadStore::new(Arc::new(StdMutex::new(Connection::open_in_memory().unwrap()))).unwrap());
        let catalog = Arc::new(CatalogEngine::new(dir, Connection::open_in_memory().unwrap()).unwrap());
        InactivityMonitor::new(conversations, users, leads, catalog, threshold_minutes, None)
    }

    #[tokio::test]
    async fn qualifying_idle_conversation_with_known_contact_auto_creates_a_lead() {
        let dir = tempfile::tempdir().unwrap();
        let mon = monitor(dir.path(), 0);

        let conversation = mon.conversations.open_or_get("chat-1", "TG").unwrap();
        mon.conversations.append(&conversation.id, Role::User, "looking for a drill", None).await.unwrap();
        mon.conversations
            .append(&conversation.id, Role::Assistant, "here are some drills", Some(r#"{"intent":"PRODUCT"}"#))
            .await
            .unwrap();

        let chat_id = ChatId::from("chat-1");
        let resolved = mon.users.resolve(&chat_id).unwrap();
        let mut user = resolved.into_user();
        user.phone = Some("+79001234567".to_string());
        user.last_name = Some("Ivanov".to_string());
        mon.users.update_user(&user).unwrap();

        mon.scan_idle_conversations().await.unwrap();

        let pending = mon.leads.pending_for_delivery().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].last_name, "Ivanov");
    }

    #[tokio::test]
    async fn same_idle_episode_never_creates_a_second_lead() {
        let dir = tempfile::tempdir().unwrap();
        let mon = monitor(dir.path(), 0);

        let conversation = mon.conversations.open_or_get("chat-1", "TG").unwrap();
        mon.conversations
            .append(&conversation.id, Role::Assistant, "here are some drills", Some(r#"{"intent":"PRODUCT"}"#))
            .await
            .unwrap();

        let chat_id = ChatId::from("chat-1");
        let mut user = mon.users.resolve(&chat_id).unwrap().into_user();
        user.phone = Some("+79001234567".to_string());
        user.last_name = Some("Ivanov".to_string());
        mon.users.update_user(&user).unwrap();

        mon.scan_idle_conversations().await.unwrap();
        mon.scan_idle_conversations().await.unwrap();

        assert_eq!(mon.leads.pending_for_delivery().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_qualifying_conversation_is_probed_but_no_lead_created() {
        let dir = tempfile::tempdir().unwrap();
        let mon = monitor(dir.path(), 0);

        let conversation = mon.conversations.open_or_get("chat-1", "TG").unwrap();
        mon.conversations
            .append(&conversation.id, Role::Assistant, "hello!", Some(r#"{"intent":"GENERAL"}"#))
            .await
            .unwrap();

        mon.scan_idle_conversations().await.unwrap();

        assert!(mon.leads.pending_for_delivery().unwrap().is_empty());
    }
}
