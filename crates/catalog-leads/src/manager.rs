use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{init_db, row_to_lead, LEAD_SELECT_SQL};
use crate::error::{LeadError, Result};
use crate::types::{Lead, LeadDraft, LeadStatus};
use crate::validate::validate_draft;

/// `sync_attempts == MAX_SYNC_ATTEMPTS` ⇒ the lead is given up on and a
/// CRITICAL alert fires (`spec.md` §4.9).
pub const MAX_SYNC_ATTEMPTS: u32 = catalog_core::config::MAX_LEAD_SYNC_ATTEMPTS;

/// Notified once a lead is durably persisted with `pending_sync` status.
/// Defined here (not in a transport crate) so `LeadStore` stays free of
/// concrete Telegram/SMTP types, mirroring the cost guard's kill-switch
/// indirection between `catalog-cost` and `catalog-llm`.
#[async_trait]
pub trait LeadNotifier: Send + Sync {
    async fn notify_lead_captured(&self, lead: &Lead);
}

/// The draft `validate_draft` would see if `draft` is folded onto
/// `existing` — a blank field in `draft` falls back to what the open lead
/// already has, so validation never re-demands information a prior contact
/// already supplied.
fn merge_onto(existing: &Lead, draft: &LeadDraft) -> LeadDraft {
    LeadDraft {
        last_name: draft.last_name.clone().or_else(|| Some(existing.last_name.clone())),
        phone: draft.phone.clone().or_else(|| existing.phone.clone()),
        email: draft.email.clone().or_else(|| existing.email.clone()),
        whatsapp: draft.whatsapp.clone().or_else(|| existing.whatsapp.clone()),
        company: draft.company.clone().or_else(|| existing.company.clone()),
        question: draft.question.clone().or_else(|| existing.question.clone()),
        source: draft.source.clone(),
        auto_created: draft.auto_created,
    }
}

pub struct LeadStore {
    db: Arc<Mutex<Connection>>,
}

impl LeadStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let conn = db.lock().unwrap();
            init_db(&conn)?;
        }
        Ok(Self { db })
    }

    fn find_open_pending(&self, chat_id: &str) -> Result<Option<Lead>> {
        let conn = self.db.lock().unwrap();
        let result = conn.query_row(
            &format!("{LEAD_SELECT_SQL} WHERE chat_id = ?1 AND status = 'pending_sync' ORDER BY created_at DESC LIMIT 1"),
            [chat_id],
            row_to_lead,
        );
        match result {
            Ok(lead) => Ok(Some(lead)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create-or-update by `chat_id` (`spec.md` §4.8): augments an existing
    /// `pending_sync` lead rather than creating a duplicate. A second-contact
    /// draft only needs to carry what it adds — `last_name`/phone/email
    /// already on the open lead satisfy validation, so the draft is merged
    /// onto the existing lead before the check runs, not validated in
    /// isolation. Persistence happens before any notification is dispatched,
    /// so an orchestrator crash right after this call is recoverable by C9
    /// — never by re-running this method.
    pub fn create_or_update(&self, chat_id: &str, draft: &LeadDraft) -> std::result::Result<Lead, LeadError> {
        if let Some(existing) = self.find_open_pending(chat_id)? {
            validate_draft(&merge_onto(&existing, draft))?;
            return self.augment(&existing, draft).map_err(Into::into);
        }

        validate_draft(draft)?;

        let id = Uuid::now_v7().to_string();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO leads (id, chat_id, last_name, phone, email, whatsapp, company, question, source, auto_created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                id,
                chat_id,
                draft.last_name,
                draft.phone,
                draft.email,
                draft.whatsapp,
                draft.company,
                draft.question,
                draft.source,
                draft.auto_created,
            ],
        )?;
        let lead = conn.query_row(&format!("{LEAD_SELECT_SQL} WHERE id = ?1"), [&id], row_to_lead)?;
        info!(lead_id = %lead.id, chat_id, "lead created");
        Ok(lead)
    }

    fn augment(&self, existing: &Lead, draft: &LeadDraft) -> Result<Lead> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "UPDATE leads SET
                last_name = ?2, phone = COALESCE(?3, phone), email = COALESCE(?4, email),
                whatsapp = COALESCE(?5, whatsapp), company = COALESCE(?6, company),
                question = COALESCE(?7, question), updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
             WHERE id = ?1",
            rusqlite::params![
                existing.id,
                draft.last_name.as_deref().unwrap_or(&existing.last_name),
                draft.phone,
                draft.email,
                draft.whatsapp,
                draft.company,
                draft.question,
            ],
        )?;
        let lead = conn.query_row(&format!("{LEAD_SELECT_SQL} WHERE id = ?1"), [&existing.id], row_to_lead)?;
        info!(lead_id = %lead.id, "lead augmented");
        Ok(lead)
    }

    pub fn get(&self, lead_id: &str) -> Result<Option<Lead>> {
        let conn = self.db.lock().unwrap();
        let result = conn.query_row(&format!("{LEAD_SELECT_SQL} WHERE id = ?1"), [lead_id], row_to_lead);
        match result {
            Ok(lead) => Ok(Some(lead)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Leads C9 should attempt delivery for: `pending_sync` and under the
    /// attempt cap.
    pub fn pending_for_delivery(&self) -> Result<Vec<Lead>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{LEAD_SELECT_SQL} WHERE status = 'pending_sync' AND sync_attempts < ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map([MAX_SYNC_ATTEMPTS], row_to_lead)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn mark_synced(&self, lead_id: &str, crm_id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "UPDATE leads SET status = 'synced', crm_id = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?1",
            rusqlite::params![lead_id, crm_id],
        )?;
        Ok(())
    }

    /// Increments `sync_attempts`; flips to `status=failed` once the cap is
    /// reached, so the worker knows whether to raise the CRITICAL alert.
    pub fn record_sync_failure(&self, lead_id: &str) -> Result<Lead> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "UPDATE leads SET
                sync_attempts = sync_attempts + 1,
                last_attempt_at = strftime('%Y-%m-%dT%H:%M:%fZ','now'),
                status = CASE WHEN sync_attempts + 1 >= ?2 THEN 'failed' ELSE status END,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
             WHERE id = ?1",
            rusqlite::params![lead_id, MAX_SYNC_ATTEMPTS],
        )?;
        let lead = conn.query_row(&format!("{LEAD_SELECT_SQL} WHERE id = ?1"), [lead_id], row_to_lead)?;
        if lead.status == LeadStatus::Failed {
            warn!(lead_id = %lead.id, attempts = lead.sync_attempts, "lead sync exhausted retries");
        }
        Ok(lead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LeadStore {
        LeadStore::new(Arc::new(Mutex::new(Connection::open_in_memory().unwrap()))).unwrap()
    }

    fn draft(last_name: &str, phone: Option<&str>) -> LeadDraft {
        LeadDraft {
            last_name: Some(last_name.to_string()),
            phone: phone.map(str::to_string),
            source: "TG".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = store();
        let lead = store.create_or_update("chat-1", &draft("Ivanov", Some("+79001234567"))).unwrap();
        assert_eq!(lead.status, LeadStatus::PendingSync);
        let fetched = store.get(&lead.id).unwrap().unwrap();
        assert_eq!(fetched.last_name, "Ivanov");
    }

    #[test]
    fn second_contact_same_chat_augments_not_duplicates() {
        let store = store();
        let first = store.create_or_update("chat-1", &draft("Ivanov", Some("+79001234567"))).unwrap();
        let second = store
            .create_or_update(
                "chat-1",
                &LeadDraft {
                    email: Some("ivanov@example.com".to_string()),
                    source: "TG".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.phone.as_deref(), Some("+79001234567"));
        assert_eq!(second.email.as_deref(), Some("ivanov@example.com"));
    }

    #[test]
    fn second_contact_with_invalid_new_phone_is_rejected() {
        let store = store();
        store.create_or_update("chat-1", &draft("Ivanov", Some("+79001234567"))).unwrap();
        let result = store.create_or_update(
            "chat-1",
            &LeadDraft {
                phone: Some("not-a-phone".to_string()),
                source: "TG".to_string(),
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn invalid_draft_is_rejected_before_persisting() {
        let store = store();
        let result = store.create_or_update("chat-1", &draft("", Some("+79001234567")));
        assert!(result.is_err());
        assert!(store.pending_for_delivery().unwrap().is_empty());
    }

    #[test]
    fn synced_lead_excluded_from_pending_for_delivery() {
        let store = store();
        let lead = store.create_or_update("chat-1", &draft("Ivanov", Some("+79001234567"))).unwrap();
        store.mark_synced(&lead.id, "crm-123").unwrap();
        assert!(store.pending_for_delivery().unwrap().is_empty());
    }

    #[test]
    fn sync_failure_sets_failed_status_after_cap() {
        let store = store();
        let lead = store.create_or_update("chat-1", &draft("Ivanov", Some("+79001234567"))).unwrap();
        let after_first = store.record_sync_failure(&lead.id).unwrap();
        assert_eq!(after_first.status, LeadStatus::PendingSync);
        assert_eq!(after_first.sync_attempts, 1);

        let after_second = store.record_sync_failure(&lead.id).unwrap();
        assert_eq!(after_second.status, LeadStatus::Failed);
        assert_eq!(after_second.sync_attempts, 2);
        assert!(store.pending_for_delivery().unwrap().is_empty());
    }
}
