use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{error, info, warn};

use catalog_leads::{Lead, LeadNotifier, LeadStore};

use crate::client::{CrmClient, LeadPayload};

/// How often the worker wakes up to look for work. Independent of
/// `CRM_RETRY_DELAY_SECS`, which gates how long a single lead waits between
/// attempts once it has already failed once.
const POLL_INTERVAL_SECS: u64 = 30;

/// Background dispatcher draining `pending_sync` leads (`spec.md` §4.9 C9).
/// Structured like `SchedulerEngine::run`: a `tokio::select!` between an
/// interval tick and a `watch::Receiver<bool>` shutdown signal.
pub struct CrmWorker {
    leads: Arc<LeadStore>,
    client: Arc<dyn CrmClient>,
    notifier: Option<Arc<dyn LeadNotifier>>,
    /// Per-lead advisory lock: `try_insert`-then-remove-on-drop, the same
    /// shape as `skynet-gateway::AppState::active_operations`'s token map.
    in_flight: Arc<DashMap<String, ()>>,
}

struct LeadGuard {
    in_flight: Arc<DashMap<String, ()>>,
    lead_id: String,
}

impl Drop for LeadGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.lead_id);
    }
}

impl CrmWorker {
    pub fn new(leads: Arc<LeadStore>, client: Arc<dyn CrmClient>, notifier: Option<Arc<dyn LeadNotifier>>) -> Self {
        Self {
            leads,
            client,
            notifier,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Runs until `shutdown` broadcasts `true`. In-flight deliveries are not
    /// interrupted; the caller is expected to await this future inside the
    /// process's drain-timeout budget (`spec.md` §5).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("CRM delivery worker started");
        let mut interval = tokio::time::interval(Duration::from_secs(POLL_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(err = %e, "CRM delivery tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("CRM delivery worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> std::result::Result<(), catalog_leads::LeadError> {
        let due = self.leads.pending_for_delivery()?;
        for lead in due {
            if !is_due_for_retry(&lead) {
                continue;
            }
            let Some(guard) = self.try_lock(&lead.id) else {
                continue;
            };
            self.deliver(&lead).await;
            drop(guard);
        }
        Ok(())
    }

    fn try_lock(&self, lead_id: &str) -> Option<LeadGuard> {
        if self.in_flight.insert(lead_id.to_string(), ()).is_some() {
            return None;
        }
        Some(LeadGuard {
            in_flight: self.in_flight.clone(),
            lead_id: lead_id.to_string(),
        })
    }

    /// One delivery attempt (`spec.md` §4.9 steps 1-4). Dedupe-then-create is
    /// idempotent per lead, so a retried lead never produces a duplicate CRM
    /// record.
    async fn deliver(&self, lead: &Lead) {
        let payload = LeadPayload::from(lead);
        let result = self.deliver_inner(lead, &payload).await;

        match result {
            Ok(crm_id) => {
                if let Err(e) = self.leads.mark_synced(&lead.id, &crm_id) {
                    error!(lead_id = %lead.id, err = %e, "failed to record CRM sync success");
                    return;
                }
                info!(lead_id = %lead.id, crm_id, "lead synced to CRM");
                if let Some(notifier) = &self.notifier {
                    if let Ok(Some(synced)) = self.leads.get(&lead.id) {
                        notifier.notify_lead_captured(&synced).await;
                    }
                }
            }
            Err(e) => {
                warn!(lead_id = %lead.id, err = %e, "CRM delivery attempt failed, scheduling retry");
                match self.leads.record_sync_failure(&lead.id) {
                    Ok(updated) if updated.status == catalog_leads::LeadStatus::Failed => {
                        error!(
                            lead_id = %lead.id,
                            attempts = updated.sync_attempts,
                            "lead exhausted CRM delivery retries, giving up"
                        );
                    }
                    Err(e) => error!(lead_id = %lead.id, err = %e, "failed to record CRM delivery failure"),
                    _ => {}
                }
            }
        }
    }

    async fn deliver_inner(&self, lead: &Lead, payload: &LeadPayload) -> crate::error::Result<String> {
        match self.client.search(lead.phone.as_deref(), lead.email.as_deref()).await? {
            Some(existing_id) => {
                let note = lead
                    .question
                    .clone()
                    .unwrap_or_else(|| "Re-contacted via the bot.".to_string());
                self.client.add_note(&existing_id, &note).await?;
                Ok(existing_id)
            }
            None => self.client.create_lead(payload).await,
        }
    }
}

/// `last_attempt_at` is `None` for a never-tried lead (always due) or a
/// timestamp gating the next attempt behind `CRM_RETRY_DELAY_SECS`.
fn is_due_for_retry(lead: &Lead) -> bool {
    let Some(last_attempt_at) = &lead.last_attempt_at else {
        return true;
    };
    let Ok(last_attempt) = DateTime::parse_from_rfc3339(last_attempt_at) else {
        return true;
    };
    let elapsed = Utc::now().signed_duration_since(last_attempt.with_timezone(&Utc));
    elapsed.num_seconds() >= catalog_core::config::CRM_RETRY_DELAY_SECS as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use catalog_leads::LeadDraft;
    use std::sync::Mutex as StdMutex;

    struct FakeCrm {
        existing_id: Option<String>,
        fail: bool,
        created: StdMutex<Vec<LeadPayload>>,
        notes: StdMutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CrmClient for FakeCrm {
        async fn search(&self, _phone: Option<&str>, _email: Option<&str>) -> crate::error::Result<Option<String>> {
            Ok(self.existing_id.clone())
        }
        async fn create_lead(&self, payload: &LeadPayload) -> crate::error::Result<String> {
            if self.fail {
                return Err(crate::error::CrmError::Api { status: 500, message: "boom".into() });
            }
            self.created.lock().unwrap().push(payload.clone());
            Ok("crm-1".to_string())
        }
        async fn add_note(&self, crm_id: &str, text: &str) -> crate::error::Result<()> {
            self.notes.lock().unwrap().push((crm_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn store() -> Arc<LeadStore> {
        Arc::new(LeadStore::new(Arc::new(std::sync::Mutex::new(rusqlite::Connection::open_in_memory().unwrap()))).unwrap())
    }

    fn lead_draft() -> LeadDraft {
        LeadDraft {
            last_name: Some("Ivanov".to_string()),
            phone: Some("+79001234567".to_string()),
            source: "TG".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn delivers_new_lead_and_marks_synced() {
        let leads = store();
        let lead = leads.create_or_update("chat-1", &lead_draft()).unwrap();
        let crm = Arc::new(FakeCrm { existing_id: None, fail: false, created: StdMutex::new(vec![]), notes: StdMutex::new(vec![]) });
        let worker = CrmWorker::new(leads.clone(), crm.clone(), None);

        worker.tick().await.unwrap();

        let synced = leads.get(&lead.id).unwrap().unwrap();
        assert_eq!(synced.status, catalog_leads::LeadStatus::Synced);
        assert_eq!(synced.crm_id.as_deref(), Some("crm-1"));
        assert_eq!(crm.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_lead_gets_a_note_not_a_new_record() {
        let leads = store();
        leads.create_or_update("chat-1", &lead_draft()).unwrap();
        let crm = Arc::new(FakeCrm {
            existing_id: Some("crm-existing".to_string()),
            fail: false,
            created: StdMutex::new(vec![]),
            notes: StdMutex::new(vec![]),
        });
        let worker = CrmWorker::new(leads.clone(), crm.clone(), None);

        worker.tick().await.unwrap();

        assert_eq!(crm.created.lock().unwrap().len(), 0);
        assert_eq!(crm.notes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_increments_attempts_and_stays_pending_under_cap() {
        let leads = store();
        let lead = leads.create_or_update("chat-1", &lead_draft()).unwrap();
        let crm = Arc::new(FakeCrm { existing_id: None, fail: true, created: StdMutex::new(vec![]), notes: StdMutex::new(vec![]) });
        let worker = CrmWorker::new(leads.clone(), crm, None);

        worker.tick().await.unwrap();

        let after = leads.get(&lead.id).unwrap().unwrap();
        assert_eq!(after.sync_attempts, 1);
        assert_eq!(after.status, catalog_leads::LeadStatus::PendingSync);
    }

    #[test]
    fn never_attempted_lead_is_always_due() {
        let lead = Lead {
            id: "1".into(), chat_id: "c".into(), last_name: "x".into(), phone: None, email: None,
            whatsapp: None, company: None, question: None, source: "TG".into(),
            status: catalog_leads::LeadStatus::PendingSync, sync_attempts: 0, last_attempt_at: None,
            crm_id: None, auto_created: false, created_at: "now".into(), updated_at: "now".into(),
        };
        assert!(is_due_for_retry(&lead));
    }

    #[test]
    fn recently_attempted_lead_is_not_yet_due() {
        let lead = Lead {
            id: "1".into(), chat_id: "c".into(), last_name: "x".into(), phone: None, email: None,
            whatsapp: None, company: None, question: None, source: "TG".into(),
            status: catalog_leads::LeadStatus::PendingSync, sync_attempts: 1,
            last_attempt_at: Some(Utc::now().to_rfc3339()),
            crm_id: None, auto_created: false, created_at: "now".into(), updated_at: "now".into(),
        };
        assert!(!is_due_for_retry(&lead));
    }
}
