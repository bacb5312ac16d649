use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::sync::watch;
use tracing::warn;

use catalog_conversation::ConversationManager;
use catalog_core::config::CatalogConfig;
use catalog_cost::CostGuard;
use catalog_crm::{CrmWorker, HttpCrmClient, LeadPayload};
use catalog_leads::{LeadNotifier, LeadStore};
use catalog_llm::provider::LlmProvider;
use catalog_llm::registry;
use catalog_llm::router::{ProviderRouter, ProviderSlot};
use catalog_monitor::InactivityMonitor;
use catalog_notify::{EmailNotifier, TelegramNotifier};
use catalog_orchestrator::OrchestratorContext;
use catalog_prompts::registry::PromptRegistry;
use catalog_services::ServiceStore;
use catalog_users::resolver::UserResolver;
use catalog_vector::CatalogEngine;

/// Central shared state — passed as `Arc<AppState>` to every axum handler
/// and implementing `OrchestratorContext` for `process_turn`, the same role
/// `skynet-gateway::AppState` played for `MessageContext`. Every store is
/// held behind its own `Arc` so the background workers (C9/C10) can take
/// their own clone without borrowing from `AppState` itself.
pub struct AppState {
    pub config: CatalogConfig,
    pub conversations: Arc<ConversationManager>,
    pub users: Arc<UserResolver>,
    pub llm: ProviderRouter,
    pub prompts: PromptRegistry,
    pub catalog: Arc<CatalogEngine>,
    pub services: ServiceStore,
    pub leads: Arc<LeadStore>,
    pub cost_guard: CostGuard,
    telegram_notifier: Option<Arc<TelegramNotifier>>,
    email_notifier: Option<Arc<EmailNotifier>>,
    /// Every configured lead channel fanned into one sink, computed once at
    /// startup and shared by the CONTACT-intent persist-time notification
    /// (`OrchestratorContext::lead_notifier`) and the background workers
    /// (`spawn_background_workers`) — both must reach Telegram *and* email
    /// when both are configured (`spec.md` §4.8, scenario 4), not just
    /// whichever channel happened to be checked first.
    lead_notifier: Option<Arc<dyn LeadNotifier>>,
}

impl AppState {
    /// Opens every store against `config.database.url`, seeds/loads the
    /// prompt cache and catalog index, and wires the notification channels.
    /// Each store gets its own `rusqlite::Connection` to the same file —
    /// SQLite allows multiple connections per process; this avoids one
    /// mutex guarding every subsystem.
    pub fn new(config: CatalogConfig) -> anyhow::Result<Self> {
        let open = || -> anyhow::Result<Arc<Mutex<Connection>>> {
            Ok(Arc::new(Mutex::new(Connection::open(&config.database.url)?)))
        };

        let conversations = Arc::new(ConversationManager::new(open()?)?);

        let users_conn = open()?;
        {
            let conn = users_conn.lock().unwrap();
            catalog_users::db::init_db(&conn)?;
        }
        let users = Arc::new(UserResolver::new(users_conn));

        let prompts = PromptRegistry::new(open()?)?;
        let services = ServiceStore::new(open()?)?;
        let leads = Arc::new(LeadStore::new(open()?)?);
        let cost_guard = CostGuard::new(open()?, config.cost_guard.clone())?;

        let catalog = CatalogEngine::new(config.catalog.persist_dir.clone(), Connection::open(&config.database.url)?)?;
        catalog.load_active_from_disk()?;
        let catalog = Arc::new(catalog);

        let llm = build_provider_router(&config)?.with_kill_switch(cost_guard.kill_switch());

        let telegram_notifier = if config.telegram.bot_token.is_empty() {
            None
        } else {
            Some(Arc::new(TelegramNotifier::new(
                config.telegram.bot_token.clone(),
                config.notifications.clone(),
            )))
        };
        let email_notifier = if config.smtp.host.is_some() {
            Some(Arc::new(EmailNotifier::new(config.smtp.clone(), config.notifications.clone())))
        } else {
            None
        };
        let lead_notifier = fan_out_lead_notifier(&telegram_notifier, &email_notifier);

        Ok(Self {
            config,
            conversations,
            users,
            llm,
            prompts,
            catalog,
            services,
            leads,
            cost_guard,
            telegram_notifier,
            email_notifier,
            lead_notifier,
        })
    }

    /// Every `AlertSink` the Hybrid Logger's dispatcher fans CRITICAL events
    /// out to (`spec.md` §4.11).
    pub fn alert_sinks(&self) -> Vec<Arc<dyn catalog_logging::AlertSink>> {
        let mut sinks: Vec<Arc<dyn catalog_logging::AlertSink>> = Vec::new();
        if let Some(t) = &self.telegram_notifier {
            sinks.push(t.clone());
        }
        if let Some(e) = &self.email_notifier {
            sinks.push(e.clone());
        }
        sinks
    }

    /// Spawns the CRM delivery worker (C9) and inactivity monitor (C10) as
    /// background tasks sharing one shutdown signal, matching the
    /// "stop C9/C10" step of the drain sequence in `spec.md` §5.
    pub fn spawn_background_workers(
        self: &Arc<AppState>,
    ) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let crm_client: Arc<dyn catalog_crm::CrmClient> = match HttpCrmClient::from_config(&self.config.crm) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!(err = %e, "CRM not configured, delivery worker will find nothing to deliver");
                Arc::new(UnconfiguredCrmClient)
            }
        };
        let crm_worker = CrmWorker::new(self.leads.clone(), crm_client, self.lead_notifier.clone());
        let crm_handle = {
            let rx = shutdown_rx.clone();
            tokio::spawn(async move { crm_worker.run(rx).await })
        };

        let monitor = InactivityMonitor::new(
            self.conversations.clone(),
            self.users.clone(),
            self.leads.clone(),
            self.catalog.clone(),
            self.config.leads.inactivity_threshold_minutes,
            self.lead_notifier.clone(),
        );
        let monitor_handle = {
            let rx = shutdown_rx.clone();
            tokio::spawn(async move { monitor.run(rx).await })
        };

        (shutdown_tx, crm_handle, monitor_handle)
    }
}

/// Single-slot failover is all this deployment needs: there is no persisted
/// `LLMSetting.is_active` store in this workspace, so the configured
/// `DEFAULT_LLM_PROVIDER` is the primary slot and the other known provider
/// (if credentialed) is appended as a fallback, in the priority-ordered
/// shape `ProviderRouter` expects.
fn build_provider_router(config: &CatalogConfig) -> anyhow::Result<ProviderRouter> {
    let mut slots: Vec<ProviderSlot> = Vec::new();
    let providers = &config.providers;

    let push_openai = |slots: &mut Vec<ProviderSlot>| {
        if let Some(key) = &providers.openai_api_key {
            let base = registry::lookup("openai").map(|p| p.base_url.to_string());
            slots.push(ProviderSlot::with_default_attempts(Box::new(
                catalog_llm::openai_compat::OpenAiCompatProvider::new(key.clone(), base),
            )));
        }
    };
    let push_yandex = |slots: &mut Vec<ProviderSlot>| {
        if let (Some(key), Some(folder)) = (&providers.yandex_api_key, &providers.yandex_folder_id) {
            slots.push(ProviderSlot::with_default_attempts(Box::new(
                catalog_llm::yandex::YandexProvider::new(key.clone(), folder.clone()),
            )));
        }
    };

    if providers.default_provider == "yandex" {
        push_yandex(&mut slots);
        push_openai(&mut slots);
    } else {
        push_openai(&mut slots);
        push_yandex(&mut slots);
    }

    if slots.is_empty() {
        anyhow::bail!("no LLM provider credentials configured (set OPENAI_API_KEY or YANDEX_API_KEY/YANDEX_FOLDER_ID)");
    }
    Ok(ProviderRouter::new(slots))
}

/// Both configured channels folded into one sink — each concrete notifier
/// already fans an individual event out to every target it owns (manager
/// chat + admin ids, or every manager email), so a second transport is only
/// needed when both channels are configured at once.
fn fan_out_lead_notifier(
    telegram: &Option<Arc<TelegramNotifier>>,
    email: &Option<Arc<EmailNotifier>>,
) -> Option<Arc<dyn LeadNotifier>> {
    match (telegram, email) {
        (Some(t), Some(e)) => Some(Arc::new(FanOutNotifier(vec![
            t.clone() as Arc<dyn LeadNotifier>,
            e.clone() as Arc<dyn LeadNotifier>,
        ]))),
        (Some(t), None) => Some(t.clone()),
        (None, Some(e)) => Some(e.clone()),
        (None, None) => None,
    }
}

struct FanOutNotifier(Vec<Arc<dyn LeadNotifier>>);

#[async_trait::async_trait]
impl LeadNotifier for FanOutNotifier {
    async fn notify_lead_captured(&self, lead: &catalog_leads::Lead) {
        for notifier in &self.0 {
            notifier.notify_lead_captured(lead).await;
        }
    }
}

impl OrchestratorContext for AppState {
    fn conversations(&self) -> &ConversationManager {
        &self.conversations
    }
    fn llm(&self) -> &dyn LlmProvider {
        &self.llm
    }
    fn prompts(&self) -> &PromptRegistry {
        &self.prompts
    }
    fn catalog(&self) -> &CatalogEngine {
        &self.catalog
    }
    fn services(&self) -> &ServiceStore {
        &self.services
    }
    fn leads(&self) -> &LeadStore {
        &self.leads
    }
    fn search_config(&self) -> &catalog_core::config::CatalogSearchConfig {
        &self.config.catalog
    }
    fn default_model(&self) -> &str {
        match self.config.providers.default_provider.as_str() {
            "yandex" => self
                .config
                .providers
                .yandex_default_model
                .as_deref()
                .unwrap_or("yandexgpt-lite"),
            _ => self
                .config
                .providers
                .openai_default_model
                .as_deref()
                .unwrap_or("gpt-4o-mini"),
        }
    }
    fn lead_notifier(&self) -> Option<&dyn LeadNotifier> {
        self.lead_notifier.as_deref()
    }
    fn cost_guard(&self) -> Option<&CostGuard> {
        Some(&self.cost_guard)
    }
}

/// The CRM client used when `CRM_API_URL` is unset: every call fails with
/// `NotConfigured`, so the worker simply finds nothing it can deliver
/// rather than panicking at startup.
struct UnconfiguredCrmClient;

#[async_trait::async_trait]
impl catalog_crm::CrmClient for UnconfiguredCrmClient {
    async fn search(&self, _phone: Option<&str>, _email: Option<&str>) -> catalog_crm::error::Result<Option<String>> {
        Err(catalog_crm::CrmError::NotConfigured)
    }
    async fn create_lead(&self, _payload: &LeadPayload) -> catalog_crm::error::Result<String> {
        Err(catalog_crm::CrmError::NotConfigured)
    }
    async fn add_note(&self, _crm_id: &str, _text: &str) -> catalog_crm::error::Result<()> {
        Err(catalog_crm::CrmError::NotConfigured)
    }
}

/// Health-check support: a cheap round-trip against the lead store, which
/// every build of this process has open. `degraded` distinguishes "DB is
/// reachable but the cost guard's kill-switch has tripped" from outright
/// failure.
pub fn health_status(state: &AppState) -> (&'static str, bool, bool) {
    health_status_of(&state.leads, &state.cost_guard)
}

fn health_status_of(leads: &LeadStore, cost_guard: &CostGuard) -> (&'static str, bool, bool) {
    let database_ok = leads.pending_for_delivery().is_ok();
    let cost_guard_ok = !cost_guard.is_tripped();
    let status = if !database_ok {
        "unhealthy"
    } else if !cost_guard_ok {
        "degraded"
    } else {
        "healthy"
    };
    (status, database_ok, cost_guard_ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::config::CostGuardConfig;

    fn open() -> Arc<Mutex<Connection>> {
        Arc::new(Mutex::new(Connection::open_in_memory().unwrap()))
    }

    #[test]
    fn healthy_when_database_ok_and_kill_switch_untripped() {
        let leads = LeadStore::new(open()).unwrap();
        let cost_guard = CostGuard::new(open(), CostGuardConfig::default()).unwrap();

        let (status, database_ok, cost_guard_ok) = health_status_of(&leads, &cost_guard);

        assert_eq!(status, "healthy");
        assert!(database_ok);
        assert!(cost_guard_ok);
    }

    #[test]
    fn degraded_when_kill_switch_tripped() {
        let leads = LeadStore::new(open()).unwrap();
        let cost_guard = CostGuard::new(open(), CostGuardConfig::default()).unwrap();
        cost_guard.kill_switch().store(true, std::sync::atomic::Ordering::SeqCst);

        let (status, database_ok, cost_guard_ok) = health_status_of(&leads, &cost_guard);

        assert_eq!(status, "degraded");
        assert!(database_ok);
        assert!(!cost_guard_ok);
    }
}
