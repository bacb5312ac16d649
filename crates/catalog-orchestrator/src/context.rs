use catalog_conversation::ConversationManager;
use catalog_core::config::CatalogSearchConfig;
use catalog_leads::{LeadNotifier, LeadStore};
use catalog_llm::provider::LlmProvider;
use catalog_prompts::registry::PromptRegistry;
use catalog_services::ServiceStore;
use catalog_vector::CatalogEngine;

/// Shared context interface the turn pipeline needs, analogous to
/// `skynet-agent`'s `MessageContext` — defined here so `catalog-orchestrator`
/// stays free of concrete transport types. `catalog-gateway::AppState`
/// implements this.
pub trait OrchestratorContext: Send + Sync {
    fn conversations(&self) -> &ConversationManager;
    fn llm(&self) -> &dyn LlmProvider;
    fn prompts(&self) -> &PromptRegistry;
    fn catalog(&self) -> &CatalogEngine;
    fn services(&self) -> &ServiceStore;
    fn leads(&self) -> &LeadStore;
    fn search_config(&self) -> &CatalogSearchConfig;
    /// The model name to put on outgoing `ChatRequest`s — resolved by the
    /// host from `LLMSetting`/`DEFAULT_LLM_PROVIDER`, since only the host
    /// knows which provider slot is actually active.
    fn default_model(&self) -> &str;
    /// Dispatched right after a lead is durably persisted (`spec.md` §4.8,
    /// distinct from C9's "CRM synced" notification). `None` when no
    /// notifier is wired (e.g. in tests).
    fn lead_notifier(&self) -> Option<&dyn LeadNotifier> {
        None
    }
    /// Rolls every completion's tokens into the monthly usage ledger
    /// (`spec.md` §4.12). `None` when no guard is wired (e.g. in tests).
    fn cost_guard(&self) -> Option<&catalog_cost::CostGuard> {
        None
    }
}
