use std::time::Duration;

use catalog_conversation::types::Role as ConvRole;
use catalog_core::types::Intent;
use catalog_llm::provider::{ChatRequest, Message as LlmMessage, Role as LlmRole};
use tracing::warn;

use crate::classify::classify;
use crate::context::OrchestratorContext;
use crate::contact::extract_contact_fields;

/// Per-turn soft deadline (`spec.md` §5) — `process_turn` returns a canned
/// fallback reply rather than propagating a timeout to the transport.
pub const DEFAULT_TURN_DEADLINE_SECS: u64 = catalog_core::config::DEFAULT_TURN_DEADLINE_SECS;

/// How many prior turns are attached to the LLM call (`spec.md` §4.5/§4.7).
pub const HISTORY_WINDOW: usize = catalog_core::config::CONTEXT_WINDOW_SIZE;

pub const FALLBACK_REPLY: &str =
    "Sorry, that's taking longer than expected. Please try again in a moment.";

#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub intent: Intent,
    pub suggested_actions: Vec<String>,
}

/// Runs the whole per-turn pipeline (`spec.md` §4.7's 8 steps) with a soft
/// deadline. On expiry the caller gets a polite fallback, not an error.
pub async fn process_turn<C: OrchestratorContext>(
    ctx: &C,
    chat_id: &str,
    platform: &str,
    user_text: &str,
) -> Reply {
    match tokio::time::timeout(
        Duration::from_secs(DEFAULT_TURN_DEADLINE_SECS),
        process_turn_inner(ctx, chat_id, platform, user_text),
    )
    .await
    {
        Ok(reply) => reply,
        Err(_) => {
            warn!(chat_id, "turn exceeded the soft deadline, returning fallback reply");
            Reply {
                text: FALLBACK_REPLY.to_string(),
                intent: Intent::General,
                suggested_actions: Vec::new(),
            }
        }
    }
}

async fn process_turn_inner<C: OrchestratorContext>(
    ctx: &C,
    chat_id: &str,
    platform: &str,
    user_text: &str,
) -> Reply {
    // 1. Append user turn to the Conversation Store.
    let conversation = match ctx.conversations().open_or_get(chat_id, platform) {
        Ok(c) => c,
        Err(e) => {
            warn!(chat_id, err = %e, "failed to open conversation, answering without history");
            return Reply {
                text: FALLBACK_REPLY.to_string(),
                intent: Intent::General,
                suggested_actions: Vec::new(),
            };
        }
    };
    if let Err(e) = ctx
        .conversations()
        .append(&conversation.id, ConvRole::User, user_text, None)
        .await
    {
        warn!(chat_id, err = %e, "failed to persist user turn");
    }

    // 2. Classify.
    let intent = classify(ctx.llm(), ctx.default_model(), user_text).await;

    // 3-5. Dispatch by intent, build retrieval context, call the LLM.
    let (prompt_name, retrieval_context) = match intent {
        Intent::Product => {
            let hits = ctx.catalog().search(user_text, 10, ctx.search_config()).await.unwrap_or_else(|e| {
                warn!(chat_id, err = %e, "catalog search failed");
                Vec::new()
            });
            ("product_search", render_product_hits(&hits))
        }
        Intent::Service => {
            let services = ctx.services().find_services(user_text).unwrap_or_else(|e| {
                warn!(chat_id, err = %e, "service search failed");
                Vec::new()
            });
            ("service_answer", render_services(&services))
        }
        Intent::CompanyInfo => {
            let info = ctx.services().company_info().ok().flatten();
            ("company_info", info.map(|i| i.content).unwrap_or_default())
        }
        Intent::Contact => {
            let draft = extract_contact_fields(user_text, platform);
            match ctx.leads().create_or_update(chat_id, &draft) {
                Ok(lead) => {
                    // Fires on persist, independent of C9's later "CRM
                    // synced" notification (`spec.md` §4.8/§4.9).
                    if let Some(notifier) = ctx.lead_notifier() {
                        notifier.notify_lead_captured(&lead).await;
                    }
                    ("lead_qualification", format!("Captured lead for {}.", lead.last_name))
                }
                Err(e) => ("lead_qualification", format!("Could not capture contact details: {e}")),
            }
        }
        Intent::General => ("general_conversation", String::new()),
    };

    let reply_text = compose_reply(ctx, &conversation.id, prompt_name, &retrieval_context, user_text).await;

    // 6. Append assistant turn, annotated with intent.
    let metadata = serde_json::json!({ "intent": intent.label() }).to_string();
    if let Err(e) = ctx
        .conversations()
        .append(&conversation.id, ConvRole::Assistant, &reply_text, Some(&metadata))
        .await
    {
        warn!(chat_id, err = %e, "failed to persist assistant turn");
    }

    // 7. Suggested post-reply actions.
    let suggested_actions = suggested_actions_for(intent, &retrieval_context);

    Reply {
        text: reply_text,
        intent,
        suggested_actions,
    }
}

async fn compose_reply<C: OrchestratorContext>(
    ctx: &C,
    conversation_id: &str,
    prompt_name: &str,
    retrieval_context: &str,
    user_text: &str,
) -> String {
    let system_prompt = match ctx.prompts().get(prompt_name) {
        Ok(p) => p.content,
        Err(e) => {
            warn!(prompt_name, err = %e, "prompt lookup failed, using a bare instruction");
            "You are a helpful assistant.".to_string()
        }
    };
    let system = format!(
        "{system_prompt}\n\nAlways reply in the same language the user wrote in.\n\n{}",
        if retrieval_context.is_empty() {
            String::new()
        } else {
            format!("Context:\n{retrieval_context}")
        }
    );

    let history = ctx
        .conversations()
        .recent_window(conversation_id, HISTORY_WINDOW)
        .unwrap_or_default();
    let mut messages: Vec<LlmMessage> = history
        .iter()
        .filter(|m| m.role != catalog_conversation::types::Role::System)
        .map(|m| LlmMessage {
            role: match m.role {
                catalog_conversation::types::Role::User => LlmRole::User,
                catalog_conversation::types::Role::Assistant => LlmRole::Assistant,
                catalog_conversation::types::Role::System => LlmRole::System,
            },
            content: m.content.clone(),
        })
        .collect();
    if messages.last().map(|m| m.content.as_str()) != Some(user_text) {
        messages.push(LlmMessage {
            role: LlmRole::User,
            content: user_text.to_string(),
        });
    }

    let request = ChatRequest {
        model: ctx.default_model().to_string(),
        system,
        messages,
        max_tokens: 1024,
        stream: false,
    };

    match ctx.llm().send(&request).await {
        Ok(resp) => {
            if let Some(guard) = ctx.cost_guard() {
                if let Err(e) = guard.record_usage(&resp.provider, &resp.model, resp.tokens_in, resp.tokens_out) {
                    warn!(err = %e, "failed to record LLM usage against the cost guard");
                }
            }
            resp.content
        }
        Err(e) => {
            warn!(err = %e, "LLM call failed for turn reply");
            "I'm having trouble answering right now. Please try again shortly, or ask to speak with a manager.".to_string()
        }
    }
}

fn render_product_hits(hits: &[catalog_vector::SearchHit]) -> String {
    if hits.is_empty() {
        return "No matching products were found in the catalog.".to_string();
    }
    hits.iter()
        .map(|hit| {
            format!(
                "- {} (article {}, score {:.2})",
                hit.product.product_name, hit.product.article, hit.score
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_services(services: &[catalog_services::CompanyService]) -> String {
    if services.is_empty() {
        return "No matching services were found.".to_string();
    }
    services
        .iter()
        .map(|s| format!("- {}: {}", s.title, s.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn suggested_actions_for(intent: Intent, retrieval_context: &str) -> Vec<String> {
    match intent {
        Intent::Product if retrieval_context.starts_with("No matching") => {
            vec!["offer_manager_contact".to_string()]
        }
        Intent::Contact => vec!["lead_captured".to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use catalog_conversation::ConversationManager;
    use catalog_leads::LeadStore;
    use catalog_llm::provider::{ChatResponse, LlmProvider, ProviderError};
    use catalog_prompts::registry::PromptRegistry;
    use catalog_services::ServiceStore;
    use catalog_vector::CatalogEngine;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex as StdMutex};

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: format!("echo: {}", req.messages.last().map(|m| m.content.as_str()).unwrap_or("")),
                provider: "echo".to_string(),
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "stop".to_string(),
            })
        }
    }

    struct TestContext {
        conversations: ConversationManager,
        llm: EchoProvider,
        prompts: PromptRegistry,
        catalog: CatalogEngine,
        services: ServiceStore,
        leads: LeadStore,
        search_config: catalog_core::config::CatalogSearchConfig,
    }

    impl TestContext {
        fn new(dir: &std::path::Path) -> Self {
            Self {
                conversations: ConversationManager::new(Arc::new(StdMutex::new(Connection::open_in_memory().unwrap()))).unwrap(),
                llm: EchoProvider,
                prompts: PromptRegistry::new(Arc::new(StdMutex::new(Connection::open_in_memory().unwrap()))).unwrap(),
                catalog: CatalogEngine::new(dir, Connection::open_in_memory().unwrap()).unwrap(),
                services: ServiceStore::new(Arc::new(StdMutex::new(Connection::open_in_memory().unwrap()))).unwrap(),
                leads: LeadStore::new(Arc::new(StdMutex::new(Connection::open_in_memory().unwrap()))).unwrap(),
                search_config: catalog_core::config::CatalogSearchConfig::default(),
            }
        }
    }

    impl OrchestratorContext for TestContext {
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
            &self.search_config
        }
        fn default_model(&self) -> &str {
            "test-model"
        }
    }

    #[tokio::test]
    async fn general_turn_round_trips_through_conversation_store() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = TestContext::new(dir.path());

        let reply = process_turn(&ctx, "chat-1", "TG", "hello there, how are you").await;
        assert_eq!(reply.intent, Intent::General);
        assert!(reply.text.contains("echo:"));

        let conversation = ctx.conversations().open_or_get("chat-1", "TG").unwrap();
        let history = ctx.conversations().recent_window(&conversation.id, 10).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn contact_turn_captures_a_lead() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = TestContext::new(dir.path());

        let reply = process_turn(&ctx, "chat-2", "TG", "свяжитесь со мной, +79001234567, Иванов").await;
        assert_eq!(reply.intent, Intent::Contact);
        assert_eq!(reply.suggested_actions, vec!["lead_captured".to_string()]);

        let pending = ctx.leads().pending_for_delivery().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].last_name, "Иванов");
    }
}
