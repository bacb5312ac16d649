use serde::{Deserialize, Serialize};

/// A named prompt template, versioned (`spec.md` §3 Prompt).
///
/// Invariant: per `name`, exactly one row has `active = true`. Versions are
/// monotonically increasing and immutable once superseded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    pub content: String,
    pub version: u32,
    pub active: bool,
    /// Role this prompt is rendered under when sent to the LLM (almost
    /// always `"system"` — kept as a field rather than hardcoded so a
    /// future prompt type isn't blocked on a schema change).
    pub role: String,
    pub created_at: String,
}

/// Seed content compiled into the binary; inserted with `version=1,
/// active=true` the first time the `prompts` table is empty.
pub(crate) const SEED_PROMPTS: &[(&str, &str)] = &[
    (
        "product_search",
        "You help customers find products in our catalog. Use the supplied \
         search results to answer; mention product name, article number, and \
         price when known. If no result matches well, say so plainly and \
         offer to connect the customer with a human.",
    ),
    (
        "service_answer",
        "You answer questions about the company's services using the supplied \
         service descriptions. Be concise and factual; do not invent services \
         not present in the context.",
    ),
    (
        "company_info",
        "You answer general questions about the company (hours, location, \
         contacts, policies) using the supplied company information. If the \
         answer isn't in the context, say you don't have that information.",
    ),
    (
        "lead_qualification",
        "The customer wants to be contacted by a human or has supplied contact \
         details. Acknowledge their request, confirm what you've captured, and \
         continue helping with their original question if one is still open.",
    ),
    (
        "general_conversation",
        "You are a helpful assistant for this company's Telegram channel. \
         Keep responses short and friendly. If the customer asks about \
         products or services, say you can help them look those up.",
    ),
];
