use std::time::Duration;

use catalog_core::types::Intent;
use catalog_llm::provider::LlmProvider;
use tracing::warn;

/// Soft latency budget for the classifier's LLM fallback path, distinct
/// from the per-turn deadline (`spec.md` §4.6's "<500ms median" keyword
/// pre-pass target, reused here as the LLM-call timeout).
pub const CLASSIFIER_TIMEOUT_MS: u64 = 500;

/// Per-label anchor terms checked case-insensitively. Small static tables,
/// same shape as `catalog-llm::registry`'s `KNOWN_PROVIDERS` slice.
struct KeywordSet {
    intent: Intent,
    terms: &'static [&'static str],
}

const KEYWORD_SETS: &[KeywordSet] = &[
    KeywordSet {
        intent: Intent::Product,
        terms: &[
            "product", "buy", "price", "catalog", "article", "товар", "купить", "цена", "каталог", "артикул",
        ],
    },
    KeywordSet {
        intent: Intent::Service,
        terms: &["service", "услуга", "услуги", "сервис"],
    },
    KeywordSet {
        intent: Intent::CompanyInfo,
        terms: &[
            "hours", "address", "location", "about you", "часы работы", "адрес", "реквизиты", "о компании",
        ],
    },
    KeywordSet {
        intent: Intent::Contact,
        terms: &[
            "call me", "contact me", "my phone", "my number", "my email",
            "свяжитесь", "позвоните", "мой телефон", "мой номер", "моя почта",
        ],
    },
];

/// Keyword pre-pass: returns `Some(intent)` only when exactly one label's
/// terms match, so the pre-pass never guesses on ambiguous input.
pub fn keyword_classify(text: &str) -> Option<Intent> {
    let lowered = text.to_lowercase();
    let mut matched: Option<Intent> = None;
    for set in KEYWORD_SETS {
        if set.terms.iter().any(|term| lowered.contains(term)) {
            if matched.is_some() {
                return None;
            }
            matched = Some(set.intent);
        }
    }
    matched
}

/// Classifies `text` per `spec.md` §4.6: keyword pre-pass first (fully
/// deterministic), then the LLM fallback under its own timeout, issued
/// against `model` (the caller's configured default completion model —
/// never a provider id). Any failure — timeout, provider error, or an
/// unrecognized label — falls back to `GENERAL` and logs a warning rather
/// than failing the turn.
pub async fn classify(provider: &dyn LlmProvider, model: &str, text: &str) -> Intent {
    if let Some(intent) = keyword_classify(text) {
        return intent;
    }

    let labels: Vec<&str> = Intent::ALL.iter().map(Intent::label).collect();
    let outcome = tokio::time::timeout(
        Duration::from_millis(CLASSIFIER_TIMEOUT_MS),
        provider.classify(model, text, &labels),
    )
    .await;

    match outcome {
        Ok(Ok(label)) => label.trim().to_uppercase().parse().unwrap_or_else(|_| {
            warn!(%label, "classifier returned an unrecognized label, defaulting to GENERAL");
            Intent::General
        }),
        Ok(Err(e)) => {
            warn!(err = %e, "classifier LLM call failed, defaulting to GENERAL");
            Intent::General
        }
        Err(_) => {
            warn!("classifier LLM call timed out, defaulting to GENERAL");
            Intent::General
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unambiguous_product_keyword_matches() {
        assert_eq!(keyword_classify("what's the price of this catalog item"), Some(Intent::Product));
    }

    #[test]
    fn russian_contact_keyword_matches() {
        assert_eq!(keyword_classify("пожалуйста, позвоните мне"), Some(Intent::Contact));
    }

    #[test]
    fn ambiguous_input_with_two_labels_returns_none() {
        assert_eq!(keyword_classify("what's the price of your service"), None);
    }

    #[test]
    fn unrelated_text_returns_none() {
        assert_eq!(keyword_classify("hello there, how are you"), None);
    }

    #[test]
    fn keyword_classify_is_deterministic() {
        let text = "what is the price";
        assert_eq!(keyword_classify(text), keyword_classify(text));
    }
}
