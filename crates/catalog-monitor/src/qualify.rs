use catalog_conversation::Message;

/// Intent labels that make an idle conversation worth auto-qualifying into
/// a lead (`spec.md` §4.8's "recent `PRODUCT` or `CONTACT` intents" example,
/// resolved as Open Question decision 2 in `DESIGN.md`).
const QUALIFYING_INTENTS: &[&str] = &["PRODUCT", "CONTACT"];

/// `catalog-orchestrator::process_turn` tags every assistant turn's
/// metadata with `{"intent": "..."}`; this scans the last few turns for one
/// of the qualifying labels.
pub fn qualifies_for_probe(recent_messages: &[Message]) -> bool {
    recent_messages.iter().any(|m| {
        let Some(metadata) = &m.metadata else {
            return false;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(metadata) else {
            return false;
        };
        value
            .get("intent")
            .and_then(|v| v.as_str())
            .is_some_and(|intent| QUALIFYING_INTENTS.contains(&intent))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_conversation::Role;

    fn message(metadata: Option<&str>) -> Message {
        Message {
            id: 1,
            conversation_id: "c1".to_string(),
            role: Role::Assistant,
            content: "x".to_string(),
            metadata: metadata.map(str::to_string),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn qualifies_when_a_recent_turn_carries_product_intent() {
        let messages = vec![message(None), message(Some(r#"{"intent":"GENERAL"}"#)), message(Some(r#"{"intent":"PRODUCT"}"#))];
        assert!(qualifies_for_probe(&messages));
    }

    #[test]
    fn does_not_qualify_without_a_qualifying_intent() {
        let messages = vec![message(Some(r#"{"intent":"GENERAL"}"#)), message(Some(r#"{"intent":"COMPANY_INFO"}"#))];
        assert!(!qualifies_for_probe(&messages));
    }

    #[test]
    fn empty_history_does_not_qualify() {
        assert!(!qualifies_for_probe(&[]));
    }
}
