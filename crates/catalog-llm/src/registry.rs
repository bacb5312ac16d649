//! Built-in provider registry — maps well-known provider IDs to their API
//! endpoints and default models (`spec.md` §6 `DEFAULT_LLM_PROVIDER`).

/// A well-known LLM provider that is OpenAI-compatible.
pub struct KnownProvider {
    /// Short identifier used in config (e.g. "openai").
    pub id: &'static str,
    pub name: &'static str,
    /// Base URL without trailing slash.
    pub base_url: &'static str,
    /// Path appended to base_url for chat completions.
    pub chat_path: &'static str,
    pub default_model: &'static str,
}

impl KnownProvider {
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.chat_path)
    }
}

pub const KNOWN_PROVIDERS: &[KnownProvider] = &[
    KnownProvider {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com",
        chat_path: "/v1/chat/completions",
        default_model: "gpt-4o-mini",
    },
    KnownProvider {
        id: "yandex",
        name: "Yandex Cloud ML",
        base_url: "https://llm.api.cloud.yandex.net",
        chat_path: "/foundationModels/v1/completion",
        default_model: "yandexgpt-lite",
    },
];

/// Look up a known provider by its ID.
pub fn lookup(id: &str) -> Option<&'static KnownProvider> {
    KNOWN_PROVIDERS.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_openai_and_yandex() {
        assert!(lookup("openai").is_some());
        assert!(lookup("yandex").is_some());
        assert!(lookup("nonexistent").is_none());
    }

    #[test]
    fn endpoint_concatenates_base_and_path() {
        let p = lookup("openai").unwrap();
        assert_eq!(p.endpoint(), "https://api.openai.com/v1/chat/completions");
    }
}
