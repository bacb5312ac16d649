/// Static USD price per 1,000 tokens for a known `(provider, model)` pair.
///
/// Mirrors the small known-provider table in `catalog-llm::registry` —
/// pricing is looked up the same way providers are: a short compiled-in
/// slice, not a remote catalog.
pub struct ModelPrice {
    pub provider: &'static str,
    pub model: &'static str,
    pub price_per_1k_usd: f64,
}

pub const KNOWN_PRICES: &[ModelPrice] = &[
    ModelPrice {
        provider: "openai",
        model: "gpt-4o-mini",
        price_per_1k_usd: 0.00015,
    },
    ModelPrice {
        provider: "yandex",
        model: "yandexgpt-lite",
        price_per_1k_usd: 0.0002,
    },
];

/// Default price applied to an unrecognised `(provider, model)` pair, so a
/// newly-configured model still accrues a cost rather than being free.
pub const DEFAULT_PRICE_PER_1K_USD: f64 = 0.001;

pub fn lookup_price(provider: &str, model: &str) -> f64 {
    KNOWN_PRICES
        .iter()
        .find(|p| p.provider == provider && p.model == model)
        .map(|p| p.price_per_1k_usd)
        .unwrap_or(DEFAULT_PRICE_PER_1K_USD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_pair_uses_table_price() {
        assert_eq!(lookup_price("openai", "gpt-4o-mini"), 0.00015);
    }

    #[test]
    fn unknown_pair_falls_back_to_default() {
        assert_eq!(lookup_price("openai", "some-future-model"), DEFAULT_PRICE_PER_1K_USD);
    }
}
