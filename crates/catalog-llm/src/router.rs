use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::provider::{
    ChatRequest, ChatResponse, LlmProvider, ProviderError, MAX_ATTEMPTS, RETRY_BASE_MS, RETRY_CAP_MS,
    RETRY_FACTOR,
};
use crate::stream::StreamEvent;

/// Configuration for a single provider slot inside the `ProviderRouter`.
pub struct ProviderSlot {
    pub provider: Box<dyn LlmProvider>,
    /// Total attempts (including the first) before moving to the next slot.
    pub max_attempts: u32,
}

impl ProviderSlot {
    pub fn new(provider: Box<dyn LlmProvider>, max_attempts: u32) -> Self {
        Self {
            provider,
            max_attempts,
        }
    }

    /// A slot using `spec.md`'s default retry budget (3 attempts).
    pub fn with_default_attempts(provider: Box<dyn LlmProvider>) -> Self {
        Self::new(provider, MAX_ATTEMPTS)
    }
}

/// `base * factor^attempt`, capped — `spec.md` §4.2's retry policy.
fn backoff_delay(attempt: u32) -> std::time::Duration {
    let millis = RETRY_BASE_MS.saturating_mul(RETRY_FACTOR.pow(attempt) as u64);
    std::time::Duration::from_millis(millis.min(RETRY_CAP_MS))
}

/// Auth failures are surfaced immediately, never retried.
fn is_auth_error(e: &ProviderError) -> bool {
    matches!(e, ProviderError::Api { status, .. } if *status == 401 || *status == 403)
}

/// Routes requests across the providers configured via `LLMSetting` with
/// automatic failover. Providers are tried in priority order (index 0
/// first — normally just the single `is_active` provider, with
/// `DEFAULT_LLM_PROVIDER` appended as a fallback slot).
pub struct ProviderRouter {
    slots: Vec<ProviderSlot>,
    /// Set by the Cost Guard when monthly spend crosses its limit. Checked
    /// before every call so a tripped guard costs nothing beyond this read —
    /// cleared only by explicit operator action.
    kill_switch: Option<Arc<AtomicBool>>,
}

impl ProviderRouter {
    pub fn new(slots: Vec<ProviderSlot>) -> Self {
        assert!(
            !slots.is_empty(),
            "ProviderRouter requires at least one provider slot"
        );
        Self {
            slots,
            kill_switch: None,
        }
    }

    /// Wire in a shared kill-switch flag (owned by the Cost Guard).
    pub fn with_kill_switch(mut self, kill_switch: Arc<AtomicBool>) -> Self {
        self.kill_switch = Some(kill_switch);
        self
    }

    fn check_kill_switch(&self) -> Result<(), ProviderError> {
        if self
            .kill_switch
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return Err(ProviderError::CostLimitExceeded);
        }
        Ok(())
    }
}

#[async_trait]
impl LlmProvider for ProviderRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.check_kill_switch()?;
        let mut last_err: Option<ProviderError> = None;

        for slot in &self.slots {
            let provider_name = slot.provider.name();
            let attempts = slot.max_attempts.max(1);

            for attempt in 0..attempts {
                match slot.provider.send(req).await {
                    Ok(resp) => {
                        if attempt > 0 {
                            info!(provider = %provider_name, attempt, "request succeeded after retry");
                        }
                        return Ok(resp);
                    }
                    Err(e) => {
                        warn!(provider = %provider_name, attempt, err = %e, "provider send failed");

                        if matches!(e, ProviderError::RateLimited { .. }) || is_auth_error(&e) {
                            last_err = Some(e);
                            break;
                        }

                        last_err = Some(e);

                        if attempt + 1 < attempts {
                            tokio::time::sleep(backoff_delay(attempt)).await;
                        }
                    }
                }
            }

            info!(provider = %provider_name, "provider exhausted, trying next provider");
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("all providers failed".to_string())))
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        self.check_kill_switch()?;
        let mut last_err: Option<ProviderError> = None;

        for slot in &self.slots {
            let provider_name = slot.provider.name();
            let attempts = slot.max_attempts.max(1);

            for attempt in 0..attempts {
                match slot.provider.send_stream(req, tx.clone()).await {
                    Ok(()) => {
                        if attempt > 0 {
                            info!(provider = %provider_name, attempt, "stream request succeeded after retry");
                        }
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(provider = %provider_name, attempt, err = %e, "provider send_stream failed");

                        if matches!(e, ProviderError::RateLimited { .. }) || is_auth_error(&e) {
                            last_err = Some(e);
                            break;
                        }

                        last_err = Some(e);

                        if attempt + 1 < attempts {
                            tokio::time::sleep(backoff_delay(attempt)).await;
                        }
                    }
                }
            }

            info!(provider = %provider_name, "stream provider exhausted, trying next provider");
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("all providers failed".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatRequest, ChatResponse, Message, Role};
    use async_trait::async_trait;

    struct AlwaysFail;

    #[async_trait]
    impl LlmProvider for AlwaysFail {
        fn name(&self) -> &str {
            "always-fail"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::Unavailable("intentional failure".to_string()))
        }
    }

    struct AlwaysOk;

    #[async_trait]
    impl LlmProvider for AlwaysOk {
        fn name(&self) -> &str {
            "always-ok"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "ok".to_string(),
                provider: "always-ok".to_string(),
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "stop".to_string(),
            })
        }
    }

    fn dummy_request() -> ChatRequest {
        ChatRequest {
            model: "test-model".to_string(),
            system: "You are a test.".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: "hello".to_string(),
            }],
            max_tokens: 64,
            stream: false,
        }
    }

    #[tokio::test]
    async fn router_falls_back_to_second_provider() {
        let router = ProviderRouter::new(vec![
            ProviderSlot::new(Box::new(AlwaysFail), 0),
            ProviderSlot::new(Box::new(AlwaysOk), 0),
        ]);

        let result = router.send(&dummy_request()).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap().content, "ok");
    }

    #[tokio::test]
    async fn router_errors_when_all_fail() {
        let router = ProviderRouter::new(vec![
            ProviderSlot::new(Box::new(AlwaysFail), 0),
            ProviderSlot::new(Box::new(AlwaysFail), 0),
        ]);

        let result = router.send(&dummy_request()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tripped_kill_switch_short_circuits_before_any_provider_call() {
        let flag = Arc::new(AtomicBool::new(true));
        let router = ProviderRouter::new(vec![ProviderSlot::new(Box::new(AlwaysOk), 0)])
            .with_kill_switch(flag);

        let result = router.send(&dummy_request()).await;
        assert!(matches!(result, Err(ProviderError::CostLimitExceeded)));
    }

    struct AlwaysUnauthorized;

    #[async_trait]
    impl LlmProvider for AlwaysUnauthorized {
        fn name(&self) -> &str {
            "always-401"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::Api {
                status: 401,
                message: "invalid api key".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn auth_error_is_not_retried_within_a_slot() {
        let router = ProviderRouter::new(vec![ProviderSlot::new(Box::new(AlwaysUnauthorized), 3)]);
        let result = router.send(&dummy_request()).await;
        assert!(matches!(result, Err(ProviderError::Api { status: 401, .. })));
    }

    #[test]
    fn backoff_delay_follows_base_factor_cap() {
        assert_eq!(backoff_delay(0).as_millis(), 500);
        assert_eq!(backoff_delay(1).as_millis(), 1000);
        assert_eq!(backoff_delay(2).as_millis(), 2000);
        assert_eq!(backoff_delay(10).as_millis(), RETRY_CAP_MS as u128);
    }
}
