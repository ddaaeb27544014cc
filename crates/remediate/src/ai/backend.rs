//! Breaker-guarded AI backend used by the investigation loop.

use std::sync::Arc;

use async_trait::async_trait;
use circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerFactory};

use super::provider::{AIMessage, AIProvider, GenerateOptions, TokenUsage};
use super::prompts::INVESTIGATION_SYSTEM_PROMPT;
use crate::errors::{RemediateError, RemediateResult};

/// Name of the breaker guarding AI calls.
pub const AI_BREAKER_NAME: &str = "ai-backend";

/// Reply to a single prompt.
#[derive(Debug, Clone, Default)]
pub struct AiReply {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// The AI service as seen by the investigation loop.
#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn send_message(&self, prompt: &str) -> RemediateResult<AiReply>;
}

/// [`AiBackend`] that routes every call through the `ai-backend` breaker.
pub struct GuardedAiBackend {
    provider: Arc<dyn AIProvider>,
    breaker: Arc<CircuitBreaker>,
    model: String,
    options: GenerateOptions,
}

impl GuardedAiBackend {
    /// Wrap `provider`, sharing the breaker registered in `factory`.
    pub fn new(
        provider: Arc<dyn AIProvider>,
        factory: &CircuitBreakerFactory,
        model: impl Into<String>,
        options: GenerateOptions,
    ) -> Self {
        Self {
            provider,
            breaker: factory.get_or_create(AI_BREAKER_NAME, None),
            model: model.into(),
            options,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl AiBackend for GuardedAiBackend {
    async fn send_message(&self, prompt: &str) -> RemediateResult<AiReply> {
        let messages = [
            AIMessage::system(INVESTIGATION_SYSTEM_PROMPT),
            AIMessage::user(prompt),
        ];

        let response = self
            .breaker
            .execute(|| {
                self.provider
                    .generate_text(&self.model, &messages, &self.options)
            })
            .await
            .map_err(|err| match err {
                BreakerError::Open(open) => RemediateError::CircuitOpen(open),
                BreakerError::Inner(inner) => inner,
            })?;

        Ok(AiReply {
            content: response.text,
            usage: Some(response.usage),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::AIResponse;
    use circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl AIProvider for FlakyProvider {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn api_key_env_var(&self) -> &'static str {
            "FLAKY_API_KEY"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn generate_text(
            &self,
            model: &str,
            _messages: &[AIMessage],
            _options: &GenerateOptions,
        ) -> RemediateResult<AIResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RemediateError::Ai("upstream 503".to_string()));
            }
            Ok(AIResponse {
                text: "analysis".to_string(),
                usage: TokenUsage::default(),
                model: model.to_string(),
                provider: "flaky".to_string(),
            })
        }
    }

    fn factory() -> CircuitBreakerFactory {
        CircuitBreakerFactory::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..CircuitBreakerConfig::default()
        })
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let backend =
            GuardedAiBackend::new(provider.clone(), &factory(), "test", GenerateOptions::default());

        let reply = backend.send_message("what happened?").await.unwrap();
        assert_eq!(reply.content, "analysis");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_open_shared_breaker() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let factory = factory();
        let backend =
            GuardedAiBackend::new(provider.clone(), &factory, "test", GenerateOptions::default());

        for _ in 0..2 {
            let err = backend.send_message("x").await.unwrap_err();
            assert!(matches!(err, RemediateError::Ai(_)));
        }

        let err = backend.send_message("x").await.unwrap_err();
        let open = err.circuit_open().expect("breaker denial");
        assert_eq!(open.circuit_name, AI_BREAKER_NAME);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let shared = factory.get(AI_BREAKER_NAME).expect("registered breaker");
        assert_eq!(shared.state(), CircuitState::Open);
    }
}
