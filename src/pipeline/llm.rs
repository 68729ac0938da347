//! Model interaction: send one system + human turn, return the completion text.
//!
//! Stages never talk to a provider directly. They go through the
//! [`CompletionModel`] trait so tests can script completions and so the
//! retry/timeout policy lives in exactly one place ([`complete_with_retry`]).
//!
//! ## Retry Strategy
//!
//! Rate limits and 5xx errors are transient, so retryable failures back off
//! exponentially (`retry_backoff_ms * 2^(attempt-1)`): with 500 ms base and 2
//! retries the waits are 500 ms → 1 s. Authentication failures are returned
//! immediately. Every attempt is bounded by `api_timeout_secs` so a note can
//! never sit in `processing` on a hung connection.

use crate::config::StudyConfig;
use crate::error::StudyError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, OpenAIProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// A chat model that answers one system instruction + one human turn.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Return the raw completion text.
    ///
    /// Errors are transport-class only (network, credential, quota); an
    /// unhelpful answer is still `Ok`.
    async fn complete(&self, system: &str, user: &str) -> Result<String, StudyError>;
}

/// Builds a [`CompletionModel`] bound to one user's credential.
///
/// Credentials travel with each job, so the worker pool asks the factory for a
/// fresh model per run instead of sharing one global client.
pub trait ModelFactory: Send + Sync {
    fn connect(
        &self,
        credential: &str,
        config: &StudyConfig,
    ) -> Result<Arc<dyn CompletionModel>, StudyError>;

    /// Like [`ModelFactory::connect`] but with a tiny token budget, for the
    /// credential preflight check.
    fn connect_for_validation(
        &self,
        credential: &str,
        config: &StudyConfig,
    ) -> Result<Arc<dyn CompletionModel>, StudyError> {
        self.connect(credential, config)
    }
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// [`CompletionModel`] backed by an edgequake-llm provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    provider_label: String,
    options: CompletionOptions,
}

impl ProviderModel {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        provider_label: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            provider,
            provider_label: provider_label.into(),
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl CompletionModel for ProviderModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, StudyError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| classify_provider_error(&self.provider_label, &e.to_string()))?;

        debug!(
            provider = %self.provider_label,
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            "Completion received"
        );
        Ok(response.content)
    }
}

/// Default factory: one OpenAI provider per credential.
#[derive(Debug, Default, Clone)]
pub struct OpenAiModelFactory;

impl ModelFactory for OpenAiModelFactory {
    fn connect(
        &self,
        credential: &str,
        config: &StudyConfig,
    ) -> Result<Arc<dyn CompletionModel>, StudyError> {
        Ok(openai_model(credential, config, config.max_tokens))
    }

    fn connect_for_validation(
        &self,
        credential: &str,
        config: &StudyConfig,
    ) -> Result<Arc<dyn CompletionModel>, StudyError> {
        Ok(openai_model(credential, config, config.validation_max_tokens))
    }
}

fn openai_model(
    credential: &str,
    config: &StudyConfig,
    max_tokens: usize,
) -> Arc<dyn CompletionModel> {
    let provider = OpenAIProvider::new(credential).with_model(&config.model);
    Arc::new(ProviderModel::new(
        Arc::new(provider),
        "openai",
        config.temperature,
        max_tokens,
    ))
}

/// Resolve the factory: the configured one, else OpenAI.
pub fn resolve_factory(config: &StudyConfig) -> Arc<dyn ModelFactory> {
    match config.model_factory {
        Some(ref factory) => Arc::clone(factory),
        None => Arc::new(OpenAiModelFactory),
    }
}

/// Map a provider error message onto the transport taxonomy.
pub fn classify_provider_error(provider: &str, message: &str) -> StudyError {
    let lower = message.to_lowercase();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("auth")
        || lower.contains("invalid api key")
        || lower.contains("incorrect api key")
    {
        StudyError::AuthError {
            provider: provider.to_string(),
            detail: message.to_string(),
        }
    } else if lower.contains("429") || lower.contains("rate") || lower.contains("quota") {
        StudyError::RateLimitExceeded {
            provider: provider.to_string(),
            detail: message.to_string(),
        }
    } else {
        StudyError::LlmApiError {
            message: message.to_string(),
        }
    }
}

// ── Retry / timeout ──────────────────────────────────────────────────────

/// Run one completion with timeout and exponential backoff.
pub async fn complete_with_retry(
    model: &dyn CompletionModel,
    label: &str,
    system: &str,
    user: &str,
    config: &StudyConfig,
) -> Result<String, StudyError> {
    let start = Instant::now();
    let mut last_err: Option<StudyError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                stage = label,
                "retry {}/{} after {}ms", attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let outcome = match timeout(config.api_timeout(), model.complete(system, user)).await {
            Ok(result) => result,
            Err(_) => Err(StudyError::ApiTimeout {
                stage: label.to_string(),
                secs: config.api_timeout_secs,
            }),
        };

        match outcome {
            Ok(text) => {
                debug!(
                    stage = label,
                    chars = text.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Stage completion ok"
                );
                return Ok(text);
            }
            Err(e) if e.is_retryable() => {
                warn!(stage = label, "attempt {} failed — {}", attempt + 1, e);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| StudyError::Internal("retry loop exited without result".into())))
}
