//! Configuration types for note processing.
//!
//! All pipeline behaviour is controlled through [`StudyConfig`], built via its
//! [`StudyConfigBuilder`]. The config is constructed once and handed to the
//! worker pool and orchestrator explicitly; nothing in the crate reads
//! process-wide LLM settings.

use crate::error::StudyError;
use crate::pipeline::llm::ModelFactory;
use crate::pipeline::stages::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for the note-ingestion pipeline.
///
/// # Example
/// ```rust
/// use study_notes::StudyConfig;
///
/// let config = StudyConfig::builder()
///     .model("gpt-4o-mini")
///     .workers(8)
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 8);
/// ```
#[derive(Clone)]
pub struct StudyConfig {
    /// LLM model identifier. Default: `gpt-4o-mini`.
    pub model: String,

    /// Sampling temperature for every stage. Default: 0.2.
    ///
    /// Stages ask for strict JSON; a low temperature keeps the model from
    /// drifting into prose around the payload.
    pub temperature: f32,

    /// Maximum tokens the model may generate per stage. Default: 4096.
    pub max_tokens: usize,

    /// Retry attempts on a transient model failure. Default: 2.
    ///
    /// Authentication failures are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 60.
    ///
    /// Bounds how long a note can sit in `processing` waiting on one stage.
    pub api_timeout_secs: u64,

    /// Per-stage caps on how much note text is sent to the model.
    pub context_limits: ContextLimits,

    /// How many key concepts are listed in the flashcard/question prompts. Default: 10.
    pub max_prompt_concepts: usize,

    /// Maximum length of a note's recorded error message, in characters. Default: 500.
    pub error_message_limit: usize,

    /// Number of notes processed concurrently by the worker pool. Default: 4.
    pub workers: usize,

    /// Bounded capacity of the job queue. Default: 64.
    pub queue_capacity: usize,

    /// Token budget for the credential preflight call. Default: 10.
    pub validation_max_tokens: usize,

    /// Pre-constructed model factory. Takes precedence over the OpenAI default.
    pub model_factory: Option<Arc<dyn ModelFactory>>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            context_limits: ContextLimits::default(),
            max_prompt_concepts: 10,
            error_message_limit: 500,
            workers: 4,
            queue_capacity: 64,
            validation_max_tokens: 10,
            model_factory: None,
        }
    }
}

impl fmt::Debug for StudyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudyConfig")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("context_limits", &self.context_limits)
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .field(
                "model_factory",
                &self.model_factory.as_ref().map(|_| "<dyn ModelFactory>"),
            )
            .finish()
    }
}

impl StudyConfig {
    /// Create a new builder for `StudyConfig`.
    pub fn builder() -> StudyConfigBuilder {
        StudyConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`StudyConfig`].
#[derive(Debug)]
pub struct StudyConfigBuilder {
    config: StudyConfig,
}

impl StudyConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn context_limits(mut self, limits: ContextLimits) -> Self {
        self.config.context_limits = limits;
        self
    }

    /// Apply one cap to every stage instead of the per-stage defaults.
    pub fn uniform_context_limit(mut self, chars: usize) -> Self {
        self.config.context_limits = ContextLimits::uniform(chars);
        self
    }

    pub fn max_prompt_concepts(mut self, n: usize) -> Self {
        self.config.max_prompt_concepts = n;
        self
    }

    pub fn error_message_limit(mut self, n: usize) -> Self {
        self.config.error_message_limit = n;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.config.queue_capacity = n.max(1);
        self
    }

    pub fn validation_max_tokens(mut self, n: usize) -> Self {
        self.config.validation_max_tokens = n;
        self
    }

    pub fn model_factory(mut self, factory: Arc<dyn ModelFactory>) -> Self {
        self.config.model_factory = Some(factory);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StudyConfig, StudyError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(StudyError::InvalidConfig("Model must not be empty".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(StudyError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(StudyError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.error_message_limit == 0 {
            return Err(StudyError::InvalidConfig(
                "error_message_limit must be ≥ 1".into(),
            ));
        }
        c.context_limits.validate()?;
        Ok(self.config)
    }
}

/// How many characters of note text each stage may send to the model.
///
/// | Stage | Default |
/// |-------|---------|
/// | summary | 15 000 |
/// | flashcards | 12 000 |
/// | questions | 12 000 |
/// | events | 10 000 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLimits {
    pub summary: usize,
    pub flashcards: usize,
    pub questions: usize,
    pub events: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            summary: 15_000,
            flashcards: 12_000,
            questions: 12_000,
            events: 10_000,
        }
    }
}

impl ContextLimits {
    pub fn uniform(chars: usize) -> Self {
        Self {
            summary: chars,
            flashcards: chars,
            questions: chars,
            events: chars,
        }
    }

    pub fn for_stage(&self, stage: Stage) -> usize {
        match stage {
            Stage::Summary => self.summary,
            Stage::Flashcards => self.flashcards,
            Stage::Questions => self.questions,
            Stage::Events => self.events,
        }
    }

    fn validate(&self) -> Result<(), StudyError> {
        for stage in Stage::ALL {
            if self.for_stage(stage) == 0 {
                return Err(StudyError::InvalidConfig(format!(
                    "context limit for {stage} must be ≥ 1 character"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stage_caps() {
        let config = StudyConfig::default();
        assert_eq!(config.context_limits.for_stage(Stage::Summary), 15_000);
        assert_eq!(config.context_limits.for_stage(Stage::Flashcards), 12_000);
        assert_eq!(config.context_limits.for_stage(Stage::Questions), 12_000);
        assert_eq!(config.context_limits.for_stage(Stage::Events), 10_000);
        assert_eq!(config.error_message_limit, 500);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn builder_clamps_and_validates() {
        let config = StudyConfig::builder()
            .temperature(9.0)
            .workers(0)
            .build()
            .unwrap();
        assert_eq!(config.temperature, 2.0);
        assert_eq!(config.workers, 1);

        let err = StudyConfig::builder().api_timeout_secs(0).build();
        assert!(matches!(err, Err(StudyError::InvalidConfig(_))));

        let err = StudyConfig::builder().uniform_context_limit(0).build();
        assert!(matches!(err, Err(StudyError::InvalidConfig(_))));
    }

    #[test]
    fn uniform_limit_applies_to_every_stage() {
        let config = StudyConfig::builder()
            .uniform_context_limit(8_000)
            .build()
            .unwrap();
        for stage in Stage::ALL {
            assert_eq!(config.context_limits.for_stage(stage), 8_000);
        }
    }

    #[test]
    fn debug_hides_factory() {
        let s = format!("{:?}", StudyConfig::default());
        assert!(s.contains("gpt-4o-mini"));
        assert!(s.contains("model_factory: None"));
    }
}
