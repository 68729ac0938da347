//! Credential preflight: format check plus one minimal model call.

use crate::config::StudyConfig;
use crate::error::{truncate_message, StudyError};
use crate::pipeline::llm::{resolve_factory, CompletionModel};
use crate::prompts::KEY_CHECK_PROMPT;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::timeout;
use tracing::{debug, info};

/// Every accepted credential starts with this.
pub const CREDENTIAL_PREFIX: &str = "sk-";

const DETAIL_LIMIT: usize = 100;

/// Reject credentials that cannot possibly be valid, without a network call.
pub fn check_credential_format(credential: &str) -> Result<(), StudyError> {
    if credential.starts_with(CREDENTIAL_PREFIX) {
        Ok(())
    } else {
        Err(StudyError::MalformedCredential {
            prefix: CREDENTIAL_PREFIX,
        })
    }
}

/// Why a credential was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum KeyRejection {
    InvalidCredential,
    RateLimited,
    /// Any other failure, with at most 100 characters of detail.
    Other(String),
}

impl fmt::Display for KeyRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRejection::InvalidCredential => f.write_str("Invalid API key"),
            KeyRejection::RateLimited => f.write_str("Rate limit exceeded"),
            KeyRejection::Other(detail) => write!(f, "API error: {detail}"),
        }
    }
}

impl KeyRejection {
    fn from_error(error: &StudyError) -> Self {
        match error {
            StudyError::AuthError { .. } | StudyError::MalformedCredential { .. } => {
                KeyRejection::InvalidCredential
            }
            StudyError::RateLimitExceeded { .. } => KeyRejection::RateLimited,
            other => {
                let text = other.to_string();
                let lower = text.to_lowercase();
                if lower.contains("invalid") || lower.contains("auth") {
                    KeyRejection::InvalidCredential
                } else {
                    KeyRejection::Other(truncate_message(&text, DETAIL_LIMIT))
                }
            }
        }
    }
}

/// Outcome of [`validate_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValidation {
    pub valid: bool,
    pub reason: Option<KeyRejection>,
}

impl KeyValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn rejected(reason: KeyRejection) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Check a credential with the configured model factory.
pub async fn validate_key(credential: &str, config: &StudyConfig) -> KeyValidation {
    if let Err(e) = check_credential_format(credential) {
        debug!("Credential rejected before network call: {e}");
        return KeyValidation::rejected(KeyRejection::InvalidCredential);
    }
    let factory = resolve_factory(config);
    match factory.connect_for_validation(credential, config) {
        Ok(model) => validate_with(model.as_ref(), config).await,
        Err(e) => KeyValidation::rejected(KeyRejection::from_error(&e)),
    }
}

/// Make the single probe call against an already-bound model. No retries.
pub async fn validate_with(model: &dyn CompletionModel, config: &StudyConfig) -> KeyValidation {
    let probe = timeout(
        config.api_timeout(),
        model.complete(KEY_CHECK_PROMPT, KEY_CHECK_PROMPT),
    )
    .await;
    let outcome = match probe {
        Ok(Ok(_)) => KeyValidation::ok(),
        Ok(Err(e)) => KeyValidation::rejected(KeyRejection::from_error(&e)),
        Err(_) => KeyValidation::rejected(KeyRejection::from_error(&StudyError::ApiTimeout {
            stage: "validate_key".into(),
            secs: config.api_timeout_secs,
        })),
    };
    info!(valid = outcome.valid, "Credential validated");
    outcome
}
