//! Error types for the study-notes library.
//!
//! Three failure classes exist in the ingestion pipeline, but only one of
//! them is an error type:
//!
//! * [`StudyError`] — **Fatal or caller-visible**: bad input rejected before a
//!   note is created, a transport failure that ends a processing run, or a
//!   lookup/concurrency failure surfaced to the request layer.
//!
//! * Malformed model output is *not* an error. The normalizer returns
//!   [`crate::pipeline::normalize::Normalized::Empty`] and the stage degrades
//!   to an empty contribution.
//!
//! * Per-item validation (an event with an unparsable date) is expressed with
//!   `Option`-returning parsers; the item is dropped and its siblings survive.

use thiserror::Error;
use uuid::Uuid;

/// All fatal errors returned by the study-notes library.
#[derive(Debug, Error)]
pub enum StudyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Extraction succeeded but produced only whitespace.
    #[error("No text content found in '{filename}'")]
    EmptyContent { filename: String },

    /// pdfium could not open or read the PDF.
    #[error("Failed to extract text from PDF '{filename}': {detail}")]
    PdfExtractionFailed { filename: String, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
    )]
    PdfiumBindingFailed(String),

    /// The credential does not look like a provider key at all.
    #[error("Malformed API key: expected a key starting with '{prefix}'")]
    MalformedCredential { prefix: &'static str },

    /// Reprocess requested for a note that never stored extracted text.
    #[error("Note {0} has no content to reprocess")]
    NoContent(Uuid),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The provider rejected the credential (401/403) — retrying will not help.
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The provider returned HTTP 429 or a quota error.
    #[error("Rate limit exceeded for provider '{provider}': {detail}")]
    RateLimitExceeded { provider: String, detail: String },

    /// Any other provider failure (network, 5xx, bad request).
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// A single model call exceeded the configured budget.
    #[error("{stage} call timed out after {secs}s")]
    ApiTimeout { stage: String, secs: u64 },

    // ── Lookup errors ─────────────────────────────────────────────────────
    #[error("Note not found: {0}")]
    NoteNotFound(Uuid),

    #[error("Flashcard not found: {0}")]
    FlashcardNotFound(Uuid),

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Course not found: {0}")]
    CourseNotFound(Uuid),

    // ── Lifecycle errors ──────────────────────────────────────────────────
    /// A processing run is already in flight for this note.
    #[error("Note {0} is already being processed")]
    AlreadyProcessing(Uuid),

    /// A run tried to commit or fail a note that is no longer `processing`.
    #[error("Note {0} is not in processing state")]
    NotProcessing(Uuid),

    /// The worker pool has shut down and no longer accepts jobs.
    #[error("Processing queue is closed")]
    QueueClosed,

    // ── Config ────────────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StudyError {
    /// Whether a model call that failed with this error may succeed on retry.
    ///
    /// Authentication failures are permanent; rate limits, timeouts and
    /// generic transport errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StudyError::RateLimitExceeded { .. }
                | StudyError::ApiTimeout { .. }
                | StudyError::LlmApiError { .. }
        )
    }

    /// Whether the error was raised before any note was created.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            StudyError::EmptyContent { .. }
                | StudyError::PdfExtractionFailed { .. }
                | StudyError::MalformedCredential { .. }
                | StudyError::NoContent(_)
        )
    }
}

/// Truncate a diagnostic to at most `limit` characters (not bytes).
pub fn truncate_message(message: &str, limit: usize) -> String {
    match message.char_indices().nth(limit) {
        Some((cut, _)) => message[..cut].to_string(),
        None => message.to_string(),
    }
}
