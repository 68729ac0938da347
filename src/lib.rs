//! # study-notes
//!
//! Turn uploaded lecture notes into study material with an LLM: a summary,
//! key concepts, knowledge gaps, flashcards, open-ended study questions and
//! calendar-worthy dates.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (pdf / txt / md / html)
//!  │
//!  ├─ 1. Extract     bytes → plain text (pdfium for PDFs, spawn_blocking)
//!  ├─ 2. Queue       note stored as `processing`, job handed to the worker pool
//!  ├─ 3. Summary     one model call; key concepts feed steps 4–5
//!  ├─ 4. Flashcards ┐
//!  ├─ 5. Questions  ├ concurrent model calls
//!  ├─ 6. Events     ┘
//!  └─ 7. Materialize one atomic commit → `completed`, or `failed` + message
//! ```
//!
//! Model output is never trusted: every completion goes through the
//! normalizer, and a stage whose answer cannot be parsed contributes nothing
//! instead of failing the note. Only transport errors (network, credential,
//! quota, timeout) fail a run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use study_notes::{InMemoryStore, StudyConfig, StudyService, TextNoteRequest};
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = StudyService::new(
//!         StudyConfig::default(),
//!         Arc::new(InMemoryStore::new()),
//!         None,
//!     );
//!     let note = service
//!         .submit_text(TextNoteRequest {
//!             owner_id: Uuid::new_v4(),
//!             course_id: None,
//!             title: "Week 3".into(),
//!             content: "Exam on 2025-05-01. Topic: gradients.".into(),
//!             credential: std::env::var("OPENAI_API_KEY")?,
//!         })
//!         .await?;
//!     println!("queued {}", note.id);
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `study-notes` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! study-notes = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod keycheck;
pub mod materialize;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod records;
pub mod review;
pub mod service;
pub mod store;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ContextLimits, StudyConfig, StudyConfigBuilder};
pub use error::StudyError;
pub use keycheck::{validate_key, KeyRejection, KeyValidation};
pub use materialize::Materializer;
pub use orchestrator::{Orchestrator, ResultBundle};
pub use pipeline::extract::{extract_text, extract_text_async};
pub use pipeline::llm::{CompletionModel, ModelFactory, OpenAiModelFactory};
pub use pipeline::normalize::{normalize, Normalized};
pub use pipeline::stages::Stage;
pub use progress::{NoopObserver, ProcessingObserver, RunReport};
pub use records::{
    Course, Difficulty, Event, EventType, Flashcard, NewEvent, Note, NoteDetail, NoteStatus,
    QuestionType, StudyQuestion,
};
pub use review::{apply_review, FlashcardStats};
pub use service::{StudyService, TextNoteRequest, UploadRequest};
pub use store::{DeleteMode, EventFilter, FlashcardFilter, InMemoryStore, NoteStore};
pub use worker::{ProcessingJob, WorkerPool};
