//! Building blocks of one processing run.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ stages ──▶ llm ──▶ normalize ──▶ stages (parse)
//! (bytes→text) (prompts) (model)  (raw→JSON)    (JSON→drafts)
//! ```
//!
//! 1. [`extract`]   — decode an upload to plain text; PDFs go through pdfium
//!    inside `spawn_blocking`
//! 2. [`llm`]       — the [`llm::CompletionModel`] seam plus retry/timeout;
//!    the only module with network I/O
//! 3. [`normalize`] — recover a JSON object from whatever the model returned
//! 4. [`stages`]    — the four prompts and their lenient parsers

pub mod extract;
pub mod llm;
pub mod normalize;
pub mod stages;
