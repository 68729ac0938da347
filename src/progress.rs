//! Observer trait for processing-run events.
//!
//! Pass an [`Arc<dyn ProcessingObserver>`] to
//! [`crate::worker::WorkerPool::spawn`] to hear about each run as it
//! progresses: forward events to a WebSocket, a metrics sink, or a terminal
//! spinner without the pipeline knowing anything about the host.
//!
//! # Example
//!
//! ```rust
//! use study_notes::{ProcessingObserver, Stage};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use uuid::Uuid;
//!
//! struct CountingObserver {
//!     stages: AtomicUsize,
//! }
//!
//! impl ProcessingObserver for CountingObserver {
//!     fn on_stage_complete(&self, _note_id: Uuid, stage: Stage, items: usize) {
//!         self.stages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage}: {items} items");
//!     }
//! }
//! ```

use crate::pipeline::stages::Stage;
use std::sync::Arc;
use uuid::Uuid;

/// Called by the worker pool as each note moves through the pipeline.
///
/// Runs for different notes execute concurrently, so implementations must be
/// `Send + Sync` and guard shared state. Every method defaults to a no-op.
pub trait ProcessingObserver: Send + Sync {
    /// A worker picked up the note.
    fn on_run_start(&self, note_id: Uuid) {
        let _ = note_id;
    }

    /// One stage returned. `items` is the number of concepts, flashcards,
    /// questions or events it produced (0 when it degraded to empty).
    fn on_stage_complete(&self, note_id: Uuid, stage: Stage, items: usize) {
        let _ = (note_id, stage, items);
    }

    /// The note was committed as `completed`.
    fn on_run_complete(&self, note_id: Uuid, report: &RunReport) {
        let _ = (note_id, report);
    }

    /// The note was marked `failed` with `error`.
    fn on_run_failed(&self, note_id: Uuid, error: &str) {
        let _ = (note_id, error);
    }
}

/// Counts of what a completed run wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunReport {
    pub flashcards: usize,
    pub questions: usize,
    pub events: usize,
    /// Extracted events rejected at write time.
    pub skipped_events: usize,
}

/// The default observer.
pub struct NoopObserver;

impl ProcessingObserver for NoopObserver {}

pub type SharedObserver = Arc<dyn ProcessingObserver>;
