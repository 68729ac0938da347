//! Pipeline orchestration: run the four stages for one note.
//!
//! ```text
//! note text
//!  │
//!  ├─ 1. Summary      key concepts feed steps 2–3
//!  ├─ 2. Flashcards ┐
//!  ├─ 3. Questions  ├ concurrent
//!  └─ 4. Events     ┘
//! ```
//!
//! A stage whose completion is garbage contributes an empty result. The run
//! fails only when a model call itself fails (network, credential, quota,
//! timeout), and then the first such error wins.

use crate::config::StudyConfig;
use crate::error::StudyError;
use crate::pipeline::llm::CompletionModel;
use crate::pipeline::stages::{
    self, EventDraft, FlashcardDraft, QuestionDraft, Stage, SummaryOutput,
};
use crate::progress::ProcessingObserver;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything one processing run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub summary: SummaryOutput,
    pub flashcards: Vec<FlashcardDraft>,
    pub questions: Vec<QuestionDraft>,
    pub events: Vec<EventDraft>,
}

/// Drives the stages for a single note with one credential-bound model.
pub struct Orchestrator {
    model: Arc<dyn CompletionModel>,
    config: Arc<StudyConfig>,
    observer: Option<Arc<dyn ProcessingObserver>>,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn CompletionModel>, config: Arc<StudyConfig>) -> Self {
        Self {
            model,
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProcessingObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run all stages, anchoring relative dates at today's UTC date.
    pub async fn run(
        &self,
        note_id: Uuid,
        content: &str,
        course_name: Option<&str>,
    ) -> Result<ResultBundle, StudyError> {
        self.run_on(note_id, content, course_name, Utc::now().date_naive())
            .await
    }

    /// Run all stages with an explicit "today" for the event stage.
    pub async fn run_on(
        &self,
        note_id: Uuid,
        content: &str,
        course_name: Option<&str>,
        today: NaiveDate,
    ) -> Result<ResultBundle, StudyError> {
        let start = Instant::now();
        let model = self.model.as_ref();
        let config = self.config.as_ref();
        info!(%note_id, chars = content.len(), "Starting note pipeline");

        // ── Step 1: Summary ──────────────────────────────────────────────────
        let summary = stages::summarize(model, content, course_name, config).await?;
        self.stage_done(note_id, Stage::Summary, summary.key_concepts.len());
        debug!(
            %note_id,
            concepts = summary.key_concepts.len(),
            gaps = summary.knowledge_gaps.len(),
            "Summary stage done"
        );

        // ── Steps 2–4: independent stages ────────────────────────────────────
        let concepts = summary.key_concepts.as_slice();
        let flashcards = async {
            let out = stages::generate_flashcards(model, content, concepts, config).await?;
            self.stage_done(note_id, Stage::Flashcards, out.len());
            Ok::<_, StudyError>(out)
        };
        let questions = async {
            let out = stages::generate_questions(model, content, concepts, config).await?;
            self.stage_done(note_id, Stage::Questions, out.len());
            Ok::<_, StudyError>(out)
        };
        let events = async {
            let out = stages::extract_events(model, content, today, config).await?;
            self.stage_done(note_id, Stage::Events, out.len());
            Ok::<_, StudyError>(out)
        };
        let (flashcards, questions, events) = futures::try_join!(flashcards, questions, events)?;

        info!(
            %note_id,
            flashcards = flashcards.len(),
            questions = questions.len(),
            events = events.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Note pipeline complete"
        );

        Ok(ResultBundle {
            summary,
            flashcards,
            questions,
            events,
        })
    }

    fn stage_done(&self, note_id: Uuid, stage: Stage, items: usize) {
        if let Some(ref cb) = self.observer {
            cb.on_stage_complete(note_id, stage, items);
        }
    }
}
