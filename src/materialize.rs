//! Turn a [`ResultBundle`] into persisted records, or record a failed run.
//!
//! Event dates are re-validated here even though the stage parser already
//! rejected obviously bad ones; an event whose date still does not resolve is
//! skipped and counted, never written with a placeholder.

use crate::error::{truncate_message, StudyError};
use crate::orchestrator::ResultBundle;
use crate::pipeline::stages::parse_event_date;
use crate::progress::RunReport;
use crate::records::{Event, Flashcard, StudyQuestion};
use crate::store::{CompletedRun, SharedStore};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct Materializer {
    store: SharedStore,
    error_message_limit: usize,
}

impl Materializer {
    pub fn new(store: SharedStore, error_message_limit: usize) -> Self {
        Self {
            store,
            error_message_limit,
        }
    }

    /// Commit a finished run in one transaction and mark the note `completed`.
    pub async fn apply(&self, note_id: Uuid, bundle: ResultBundle) -> Result<RunReport, StudyError> {
        let note = self.store.get_note(note_id).await?;
        let now = Utc::now();

        let flashcards: Vec<Flashcard> = bundle
            .flashcards
            .into_iter()
            .map(|d| Flashcard {
                id: Uuid::new_v4(),
                note_id,
                front: d.front,
                back: d.back,
                difficulty: d.difficulty,
                times_reviewed: 0,
                times_correct: 0,
                last_reviewed: None,
                next_review: None,
                created_at: now,
            })
            .collect();

        let questions: Vec<StudyQuestion> = bundle
            .questions
            .into_iter()
            .map(|d| StudyQuestion {
                id: Uuid::new_v4(),
                note_id,
                question: d.question,
                suggested_answer: d.suggested_answer,
                question_type: d.question_type,
                created_at: now,
            })
            .collect();

        let mut skipped_events = 0;
        let mut events = Vec::with_capacity(bundle.events.len());
        for draft in bundle.events {
            let Some(date) = parse_event_date(&draft.date) else {
                warn!(%note_id, title = %draft.title, date = %draft.date, "Skipping event with unparsable date");
                skipped_events += 1;
                continue;
            };
            events.push(Event::new(
                note.owner_id,
                note.course_id,
                Some(note_id),
                draft.title,
                draft.description,
                draft.event_type,
                date,
                draft.confidence,
            ));
        }

        let report = RunReport {
            flashcards: flashcards.len(),
            questions: questions.len(),
            events: events.len(),
            skipped_events,
        };

        self.store
            .commit_run(
                note_id,
                CompletedRun {
                    summary: bundle.summary.summary,
                    key_concepts: bundle.summary.key_concepts,
                    knowledge_gaps: bundle.summary.knowledge_gaps,
                    flashcards,
                    questions,
                    events,
                    processed_at: now,
                },
            )
            .await?;

        info!(
            %note_id,
            flashcards = report.flashcards,
            questions = report.questions,
            events = report.events,
            skipped_events = report.skipped_events,
            "Note completed"
        );
        Ok(report)
    }

    /// Mark the note `failed`. Returns the stored (truncated) message.
    pub async fn fail(&self, note_id: Uuid, error: &StudyError) -> Result<String, StudyError> {
        let message = truncate_message(&error.to_string(), self.error_message_limit);
        self.store.fail_run(note_id, message.clone()).await?;
        warn!(%note_id, error = %message, "Note failed");
        Ok(message)
    }
}
