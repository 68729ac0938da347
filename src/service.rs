//! [`StudyService`]: the facade a request layer calls.
//!
//! Every operation is scoped to an owner. A record that exists but belongs to
//! someone else is reported as not found.
//!
//! Ingestion calls (`upload`, `submit_text`, `reprocess`) validate input,
//! create or reset the note in `processing`, hand a job to the
//! [`WorkerPool`] and return without waiting for the run.

use crate::config::StudyConfig;
use crate::error::{truncate_message, StudyError};
use crate::keycheck::{check_credential_format, validate_key, KeyValidation};
use crate::pipeline::extract::extract_text_async;
use crate::progress::SharedObserver;
use crate::records::{Course, Difficulty, Event, Flashcard, NewEvent, Note, NoteDetail};
use crate::review::{apply_review, FlashcardStats};
use crate::store::{DeleteMode, EventFilter, FlashcardFilter, NewNote, SharedStore};
use crate::worker::{ProcessingJob, WorkerPool};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const UNTITLED_NOTE: &str = "Untitled Note";

/// A file upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner_id: Uuid,
    pub course_id: Option<Uuid>,
    /// Defaults to the filename.
    pub title: Option<String>,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub credential: String,
}

/// A note typed or pasted as plain text.
#[derive(Debug, Clone)]
pub struct TextNoteRequest {
    pub owner_id: Uuid,
    pub course_id: Option<Uuid>,
    pub title: String,
    pub content: String,
    pub credential: String,
}

pub struct StudyService {
    config: Arc<StudyConfig>,
    store: SharedStore,
    pool: WorkerPool,
}

impl StudyService {
    /// Start the service and its worker pool. Must be called inside a Tokio runtime.
    pub fn new(config: StudyConfig, store: SharedStore, observer: Option<SharedObserver>) -> Self {
        let config = Arc::new(config);
        let pool = WorkerPool::spawn(Arc::clone(&config), Arc::clone(&store), observer);
        Self {
            config,
            store,
            pool,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    // ── Courses ──────────────────────────────────────────────────────────

    pub async fn create_course(
        &self,
        owner_id: Uuid,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Course, StudyError> {
        self.store
            .create_course(owner_id, name.into(), description)
            .await
    }

    pub async fn list_courses(&self, owner_id: Uuid) -> Result<Vec<Course>, StudyError> {
        self.store.list_courses(owner_id).await
    }

    async fn owned_course(
        &self,
        owner_id: Uuid,
        course_id: Option<Uuid>,
    ) -> Result<Option<Course>, StudyError> {
        let Some(id) = course_id else {
            return Ok(None);
        };
        let course = self.store.get_course(id).await?;
        if course.owner_id != owner_id {
            return Err(StudyError::CourseNotFound(id));
        }
        Ok(Some(course))
    }

    // ── Ingestion ────────────────────────────────────────────────────────

    /// Extract text from an uploaded file and start processing it.
    pub async fn upload(&self, req: UploadRequest) -> Result<Note, StudyError> {
        check_credential_format(&req.credential)?;
        let course = self.owned_course(req.owner_id, req.course_id).await?;

        let text = extract_text_async(req.bytes, req.filename.clone()).await?;
        if text.trim().is_empty() {
            return Err(StudyError::EmptyContent {
                filename: req.filename,
            });
        }

        let title = req
            .title
            .filter(|t| !t.trim().is_empty())
            .or_else(|| Some(req.filename.clone()).filter(|f| !f.is_empty()))
            .unwrap_or_else(|| UNTITLED_NOTE.to_string());

        let note = self
            .store
            .create_note(NewNote {
                owner_id: req.owner_id,
                course_id: req.course_id,
                title,
                original_filename: Some(req.filename),
                original_content: text,
            })
            .await?;
        info!(note_id = %note.id, chars = note.original_content.len(), "Note uploaded");

        self.start_run(&note, course.map(|c| c.name), req.credential)
            .await?;
        Ok(note)
    }

    /// Create a note from raw text and start processing it.
    pub async fn submit_text(&self, req: TextNoteRequest) -> Result<Note, StudyError> {
        check_credential_format(&req.credential)?;
        let course = self.owned_course(req.owner_id, req.course_id).await?;
        if req.content.trim().is_empty() {
            return Err(StudyError::EmptyContent {
                filename: req.title,
            });
        }

        let note = self
            .store
            .create_note(NewNote {
                owner_id: req.owner_id,
                course_id: req.course_id,
                title: req.title,
                original_filename: None,
                original_content: req.content,
            })
            .await?;
        info!(note_id = %note.id, "Text note created");

        self.start_run(&note, course.map(|c| c.name), req.credential)
            .await?;
        Ok(note)
    }

    /// Discard a note's generated records and run the pipeline again on its
    /// stored text.
    pub async fn reprocess(
        &self,
        owner_id: Uuid,
        note_id: Uuid,
        credential: &str,
    ) -> Result<Note, StudyError> {
        check_credential_format(credential)?;
        let note = self.note(owner_id, note_id).await?;
        if note.original_content.trim().is_empty() {
            return Err(StudyError::NoContent(note_id));
        }
        let note = self.store.begin_reprocess(note_id).await?;

        // A course deleted since upload just means no course hint.
        let course_name = match note.course_id {
            Some(id) => self.store.get_course(id).await.ok().map(|c| c.name),
            None => None,
        };
        info!(%note_id, "Reprocessing note");
        self.start_run(&note, course_name, credential.to_string())
            .await?;
        Ok(note)
    }

    async fn start_run(
        &self,
        note: &Note,
        course_name: Option<String>,
        credential: String,
    ) -> Result<(), StudyError> {
        let job = ProcessingJob {
            note_id: note.id,
            content: note.original_content.clone(),
            course_name,
            credential,
        };
        if let Err(e) = self.pool.enqueue(job).await {
            warn!(note_id = %note.id, error = %e, "Could not queue note");
            let message = truncate_message(&e.to_string(), self.config.error_message_limit);
            self.store.fail_run(note.id, message).await?;
            return Err(e);
        }
        Ok(())
    }

    // ── Notes ────────────────────────────────────────────────────────────

    pub async fn note(&self, owner_id: Uuid, note_id: Uuid) -> Result<Note, StudyError> {
        let note = self.store.get_note(note_id).await?;
        if note.owner_id != owner_id {
            return Err(StudyError::NoteNotFound(note_id));
        }
        Ok(note)
    }

    /// A note with its flashcards, questions and extracted events.
    pub async fn note_detail(&self, owner_id: Uuid, note_id: Uuid) -> Result<NoteDetail, StudyError> {
        let note = self.note(owner_id, note_id).await?;
        let (flashcards, study_questions, extracted_events) = futures::try_join!(
            self.store.flashcards_for_note(note_id),
            self.store.questions_for_note(note_id),
            self.store.events_for_note(note_id),
        )?;
        Ok(NoteDetail {
            note,
            flashcards,
            study_questions,
            extracted_events,
        })
    }

    pub async fn list_notes(
        &self,
        owner_id: Uuid,
        course_id: Option<Uuid>,
    ) -> Result<Vec<Note>, StudyError> {
        self.store.list_notes(owner_id, course_id).await
    }

    pub async fn delete_note(
        &self,
        owner_id: Uuid,
        note_id: Uuid,
        mode: DeleteMode,
    ) -> Result<(), StudyError> {
        self.note(owner_id, note_id).await?;
        self.store.delete_note(note_id, mode).await?;
        info!(%note_id, ?mode, "Note deleted");
        Ok(())
    }

    // ── Flashcards ───────────────────────────────────────────────────────

    pub async fn flashcards(
        &self,
        owner_id: Uuid,
        filter: &FlashcardFilter,
    ) -> Result<Vec<Flashcard>, StudyError> {
        self.store.flashcards_for_owner(owner_id, filter).await
    }

    /// Record one review and reschedule the card.
    pub async fn review_flashcard(
        &self,
        owner_id: Uuid,
        flashcard_id: Uuid,
        rating: Difficulty,
    ) -> Result<Flashcard, StudyError> {
        let mut card = self.store.get_flashcard(flashcard_id).await?;
        match self.store.get_note(card.note_id).await {
            Ok(note) if note.owner_id == owner_id => {}
            _ => return Err(StudyError::FlashcardNotFound(flashcard_id)),
        }
        apply_review(&mut card, rating, Utc::now());
        self.store.update_flashcard(card.clone()).await?;
        Ok(card)
    }

    pub async fn flashcard_stats(&self, owner_id: Uuid) -> Result<FlashcardStats, StudyError> {
        let cards = self
            .store
            .flashcards_for_owner(owner_id, &FlashcardFilter::default())
            .await?;
        Ok(FlashcardStats::from_cards(&cards, Utc::now()))
    }

    // ── Events ───────────────────────────────────────────────────────────

    pub async fn events(
        &self,
        owner_id: Uuid,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, StudyError> {
        self.store.events_for_owner(owner_id, filter).await
    }

    /// Events dated between now and `days` from now. A window too large to
    /// represent is treated as unbounded.
    pub async fn upcoming_events(&self, owner_id: Uuid, days: i64) -> Result<Vec<Event>, StudyError> {
        let now = Utc::now();
        let until = Duration::try_days(days.max(0)).and_then(|span| now.checked_add_signed(span));
        let filter = EventFilter {
            upcoming_from: Some(now),
            until,
            ..Default::default()
        };
        self.store.events_for_owner(owner_id, &filter).await
    }

    /// A user-entered event: no source note, full confidence.
    pub async fn create_manual_event(&self, new: NewEvent) -> Result<Event, StudyError> {
        self.owned_course(new.owner_id, new.course_id).await?;
        let event = Event::new(
            new.owner_id,
            new.course_id,
            None,
            new.title,
            new.description,
            new.event_type,
            new.event_date,
            1.0,
        );
        self.store.insert_event(event).await
    }

    async fn owned_event(&self, owner_id: Uuid, event_id: Uuid) -> Result<Event, StudyError> {
        let event = self.store.get_event(event_id).await?;
        if event.owner_id != owner_id {
            return Err(StudyError::EventNotFound(event_id));
        }
        Ok(event)
    }

    /// Record that an event was pushed to an external calendar. Already
    /// synced events keep their existing id.
    pub async fn mark_event_synced(
        &self,
        owner_id: Uuid,
        event_id: Uuid,
        external_id: impl Into<String>,
    ) -> Result<Event, StudyError> {
        let mut event = self.owned_event(owner_id, event_id).await?;
        if event.is_synced() {
            return Ok(event);
        }
        event.mark_synced(external_id);
        self.store.update_event(event.clone()).await?;
        Ok(event)
    }

    pub async fn delete_event(&self, owner_id: Uuid, event_id: Uuid) -> Result<(), StudyError> {
        self.owned_event(owner_id, event_id).await?;
        self.store.delete_event(event_id).await
    }

    // ── Credentials / lifecycle ──────────────────────────────────────────

    pub async fn validate_key(&self, credential: &str) -> KeyValidation {
        validate_key(credential, &self.config).await
    }

    /// Stop accepting work and wait for queued runs to finish.
    pub async fn shutdown(self) -> Result<(), StudyError> {
        self.pool.shutdown().await
    }
}
