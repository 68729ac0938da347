//! Durable-store interface and an in-memory implementation.
//!
//! The pipeline only needs a handful of operations from persistence, and the
//! two that matter most are atomic:
//!
//! - [`NoteStore::commit_run`] writes a finished run (note fields, flashcards,
//!   questions, events) all-or-nothing, and only while the note is still
//!   `processing`.
//! - [`NoteStore::begin_reprocess`] is a compare-and-set on status: a note
//!   that is already `processing` is rejected, so two runs can never race to
//!   write the same note.
//!
//! [`InMemoryStore`] holds every table behind one `RwLock`; each mutation runs
//! under a single write guard, which is what makes it transactional.

use crate::error::StudyError;
use crate::records::{Course, Event, Flashcard, Note, NoteStatus, StudyQuestion};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Fields supplied when a note is created.
#[derive(Debug, Clone)]
pub struct NewNote {
    pub owner_id: Uuid,
    pub course_id: Option<Uuid>,
    pub title: String,
    pub original_filename: Option<String>,
    pub original_content: String,
}

/// Everything a successful run writes, in one unit.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub summary: String,
    pub key_concepts: Vec<String>,
    pub knowledge_gaps: Vec<String>,
    pub flashcards: Vec<Flashcard>,
    pub questions: Vec<StudyQuestion>,
    pub events: Vec<Event>,
    pub processed_at: DateTime<Utc>,
}

/// What happens to a note's extracted events when the note is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Keep the events, clearing their source-note reference.
    DetachEvents,
    /// Delete the events with the note.
    #[default]
    CascadeEvents,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub course_id: Option<Uuid>,
    pub synced_only: bool,
    /// Only events dated at or after this instant.
    pub upcoming_from: Option<DateTime<Utc>>,
    /// Only events dated at or before this instant.
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct FlashcardFilter {
    pub course_id: Option<Uuid>,
    /// Only cards due at this instant.
    pub due_at: Option<DateTime<Utc>>,
}

/// Persistence operations used by the pipeline and its callers.
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn create_course(
        &self,
        owner_id: Uuid,
        name: String,
        description: Option<String>,
    ) -> Result<Course, StudyError>;

    async fn get_course(&self, id: Uuid) -> Result<Course, StudyError>;

    /// Courses for an owner, by name.
    async fn list_courses(&self, owner_id: Uuid) -> Result<Vec<Course>, StudyError>;

    /// Insert a note in `processing` status with no generated fields.
    async fn create_note(&self, new: NewNote) -> Result<Note, StudyError>;

    async fn get_note(&self, id: Uuid) -> Result<Note, StudyError>;

    /// Notes for an owner, newest first.
    async fn list_notes(
        &self,
        owner_id: Uuid,
        course_id: Option<Uuid>,
    ) -> Result<Vec<Note>, StudyError>;

    /// Purge generated records and reset the note to `processing`.
    ///
    /// Fails with [`StudyError::AlreadyProcessing`] if a run is in flight.
    async fn begin_reprocess(&self, id: Uuid) -> Result<Note, StudyError>;

    /// Atomically write a finished run and mark the note `completed`.
    async fn commit_run(&self, id: Uuid, run: CompletedRun) -> Result<(), StudyError>;

    /// Mark a `processing` note `failed` with `message`.
    async fn fail_run(&self, id: Uuid, message: String) -> Result<(), StudyError>;

    async fn delete_note(&self, id: Uuid, mode: DeleteMode) -> Result<(), StudyError>;

    async fn get_flashcard(&self, id: Uuid) -> Result<Flashcard, StudyError>;

    async fn update_flashcard(&self, card: Flashcard) -> Result<(), StudyError>;

    async fn flashcards_for_note(&self, note_id: Uuid) -> Result<Vec<Flashcard>, StudyError>;

    async fn flashcards_for_owner(
        &self,
        owner_id: Uuid,
        filter: &FlashcardFilter,
    ) -> Result<Vec<Flashcard>, StudyError>;

    async fn questions_for_note(&self, note_id: Uuid) -> Result<Vec<StudyQuestion>, StudyError>;

    async fn events_for_note(&self, note_id: Uuid) -> Result<Vec<Event>, StudyError>;

    /// Events for an owner, ordered by date.
    async fn events_for_owner(
        &self,
        owner_id: Uuid,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, StudyError>;

    async fn insert_event(&self, event: Event) -> Result<Event, StudyError>;

    async fn get_event(&self, id: Uuid) -> Result<Event, StudyError>;

    async fn update_event(&self, event: Event) -> Result<(), StudyError>;

    async fn delete_event(&self, id: Uuid) -> Result<(), StudyError>;
}

pub type SharedStore = Arc<dyn NoteStore>;

// ── In-memory implementation ─────────────────────────────────────────────

#[derive(Default)]
struct Tables {
    courses: HashMap<Uuid, Course>,
    notes: HashMap<Uuid, Note>,
    // Vecs keep insertion order for per-note listings.
    flashcards: Vec<Flashcard>,
    questions: Vec<StudyQuestion>,
    events: Vec<Event>,
}

impl Tables {
    fn note_mut(&mut self, id: Uuid) -> Result<&mut Note, StudyError> {
        self.notes.get_mut(&id).ok_or(StudyError::NoteNotFound(id))
    }

    fn purge_generated(&mut self, note_id: Uuid) {
        self.flashcards.retain(|c| c.note_id != note_id);
        self.questions.retain(|q| q.note_id != note_id);
        self.events.retain(|e| e.source_note_id != Some(note_id));
    }

    fn owner_course_of(&self, note_id: Uuid) -> Option<(Uuid, Option<Uuid>)> {
        self.notes.get(&note_id).map(|n| (n.owner_id, n.course_id))
    }
}

/// A [`NoteStore`] kept entirely in memory. Suitable for tests and the CLI.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NoteStore for InMemoryStore {
    async fn create_course(
        &self,
        owner_id: Uuid,
        name: String,
        description: Option<String>,
    ) -> Result<Course, StudyError> {
        let course = Course {
            id: Uuid::new_v4(),
            owner_id,
            name,
            description,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .courses
            .insert(course.id, course.clone());
        Ok(course)
    }

    async fn get_course(&self, id: Uuid) -> Result<Course, StudyError> {
        self.tables
            .read()
            .await
            .courses
            .get(&id)
            .cloned()
            .ok_or(StudyError::CourseNotFound(id))
    }

    async fn list_courses(&self, owner_id: Uuid) -> Result<Vec<Course>, StudyError> {
        let tables = self.tables.read().await;
        let mut courses: Vec<Course> = tables
            .courses
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        courses.sort_by(|a, b| a.name.cmp(&b.name).then(a.created_at.cmp(&b.created_at)));
        Ok(courses)
    }

    async fn create_note(&self, new: NewNote) -> Result<Note, StudyError> {
        let note = Note {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            course_id: new.course_id,
            title: new.title,
            original_filename: new.original_filename,
            original_content: new.original_content,
            summary: None,
            key_concepts: None,
            knowledge_gaps: None,
            status: NoteStatus::Processing,
            error_message: None,
            uploaded_at: Utc::now(),
            processed_at: None,
        };
        self.tables.write().await.notes.insert(note.id, note.clone());
        debug!(note_id = %note.id, "Note created");
        Ok(note)
    }

    async fn get_note(&self, id: Uuid) -> Result<Note, StudyError> {
        self.tables
            .read()
            .await
            .notes
            .get(&id)
            .cloned()
            .ok_or(StudyError::NoteNotFound(id))
    }

    async fn list_notes(
        &self,
        owner_id: Uuid,
        course_id: Option<Uuid>,
    ) -> Result<Vec<Note>, StudyError> {
        let tables = self.tables.read().await;
        let mut notes: Vec<Note> = tables
            .notes
            .values()
            .filter(|n| n.owner_id == owner_id)
            .filter(|n| course_id.is_none() || n.course_id == course_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(notes)
    }

    async fn begin_reprocess(&self, id: Uuid) -> Result<Note, StudyError> {
        let mut tables = self.tables.write().await;
        let note = tables.note_mut(id)?;
        if note.status == NoteStatus::Processing {
            return Err(StudyError::AlreadyProcessing(id));
        }
        if note.original_content.trim().is_empty() {
            return Err(StudyError::NoContent(id));
        }
        note.reset_for_processing();
        let snapshot = note.clone();
        tables.purge_generated(id);
        debug!(note_id = %id, "Note reset for reprocessing");
        Ok(snapshot)
    }

    async fn commit_run(&self, id: Uuid, run: CompletedRun) -> Result<(), StudyError> {
        let mut tables = self.tables.write().await;
        let note = tables.note_mut(id)?;
        if note.status != NoteStatus::Processing {
            return Err(StudyError::NotProcessing(id));
        }
        note.complete(
            run.summary,
            run.key_concepts,
            run.knowledge_gaps,
            run.processed_at,
        );
        tables.flashcards.extend(run.flashcards);
        tables.questions.extend(run.questions);
        tables.events.extend(run.events);
        Ok(())
    }

    async fn fail_run(&self, id: Uuid, message: String) -> Result<(), StudyError> {
        let mut tables = self.tables.write().await;
        let note = tables.note_mut(id)?;
        if note.status != NoteStatus::Processing {
            return Err(StudyError::NotProcessing(id));
        }
        note.fail(message);
        Ok(())
    }

    async fn delete_note(&self, id: Uuid, mode: DeleteMode) -> Result<(), StudyError> {
        let mut tables = self.tables.write().await;
        if tables.notes.remove(&id).is_none() {
            return Err(StudyError::NoteNotFound(id));
        }
        tables.flashcards.retain(|c| c.note_id != id);
        tables.questions.retain(|q| q.note_id != id);
        match mode {
            DeleteMode::CascadeEvents => tables.events.retain(|e| e.source_note_id != Some(id)),
            DeleteMode::DetachEvents => tables
                .events
                .iter_mut()
                .filter(|e| e.source_note_id == Some(id))
                .for_each(|e| e.source_note_id = None),
        }
        Ok(())
    }

    async fn get_flashcard(&self, id: Uuid) -> Result<Flashcard, StudyError> {
        self.tables
            .read()
            .await
            .flashcards
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(StudyError::FlashcardNotFound(id))
    }

    async fn update_flashcard(&self, card: Flashcard) -> Result<(), StudyError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .flashcards
            .iter_mut()
            .find(|c| c.id == card.id)
            .ok_or(StudyError::FlashcardNotFound(card.id))?;
        *slot = card;
        Ok(())
    }

    async fn flashcards_for_note(&self, note_id: Uuid) -> Result<Vec<Flashcard>, StudyError> {
        let tables = self.tables.read().await;
        Ok(tables
            .flashcards
            .iter()
            .filter(|c| c.note_id == note_id)
            .cloned()
            .collect())
    }

    async fn flashcards_for_owner(
        &self,
        owner_id: Uuid,
        filter: &FlashcardFilter,
    ) -> Result<Vec<Flashcard>, StudyError> {
        let tables = self.tables.read().await;
        Ok(tables
            .flashcards
            .iter()
            .filter(|c| match tables.owner_course_of(c.note_id) {
                Some((owner, course)) => {
                    owner == owner_id && (filter.course_id.is_none() || course == filter.course_id)
                }
                None => false,
            })
            .filter(|c| filter.due_at.is_none_or(|now| c.is_due(now)))
            .cloned()
            .collect())
    }

    async fn questions_for_note(&self, note_id: Uuid) -> Result<Vec<StudyQuestion>, StudyError> {
        let tables = self.tables.read().await;
        Ok(tables
            .questions
            .iter()
            .filter(|q| q.note_id == note_id)
            .cloned()
            .collect())
    }

    async fn events_for_note(&self, note_id: Uuid) -> Result<Vec<Event>, StudyError> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.source_note_id == Some(note_id))
            .cloned()
            .collect())
    }

    async fn events_for_owner(
        &self,
        owner_id: Uuid,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, StudyError> {
        let tables = self.tables.read().await;
        let mut events: Vec<Event> = tables
            .events
            .iter()
            .filter(|e| e.owner_id == owner_id)
            .filter(|e| filter.course_id.is_none() || e.course_id == filter.course_id)
            .filter(|e| !filter.synced_only || e.is_synced())
            .filter(|e| filter.upcoming_from.is_none_or(|from| e.event_date >= from))
            .filter(|e| filter.until.is_none_or(|until| e.event_date <= until))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.event_date);
        Ok(events)
    }

    async fn insert_event(&self, event: Event) -> Result<Event, StudyError> {
        self.tables.write().await.events.push(event.clone());
        Ok(event)
    }

    async fn get_event(&self, id: Uuid) -> Result<Event, StudyError> {
        self.tables
            .read()
            .await
            .events
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(StudyError::EventNotFound(id))
    }

    async fn update_event(&self, event: Event) -> Result<(), StudyError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or(StudyError::EventNotFound(event.id))?;
        *slot = event;
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> Result<(), StudyError> {
        let mut tables = self.tables.write().await;
        let before = tables.events.len();
        tables.events.retain(|e| e.id != id);
        if tables.events.len() == before {
            return Err(StudyError::EventNotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Difficulty, EventType, QuestionType};
    use chrono::Duration;

    fn new_note(owner: Uuid) -> NewNote {
        NewNote {
            owner_id: owner,
            course_id: None,
            title: "Week 1".into(),
            original_filename: Some("week1.txt".into()),
            original_content: "Exam on 2025-05-01.".into(),
        }
    }

    fn run_for(note: &Note) -> CompletedRun {
        let now = Utc::now();
        CompletedRun {
            summary: "sum".into(),
            key_concepts: vec!["k".into()],
            knowledge_gaps: vec![],
            flashcards: vec![Flashcard {
                id: Uuid::new_v4(),
                note_id: note.id,
                front: "f".into(),
                back: "b".into(),
                difficulty: Difficulty::Medium,
                times_reviewed: 0,
                times_correct: 0,
                last_reviewed: None,
                next_review: None,
                created_at: now,
            }],
            questions: vec![StudyQuestion {
                id: Uuid::new_v4(),
                note_id: note.id,
                question: "q".into(),
                suggested_answer: None,
                question_type: QuestionType::Recall,
                created_at: now,
            }],
            events: vec![Event::new(
                note.owner_id,
                None,
                Some(note.id),
                "Exam".into(),
                None,
                EventType::Exam,
                now + Duration::days(3),
                0.8,
            )],
            processed_at: now,
        }
    }

    #[tokio::test]
    async fn courses_listed_per_owner_by_name() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        store.create_course(owner, "Statistics".into(), None).await.unwrap();
        store
            .create_course(owner, "Calculus".into(), Some("MATH 101".into()))
            .await
            .unwrap();
        store
            .create_course(Uuid::new_v4(), "Biology".into(), None)
            .await
            .unwrap();

        let names: Vec<String> = store
            .list_courses(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Calculus", "Statistics"]);
        assert!(store.list_courses(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_requires_processing() {
        let store = InMemoryStore::new();
        let note = store.create_note(new_note(Uuid::new_v4())).await.unwrap();
        assert_eq!(note.status, NoteStatus::Processing);

        store.commit_run(note.id, run_for(&note)).await.unwrap();
        let done = store.get_note(note.id).await.unwrap();
        assert_eq!(done.status, NoteStatus::Completed);
        assert!(done.processed_at.is_some());

        let again = store.commit_run(note.id, run_for(&note)).await;
        assert!(matches!(again, Err(StudyError::NotProcessing(_))));
        assert_eq!(store.flashcards_for_note(note.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reprocess_is_compare_and_set() {
        let store = InMemoryStore::new();
        let note = store.create_note(new_note(Uuid::new_v4())).await.unwrap();

        let busy = store.begin_reprocess(note.id).await;
        assert!(matches!(busy, Err(StudyError::AlreadyProcessing(_))));

        store.commit_run(note.id, run_for(&note)).await.unwrap();
        let reset = store.begin_reprocess(note.id).await.unwrap();
        assert_eq!(reset.status, NoteStatus::Processing);
        assert!(reset.summary.is_none());
        assert_eq!(reset.original_content, note.original_content);
        assert!(store.flashcards_for_note(note.id).await.unwrap().is_empty());
        assert!(store.questions_for_note(note.id).await.unwrap().is_empty());
        assert!(store.events_for_note(note.id).await.unwrap().is_empty());

        let twice = store.begin_reprocess(note.id).await;
        assert!(matches!(twice, Err(StudyError::AlreadyProcessing(_))));
    }

    #[tokio::test]
    async fn delete_modes_for_events() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();

        let a = store.create_note(new_note(owner)).await.unwrap();
        store.commit_run(a.id, run_for(&a)).await.unwrap();
        store.delete_note(a.id, DeleteMode::DetachEvents).await.unwrap();
        let kept = store.events_for_owner(owner, &EventFilter::default()).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert!(kept[0].source_note_id.is_none());

        let b = store.create_note(new_note(owner)).await.unwrap();
        store.commit_run(b.id, run_for(&b)).await.unwrap();
        store.delete_note(b.id, DeleteMode::CascadeEvents).await.unwrap();
        assert_eq!(
            store.events_for_owner(owner, &EventFilter::default()).await.unwrap().len(),
            1
        );
        assert!(store.flashcards_for_note(b.id).await.unwrap().is_empty());
        assert!(matches!(
            store.get_note(b.id).await,
            Err(StudyError::NoteNotFound(_))
        ));
    }

    #[tokio::test]
    async fn event_filters_and_ordering() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let now = Utc::now();
        for days in [5, -2, 1] {
            store
                .insert_event(Event::new(
                    owner,
                    None,
                    None,
                    format!("d{days}"),
                    None,
                    EventType::Quiz,
                    now + Duration::days(days),
                    1.0,
                ))
                .await
                .unwrap();
        }
        let all = store.events_for_owner(owner, &EventFilter::default()).await.unwrap();
        let titles: Vec<_> = all.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["d-2", "d1", "d5"]);

        let upcoming = EventFilter {
            upcoming_from: Some(now),
            ..Default::default()
        };
        assert_eq!(store.events_for_owner(owner, &upcoming).await.unwrap().len(), 2);

        let mut first = all[0].clone();
        first.mark_synced("ext-1");
        store.update_event(first).await.unwrap();
        let synced = EventFilter {
            synced_only: true,
            ..Default::default()
        };
        assert_eq!(store.events_for_owner(owner, &synced).await.unwrap().len(), 1);
    }
}
