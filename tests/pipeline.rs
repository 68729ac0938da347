//! End-to-end tests through `StudyService` with a scripted model.
//!
//! No network: a stub `ModelFactory` answers each stage from its system
//! prompt, and a shared `Script` switches behaviour between runs.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use study_notes::{
    CompletionModel, DeleteMode, Difficulty, EventFilter, EventType, InMemoryStore, ModelFactory,
    NewEvent, Note, NoteStatus, StudyConfig, StudyError, StudyService, TextNoteRequest,
    UploadRequest,
};
use tokio::sync::Semaphore;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Good,
    GarbageFlashcards,
    Fail,
    /// Block the summary call until the gate opens.
    Hold,
}

struct Script {
    mode: Mutex<Mode>,
    gate: Semaphore,
}

impl Script {
    fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            gate: Semaphore::new(0),
        })
    }

    fn set(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn mode(&self) -> Mode {
        *self.mode.lock().unwrap()
    }
}

struct StubModel(Arc<Script>);

#[async_trait]
impl CompletionModel for StubModel {
    async fn complete(&self, system: &str, _user: &str) -> Result<String, StudyError> {
        let mode = self.0.mode();
        if mode == Mode::Fail {
            return Err(StudyError::LlmApiError {
                message: format!("upstream exploded: {}", "x".repeat(2000)),
            });
        }
        if system.contains("study assistant") {
            if mode == Mode::Hold {
                let _permit = self.0.gate.acquire().await;
            }
            Ok(r#"```json
{"summary": "Gradients point uphill.", "key_concepts": ["gradients"], "gaps_or_unclear": ["chain rule"]}
```"#
                .into())
        } else if system.contains("flashcards") {
            if mode == Mode::GarbageFlashcards {
                Ok("Sure! Here are some flashcards: front/back...".into())
            } else {
                Ok(r#"{"flashcards": [{"front": "What is a gradient?", "back": "Vector of partial derivatives", "difficulty": "easy"}]}"#.into())
            }
        } else if system.contains("study questions") {
            Ok(r#"{"questions": [{"question": "Why does descent follow the negative gradient?", "question_type": "conceptual"}]}"#.into())
        } else {
            Ok(r#"{"events": [{"title": "Exam", "event_type": "exam", "date": "2025-05-01T09:00:00", "confidence": 0.9}]}"#.into())
        }
    }
}

struct StubFactory(Arc<Script>);

impl ModelFactory for StubFactory {
    fn connect(
        &self,
        _credential: &str,
        _config: &StudyConfig,
    ) -> Result<Arc<dyn CompletionModel>, StudyError> {
        Ok(Arc::new(StubModel(Arc::clone(&self.0))))
    }
}

fn service(script: &Arc<Script>) -> StudyService {
    let config = StudyConfig::builder()
        .model_factory(Arc::new(StubFactory(Arc::clone(script))))
        .max_retries(0)
        .workers(2)
        .build()
        .unwrap();
    StudyService::new(config, Arc::new(InMemoryStore::new()), None)
}

fn upload(owner_id: Uuid, credential: &str) -> UploadRequest {
    UploadRequest {
        owner_id,
        course_id: None,
        title: None,
        filename: "week3.txt".into(),
        bytes: b"Exam on 2025-05-01. Topic: gradients.".to_vec(),
        credential: credential.into(),
    }
}

/// Poll until the note leaves `processing`.
async fn wait_terminal(svc: &StudyService, owner_id: Uuid, note_id: Uuid) -> Note {
    for _ in 0..500 {
        let note = svc.note(owner_id, note_id).await.unwrap();
        if note.status.is_terminal() {
            return note;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("note {note_id} never reached a terminal status");
}

#[tokio::test]
async fn upload_runs_to_completion() {
    let script = Script::new(Mode::Good);
    let svc = service(&script);
    let owner = Uuid::new_v4();

    let note = svc.upload(upload(owner, "sk-test")).await.unwrap();
    assert_eq!(note.status, NoteStatus::Processing);
    assert_eq!(note.title, "week3.txt");

    let done = wait_terminal(&svc, owner, note.id).await;
    assert_eq!(done.status, NoteStatus::Completed);
    assert_eq!(done.summary.as_deref(), Some("Gradients point uphill."));
    assert_eq!(done.key_concepts, Some(vec!["gradients".to_string()]));
    assert_eq!(done.knowledge_gaps, Some(vec!["chain rule".to_string()]));
    assert!(done.processed_at.is_some());
    assert!(done.error_message.is_none());

    let detail = svc.note_detail(owner, note.id).await.unwrap();
    assert_eq!(detail.flashcards.len(), 1);
    assert_eq!(detail.flashcards[0].difficulty, Difficulty::Easy);
    assert_eq!(detail.flashcards[0].times_reviewed, 0);
    assert_eq!(detail.study_questions.len(), 1);
    assert!(detail.study_questions[0].suggested_answer.is_none());

    assert_eq!(detail.extracted_events.len(), 1);
    let event = &detail.extracted_events[0];
    assert_eq!(event.event_date.format("%Y-%m-%d").to_string(), "2025-05-01");
    assert_eq!(event.event_type, EventType::Exam);
    assert!((event.confidence - 0.9).abs() < 1e-6);
    assert_eq!(event.source_note_id, Some(note.id));
    assert!(!event.is_synced());

    svc.shutdown().await.unwrap();
}

#[tokio::test]
async fn garbage_flashcards_still_complete() {
    let script = Script::new(Mode::GarbageFlashcards);
    let svc = service(&script);
    let owner = Uuid::new_v4();

    let note = svc.upload(upload(owner, "sk-test")).await.unwrap();
    let done = wait_terminal(&svc, owner, note.id).await;
    assert_eq!(done.status, NoteStatus::Completed);

    let detail = svc.note_detail(owner, note.id).await.unwrap();
    assert!(detail.flashcards.is_empty());
    assert_eq!(detail.study_questions.len(), 1);
    assert_eq!(detail.extracted_events.len(), 1);
}

#[tokio::test]
async fn transport_error_fails_note_with_truncated_message() {
    let script = Script::new(Mode::Fail);
    let svc = service(&script);
    let owner = Uuid::new_v4();

    let note = svc.upload(upload(owner, "sk-test")).await.unwrap();
    let failed = wait_terminal(&svc, owner, note.id).await;
    assert_eq!(failed.status, NoteStatus::Failed);
    let message = failed.error_message.unwrap();
    assert!(message.contains("upstream exploded"));
    assert_eq!(message.chars().count(), 500);
    assert!(failed.summary.is_none());

    let detail = svc.note_detail(owner, note.id).await.unwrap();
    assert!(detail.flashcards.is_empty());
    assert!(detail.extracted_events.is_empty());
}

#[tokio::test]
async fn reprocess_replaces_previous_records() {
    let script = Script::new(Mode::Good);
    let svc = service(&script);
    let owner = Uuid::new_v4();

    let note = svc.upload(upload(owner, "sk-test")).await.unwrap();
    wait_terminal(&svc, owner, note.id).await;

    script.set(Mode::Fail);
    svc.reprocess(owner, note.id, "sk-test").await.unwrap();
    let failed = wait_terminal(&svc, owner, note.id).await;
    assert_eq!(failed.status, NoteStatus::Failed);
    let detail = svc.note_detail(owner, note.id).await.unwrap();
    assert!(detail.flashcards.is_empty());
    assert!(detail.study_questions.is_empty());
    assert!(detail.extracted_events.is_empty());

    script.set(Mode::Good);
    let reset = svc.reprocess(owner, note.id, "sk-test").await.unwrap();
    assert_eq!(reset.status, NoteStatus::Processing);
    assert!(reset.error_message.is_none());
    let done = wait_terminal(&svc, owner, note.id).await;
    assert_eq!(done.status, NoteStatus::Completed);

    let detail = svc.note_detail(owner, note.id).await.unwrap();
    assert_eq!(detail.flashcards.len(), 1);
    assert_eq!(detail.extracted_events.len(), 1);
    assert_eq!(detail.note.original_content, "Exam on 2025-05-01. Topic: gradients.");
}

#[tokio::test]
async fn reprocess_rejected_while_processing() {
    let script = Script::new(Mode::Hold);
    let svc = service(&script);
    let owner = Uuid::new_v4();

    let note = svc.upload(upload(owner, "sk-test")).await.unwrap();
    let busy = svc.reprocess(owner, note.id, "sk-test").await;
    assert!(matches!(busy, Err(StudyError::AlreadyProcessing(id)) if id == note.id));

    script.gate.add_permits(16);
    let done = wait_terminal(&svc, owner, note.id).await;
    assert_eq!(done.status, NoteStatus::Completed);
    assert_eq!(svc.note_detail(owner, note.id).await.unwrap().flashcards.len(), 1);
}

#[tokio::test]
async fn input_errors_create_no_note() {
    let script = Script::new(Mode::Good);
    let svc = service(&script);
    let owner = Uuid::new_v4();

    let bad_key = svc.upload(upload(owner, "not-a-key")).await;
    assert!(matches!(bad_key, Err(StudyError::MalformedCredential { .. })));

    let mut blank = upload(owner, "sk-test");
    blank.bytes = b"   \n\t ".to_vec();
    let empty = svc.upload(blank).await;
    assert!(matches!(empty, Err(StudyError::EmptyContent { .. })));

    let text = svc
        .submit_text(TextNoteRequest {
            owner_id: owner,
            course_id: Some(Uuid::new_v4()),
            title: "Orphan".into(),
            content: "text".into(),
            credential: "sk-test".into(),
        })
        .await;
    assert!(matches!(text, Err(StudyError::CourseNotFound(_))));

    assert!(svc.list_notes(owner, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn html_upload_is_stripped_before_processing() {
    let script = Script::new(Mode::Good);
    let svc = service(&script);
    let owner = Uuid::new_v4();

    let mut req = upload(owner, "sk-test");
    req.filename = "page.html".into();
    req.title = Some("Slides".into());
    req.bytes = b"<html><script>x()</script><p>Exam on <b>2025-05-01</b></p></html>".to_vec();
    let note = svc.upload(req).await.unwrap();
    assert_eq!(note.title, "Slides");
    assert_eq!(note.original_content, "Exam on 2025-05-01");
    wait_terminal(&svc, owner, note.id).await;
}

#[tokio::test]
async fn notes_are_scoped_to_owner() {
    let script = Script::new(Mode::Good);
    let svc = service(&script);
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let note = svc.upload(upload(owner, "sk-test")).await.unwrap();
    wait_terminal(&svc, owner, note.id).await;

    assert!(matches!(
        svc.note_detail(stranger, note.id).await,
        Err(StudyError::NoteNotFound(_))
    ));
    assert!(matches!(
        svc.delete_note(stranger, note.id, DeleteMode::CascadeEvents).await,
        Err(StudyError::NoteNotFound(_))
    ));
    assert!(svc.list_notes(stranger, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn review_updates_schedule_and_stats() {
    let script = Script::new(Mode::Good);
    let svc = service(&script);
    let owner = Uuid::new_v4();

    let note = svc.upload(upload(owner, "sk-test")).await.unwrap();
    wait_terminal(&svc, owner, note.id).await;
    let card = svc.note_detail(owner, note.id).await.unwrap().flashcards[0].clone();

    let reviewed = svc
        .review_flashcard(owner, card.id, Difficulty::Hard)
        .await
        .unwrap();
    assert_eq!(reviewed.times_reviewed, 1);
    assert_eq!(reviewed.times_correct, 0);
    assert_eq!(reviewed.difficulty, Difficulty::Hard);
    let gap = reviewed.next_review.unwrap() - reviewed.last_reviewed.unwrap();
    assert_eq!(gap.num_days(), 1);

    let reviewed = svc
        .review_flashcard(owner, card.id, Difficulty::Easy)
        .await
        .unwrap();
    assert_eq!(reviewed.times_reviewed, 2);
    assert_eq!(reviewed.times_correct, 1);
    assert_eq!(reviewed.difficulty, Difficulty::Easy);
    let stored = svc.note_detail(owner, note.id).await.unwrap().flashcards[0].clone();
    assert_eq!(stored.difficulty, Difficulty::Easy);

    let stats = svc.flashcard_stats(owner).await.unwrap();
    assert_eq!(stats.total_flashcards, 1);
    assert_eq!(stats.reviewed_at_least_once, 1);
    assert_eq!(stats.due_for_review, 0);
    assert_eq!(stats.accuracy_percentage, 50.0);

    let stranger = svc
        .review_flashcard(Uuid::new_v4(), card.id, Difficulty::Easy)
        .await;
    assert!(matches!(stranger, Err(StudyError::FlashcardNotFound(_))));
}

#[tokio::test]
async fn manual_events_and_sync() {
    let script = Script::new(Mode::Good);
    let svc = service(&script);
    let owner = Uuid::new_v4();
    let course = svc.create_course(owner, "Calculus", None).await.unwrap();
    let courses = svc.list_courses(owner).await.unwrap();
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0].id, course.id);
    assert!(svc.list_courses(Uuid::new_v4()).await.unwrap().is_empty());

    let event = svc
        .create_manual_event(NewEvent {
            owner_id: owner,
            course_id: Some(course.id),
            title: "Problem set 4".into(),
            description: None,
            event_type: EventType::Assignment,
            event_date: chrono::Utc::now() + chrono::Duration::days(2),
        })
        .await
        .unwrap();
    assert_eq!(event.confidence, 1.0);
    assert!(event.source_note_id.is_none());

    let synced = svc
        .mark_event_synced(owner, event.id, "gcal-123")
        .await
        .unwrap();
    assert!(synced.is_synced());
    assert_eq!(synced.external_calendar_id.as_deref(), Some("gcal-123"));
    let again = svc
        .mark_event_synced(owner, event.id, "gcal-999")
        .await
        .unwrap();
    assert_eq!(again.external_calendar_id.as_deref(), Some("gcal-123"));

    let only_synced = EventFilter {
        synced_only: true,
        ..Default::default()
    };
    assert_eq!(svc.events(owner, &only_synced).await.unwrap().len(), 1);
    assert_eq!(svc.upcoming_events(owner, 7).await.unwrap().len(), 1);
    assert!(svc.upcoming_events(owner, 1).await.unwrap().is_empty());
    assert!(svc.upcoming_events(owner, -3).await.unwrap().is_empty());
    assert_eq!(svc.upcoming_events(owner, i64::MAX).await.unwrap().len(), 1);

    svc.delete_event(owner, event.id).await.unwrap();
    assert!(svc.events(owner, &EventFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_note_detaches_or_cascades_events() {
    let script = Script::new(Mode::Good);
    let svc = service(&script);
    let owner = Uuid::new_v4();

    let a = svc.upload(upload(owner, "sk-test")).await.unwrap();
    let b = svc.upload(upload(owner, "sk-test")).await.unwrap();
    wait_terminal(&svc, owner, a.id).await;
    wait_terminal(&svc, owner, b.id).await;

    svc.delete_note(owner, a.id, DeleteMode::DetachEvents).await.unwrap();
    svc.delete_note(owner, b.id, DeleteMode::CascadeEvents).await.unwrap();

    let remaining = svc.events(owner, &EventFilter::default()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].source_note_id.is_none());
    assert!(svc.list_notes(owner, None).await.unwrap().is_empty());
}
