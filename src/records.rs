//! Durable record types: notes and everything derived from them.
//!
//! Status and category fields are closed enums at this boundary. Parsing from
//! model output goes through [`FromStr`] (case-insensitive); unknown values
//! are handled by the stage that produced them, never stored verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ── Enums ────────────────────────────────────────────────────────────────

/// Lifecycle of a note's processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl NoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::Pending => "pending",
            NoteStatus::Processing => "processing",
            NoteStatus::Completed => "completed",
            NoteStatus::Failed => "failed",
        }
    }

    /// `completed` or `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NoteStatus::Completed | NoteStatus::Failed)
    }
}

/// Flashcard difficulty, also used as the review rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Recall,
    #[default]
    Conceptual,
    Application,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Recall => "recall",
            QuestionType::Conceptual => "conceptual",
            QuestionType::Application => "application",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Exam,
    Assignment,
    Quiz,
    Project,
    StudySession,
    #[default]
    Lecture,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Exam => "exam",
            EventType::Assignment => "assignment",
            EventType::Quiz => "quiz",
            EventType::Project => "project",
            EventType::StudySession => "study_session",
            EventType::Lecture => "lecture",
        }
    }
}

/// Error returned when a tag string names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownTag {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! tag_enum_impls {
    ($ty:ty, $kind:literal, [$($variant:expr),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownTag;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == wanted)
                    .ok_or_else(|| UnknownTag {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

tag_enum_impls!(
    NoteStatus,
    "status",
    [
        NoteStatus::Pending,
        NoteStatus::Processing,
        NoteStatus::Completed,
        NoteStatus::Failed
    ]
);
tag_enum_impls!(
    Difficulty,
    "difficulty",
    [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
);
tag_enum_impls!(
    QuestionType,
    "question type",
    [
        QuestionType::Recall,
        QuestionType::Conceptual,
        QuestionType::Application
    ]
);
tag_enum_impls!(
    EventType,
    "event type",
    [
        EventType::Exam,
        EventType::Assignment,
        EventType::Quiz,
        EventType::Project,
        EventType::StudySession,
        EventType::Lecture
    ]
);

// ── Entities ─────────────────────────────────────────────────────────────

/// A course notes and events can be filed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A unit of submitted study material and its processing lifecycle.
///
/// `status == Completed` iff `summary` and `processed_at` are set;
/// `status == Failed` iff `error_message` is set. The store enforces both
/// through [`Note::complete`] and [`Note::fail`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub course_id: Option<Uuid>,
    pub title: String,
    pub original_filename: Option<String>,
    /// Extracted text. Set once at creation; reprocessing reuses it.
    pub original_content: String,
    pub summary: Option<String>,
    pub key_concepts: Option<Vec<String>>,
    pub knowledge_gaps: Option<Vec<String>>,
    pub status: NoteStatus,
    pub error_message: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Note {
    /// Record a successful run.
    pub fn complete(
        &mut self,
        summary: String,
        key_concepts: Vec<String>,
        knowledge_gaps: Vec<String>,
        at: DateTime<Utc>,
    ) {
        self.summary = Some(summary);
        self.key_concepts = Some(key_concepts);
        self.knowledge_gaps = Some(knowledge_gaps);
        self.status = NoteStatus::Completed;
        self.error_message = None;
        self.processed_at = Some(at);
    }

    /// Record a failed run; generated fields stay cleared.
    pub fn fail(&mut self, message: String) {
        self.clear_generated();
        self.status = NoteStatus::Failed;
        self.error_message = Some(message);
    }

    /// Reset to `processing` with every generated field cleared.
    pub fn reset_for_processing(&mut self) {
        self.clear_generated();
        self.status = NoteStatus::Processing;
        self.error_message = None;
    }

    fn clear_generated(&mut self) {
        self.summary = None;
        self.key_concepts = None;
        self.knowledge_gaps = None;
        self.processed_at = None;
    }
}

/// One question/answer pair derived from a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: Uuid,
    pub note_id: Uuid,
    pub front: String,
    pub back: String,
    pub difficulty: Difficulty,
    pub times_reviewed: u32,
    /// Never exceeds `times_reviewed`.
    pub times_correct: u32,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub next_review: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Flashcard {
    /// Due when never scheduled or scheduled at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review.is_none_or(|at| at <= now)
    }
}

/// One open-ended question derived from a note. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyQuestion {
    pub id: Uuid,
    pub note_id: Uuid,
    pub question: String,
    pub suggested_answer: Option<String>,
    pub question_type: QuestionType,
    pub created_at: DateTime<Utc>,
}

/// A calendar-worthy date, either extracted from a note or created by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub course_id: Option<Uuid>,
    /// `None` for manual events.
    pub source_note_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub event_type: EventType,
    pub event_date: DateTime<Utc>,
    pub external_calendar_id: Option<String>,
    synced_to_calendar: bool,
    /// 1.0 for manual events.
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// A new, unsynced event. `confidence` is clamped to `[0.0, 1.0]`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner_id: Uuid,
        course_id: Option<Uuid>,
        source_note_id: Option<Uuid>,
        title: String,
        description: Option<String>,
        event_type: EventType,
        event_date: DateTime<Utc>,
        confidence: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            course_id,
            source_note_id,
            title,
            description,
            event_type,
            event_date,
            external_calendar_id: None,
            synced_to_calendar: false,
            confidence: clamp_confidence(confidence),
            created_at: Utc::now(),
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced_to_calendar
    }

    /// Record the external calendar id; the only way to set the sync flag.
    pub fn mark_synced(&mut self, external_id: impl Into<String>) {
        self.external_calendar_id = Some(external_id.into());
        self.synced_to_calendar = true;
    }

    pub fn clear_sync(&mut self) {
        self.external_calendar_id = None;
        self.synced_to_calendar = false;
    }
}

pub(crate) fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        1.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Input for a manually created event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub owner_id: Uuid,
    pub course_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub event_type: EventType,
    pub event_date: DateTime<Utc>,
}

/// A note together with everything generated from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteDetail {
    pub note: Note,
    pub flashcards: Vec<Flashcard>,
    pub study_questions: Vec<StudyQuestion>,
    pub extracted_events: Vec<Event>,
}
