//! The four extraction stages: summary, flashcards, questions, events.
//!
//! Each stage makes exactly one model call (through
//! [`complete_with_retry`]) and turns the completion into typed drafts via the
//! normalizer. Parsing is split from calling so the degrade-to-empty rules can
//! be tested without a model:
//!
//! - a completion with no recoverable JSON yields an empty output
//! - items missing required fields are dropped, siblings survive
//! - unknown tags fall back to the documented defaults
//!
//! Only transport errors leave a stage as `Err`.

use crate::config::StudyConfig;
use crate::error::StudyError;
use crate::pipeline::llm::{complete_with_retry, CompletionModel};
use crate::pipeline::normalize::{normalize, Normalized};
use crate::prompts;
use crate::records::{clamp_confidence, Difficulty, EventType, QuestionType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info};

/// One bounded unit of model-driven extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Summary,
    Flashcards,
    Questions,
    Events,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Summary,
        Stage::Flashcards,
        Stage::Questions,
        Stage::Events,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Summary => "summary",
            Stage::Flashcards => "flashcards",
            Stage::Questions => "questions",
            Stage::Events => "events",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Stage outputs ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryOutput {
    pub summary: String,
    pub key_concepts: Vec<String>,
    pub knowledge_gaps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardDraft {
    pub front: String,
    pub back: String,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub question: String,
    pub suggested_answer: Option<String>,
    pub question_type: QuestionType,
}

/// An extracted event whose date string has already parsed once.
///
/// The raw `date` string is kept so the materializer can validate it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub description: Option<String>,
    pub event_type: EventType,
    pub date: String,
    pub confidence: f32,
}

// ── Model calls ──────────────────────────────────────────────────────────

pub async fn summarize(
    model: &dyn CompletionModel,
    content: &str,
    course_name: Option<&str>,
    config: &StudyConfig,
) -> Result<SummaryOutput, StudyError> {
    let notes = head_chars(content, config.context_limits.for_stage(Stage::Summary));
    let user = prompts::summary_user_prompt(course_name, notes);
    let raw = run_stage(model, Stage::Summary, prompts::SUMMARY_SYSTEM_PROMPT, &user, config).await?;
    Ok(parse_summary(&raw))
}

pub async fn generate_flashcards(
    model: &dyn CompletionModel,
    content: &str,
    key_concepts: &[String],
    config: &StudyConfig,
) -> Result<Vec<FlashcardDraft>, StudyError> {
    let notes = head_chars(content, config.context_limits.for_stage(Stage::Flashcards));
    let user = prompts::concepts_user_prompt(key_concepts, config.max_prompt_concepts, notes);
    let raw = run_stage(
        model,
        Stage::Flashcards,
        prompts::FLASHCARD_SYSTEM_PROMPT,
        &user,
        config,
    )
    .await?;
    Ok(parse_flashcards(&raw))
}

pub async fn generate_questions(
    model: &dyn CompletionModel,
    content: &str,
    key_concepts: &[String],
    config: &StudyConfig,
) -> Result<Vec<QuestionDraft>, StudyError> {
    let notes = head_chars(content, config.context_limits.for_stage(Stage::Questions));
    let user = prompts::concepts_user_prompt(key_concepts, config.max_prompt_concepts, notes);
    let raw = run_stage(
        model,
        Stage::Questions,
        prompts::QUESTION_SYSTEM_PROMPT,
        &user,
        config,
    )
    .await?;
    Ok(parse_questions(&raw))
}

/// `today` anchors relative dates such as "next Friday".
pub async fn extract_events(
    model: &dyn CompletionModel,
    content: &str,
    today: NaiveDate,
    config: &StudyConfig,
) -> Result<Vec<EventDraft>, StudyError> {
    let notes = head_chars(content, config.context_limits.for_stage(Stage::Events));
    let system = prompts::event_system_prompt(&today.format("%Y-%m-%d").to_string());
    let raw = run_stage(model, Stage::Events, &system, notes, config).await?;
    Ok(parse_events(&raw))
}

async fn run_stage(
    model: &dyn CompletionModel,
    stage: Stage,
    system: &str,
    user: &str,
    config: &StudyConfig,
) -> Result<Normalized, StudyError> {
    let raw = complete_with_retry(model, stage.as_str(), system, user, config).await?;
    let normalized = normalize(&raw);
    if normalized.is_empty() {
        info!(%stage, "Model returned no usable JSON; stage degrades to empty");
    }
    Ok(normalized)
}

/// The first `max_chars` characters of `text`.
pub fn head_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

// ── Parsers ──────────────────────────────────────────────────────────────

pub fn parse_summary(n: &Normalized) -> SummaryOutput {
    SummaryOutput {
        summary: n.str_field("summary").trim().to_string(),
        key_concepts: n.string_list("key_concepts"),
        knowledge_gaps: n.string_list("gaps_or_unclear"),
    }
}

pub fn parse_flashcards(n: &Normalized) -> Vec<FlashcardDraft> {
    let items = n.array_field("flashcards");
    let cards: Vec<FlashcardDraft> = items
        .iter()
        .filter_map(|item| {
            let front = required_str(item, "front")?;
            let back = required_str(item, "back")?;
            Some(FlashcardDraft {
                front,
                back,
                difficulty: tag_or_default(item, "difficulty"),
            })
        })
        .collect();
    log_dropped(Stage::Flashcards, items.len(), cards.len());
    cards
}

pub fn parse_questions(n: &Normalized) -> Vec<QuestionDraft> {
    let items = n.array_field("questions");
    let questions: Vec<QuestionDraft> = items
        .iter()
        .filter_map(|item| {
            Some(QuestionDraft {
                question: required_str(item, "question")?,
                suggested_answer: required_str(item, "suggested_answer"),
                question_type: tag_or_default(item, "question_type"),
            })
        })
        .collect();
    log_dropped(Stage::Questions, items.len(), questions.len());
    questions
}

/// Keep only events with a title and a parseable date.
pub fn parse_events(n: &Normalized) -> Vec<EventDraft> {
    let items = n.array_field("events");
    let events: Vec<EventDraft> = items
        .iter()
        .filter_map(|item| {
            let title = required_str(item, "title")?;
            let date = required_str(item, "date")?;
            parse_event_date(&date)?;
            let confidence = item
                .get("confidence")
                .and_then(Value::as_f64)
                .map(|c| clamp_confidence(c as f32))
                .unwrap_or(1.0);
            Some(EventDraft {
                title,
                description: required_str(item, "description"),
                event_type: tag_or_default(item, "event_type"),
                date,
                confidence,
            })
        })
        .collect();
    log_dropped(Stage::Events, items.len(), events.len());
    events
}

/// Parse an ISO-8601 date-time as UTC.
///
/// Accepts RFC 3339 (`Z` or offset), naive `YYYY-MM-DDTHH:MM:SS[.f]` and
/// `YYYY-MM-DD HH:MM:SS` (taken as UTC), and a bare `YYYY-MM-DD` (midnight).
pub fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn required_str(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn tag_or_default<T: std::str::FromStr + Default>(item: &Value, key: &str) -> T {
    item.get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

fn log_dropped(stage: Stage, seen: usize, kept: usize) {
    if kept < seen {
        debug!(%stage, dropped = seen - kept, kept, "Dropped malformed items");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    fn n(raw: &str) -> Normalized {
        normalize(raw)
    }

    #[test]
    fn event_date_validation() {
        assert!(parse_event_date("not-a-date").is_none());
        assert!(parse_event_date("").is_none());
        let z = parse_event_date("2025-01-15T14:00:00Z").unwrap();
        let naive = parse_event_date("2025-01-15T14:00:00").unwrap();
        assert_eq!(z, naive);
        assert_eq!(z, Utc.with_ymd_and_hms(2025, 1, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn event_date_variants() {
        let offset = parse_event_date("2025-01-15T14:00:00+02:00").unwrap();
        assert_eq!(offset.hour(), 12);
        let day = parse_event_date("2025-05-01").unwrap();
        assert_eq!((day.year(), day.month(), day.day()), (2025, 5, 1));
        assert!(parse_event_date("2025-01-15 09:30:00").is_some());
        assert!(parse_event_date("2025-01-15T14:00:00.250").is_some());
        assert!(parse_event_date("2025-13-45T99:00:00").is_none());
    }

    #[test]
    fn summary_missing_fields_default_to_empty() {
        let s = parse_summary(&n(r#"{"summary": "Backprop"}"#));
        assert_eq!(s.summary, "Backprop");
        assert!(s.key_concepts.is_empty());
        assert!(s.knowledge_gaps.is_empty());

        assert_eq!(parse_summary(&Normalized::Empty), SummaryOutput::default());
    }

    #[test]
    fn flashcards_default_difficulty_and_drop_incomplete() {
        let cards = parse_flashcards(&n(r#"{"flashcards": [
            {"front": "What is a gradient?", "back": "Vector of partials", "difficulty": "HARD"},
            {"front": "Chain rule?", "back": "d(f∘g) = f'(g)·g'", "difficulty": "extreme"},
            {"front": "No back"},
            {"front": "Missing difficulty", "back": "ok"},
            "not an object"
        ]}"#));
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].difficulty, Difficulty::Hard);
        assert_eq!(cards[1].difficulty, Difficulty::Medium);
        assert_eq!(cards[2].difficulty, Difficulty::Medium);
    }

    #[test]
    fn questions_default_type() {
        let qs = parse_questions(&n(r#"{"questions": [
            {"question": "Why?", "suggested_answer": "Because", "question_type": "application"},
            {"question": "How?"},
            {"suggested_answer": "orphan"}
        ]}"#));
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].question_type, QuestionType::Application);
        assert_eq!(qs[1].question_type, QuestionType::Conceptual);
        assert!(qs[1].suggested_answer.is_none());
    }

    #[test]
    fn events_with_bad_dates_are_dropped() {
        let events = parse_events(&n(r#"{"events": [
            {"title": "Final exam", "event_type": "exam", "date": "2025-05-01T09:00:00", "confidence": 0.9},
            {"title": "Sometime", "event_type": "quiz", "date": "not-a-date", "confidence": 0.4},
            {"title": "No date", "event_type": "quiz"},
            {"title": "PS3 due", "event_type": "homework", "date": "2025-05-08T23:59:00Z", "confidence": 7}
        ]}"#));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::Exam);
        assert!((events[0].confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(events[1].event_type, EventType::Lecture);
        assert_eq!(events[1].confidence, 1.0);
    }

    #[test]
    fn garbage_degrades_to_empty() {
        let garbage = n("I'm sorry, I can't help with that.");
        assert!(parse_flashcards(&garbage).is_empty());
        assert!(parse_questions(&garbage).is_empty());
        assert!(parse_events(&garbage).is_empty());
    }

    #[test]
    fn head_chars_is_char_safe() {
        assert_eq!(head_chars("αβγδ", 2), "αβ");
        assert_eq!(head_chars("ab", 10), "ab");
        assert_eq!(head_chars("", 3), "");
    }
}
