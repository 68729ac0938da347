//! Prompt contracts for the four extraction stages.
//!
//! Every stage sends one system instruction demanding JSON-only output and
//! one human turn built from the note text. Keeping them here lets unit tests
//! inspect the exact field names each stage parses back out.

/// Summary stage: `summary`, `key_concepts`, `gaps_or_unclear`.
pub const SUMMARY_SYSTEM_PROMPT: &str = r#"You are a study assistant. Analyze the notes and respond with JSON containing: "summary" (2-4 paragraph summary), "key_concepts" (array of strings), and "gaps_or_unclear" (array of areas needing more study). Respond ONLY with valid JSON, no other text."#;

/// Flashcard stage: a `flashcards` array of `front`/`back`/`difficulty`.
pub const FLASHCARD_SYSTEM_PROMPT: &str = r#"Create 5-10 flashcards from the notes. Respond with JSON containing a "flashcards" array. Each flashcard has "front" (question), "back" (answer), and "difficulty" (easy, medium, or hard). Respond ONLY with valid JSON, no other text."#;

/// Question stage: a `questions` array of `question`/`suggested_answer`/`question_type`.
pub const QUESTION_SYSTEM_PROMPT: &str = r#"Create 3-5 study questions from the notes. Respond with JSON containing a "questions" array. Each question has "question", "suggested_answer", and "question_type" (recall, conceptual, or application). Respond ONLY with valid JSON, no other text."#;

/// Event stage. `{current_date}` is replaced by [`event_system_prompt`].
pub const EVENT_SYSTEM_PROMPT: &str = r#"Extract dates and deadlines from notes. Today is {current_date}. Respond with JSON containing an "events" array. Each event has "title", "event_type" (exam, assignment, quiz, project, or lecture), "date" (ISO format YYYY-MM-DDTHH:MM:SS), and "confidence" (0.0 to 1.0). If no dates found, respond with empty events array. Respond ONLY with valid JSON, no other text."#;

/// Placeholder course name when a note is not filed under a course.
pub const UNSPECIFIED_COURSE: &str = "Not specified";

/// Placeholder concept list when the summary stage produced none.
pub const DEFAULT_CONCEPTS: &str = "main topics";

/// Minimal prompt used by the credential preflight check.
pub const KEY_CHECK_PROMPT: &str = "Hi";

pub fn summary_user_prompt(course_name: Option<&str>, notes: &str) -> String {
    format!(
        "Course: {}\n\nNotes:\n{}",
        course_name.unwrap_or(UNSPECIFIED_COURSE),
        notes
    )
}

/// Human turn shared by the flashcard and question stages.
pub fn concepts_user_prompt(concepts: &[String], max_concepts: usize, notes: &str) -> String {
    let concepts = if concepts.is_empty() {
        DEFAULT_CONCEPTS.to_string()
    } else {
        concepts
            .iter()
            .take(max_concepts)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("Key concepts: {}\n\nNotes:\n{}", concepts, notes)
}

pub fn event_system_prompt(current_date: &str) -> String {
    EVENT_SYSTEM_PROMPT.replace("{current_date}", current_date)
}
