//! Flashcard review scheduling and aggregate statistics.
//!
//! | rating | counters                      | next review                      |
//! |--------|-------------------------------|----------------------------------|
//! | easy   | reviewed +1, correct +1       | now + min(30, 3 × correct) days  |
//! | medium | reviewed +1, correct +1       | now + min(14, 1 × correct) days  |
//! | hard   | reviewed +1                   | now + 1 day                      |
//!
//! `correct` is the count after the increment, so a card at two correct
//! answers rated easy moves to three and is next due in nine days.

use crate::records::{Difficulty, Flashcard};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const EASY_CAP_DAYS: i64 = 30;
const EASY_STEP_DAYS: i64 = 3;
const MEDIUM_CAP_DAYS: i64 = 14;
const MEDIUM_STEP_DAYS: i64 = 1;
const HARD_INTERVAL_DAYS: i64 = 1;

/// Days until the next review for `rating`, given the post-review correct count.
pub fn interval_days(rating: Difficulty, times_correct: u32) -> i64 {
    let correct = i64::from(times_correct);
    match rating {
        Difficulty::Easy => (correct * EASY_STEP_DAYS).min(EASY_CAP_DAYS),
        Difficulty::Medium => (correct * MEDIUM_STEP_DAYS).min(MEDIUM_CAP_DAYS),
        Difficulty::Hard => HARD_INTERVAL_DAYS,
    }
}

/// Apply one review at `now`. The rating becomes the card's difficulty tag;
/// counters and schedule fields advance per the table above.
pub fn apply_review(card: &mut Flashcard, rating: Difficulty, now: DateTime<Utc>) {
    card.difficulty = rating;
    card.times_reviewed = card.times_reviewed.saturating_add(1);
    card.last_reviewed = Some(now);
    if rating != Difficulty::Hard {
        card.times_correct = card.times_correct.saturating_add(1).min(card.times_reviewed);
    }
    card.next_review = Some(now + Duration::days(interval_days(rating, card.times_correct)));
}

/// Review totals across a set of flashcards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlashcardStats {
    pub total_flashcards: usize,
    pub reviewed_at_least_once: usize,
    pub due_for_review: usize,
    pub total_reviews: u64,
    pub total_correct: u64,
    /// Percent correct, one decimal place; 0 when nothing was reviewed.
    pub accuracy_percentage: f64,
}

impl FlashcardStats {
    pub fn from_cards(cards: &[Flashcard], now: DateTime<Utc>) -> Self {
        let total_reviews: u64 = cards.iter().map(|c| u64::from(c.times_reviewed)).sum();
        let total_correct: u64 = cards.iter().map(|c| u64::from(c.times_correct)).sum();
        let accuracy_percentage = if total_reviews == 0 {
            0.0
        } else {
            (total_correct as f64 / total_reviews as f64 * 1000.0).round() / 10.0
        };
        Self {
            total_flashcards: cards.len(),
            reviewed_at_least_once: cards.iter().filter(|c| c.times_reviewed > 0).count(),
            due_for_review: cards.iter().filter(|c| c.is_due(now)).count(),
            total_reviews,
            total_correct,
            accuracy_percentage,
        }
    }
}
