// src/grading/history.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{grading::scorer::percentage_of, models::attempt::Attempt};

/// One attempt as shown in a student's history, numbered oldest = 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderedAttemptView {
    pub attempt_number: usize,
    pub id: i64,
    pub score: i32,
    pub max_score: i32,
    pub percentage: i32,
    pub passed: bool,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptHistory {
    /// Newest first.
    pub attempts: Vec<OrderedAttemptView>,
    pub best_score: i32,
    pub best_percentage: i32,
    pub total_attempts: usize,
    pub attempts_remaining: i32,
}

/// Summarizes the attempts of one assignment against the quiz's attempt cap.
///
/// Attempts are ordered newest first by `submitted_at` before numbering, so the
/// caller's ordering does not matter. The best percentage is taken from the best
/// attempt's own `max_score`.
pub fn summarize(attempts: &[Attempt], quiz_max_attempts: i32) -> AttemptHistory {
    let mut ordered: Vec<&Attempt> = attempts.iter().collect();
    ordered.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(b.id.cmp(&a.id)));

    let total = ordered.len();
    let views = ordered
        .iter()
        .enumerate()
        .map(|(index, attempt)| OrderedAttemptView {
            attempt_number: total - index,
            id: attempt.id,
            score: attempt.score,
            max_score: attempt.max_score,
            percentage: attempt.percentage,
            passed: attempt.passed,
            submitted_at: attempt.submitted_at,
        })
        .collect();

    // Ties go to the most recent attempt.
    let best = ordered
        .iter()
        .copied()
        .reduce(|best, a| if a.score > best.score { a } else { best });

    let (best_score, best_percentage) = match best {
        Some(a) => (a.score, percentage_of(a.score, a.max_score)),
        None => (0, 0),
    };

    let used = i32::try_from(total).unwrap_or(i32::MAX);
    AttemptHistory {
        attempts: views,
        best_score,
        best_percentage,
        total_attempts: total,
        attempts_remaining: quiz_max_attempts.saturating_sub(used).max(0),
    }
}
