// src/grading/fallback.rs

//! Deterministic local scorer used when the grading oracle cannot be reached
//! or its reply cannot be parsed. Pure: same input, same grade.

use std::sync::LazyLock;

use regex::Regex;

use crate::grading::{Grade, GradeSource};

pub const EMPTY_RATIONALE: &str = "No answer was provided.";
pub const NON_ANSWER_RATIONALE: &str =
    "The response does not attempt to answer the question.";
pub const SHORT_RATIONALE: &str =
    "Automated grading was unavailable. The answer is brief, so partial credit was awarded.";
pub const MEDIUM_RATIONALE: &str =
    "Automated grading was unavailable. The answer shows some development and was awarded moderate credit.";
pub const LONG_RATIONALE: &str =
    "Automated grading was unavailable. The answer is detailed and was awarded substantial credit.";

/// Trimmed character counts below these limits fall into the short and medium bands.
const SHORT_LIMIT: usize = 20;
const MEDIUM_LIMIT: usize = 100;

static NON_ANSWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*((i\s*)?(do\s*not|don'?t)\s*know|idk|no\s*idea|not\s*sure|no\s*clue|n/?a|none|pass|skip|\?+)\s*[.!?]*\s*$",
    )
    .expect("static pattern")
});

/// True for empty answers and "I don't know" style non-answers.
pub fn is_non_answer(answer: &str) -> bool {
    // Smart punctuation turns ' into a curly quote.
    let answer = answer.replace(['\u{2018}', '\u{2019}'], "'");
    answer.trim().is_empty() || NON_ANSWER.is_match(&answer)
}

/// Scores an answer by its length when no oracle verdict is available.
pub fn fallback_grade(answer: &str, max_points: i32) -> Grade {
    let trimmed = answer.trim();

    if trimmed.is_empty() {
        return Grade::local(0, EMPTY_RATIONALE, 100, GradeSource::Fallback);
    }
    if is_non_answer(trimmed) {
        return Grade::local(0, NON_ANSWER_RATIONALE, 100, GradeSource::Fallback);
    }

    let len = trimmed.chars().count();
    let (ratio, rationale, confidence) = if len < SHORT_LIMIT {
        (0.3, SHORT_RATIONALE, 70)
    } else if len < MEDIUM_LIMIT {
        (0.6, MEDIUM_RATIONALE, 75)
    } else {
        (0.8, LONG_RATIONALE, 80)
    };

    Grade::local(
        proportion_of(max_points, ratio),
        rationale,
        confidence,
        GradeSource::Fallback,
    )
}

/// `ratio` of `max_points`, rounded and kept within 0..=max_points.
pub(crate) fn proportion_of(max_points: i32, ratio: f64) -> i32 {
    let max = max_points.max(0);
    ((max as f64 * ratio).round() as i32).clamp(0, max)
}
