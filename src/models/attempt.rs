// src/models/attempt.rs

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The scored outcome of one submission. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub assignment_id: i64,
    pub student_id: String,
    pub quiz_id: i64,
    pub section_id: Option<i64>,

    /// Raw submitted answers keyed by question id.
    pub answers: BTreeMap<i64, String>,

    /// Sum of awarded points.
    pub score: i32,
    /// Sum of question points at scoring time.
    pub max_score: i32,
    /// round(score / max_score * 100), 0 for an empty quiz.
    pub percentage: i32,
    pub passed: bool,

    /// Grading detail for oracle-graded questions, in question order.
    pub feedback: Vec<FeedbackEntry>,

    /// Per-question outcome for every question, in question order.
    pub results: Vec<QuestionResult>,

    pub submitted_at: DateTime<Utc>,
}

impl Attempt {
    pub fn feedback_for(&self, question_id: i64) -> Option<&GradingDetail> {
        self.feedback
            .iter()
            .find(|entry| entry.question_id == question_id)
            .map(|entry| &entry.detail)
    }

    /// True when any answer was graded by a fallback path.
    pub fn graded_with_reduced_confidence(&self) -> bool {
        self.feedback
            .iter()
            .any(|entry| entry.detail.error || entry.detail.fallback)
    }
}

/// An attempt that has been scored but not yet stored.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub assignment_id: i64,
    pub student_id: String,
    pub quiz_id: i64,
    pub section_id: Option<i64>,
    pub answers: BTreeMap<i64, String>,
    pub score: i32,
    pub max_score: i32,
    pub percentage: i32,
    pub passed: bool,
    pub feedback: Vec<FeedbackEntry>,
    pub results: Vec<QuestionResult>,
    pub submitted_at: DateTime<Utc>,
}

impl NewAttempt {
    pub fn into_attempt(self, id: i64) -> Attempt {
        Attempt {
            id,
            assignment_id: self.assignment_id,
            student_id: self.student_id,
            quiz_id: self.quiz_id,
            section_id: self.section_id,
            answers: self.answers,
            score: self.score,
            max_score: self.max_score,
            percentage: self.percentage,
            passed: self.passed,
            feedback: self.feedback,
            results: self.results,
            submitted_at: self.submitted_at,
        }
    }
}

/// Oracle (or fallback) grading detail for one free-text answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingDetail {
    pub score: i32,
    pub max_points: i32,
    pub rationale: String,
    /// 0..=100
    pub confidence: i32,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub graded_at: DateTime<Utc>,
    /// Set when the grader failed and a local award was substituted.
    #[serde(default)]
    pub error: bool,
    /// Set when the local fallback scorer produced the score.
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub question_id: i64,
    #[serde(flatten)]
    pub detail: GradingDetail,
}

/// Recorded outcome of a single question within an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: i64,
    pub points_awarded: i32,
    pub max_points: i32,
    /// Exact-match correctness for objective questions; None for free text.
    pub correct: Option<bool>,
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    /// Key: question id. Value: the raw answer.
    pub answers: HashMap<i64, String>,
    pub section_id: Option<i64>,
}

/// Result of a submission. `duplicate` marks a previously stored attempt.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub attempt: Attempt,
    pub duplicate: bool,
    pub degraded: bool,
}
