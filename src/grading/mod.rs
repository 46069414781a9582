// src/grading/mod.rs

//! The scoring engine: free-text grading through an external oracle, per-question
//! evaluation, attempt scoring, and read-only reporting over stored attempts.

pub mod analytics;
pub mod evaluator;
pub mod fallback;
pub mod history;
pub mod oracle;
pub mod prompt;
pub mod scorer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::attempt::GradingDetail;

pub use evaluator::{AnswerEvaluator, QuestionOutcome};
pub use oracle::{ChatCompletionClient, CompletionModel, OracleError, OracleGrader};
pub use scorer::{AttemptScorer, EvaluationMode};

/// One free-text answer to be graded.
#[derive(Debug, Clone, Copy)]
pub struct GradeRequest<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    pub reference: Option<&'a str>,
    pub max_points: i32,
}

/// Where a grade came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeSource {
    /// Parsed from an oracle reply.
    Oracle,
    /// Empty answer, decided without contacting the oracle.
    ShortCircuit,
    /// Local heuristic after the oracle failed.
    Fallback,
}

/// A bounded grade: `0 <= score <= max_points`, `0 <= confidence <= 100`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub score: i32,
    pub rationale: String,
    pub confidence: i32,
    pub keywords: Vec<String>,
    pub suggestions: Vec<String>,
    pub source: GradeSource,
}

impl Grade {
    pub(crate) fn local(score: i32, rationale: &str, confidence: i32, source: GradeSource) -> Self {
        Grade {
            score,
            rationale: rationale.to_string(),
            confidence,
            keywords: Vec::new(),
            suggestions: Vec::new(),
            source,
        }
    }

    pub fn into_detail(self, max_points: i32, graded_at: DateTime<Utc>) -> GradingDetail {
        GradingDetail {
            score: self.score,
            max_points,
            rationale: self.rationale,
            confidence: self.confidence,
            keywords: self.keywords,
            suggestions: self.suggestions,
            graded_at,
            error: false,
            fallback: self.source == GradeSource::Fallback,
        }
    }
}

/// Grades one free-text answer. Implementations must return bounded grades.
#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade(&self, request: GradeRequest<'_>) -> Result<Grade, OracleError>;
}
