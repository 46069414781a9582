// src/grading/evaluator.rs

use std::sync::Arc;

use chrono::Utc;

use crate::{
    grading::{GradeRequest, Grader},
    models::{
        attempt::{GradingDetail, QuestionResult},
        question::{Question, QuestionKind},
    },
};

pub const GRADER_ERROR_RATIONALE: &str = "We're sorry, your answer could not be graded \
    automatically. Half credit has been awarded provisionally and your instructor may review it.";
pub const GRADER_ERROR_CONFIDENCE: i32 = 40;

/// Outcome of evaluating one question.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionOutcome {
    pub question_id: i64,
    pub points_awarded: i32,
    pub max_points: i32,
    pub correct: Option<bool>,
    /// Only set for answered free-text questions.
    pub feedback: Option<GradingDetail>,
}

impl QuestionOutcome {
    pub fn result(&self) -> QuestionResult {
        QuestionResult {
            question_id: self.question_id,
            points_awarded: self.points_awarded,
            max_points: self.max_points,
            correct: self.correct,
        }
    }
}

/// Scores a single answer: exact match for objective types, the grader for free text.
#[derive(Clone)]
pub struct AnswerEvaluator {
    grader: Arc<dyn Grader>,
}

impl AnswerEvaluator {
    pub fn new(grader: Arc<dyn Grader>) -> Self {
        Self { grader }
    }

    pub async fn evaluate(&self, question: &Question, answer: Option<&str>) -> QuestionOutcome {
        match &question.kind {
            QuestionKind::MultipleChoice { correct_answer, .. }
            | QuestionKind::TrueFalse { correct_answer } => {
                // Strict, case-sensitive comparison. No key means nothing is correct.
                let correct = matches!(
                    (answer, correct_answer.as_deref()),
                    (Some(given), Some(expected)) if given == expected
                );
                QuestionOutcome {
                    question_id: question.id,
                    points_awarded: if correct { question.points } else { 0 },
                    max_points: question.points,
                    correct: Some(correct),
                    feedback: None,
                }
            }
            QuestionKind::ShortAnswer { reference_answer } => {
                let unanswered = QuestionOutcome {
                    question_id: question.id,
                    points_awarded: 0,
                    max_points: question.points,
                    correct: None,
                    feedback: None,
                };
                let Some(answer) = answer.filter(|a| !a.trim().is_empty()) else {
                    return unanswered;
                };

                let request = GradeRequest {
                    question: &question.prompt,
                    answer,
                    reference: reference_answer.as_deref(),
                    max_points: question.points,
                };

                let detail = match self.grader.grade(request).await {
                    Ok(grade) => {
                        let mut detail = grade.into_detail(question.points, Utc::now());
                        detail.score = detail.score.clamp(0, question.points);
                        detail
                    }
                    Err(e) => {
                        tracing::warn!("Grading question {} failed, awarding half credit: {}", question.id, e);
                        GradingDetail {
                            score: question.points / 2,
                            max_points: question.points,
                            rationale: GRADER_ERROR_RATIONALE.to_string(),
                            confidence: GRADER_ERROR_CONFIDENCE,
                            keywords: Vec::new(),
                            suggestions: Vec::new(),
                            graded_at: Utc::now(),
                            error: true,
                            fallback: false,
                        }
                    }
                };

                QuestionOutcome {
                    points_awarded: detail.score,
                    feedback: Some(detail),
                    ..unanswered
                }
            }
        }
    }
}
