// src/grading/analytics.rs

//! Read-only aggregates over stored attempts for reporting views.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::models::attempt::Attempt;

/// Mean of attempt percentages, 0 with no attempts.
pub fn average_percentage(attempts: &[Attempt]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    attempts.iter().map(|a| a.percentage as f64).sum::<f64>() / attempts.len() as f64
}

/// Mean of raw scores, 0 with no attempts.
pub fn average_score(attempts: &[Attempt]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    attempts.iter().map(|a| a.score as f64).sum::<f64>() / attempts.len() as f64
}

/// Fraction of attempts marked passed, in 0.0..=1.0.
pub fn pass_rate(attempts: &[Attempt]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    attempts.iter().filter(|a| a.passed).count() as f64 / attempts.len() as f64
}

pub fn unique_students(attempts: &[Attempt]) -> usize {
    attempts
        .iter()
        .map(|a| a.student_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionSuccessRate {
    pub question_id: i64,
    /// Attempts that recorded a correctness verdict for this question.
    pub attempts: usize,
    pub correct: usize,
    /// `correct / attempts`, in 0.0..=1.0.
    pub success_rate: f64,
}

/// Per-question success rate over objective questions, ordered by question id.
/// Free-text questions have no boolean verdict and are skipped.
pub fn question_success_rates(attempts: &[Attempt]) -> Vec<QuestionSuccessRate> {
    let mut tally: BTreeMap<i64, (usize, usize)> = BTreeMap::new();
    for result in attempts.iter().flat_map(|a| a.results.iter()) {
        if let Some(correct) = result.correct {
            let entry = tally.entry(result.question_id).or_default();
            entry.0 += 1;
            if correct {
                entry.1 += 1;
            }
        }
    }

    tally
        .into_iter()
        .map(|(question_id, (attempts, correct))| QuestionSuccessRate {
            question_id,
            attempts,
            correct,
            success_rate: correct as f64 / attempts as f64,
        })
        .collect()
}

/// Everything the results view shows for a quiz or section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsReport {
    pub total_attempts: usize,
    pub unique_students: usize,
    pub average_score: f64,
    pub average_percentage: f64,
    pub pass_rate: f64,
    pub questions: Vec<QuestionSuccessRate>,
}

pub fn report(attempts: &[Attempt]) -> ResultsReport {
    ResultsReport {
        total_attempts: attempts.len(),
        unique_students: unique_students(attempts),
        average_score: average_score(attempts),
        average_percentage: average_percentage(attempts),
        pass_rate: pass_rate(attempts),
        questions: question_success_rates(attempts),
    }
}
