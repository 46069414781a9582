// src/store/memory.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::AppError,
    models::{
        assignment::Assignment,
        attempt::{Attempt, NewAttempt},
        question::Question,
        quiz::{CreateQuizRequest, Quiz},
    },
    store::Store,
};

#[derive(Default)]
struct Tables {
    quizzes: HashMap<i64, Quiz>,
    assignments: HashMap<i64, Assignment>,
    attempts: Vec<Attempt>,
    next_quiz_id: i64,
    next_question_id: i64,
    next_assignment_id: i64,
    next_attempt_id: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Process-local store. Used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fully built quiz, assigning a fresh id. Question ids are kept.
    pub async fn insert_quiz(&self, mut quiz: Quiz) -> Quiz {
        let mut tables = self.tables.write().await;
        quiz.id = next(&mut tables.next_quiz_id);
        quiz.questions.sort_by_key(|q| (q.order, q.id));
        if let Some(max_id) = quiz.questions.iter().map(|q| q.id).max() {
            tables.next_question_id = tables.next_question_id.max(max_id);
        }
        tables.quizzes.insert(quiz.id, quiz.clone());
        quiz
    }
}

fn newest_first(mut attempts: Vec<Attempt>) -> Vec<Attempt> {
    attempts.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(b.id.cmp(&a.id)));
    attempts
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        Ok(self.tables.read().await.quizzes.get(&id).cloned())
    }

    async fn create_quiz(&self, req: &CreateQuizRequest) -> Result<Quiz, AppError> {
        let mut tables = self.tables.write().await;
        let quiz_id = next(&mut tables.next_quiz_id);

        let mut questions = Vec::with_capacity(req.questions.len());
        for (index, q) in req.questions.iter().enumerate() {
            questions.push(Question {
                id: next(&mut tables.next_question_id),
                kind: q.kind.clone(),
                prompt: q.prompt.clone(),
                points: q.points,
                order: q.order.unwrap_or(index as i32),
            });
        }
        questions.sort_by_key(|q| (q.order, q.id));

        let quiz = Quiz {
            id: quiz_id,
            title: req.title.clone(),
            description: req.description.clone(),
            max_attempts: req.max_attempts(),
            time_limit: req.time_limit,
            start_date: req.start_date,
            end_date: req.end_date,
            passing_score: req.passing_score,
            questions,
        };
        tables.quizzes.insert(quiz_id, quiz.clone());
        Ok(quiz)
    }

    async fn get_or_create_assignment(
        &self,
        quiz_id: i64,
        student_id: &str,
        section_id: Option<i64>,
    ) -> Result<Assignment, AppError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .assignments
            .values()
            .find(|a| a.quiz_id == quiz_id && a.student_id == student_id)
        {
            return Ok(existing.clone());
        }

        let assignment = Assignment {
            id: next(&mut tables.next_assignment_id),
            quiz_id,
            student_id: student_id.to_string(),
            section_id,
            is_completed: false,
            completed_at: None,
            created_at: Utc::now(),
        };
        tables.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }

    async fn get_assignment(&self, id: i64) -> Result<Option<Assignment>, AppError> {
        Ok(self.tables.read().await.assignments.get(&id).cloned())
    }

    async fn complete_assignment(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let assignment = tables
            .assignments
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", id)))?;
        assignment.is_completed = true;
        assignment.completed_at = Some(at);
        Ok(())
    }

    async fn find_attempt(
        &self,
        assignment_id: i64,
        student_id: &str,
    ) -> Result<Option<Attempt>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .attempts
            .iter()
            .find(|a| a.assignment_id == assignment_id && a.student_id == student_id)
            .cloned())
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<Option<Attempt>, AppError> {
        let mut tables = self.tables.write().await;
        // Mirrors the UNIQUE (assignment_id) constraint of the SQL schema.
        if tables
            .attempts
            .iter()
            .any(|a| a.assignment_id == attempt.assignment_id)
        {
            return Ok(None);
        }
        let stored = attempt.into_attempt(next(&mut tables.next_attempt_id));
        tables.attempts.push(stored.clone());
        Ok(Some(stored))
    }

    async fn list_attempts_for_assignment(
        &self,
        assignment_id: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .attempts
                .iter()
                .filter(|a| a.assignment_id == assignment_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_attempts_for_quiz(
        &self,
        quiz_id: i64,
        section_id: Option<i64>,
    ) -> Result<Vec<Attempt>, AppError> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .attempts
                .iter()
                .filter(|a| a.quiz_id == quiz_id)
                .filter(|a| section_id.is_none() || a.section_id == section_id)
                .cloned()
                .collect(),
        ))
    }
}
