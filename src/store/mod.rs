// src/store/mod.rs

//! Persistence for quizzes, assignments and attempts.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        assignment::Assignment,
        attempt::{Attempt, NewAttempt},
        quiz::{CreateQuizRequest, Quiz},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Loads a quiz with its questions sorted by `order`.
    async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError>;

    async fn create_quiz(&self, req: &CreateQuizRequest) -> Result<Quiz, AppError>;

    /// Returns the student's assignment for the quiz, creating it on first access.
    async fn get_or_create_assignment(
        &self,
        quiz_id: i64,
        student_id: &str,
        section_id: Option<i64>,
    ) -> Result<Assignment, AppError>;

    async fn get_assignment(&self, id: i64) -> Result<Option<Assignment>, AppError>;

    async fn complete_assignment(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn find_attempt(
        &self,
        assignment_id: i64,
        student_id: &str,
    ) -> Result<Option<Attempt>, AppError>;

    /// Stores a scored attempt. Returns `None` when the assignment already has one.
    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<Option<Attempt>, AppError>;

    /// Newest first.
    async fn list_attempts_for_assignment(
        &self,
        assignment_id: i64,
    ) -> Result<Vec<Attempt>, AppError>;

    /// Newest first, optionally restricted to one section.
    async fn list_attempts_for_quiz(
        &self,
        quiz_id: i64,
        section_id: Option<i64>,
    ) -> Result<Vec<Attempt>, AppError>;
}
