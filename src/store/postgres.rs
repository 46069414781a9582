// src/store/postgres.rs

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};

use crate::{
    error::AppError,
    models::{
        assignment::Assignment,
        attempt::{Attempt, FeedbackEntry, NewAttempt, QuestionResult},
        question::{Question, QuestionKind},
        quiz::{CreateQuizRequest, Quiz},
    },
    store::Store,
};

/// Row of the 'quizzes' table.
#[derive(FromRow)]
struct QuizRow {
    id: i64,
    title: String,
    description: Option<String>,
    max_attempts: i32,
    time_limit: Option<i32>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    passing_score: Option<i32>,
}

/// Row of the 'questions' table. `type` is a reserved keyword in Rust.
#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    #[sqlx(rename = "type")]
    question_type: String,
    prompt: String,
    options: Json<Vec<String>>,
    correct_answer: Option<String>,
    points: i32,
    position: i32,
}

impl TryFrom<QuestionRow> for Question {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let kind = QuestionKind::from_parts(&row.question_type, row.options.0, row.correct_answer)
            .ok_or_else(|| {
                AppError::InternalServerError(format!(
                    "Question {} has unknown type '{}'",
                    row.id, row.question_type
                ))
            })?;
        Ok(Question {
            id: row.id,
            kind,
            prompt: row.prompt,
            points: row.points,
            order: row.position,
        })
    }
}

/// Row of the 'attempts' table.
#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    assignment_id: i64,
    student_id: String,
    quiz_id: i64,
    section_id: Option<i64>,
    answers: Json<BTreeMap<i64, String>>,
    score: i32,
    max_score: i32,
    percentage: i32,
    passed: bool,
    feedback: Json<Vec<FeedbackEntry>>,
    results: Json<Vec<QuestionResult>>,
    submitted_at: DateTime<Utc>,
}

impl From<AttemptRow> for Attempt {
    fn from(row: AttemptRow) -> Self {
        Attempt {
            id: row.id,
            assignment_id: row.assignment_id,
            student_id: row.student_id,
            quiz_id: row.quiz_id,
            section_id: row.section_id,
            answers: row.answers.0,
            score: row.score,
            max_score: row.max_score,
            percentage: row.percentage,
            passed: row.passed,
            feedback: row.feedback.0,
            results: row.results.0,
            submitted_at: row.submitted_at,
        }
    }
}

const ATTEMPT_COLUMNS: &str = "id, assignment_id, student_id, quiz_id, section_id, answers, \
     score, max_score, percentage, passed, feedback, results, submitted_at";

const ASSIGNMENT_COLUMNS: &str =
    "id, quiz_id, student_id, section_id, is_completed, completed_at, created_at";

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        let Some(quiz) = sqlx::query_as::<_, QuizRow>(
            r#"
            SELECT id, title, description, max_attempts, time_limit,
                   start_date, end_date, passing_score
            FROM quizzes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch quiz {}: {:?}", id, e);
            AppError::InternalServerError(e.to_string())
        })?
        else {
            return Ok(None);
        };

        let questions = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, type, prompt, options, correct_answer, points, position
            FROM questions
            WHERE quiz_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Question::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Quiz {
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            max_attempts: quiz.max_attempts,
            time_limit: quiz.time_limit,
            start_date: quiz.start_date,
            end_date: quiz.end_date,
            passing_score: quiz.passing_score,
            questions,
        }))
    }

    async fn create_quiz(&self, req: &CreateQuizRequest) -> Result<Quiz, AppError> {
        let mut tx = self.pool.begin().await?;

        let quiz_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO quizzes (title, description, max_attempts, time_limit,
                                 start_date, end_date, passing_score)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.max_attempts())
        .bind(req.time_limit)
        .bind(req.start_date)
        .bind(req.end_date)
        .bind(req.passing_score)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert quiz: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        for (index, q) in req.questions.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO questions (quiz_id, type, prompt, options, correct_answer, points, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(quiz_id)
            .bind(q.kind.tag())
            .bind(&q.prompt)
            .bind(Json(q.kind.options().to_vec()))
            .bind(q.kind.expected_answer())
            .bind(q.points)
            .bind(q.order.unwrap_or(index as i32))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_quiz(quiz_id)
            .await?
            .ok_or_else(|| AppError::InternalServerError(format!("Quiz {} vanished after insert", quiz_id)))
    }

    async fn get_or_create_assignment(
        &self,
        quiz_id: i64,
        student_id: &str,
        section_id: Option<i64>,
    ) -> Result<Assignment, AppError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let sql = format!(
            r#"
            INSERT INTO assignments (quiz_id, student_id, section_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (quiz_id, student_id) DO UPDATE SET quiz_id = EXCLUDED.quiz_id
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let assignment = sqlx::query_as::<_, Assignment>(&sql)
            .bind(quiz_id)
            .bind(student_id)
            .bind(section_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to get or create assignment: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?;
        Ok(assignment)
    }

    async fn get_assignment(&self, id: i64) -> Result<Option<Assignment>, AppError> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = $1");
        Ok(sqlx::query_as::<_, Assignment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn complete_assignment(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE assignments SET is_completed = TRUE, completed_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Assignment {} not found", id)));
        }
        Ok(())
    }

    async fn find_attempt(
        &self,
        assignment_id: i64,
        student_id: &str,
    ) -> Result<Option<Attempt>, AppError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE assignment_id = $1 AND student_id = $2"
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(assignment_id)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Attempt::from))
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<Option<Attempt>, AppError> {
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO attempts (assignment_id, student_id, quiz_id, section_id, answers,
                                  score, max_score, percentage, passed, feedback, results, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (assignment_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(attempt.assignment_id)
        .bind(&attempt.student_id)
        .bind(attempt.quiz_id)
        .bind(attempt.section_id)
        .bind(Json(&attempt.answers))
        .bind(attempt.score)
        .bind(attempt.max_score)
        .bind(attempt.percentage)
        .bind(attempt.passed)
        .bind(Json(&attempt.feedback))
        .bind(Json(&attempt.results))
        .bind(attempt.submitted_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert attempt: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(id.map(|id| attempt.into_attempt(id)))
    }

    async fn list_attempts_for_assignment(
        &self,
        assignment_id: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE assignment_id = $1 \
             ORDER BY submitted_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(assignment_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Attempt::from).collect())
    }

    async fn list_attempts_for_quiz(
        &self,
        quiz_id: i64,
        section_id: Option<i64>,
    ) -> Result<Vec<Attempt>, AppError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts \
             WHERE quiz_id = $1 AND ($2::BIGINT IS NULL OR section_id = $2) \
             ORDER BY submitted_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(quiz_id)
            .bind(section_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Attempt::from).collect())
    }
}
