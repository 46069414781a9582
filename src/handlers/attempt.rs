// src/handlers/attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    error::AppError,
    grading::{analytics, history},
    models::{attempt::SubmitAttemptRequest, quiz::Quiz},
    state::AppState,
    utils::jwt::Claims,
};

async fn load_quiz(state: &AppState, id: i64) -> Result<Quiz, AppError> {
    state
        .store
        .get_quiz(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", id)))
}

/// The availability window belongs to the application, not the scoring engine.
fn ensure_open(quiz: &Quiz, now: DateTime<Utc>) -> Result<(), AppError> {
    if quiz.start_date.is_some_and(|start| now < start) {
        return Err(AppError::Forbidden("Quiz has not opened yet".to_string()));
    }
    if quiz.end_date.is_some_and(|end| now > end) {
        return Err(AppError::Forbidden("Quiz is closed".to_string()));
    }
    Ok(())
}

/// Submits the caller's answers for a quiz.
///
/// * Creates the caller's assignment on first access.
/// * A repeated submission returns the stored attempt with `duplicate: true`.
/// * `degraded` is set when some answers were graded by a fallback path.
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = load_quiz(&state, quiz_id).await?;
    ensure_open(&quiz, Utc::now())?;

    let mut assignment = state
        .store
        .get_or_create_assignment(quiz.id, &claims.sub, req.section_id)
        .await?;
    // The assignment may predate the submission (history view), so the
    // section sent with the answers wins.
    assignment.section_id = req.section_id.or(assignment.section_id);

    let outcome = state.scorer.submit(&quiz, &assignment, &req.answers).await?;

    let message = if outcome.duplicate {
        "This quiz has already been submitted"
    } else if outcome.degraded {
        "Submission succeeded, some answers were graded with reduced confidence"
    } else {
        "Submission succeeded"
    };

    Ok(Json(serde_json::json!({
        "attempt": outcome.attempt,
        "duplicate": outcome.duplicate,
        "degraded": outcome.degraded,
        "message": message,
    })))
}

/// Returns the caller's attempt history for a quiz.
pub async fn get_attempt_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = load_quiz(&state, quiz_id).await?;
    let assignment = state
        .store
        .get_or_create_assignment(quiz.id, &claims.sub, None)
        .await?;

    let attempts = state
        .store
        .list_attempts_for_assignment(assignment.id)
        .await?;

    Ok(Json(history::summarize(&attempts, quiz.max_attempts)))
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub section_id: Option<i64>,
}

/// Aggregate results for a quiz, optionally for one section.
/// Professors and admins only.
pub async fn get_results(
    State(state): State<AppState>,
    Path(quiz_id): Path<i64>,
    Query(query): Query<ResultsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = load_quiz(&state, quiz_id).await?;
    let attempts = state
        .store
        .list_attempts_for_quiz(quiz.id, query.section_id)
        .await?;

    Ok(Json(analytics::report(&attempts)))
}
