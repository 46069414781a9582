// src/handlers/quiz.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::quiz::{CreateQuizRequest, PublicQuiz},
    store::Store,
};

/// Creates a quiz together with its questions.
/// Professors and admins only.
pub async fn create_quiz(
    State(store): State<Arc<dyn Store>>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if let (Some(start), Some(end)) = (payload.start_date, payload.end_date) {
        if end <= start {
            return Err(AppError::BadRequest(
                "end_date must be after start_date".to_string(),
            ));
        }
    }

    let quiz = store.create_quiz(&payload).await?;
    tracing::info!("Created quiz {} with {} questions", quiz.id, quiz.questions.len());

    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Returns a quiz for taking. Answer keys are hidden.
pub async fn get_quiz(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = store
        .get_quiz(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", id)))?;

    Ok(Json(PublicQuiz::from(&quiz)))
}
