// src/models/quiz.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::{CreateQuestionRequest, PublicQuestion, Question};

/// A quiz together with its ordered questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,

    /// Caps submissions per student per assignment. Defaults to 1.
    pub max_attempts: i32,

    /// Advisory time limit in minutes. The caller enforces it.
    pub time_limit: Option<i32>,

    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,

    /// Percentage needed to pass. When unset every attempt passes.
    pub passing_score: Option<i32>,

    /// Sorted by `order`.
    pub questions: Vec<Question>,
}

impl Quiz {
    /// Sum of all question point values.
    pub fn max_score(&self) -> i32 {
        self.questions.iter().map(|q| q.points).sum()
    }

    pub fn question(&self, id: i64) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

/// Student-facing view of a quiz (answer keys hidden).
#[derive(Debug, Serialize)]
pub struct PublicQuiz {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub max_attempts: i32,
    pub time_limit: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub questions: Vec<PublicQuestion>,
}

impl From<&Quiz> for PublicQuiz {
    fn from(quiz: &Quiz) -> Self {
        PublicQuiz {
            id: quiz.id,
            title: quiz.title.clone(),
            description: quiz.description.clone(),
            max_attempts: quiz.max_attempts,
            time_limit: quiz.time_limit,
            start_date: quiz.start_date,
            end_date: quiz.end_date,
            questions: quiz.questions.iter().map(PublicQuestion::from).collect(),
        }
    }
}

/// DTO for creating a quiz with its questions.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: Option<i32>,
    #[validate(range(min = 1))]
    pub time_limit: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0, max = 100))]
    pub passing_score: Option<i32>,
    #[validate(nested)]
    pub questions: Vec<CreateQuestionRequest>,
}

impl CreateQuizRequest {
    /// Configured attempt cap, defaulting to a single attempt.
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts.unwrap_or(1)
    }
}
