// src/models/assignment.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Binding of one quiz to one student. Created lazily on first access.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub quiz_id: i64,

    /// Opaque subject id issued by the identity provider.
    pub student_id: String,

    /// Enrollment context the student is working under, if any.
    pub section_id: Option<i64>,

    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
