// src/models/question.rs

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// A single quiz question. Owned by a quiz and deleted together with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// The type tag and the per-type answer data.
    #[serde(flatten)]
    pub kind: QuestionKind,

    /// The text shown to the student.
    pub prompt: String,

    /// Maximum score contribution of this question. Always positive.
    pub points: i32,

    /// Presentation and feedback ordering. Does not affect the total score.
    pub order: i32,
}

/// Closed set of question types. Scoring behavior is chosen by matching on this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<String>,
        correct_answer: Option<String>,
    },
    TrueFalse {
        correct_answer: Option<String>,
    },
    ShortAnswer {
        /// Reference answer handed to the oracle for comparison.
        reference_answer: Option<String>,
    },
}

impl QuestionKind {
    /// Database/wire tag of this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice { .. } => "MULTIPLE_CHOICE",
            QuestionKind::TrueFalse { .. } => "TRUE_FALSE",
            QuestionKind::ShortAnswer { .. } => "SHORT_ANSWER",
        }
    }

    /// Objective types are graded by exact match and never contact the oracle.
    pub fn is_objective(&self) -> bool {
        !matches!(self, QuestionKind::ShortAnswer { .. })
    }

    /// Ground truth for objective types, reference answer for short answers.
    pub fn expected_answer(&self) -> Option<&str> {
        match self {
            QuestionKind::MultipleChoice { correct_answer, .. }
            | QuestionKind::TrueFalse { correct_answer } => correct_answer.as_deref(),
            QuestionKind::ShortAnswer { reference_answer } => reference_answer.as_deref(),
        }
    }

    /// Rebuilds a kind from its stored columns.
    pub fn from_parts(
        tag: &str,
        options: Vec<String>,
        correct_answer: Option<String>,
    ) -> Option<Self> {
        match tag {
            "MULTIPLE_CHOICE" => Some(QuestionKind::MultipleChoice {
                options,
                correct_answer,
            }),
            "TRUE_FALSE" => Some(QuestionKind::TrueFalse { correct_answer }),
            "SHORT_ANSWER" => Some(QuestionKind::ShortAnswer {
                reference_answer: correct_answer,
            }),
            _ => None,
        }
    }

    pub fn options(&self) -> &[String] {
        match self {
            QuestionKind::MultipleChoice { options, .. } => options,
            _ => &[],
        }
    }
}

/// DTO for sending a question to a student (excludes the answer key).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: &'static str,
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub points: i32,
    pub order: i32,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            id: q.id,
            question_type: q.kind.tag(),
            prompt: q.prompt.clone(),
            options: q.kind.options().to_vec(),
            points: q.points,
            order: q.order,
        }
    }
}

/// DTO for creating a question as part of a new quiz.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = validate_kind))]
pub struct CreateQuestionRequest {
    #[serde(flatten)]
    pub kind: QuestionKind,
    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,
    #[validate(range(min = 1, max = 1000))]
    pub points: i32,
    pub order: Option<i32>,
}

fn validate_kind(req: &CreateQuestionRequest) -> Result<(), ValidationError> {
    match &req.kind {
        QuestionKind::MultipleChoice {
            options,
            correct_answer,
        } => {
            if options.is_empty() {
                return Err(ValidationError::new("options_cannot_be_empty"));
            }
            if options.iter().any(|opt| opt.len() > 500) {
                return Err(ValidationError::new("option_too_long"));
            }
            // The answer key must be one of the listed options.
            if let Some(answer) = correct_answer {
                if !options.contains(answer) {
                    return Err(ValidationError::new("correct_answer_not_in_options"));
                }
            }
            Ok(())
        }
        QuestionKind::TrueFalse { correct_answer } => match correct_answer.as_deref() {
            None | Some("true") | Some("false") => Ok(()),
            Some(_) => Err(ValidationError::new("true_false_answer_invalid")),
        },
        QuestionKind::ShortAnswer { reference_answer } => {
            if reference_answer.as_ref().is_some_and(|r| r.len() > 4000) {
                return Err(ValidationError::new("reference_answer_too_long"));
            }
            Ok(())
        }
    }
}
