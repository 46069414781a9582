// src/grading/scorer.rs

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;

use crate::{
    error::AppError,
    grading::evaluator::{AnswerEvaluator, QuestionOutcome},
    models::{
        assignment::Assignment,
        attempt::{Attempt, FeedbackEntry, NewAttempt, SubmissionOutcome},
        question::Question,
        quiz::Quiz,
    },
    store::Store,
};

/// How per-question evaluations are dispatched within one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// One question at a time, in question order.
    Sequential,
    /// All at once, with the n-th oracle-bound question delayed by n * the given stagger.
    Staggered(Duration),
}

/// round(score / max_score * 100), or 0 when there is nothing to score.
pub fn percentage_of(score: i32, max_score: i32) -> i32 {
    if max_score <= 0 {
        return 0;
    }
    (score as f64 / max_score as f64 * 100.0).round() as i32
}

/// Scores submissions and stores exactly one attempt per assignment.
pub struct AttemptScorer {
    store: Arc<dyn Store>,
    evaluator: AnswerEvaluator,
    mode: EvaluationMode,
}

impl AttemptScorer {
    pub fn new(store: Arc<dyn Store>, evaluator: AnswerEvaluator) -> Self {
        Self {
            store,
            evaluator,
            mode: EvaluationMode::Sequential,
        }
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Scores `answers` for `assignment` and stores the attempt.
    ///
    /// * An existing attempt for the assignment is returned as a duplicate without
    ///   grading anything.
    /// * Grading failures never abort the submission; only a failed attempt write does.
    /// * Assignment completion is written after the attempt. Failing to write it is
    ///   logged and does not fail the submission.
    pub async fn submit(
        &self,
        quiz: &Quiz,
        assignment: &Assignment,
        answers: &HashMap<i64, String>,
    ) -> Result<SubmissionOutcome, AppError> {
        if assignment.quiz_id != quiz.id {
            return Err(AppError::BadRequest(format!(
                "Assignment {} does not belong to quiz {}",
                assignment.id, quiz.id
            )));
        }

        if let Some(existing) = self
            .store
            .find_attempt(assignment.id, &assignment.student_id)
            .await?
        {
            tracing::info!(
                "Duplicate submission for assignment {}, returning attempt {}",
                assignment.id,
                existing.id
            );
            return Ok(duplicate(existing));
        }

        if let Some(unknown) = answers.keys().find(|id| quiz.question(**id).is_none()) {
            return Err(AppError::BadRequest(format!(
                "Question {} is not part of quiz {}",
                unknown, quiz.id
            )));
        }

        let mut questions: Vec<&Question> = quiz.questions.iter().collect();
        questions.sort_by_key(|q| (q.order, q.id));

        let outcomes = self.evaluate_all(&questions, answers).await;

        let score: i32 = outcomes.iter().map(|o| o.points_awarded).sum();
        let max_score = quiz.max_score();
        let percentage = percentage_of(score, max_score);
        let passed = quiz.passing_score.is_none_or(|threshold| percentage >= threshold);

        let results = outcomes.iter().map(QuestionOutcome::result).collect();
        let feedback: Vec<FeedbackEntry> = outcomes
            .into_iter()
            .filter_map(|o| {
                o.feedback.map(|detail| FeedbackEntry {
                    question_id: o.question_id,
                    detail,
                })
            })
            .collect();

        let new_attempt = NewAttempt {
            assignment_id: assignment.id,
            student_id: assignment.student_id.clone(),
            quiz_id: quiz.id,
            section_id: assignment.section_id,
            answers: answers
                .iter()
                .map(|(id, answer)| (*id, answer.clone()))
                .collect::<BTreeMap<_, _>>(),
            score,
            max_score,
            percentage,
            passed,
            feedback,
            results,
            submitted_at: Utc::now(),
        };

        let Some(attempt) = self.store.insert_attempt(new_attempt).await? else {
            // Lost the race against a concurrent submission for the same assignment.
            let existing = self
                .store
                .find_attempt(assignment.id, &assignment.student_id)
                .await?
                .ok_or_else(|| {
                    AppError::InternalServerError(format!(
                        "Attempt for assignment {} rejected as duplicate but not found",
                        assignment.id
                    ))
                })?;
            return Ok(duplicate(existing));
        };

        if let Err(e) = self
            .store
            .complete_assignment(assignment.id, attempt.submitted_at)
            .await
        {
            tracing::error!(
                "Attempt {} stored but assignment {} could not be marked complete: {}",
                attempt.id,
                assignment.id,
                e
            );
        }

        tracing::info!(
            "Scored attempt {} for assignment {}: {}/{} ({}%)",
            attempt.id,
            assignment.id,
            attempt.score,
            attempt.max_score,
            attempt.percentage
        );

        let degraded = attempt.graded_with_reduced_confidence();
        Ok(SubmissionOutcome {
            attempt,
            duplicate: false,
            degraded,
        })
    }

    async fn evaluate_all(
        &self,
        questions: &[&Question],
        answers: &HashMap<i64, String>,
    ) -> Vec<QuestionOutcome> {
        match self.mode {
            EvaluationMode::Sequential => {
                let mut outcomes = Vec::with_capacity(questions.len());
                for question in questions {
                    let answer = answers.get(&question.id).map(String::as_str);
                    outcomes.push(self.evaluator.evaluate(question, answer).await);
                }
                outcomes
            }
            EvaluationMode::Staggered(stagger) => {
                let mut slot = 0u32;
                let evaluations = questions.iter().map(|question| {
                    let answer = answers.get(&question.id).map(String::as_str);
                    let delay = if needs_oracle(question, answer) {
                        slot += 1;
                        stagger * (slot - 1)
                    } else {
                        Duration::ZERO
                    };
                    let evaluator = &self.evaluator;
                    async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        evaluator.evaluate(question, answer).await
                    }
                });
                // join_all keeps input order.
                futures::future::join_all(evaluations).await
            }
        }
    }
}

fn needs_oracle(question: &Question, answer: Option<&str>) -> bool {
    !question.kind.is_objective()
        && answer.is_some_and(|a| !a.trim().is_empty())
}

fn duplicate(attempt: Attempt) -> SubmissionOutcome {
    let degraded = attempt.graded_with_reduced_confidence();
    SubmissionOutcome {
        attempt,
        duplicate: true,
        degraded,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::DateTime;

    use super::*;
    use crate::{
        grading::evaluator::tests::{FixedGrader, mc, short},
        models::quiz::{CreateQuizRequest, Quiz},
        store::memory::MemoryStore,
    };

    /// Wraps a `MemoryStore` to simulate a lost insert race or a failing
    /// completion write.
    struct FlakyStore {
        inner: Arc<MemoryStore>,
        hide_next_lookup: AtomicBool,
        fail_completion: bool,
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
            self.inner.get_quiz(id).await
        }

        async fn create_quiz(&self, req: &CreateQuizRequest) -> Result<Quiz, AppError> {
            self.inner.create_quiz(req).await
        }

        async fn get_or_create_assignment(
            &self,
            quiz_id: i64,
            student_id: &str,
            section_id: Option<i64>,
        ) -> Result<Assignment, AppError> {
            self.inner
                .get_or_create_assignment(quiz_id, student_id, section_id)
                .await
        }

        async fn get_assignment(&self, id: i64) -> Result<Option<Assignment>, AppError> {
            self.inner.get_assignment(id).await
        }

        async fn complete_assignment(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
            if self.fail_completion {
                return Err(AppError::InternalServerError("connection reset".to_string()));
            }
            self.inner.complete_assignment(id, at).await
        }

        async fn find_attempt(
            &self,
            assignment_id: i64,
            student_id: &str,
        ) -> Result<Option<Attempt>, AppError> {
            if self.hide_next_lookup.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_attempt(assignment_id, student_id).await
        }

        async fn insert_attempt(&self, attempt: NewAttempt) -> Result<Option<Attempt>, AppError> {
            self.inner.insert_attempt(attempt).await
        }

        async fn list_attempts_for_assignment(
            &self,
            assignment_id: i64,
        ) -> Result<Vec<Attempt>, AppError> {
            self.inner.list_attempts_for_assignment(assignment_id).await
        }

        async fn list_attempts_for_quiz(
            &self,
            quiz_id: i64,
            section_id: Option<i64>,
        ) -> Result<Vec<Attempt>, AppError> {
            self.inner.list_attempts_for_quiz(quiz_id, section_id).await
        }
    }

    fn quiz(id: i64, questions: Vec<Question>) -> Quiz {
        Quiz {
            id,
            title: "Biology".to_string(),
            description: None,
            max_attempts: 1,
            time_limit: None,
            start_date: None,
            end_date: None,
            passing_score: None,
            questions,
        }
    }

    async fn setup(
        store: &Arc<MemoryStore>,
        quiz: Quiz,
        grader: Arc<FixedGrader>,
    ) -> (AttemptScorer, Quiz, Assignment) {
        let quiz = store.insert_quiz(quiz).await;
        let assignment = store
            .get_or_create_assignment(quiz.id, "student-1", Some(3))
            .await
            .unwrap();
        let scorer = AttemptScorer::new(store.clone(), AnswerEvaluator::new(grader));
        (scorer, quiz, assignment)
    }

    fn answers(pairs: &[(i64, &str)]) -> HashMap<i64, String> {
        pairs.iter().map(|(id, a)| (*id, a.to_string())).collect()
    }

    #[test]
    fn test_percentage_of() {
        assert_eq!(percentage_of(4, 5), 80);
        assert_eq!(percentage_of(1, 3), 33);
        assert_eq!(percentage_of(2, 3), 67);
        assert_eq!(percentage_of(0, 0), 0);
    }

    #[tokio::test]
    async fn test_aggregates_objective_points() {
        let store = Arc::new(MemoryStore::new());
        let questions = vec![mc(1, "A", 1), mc(2, "B", 2), mc(3, "C", 3), mc(4, "D", 4)];
        let (scorer, quiz, assignment) =
            setup(&store, quiz(1, questions), FixedGrader::scoring(0)).await;

        let outcome = scorer
            .submit(&quiz, &assignment, &answers(&[(1, "A"), (2, "A"), (3, "C"), (4, "A")]))
            .await
            .unwrap();

        assert!(!outcome.duplicate);
        assert_eq!(outcome.attempt.score, 4);
        assert_eq!(outcome.attempt.max_score, 10);
        assert_eq!(outcome.attempt.percentage, 40);
        assert!(outcome.attempt.passed);
        assert!(outcome.attempt.feedback.is_empty());
        assert_eq!(outcome.attempt.section_id, Some(3));
        assert_eq!(outcome.attempt.results.len(), 4);

        let stored = store.get_assignment(assignment.id).await.unwrap().unwrap();
        assert!(stored.is_completed);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_second_submission_returns_first_attempt() {
        let store = Arc::new(MemoryStore::new());
        let grader = FixedGrader::scoring(2);
        let (scorer, quiz, assignment) =
            setup(&store, quiz(1, vec![mc(1, "A", 1), short(2, 4)]), grader.clone()).await;

        let first = scorer
            .submit(&quiz, &assignment, &answers(&[(1, "A"), (2, "light")]))
            .await
            .unwrap();
        let second = scorer
            .submit(&quiz, &assignment, &answers(&[(1, "B"), (99, "junk")]))
            .await
            .unwrap();

        assert!(second.duplicate);
        assert_eq!(first.attempt.id, second.attempt.id);
        assert_eq!(second.attempt.score, first.attempt.score);
        assert_eq!(grader.calls(), 1);
        assert_eq!(store.list_attempts_for_assignment(assignment.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_quiz_scores_zero() {
        let store = Arc::new(MemoryStore::new());
        let (scorer, quiz, assignment) =
            setup(&store, quiz(1, Vec::new()), FixedGrader::scoring(0)).await;

        let outcome = scorer.submit(&quiz, &assignment, &HashMap::new()).await.unwrap();
        assert_eq!(outcome.attempt.score, 0);
        assert_eq!(outcome.attempt.max_score, 0);
        assert_eq!(outcome.attempt.percentage, 0);
    }

    #[tokio::test]
    async fn test_mixed_quiz_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        let (scorer, quiz, assignment) =
            setup(&store, quiz(1, vec![mc(1, "A", 1), short(2, 4)]), FixedGrader::scoring(3)).await;

        let outcome = scorer
            .submit(
                &quiz,
                &assignment,
                &answers(&[(1, "A"), (2, "plants make food from sunlight")]),
            )
            .await
            .unwrap();

        let attempt = outcome.attempt;
        assert_eq!(attempt.score, 4);
        assert_eq!(attempt.max_score, 5);
        assert_eq!(attempt.percentage, 80);
        assert_eq!(attempt.feedback.len(), 1);
        assert_eq!(attempt.feedback[0].question_id, 2);
        assert_eq!(attempt.feedback_for(2).unwrap().score, 3);
        assert!(!outcome.degraded);
    }

    #[tokio::test]
    async fn test_grader_failure_does_not_abort_submission() {
        let store = Arc::new(MemoryStore::new());
        let (scorer, quiz, assignment) = setup(
            &store,
            quiz(1, vec![short(1, 4), short(2, 6), mc(3, "C", 2)]),
            FixedGrader::failing(),
        )
        .await;

        let outcome = scorer
            .submit(&quiz, &assignment, &answers(&[(1, "x"), (2, "y"), (3, "C")]))
            .await
            .unwrap();

        assert_eq!(outcome.attempt.score, 2 + 3 + 2);
        assert!(outcome.degraded);
        assert!(outcome.attempt.feedback.iter().all(|f| f.detail.error));
    }

    #[tokio::test]
    async fn test_passing_score_is_applied_when_set() {
        let store = Arc::new(MemoryStore::new());
        let mut q = quiz(1, vec![mc(1, "A", 1), mc(2, "B", 1)]);
        q.passing_score = Some(60);
        let (scorer, quiz, assignment) = setup(&store, q, FixedGrader::scoring(0)).await;

        let outcome = scorer
            .submit(&quiz, &assignment, &answers(&[(1, "A")]))
            .await
            .unwrap();
        assert_eq!(outcome.attempt.percentage, 50);
        assert!(!outcome.attempt.passed);
    }

    #[tokio::test]
    async fn test_rejects_foreign_questions_and_assignments() {
        let store = Arc::new(MemoryStore::new());
        let (scorer, quiz, assignment) =
            setup(&store, quiz(1, vec![mc(1, "A", 1)]), FixedGrader::scoring(0)).await;

        let err = scorer
            .submit(&quiz, &assignment, &answers(&[(42, "A")]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let mut other = assignment.clone();
        other.quiz_id = quiz.id + 1;
        let err = scorer.submit(&quiz, &other, &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_staggered_mode_keeps_question_order() {
        let store = Arc::new(MemoryStore::new());
        let mut questions = vec![short(3, 2), mc(1, "A", 1), short(2, 2)];
        questions[0].order = 30;
        questions[1].order = 10;
        questions[2].order = 20;
        let (scorer, quiz, assignment) =
            setup(&store, quiz(1, questions), FixedGrader::scoring(1)).await;
        let scorer = scorer.with_mode(EvaluationMode::Staggered(Duration::from_millis(5)));

        let outcome = scorer
            .submit(&quiz, &assignment, &answers(&[(1, "A"), (2, "a"), (3, "b")]))
            .await
            .unwrap();

        let order: Vec<i64> = outcome.attempt.results.iter().map(|r| r.question_id).collect();
        assert_eq!(order, vec![1, 2, 3]);
        let feedback_order: Vec<i64> = outcome
            .attempt
            .feedback
            .iter()
            .map(|f| f.question_id)
            .collect();
        assert_eq!(feedback_order, vec![2, 3]);
        assert_eq!(outcome.attempt.score, 3);
    }

    #[tokio::test]
    async fn test_lost_insert_race_returns_stored_attempt() {
        let store = Arc::new(MemoryStore::new());
        let grader = FixedGrader::scoring(2);
        let (winner, quiz, assignment) =
            setup(&store, quiz(1, vec![mc(1, "A", 1), short(2, 4)]), grader.clone()).await;

        let first = winner
            .submit(&quiz, &assignment, &answers(&[(1, "A"), (2, "light")]))
            .await
            .unwrap();

        // The second submitter checked before the first one's row was visible.
        let racing = Arc::new(FlakyStore {
            inner: store.clone(),
            hide_next_lookup: AtomicBool::new(true),
            fail_completion: false,
        });
        let loser = AttemptScorer::new(racing, AnswerEvaluator::new(grader.clone()));
        let second = loser
            .submit(&quiz, &assignment, &answers(&[(1, "B"), (2, "dark")]))
            .await
            .unwrap();

        assert!(second.duplicate);
        assert_eq!(second.attempt.id, first.attempt.id);
        assert_eq!(second.attempt.score, first.attempt.score);
        assert_eq!(grader.calls(), 2);
        assert_eq!(store.list_attempts_for_assignment(assignment.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_completion_failure_keeps_submission() {
        let store = Arc::new(MemoryStore::new());
        let (_, quiz, assignment) =
            setup(&store, quiz(1, vec![mc(1, "A", 2)]), FixedGrader::scoring(0)).await;

        let failing = Arc::new(FlakyStore {
            inner: store.clone(),
            hide_next_lookup: AtomicBool::new(false),
            fail_completion: true,
        });
        let scorer = AttemptScorer::new(failing, AnswerEvaluator::new(FixedGrader::scoring(0)));

        let outcome = scorer
            .submit(&quiz, &assignment, &answers(&[(1, "A")]))
            .await
            .unwrap();

        assert!(!outcome.duplicate);
        assert_eq!(outcome.attempt.score, 2);
        let stored = store.list_attempts_for_assignment(assignment.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, outcome.attempt.id);
        let assignment = store.get_assignment(assignment.id).await.unwrap().unwrap();
        assert!(!assignment.is_completed);
    }
}
