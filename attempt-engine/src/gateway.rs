use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use records::{Answer, AttemptStatus, Exam, ExamAttempt, LevelResult, Question};
use uuid::Uuid;

use crate::error::Error;

/// Partial update of an attempt record. Unset fields are left untouched by
/// the store; each write is an independent last-write-wins operation scoped
/// to one attempt id.
#[derive(Clone, Debug, Default)]
pub struct AttemptPatch {
    pub status: Option<AttemptStatus>,
    pub current_level: Option<u32>,
    pub answers: Option<HashMap<Uuid, Answer>>,
    pub time_spent_seconds: Option<u64>,
    pub total_score: Option<f64>,
    pub passed: Option<bool>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AttemptPatch {
    /// The auto-save shape: answers plus elapsed time, nothing else.
    pub fn snapshot(answers: HashMap<Uuid, Answer>, time_spent_seconds: u64) -> Self {
        AttemptPatch {
            answers: Some(answers),
            time_spent_seconds: Some(time_spent_seconds),
            ..Default::default()
        }
    }

    pub fn apply(self, attempt: &mut ExamAttempt) {
        if let Some(status) = self.status {
            attempt.status = status;
        }
        if let Some(level) = self.current_level {
            attempt.current_level = level;
        }
        if let Some(answers) = self.answers {
            attempt.answers = answers;
        }
        if let Some(seconds) = self.time_spent_seconds {
            attempt.time_spent_seconds = seconds;
        }
        if let Some(score) = self.total_score {
            attempt.total_score = score;
        }
        if let Some(passed) = self.passed {
            attempt.passed = passed;
        }
        if let Some(at) = self.completed_at {
            attempt.completed_at = Some(at);
        }
    }
}

/// Typed face of the record store. Every call may fail with a transient
/// `Persistence` error; the engine does not retry on its own except through
/// the auto-save re-trigger on the next edit.
#[async_trait]
pub trait PersistenceGateway: Send + Sync + 'static {
    async fn exam(&self, exam_id: Uuid) -> Result<Exam, Error>;

    /// Question set for one level, ordered by `order_index`.
    async fn level_questions(&self, exam_id: Uuid, level: u32) -> Result<Vec<Question>, Error>;

    async fn find_in_progress_attempt(
        &self,
        exam_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<ExamAttempt>, Error>;

    async fn attempt(&self, attempt_id: Uuid) -> Result<ExamAttempt, Error>;

    /// All attempts of one student, newest first.
    async fn student_attempts(&self, student_id: Uuid) -> Result<Vec<ExamAttempt>, Error>;

    async fn insert_attempt(&self, attempt: &ExamAttempt) -> Result<ExamAttempt, Error>;

    async fn update_attempt(
        &self,
        attempt_id: Uuid,
        patch: AttemptPatch,
    ) -> Result<ExamAttempt, Error>;

    async fn insert_level_result(&self, result: &LevelResult) -> Result<LevelResult, Error>;

    /// Results of one attempt, ordered by level number.
    async fn level_results(&self, attempt_id: Uuid) -> Result<Vec<LevelResult>, Error>;
}
