use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::exam::Answer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
}

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Completed)
    }
}

/// One student's run through an exam. The mutable aggregate root of the
/// attempt engine: at most one `in_progress` attempt exists per
/// (exam, student) pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub student_id: Uuid,
    pub status: AttemptStatus,
    /// Advances monotonically while in progress; stops at the last level.
    pub current_level: u32,
    #[serde(default)]
    pub answers: HashMap<Uuid, Answer>,
    /// Cumulative across the whole attempt, never decreases.
    pub time_spent_seconds: u64,
    pub total_score: f64,
    pub passed: bool,
    /// Presented question order per level, persisted at creation when the
    /// exam randomizes questions so a past attempt can be reviewed in the
    /// exact order it was shown.
    #[serde(default)]
    pub level_order: BTreeMap<u32, Vec<Uuid>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExamAttempt {
    /// Fresh attempt at level 1 with nothing answered.
    pub fn new(exam_id: Uuid, student_id: Uuid) -> Self {
        ExamAttempt {
            id: Uuid::new_v4(),
            exam_id,
            student_id,
            status: AttemptStatus::InProgress,
            current_level: 1,
            answers: HashMap::new(),
            time_spent_seconds: 0,
            total_score: 0.0,
            passed: false,
            level_order: BTreeMap::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Scoring record for one level of one attempt. Created exactly once per
/// level and never updated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LevelResult {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub level_number: u32,
    pub score: f64,
    pub total_questions: u32,
    pub correct_answers: u32,
    pub passed: bool,
    pub completed_at: DateTime<Utc>,
    pub time_spent_seconds: u64,
}
