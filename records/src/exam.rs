use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable exam definition authored by an admin. Read-only input to the
/// attempt engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Exam {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub total_levels: u32,
    pub duration_minutes: u32,
    /// Percentage threshold (0-100) a level score must meet to pass.
    pub passing_score: f64,
    pub randomize_questions: bool,
    pub is_published: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    Text,
    Number,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub level_number: u32,
    /// Stable level-relative ordering. Backing-store insertion order is not
    /// guaranteed, so presentation order always sorts on this field.
    pub order_index: u32,
    pub prompt: String,
    pub question_type: QuestionType,
    /// Options for the choice types; empty for text and number questions.
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: Answer,
    pub points: u32,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub max_length: Option<u32>,
}

/// A submitted (or correct) answer value.
///
/// Stored on the wire as either a bare string or a string array, matching the
/// answers column shape. The tag exists only in memory so scoring can dispatch
/// exhaustively instead of shape-sniffing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    MultiSelect(Vec<String>),
    Scalar(String),
}

impl Answer {
    pub fn scalar(value: impl Into<String>) -> Self {
        Answer::Scalar(value.into())
    }

    pub fn multi<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Answer::MultiSelect(values.into_iter().map(Into::into).collect())
    }
}
