use std::collections::{BTreeSet, HashMap};

use records::{Answer, Question, QuestionType};
use uuid::Uuid;

/// Outcome of scoring one level's question set against the accumulated
/// answers.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct LevelScore {
    pub earned_points: u32,
    pub total_points: u32,
    pub correct_answers: u32,
    pub total_questions: u32,
    /// Percentage 0-100, rounded to two decimal places.
    pub score: f64,
    pub passed: bool,
}

/// Scores a level. Unanswered questions count as incorrect and a level with
/// zero total points scores 0 rather than dividing by zero.
pub fn score_level(
    questions: &[Question],
    answers: &HashMap<Uuid, Answer>,
    passing_score: f64,
) -> LevelScore {
    let mut earned_points = 0u32;
    let mut total_points = 0u32;
    let mut correct_answers = 0u32;

    for question in questions {
        total_points += question.points;
        let Some(submitted) = answers.get(&question.id) else {
            continue;
        };
        if answer_matches(question, submitted) {
            correct_answers += 1;
            earned_points += question.points;
        }
    }

    let score = if total_points > 0 {
        round2(earned_points as f64 / total_points as f64 * 100.0)
    } else {
        0.0
    };

    LevelScore {
        earned_points,
        total_points,
        correct_answers,
        total_questions: questions.len() as u32,
        score,
        passed: score >= passing_score,
    }
}

/// Match policy: exact equality after trimming whitespace and lowercasing,
/// no partial credit. Multiple-choice compares as normalized sets; a scalar
/// submitted against a multiple-choice question is treated as a one-element
/// set.
pub fn answer_matches(question: &Question, submitted: &Answer) -> bool {
    match question.question_type {
        QuestionType::MultipleChoice => {
            normalized_set(submitted) == normalized_set(&question.correct_answer)
        }
        QuestionType::SingleChoice | QuestionType::Text | QuestionType::Number => {
            match (submitted, &question.correct_answer) {
                (Answer::Scalar(submitted), Answer::Scalar(correct)) => {
                    normalize(submitted) == normalize(correct)
                }
                _ => false,
            }
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn normalized_set(answer: &Answer) -> BTreeSet<String> {
    match answer {
        Answer::Scalar(value) => BTreeSet::from([normalize(value)]),
        Answer::MultiSelect(values) => values.iter().map(|v| normalize(v)).collect(),
    }
}
