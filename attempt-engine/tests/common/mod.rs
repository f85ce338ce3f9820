#![allow(dead_code)]

use chrono::Utc;
use records::{Answer, Exam, Question, QuestionType};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

pub fn exam(total_levels: u32, duration_minutes: u32, passing_score: f64) -> Exam {
    Exam {
        id: Uuid::new_v4(),
        title: "Placement exam".into(),
        description: None,
        total_levels,
        duration_minutes,
        passing_score,
        randomize_questions: false,
        is_published: true,
        created_by: Uuid::new_v4(),
        created_at: Utc::now(),
    }
}

pub fn question(exam_id: Uuid, level: u32, order: u32, points: u32, correct: &str) -> Question {
    Question {
        id: Uuid::new_v4(),
        exam_id,
        level_number: level,
        order_index: order,
        prompt: format!("question {order} of level {level}"),
        question_type: QuestionType::Text,
        options: vec![],
        correct_answer: Answer::scalar(correct),
        points,
        min_value: None,
        max_value: None,
        max_length: None,
    }
}
