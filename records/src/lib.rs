//! Record types stored by the persistence gateway.
//!
//! One module per record family, re-exported flat:
//!
//! - Exams and their question banks
//! - Attempts and per-level results
//! - User profiles and class links

pub mod attempt;
pub mod exam;
pub mod user;

pub use attempt::{AttemptStatus, ExamAttempt, LevelResult};
pub use exam::{Answer, Exam, Question, QuestionType};
pub use user::{ClassLink, Role, UserProfile};
