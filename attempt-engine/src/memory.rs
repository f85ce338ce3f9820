use std::collections::HashMap;
use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use records::{Exam, ExamAttempt, LevelResult, Question};
use uuid::Uuid;

use crate::error::Error;
use crate::gateway::{AttemptPatch, PersistenceGateway};

#[derive(Default)]
struct Store {
    exams: HashMap<Uuid, Exam>,
    questions: Vec<Question>,
    attempts: HashMap<Uuid, ExamAttempt>,
    level_results: Vec<LevelResult>,
}

/// In-memory gateway used by the test suite and local embeddings.
///
/// Counts durable attempt writes and supports one-shot write-failure
/// injection so transient persistence failures are reproducible.
#[derive(Default)]
pub struct MemoryGateway {
    store: Mutex<Store>,
    attempt_writes: AtomicUsize,
    fail_next_write: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        MemoryGateway::default()
    }

    pub fn seed_exam(&self, exam: Exam) {
        self.store
            .lock()
            .expect("store poisoned")
            .exams
            .insert(exam.id, exam);
    }

    pub fn seed_questions(&self, questions: impl IntoIterator<Item = Question>) {
        self.store
            .lock()
            .expect("store poisoned")
            .questions
            .extend(questions);
    }

    /// Successful attempt inserts and updates so far.
    pub fn attempt_write_count(&self) -> usize {
        self.attempt_writes.load(Ordering::SeqCst)
    }

    /// Makes the next write fail with a `Persistence` error.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn check_write_failure(&self) -> Result<(), Error> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(Error::Persistence("injected write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn exam(&self, exam_id: Uuid) -> Result<Exam, Error> {
        self.store
            .lock()
            .expect("store poisoned")
            .exams
            .get(&exam_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("exam {exam_id}")))
    }

    async fn level_questions(&self, exam_id: Uuid, level: u32) -> Result<Vec<Question>, Error> {
        let store = self.store.lock().expect("store poisoned");
        let mut questions: Vec<Question> = store
            .questions
            .iter()
            .filter(|q| q.exam_id == exam_id && q.level_number == level)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.order_index);
        Ok(questions)
    }

    async fn find_in_progress_attempt(
        &self,
        exam_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<ExamAttempt>, Error> {
        let store = self.store.lock().expect("store poisoned");
        Ok(store
            .attempts
            .values()
            .find(|a| {
                a.exam_id == exam_id && a.student_id == student_id && !a.status.is_terminal()
            })
            .cloned())
    }

    async fn attempt(&self, attempt_id: Uuid) -> Result<ExamAttempt, Error> {
        self.store
            .lock()
            .expect("store poisoned")
            .attempts
            .get(&attempt_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("attempt {attempt_id}")))
    }

    async fn student_attempts(&self, student_id: Uuid) -> Result<Vec<ExamAttempt>, Error> {
        let store = self.store.lock().expect("store poisoned");
        let mut attempts: Vec<ExamAttempt> = store
            .attempts
            .values()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| std::cmp::Reverse(a.created_at));
        Ok(attempts)
    }

    async fn insert_attempt(&self, attempt: &ExamAttempt) -> Result<ExamAttempt, Error> {
        self.check_write_failure()?;
        let mut store = self.store.lock().expect("store poisoned");
        store.attempts.insert(attempt.id, attempt.clone());
        self.attempt_writes.fetch_add(1, Ordering::SeqCst);
        Ok(attempt.clone())
    }

    async fn update_attempt(
        &self,
        attempt_id: Uuid,
        patch: AttemptPatch,
    ) -> Result<ExamAttempt, Error> {
        self.check_write_failure()?;
        let mut store = self.store.lock().expect("store poisoned");
        let attempt = store
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| Error::NotFound(format!("attempt {attempt_id}")))?;
        patch.apply(attempt);
        self.attempt_writes.fetch_add(1, Ordering::SeqCst);
        Ok(attempt.clone())
    }

    async fn insert_level_result(&self, result: &LevelResult) -> Result<LevelResult, Error> {
        self.check_write_failure()?;
        let mut store = self.store.lock().expect("store poisoned");
        store.level_results.push(result.clone());
        Ok(result.clone())
    }

    async fn level_results(&self, attempt_id: Uuid) -> Result<Vec<LevelResult>, Error> {
        let store = self.store.lock().expect("store poisoned");
        let mut results: Vec<LevelResult> = store
            .level_results
            .iter()
            .filter(|r| r.attempt_id == attempt_id)
            .cloned()
            .collect();
        results.sort_by_key(|r| r.level_number);
        Ok(results)
    }
}
