//! Session behavior under paused tokio time: debounced auto-save, the
//! countdown timer and forced submission on expiry.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use attempt_engine::{
    AttemptPatch, EngineConfig, Error, ExamSession, Identity, MemoryGateway, PersistenceGateway,
    SaveStatus,
};
use records::{Answer, AttemptStatus, Exam, ExamAttempt, LevelResult, Question};
use uuid::Uuid;

use common::{exam, question};

/// Wraps the in-memory gateway with injected latency and targeted read
/// failures so races around the write queue are reproducible under paused
/// time.
struct FlakyGateway {
    inner: MemoryGateway,
    /// Sleep inserted into `level_results`, stretching the submission's
    /// prepare phase.
    results_delay: Option<Duration>,
    /// Sleep inserted into `update_attempt`, keeping a save in flight.
    update_delay: Option<Duration>,
    /// Fails the next `level_questions` read for this level.
    fail_questions_for_level: Mutex<Option<u32>>,
}

impl FlakyGateway {
    fn new(inner: MemoryGateway) -> Self {
        FlakyGateway {
            inner,
            results_delay: None,
            update_delay: None,
            fail_questions_for_level: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PersistenceGateway for FlakyGateway {
    async fn exam(&self, exam_id: Uuid) -> Result<Exam, Error> {
        self.inner.exam(exam_id).await
    }

    async fn level_questions(&self, exam_id: Uuid, level: u32) -> Result<Vec<Question>, Error> {
        let inject = {
            let mut slot = self.fail_questions_for_level.lock().unwrap();
            if *slot == Some(level) {
                slot.take();
                true
            } else {
                false
            }
        };
        if inject {
            return Err(Error::Persistence("injected read failure".into()));
        }
        self.inner.level_questions(exam_id, level).await
    }

    async fn find_in_progress_attempt(
        &self,
        exam_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<ExamAttempt>, Error> {
        self.inner.find_in_progress_attempt(exam_id, student_id).await
    }

    async fn attempt(&self, attempt_id: Uuid) -> Result<ExamAttempt, Error> {
        self.inner.attempt(attempt_id).await
    }

    async fn student_attempts(&self, student_id: Uuid) -> Result<Vec<ExamAttempt>, Error> {
        self.inner.student_attempts(student_id).await
    }

    async fn insert_attempt(&self, attempt: &ExamAttempt) -> Result<ExamAttempt, Error> {
        self.inner.insert_attempt(attempt).await
    }

    async fn update_attempt(
        &self,
        attempt_id: Uuid,
        patch: AttemptPatch,
    ) -> Result<ExamAttempt, Error> {
        if let Some(delay) = self.update_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.update_attempt(attempt_id, patch).await
    }

    async fn insert_level_result(&self, result: &LevelResult) -> Result<LevelResult, Error> {
        self.inner.insert_level_result(result).await
    }

    async fn level_results(&self, attempt_id: Uuid) -> Result<Vec<LevelResult>, Error> {
        if let Some(delay) = self.results_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.level_results(attempt_id).await
    }
}

/// Edits fired inside one debounce window coalesce into a single durable
/// write carrying all of them.
#[tokio::test(start_paused = true)]
async fn autosave_coalesces_rapid_edits() -> anyhow::Result<()> {
    common::init_tracing();
    let gateway = Arc::new(MemoryGateway::new());
    let exam = exam(1, 60, 50.0);
    gateway.seed_exam(exam.clone());
    let q1 = question(exam.id, 1, 0, 1, "a");
    let q2 = question(exam.id, 1, 1, 1, "b");
    let q3 = question(exam.id, 1, 2, 1, "c");
    gateway.seed_questions([q1.clone(), q2.clone(), q3.clone()]);

    let student = Identity::student(Uuid::new_v4());
    let session = ExamSession::start(
        Arc::clone(&gateway),
        &student,
        exam.id,
        EngineConfig::default(),
    )
    .await?;
    // One write so far: the attempt insert.
    assert_eq!(gateway.attempt_write_count(), 1);

    session.record_answer(q1.id, Answer::scalar("a"))?;
    session.record_answer(q2.id, Answer::scalar("b"))?;
    session.record_answer(q3.id, Answer::scalar("c"))?;

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(gateway.attempt_write_count(), 2);
    assert!(matches!(session.save_status(), SaveStatus::Saved { .. }));

    let stored = gateway.attempt(session.attempt().id).await?;
    assert_eq!(stored.answers.len(), 3);
    Ok(())
}

/// A failed auto-save surfaces as a non-fatal `Error` status; the next edit
/// re-triggers the debounce and the retry carries everything unsaved.
#[tokio::test(start_paused = true)]
async fn autosave_failure_recovers_on_next_edit() -> anyhow::Result<()> {
    let gateway = Arc::new(MemoryGateway::new());
    let exam = exam(1, 60, 50.0);
    gateway.seed_exam(exam.clone());
    let q1 = question(exam.id, 1, 0, 1, "a");
    let q2 = question(exam.id, 1, 1, 1, "b");
    gateway.seed_questions([q1.clone(), q2.clone()]);

    let student = Identity::student(Uuid::new_v4());
    let session = ExamSession::start(
        Arc::clone(&gateway),
        &student,
        exam.id,
        EngineConfig::default(),
    )
    .await?;

    gateway.fail_next_write();
    session.record_answer(q1.id, Answer::scalar("a"))?;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(session.save_status(), SaveStatus::Error);

    session.record_answer(q2.id, Answer::scalar("b"))?;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(matches!(session.save_status(), SaveStatus::Saved { .. }));

    let stored = gateway.attempt(session.attempt().id).await?;
    assert_eq!(stored.answers.len(), 2);
    Ok(())
}

/// The countdown reaching zero forces a submission of the current level
/// with whatever answers exist, then advances to the next level.
#[tokio::test(start_paused = true)]
async fn timeout_forces_level_submission() -> anyhow::Result<()> {
    let gateway = Arc::new(MemoryGateway::new());
    let exam = exam(2, 1, 50.0);
    gateway.seed_exam(exam.clone());
    let q1 = question(exam.id, 1, 0, 5, "a");
    let q2 = question(exam.id, 1, 1, 5, "b");
    let q3 = question(exam.id, 2, 0, 5, "c");
    gateway.seed_questions([q1.clone(), q2.clone(), q3.clone()]);

    let student = Identity::student(Uuid::new_v4());
    let session = ExamSession::start(
        Arc::clone(&gateway),
        &student,
        exam.id,
        EngineConfig::default(),
    )
    .await?;

    session.record_answer(q1.id, Answer::scalar("a"))?;

    // Run past the one-minute budget.
    tokio::time::sleep(Duration::from_secs(70)).await;

    let results = gateway.level_results(session.attempt().id).await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].level_number, 1);
    // One of two answered correctly; the missing answer scored incorrect.
    assert_eq!(results[0].correct_answers, 1);
    assert_eq!(results[0].score, 50.0);

    let attempt = session.attempt();
    assert_eq!(attempt.current_level, 2);
    assert_eq!(attempt.status, AttemptStatus::InProgress);
    assert_eq!(session.remaining_seconds(), 0);
    Ok(())
}

/// Expiry on the last level finalizes the attempt; a manual submission
/// afterwards is rejected without touching stored state.
#[tokio::test(start_paused = true)]
async fn timeout_on_last_level_completes_attempt() -> anyhow::Result<()> {
    let gateway = Arc::new(MemoryGateway::new());
    let exam = exam(1, 1, 50.0);
    gateway.seed_exam(exam.clone());
    let q = question(exam.id, 1, 0, 5, "a");
    gateway.seed_questions([q.clone()]);

    let student = Identity::student(Uuid::new_v4());
    let session = ExamSession::start(
        Arc::clone(&gateway),
        &student,
        exam.id,
        EngineConfig::default(),
    )
    .await?;
    session.record_answer(q.id, Answer::scalar("a"))?;

    tokio::time::sleep(Duration::from_secs(70)).await;

    let attempt = session.attempt();
    assert_eq!(attempt.status, AttemptStatus::Completed);
    assert!(attempt.passed);

    let writes_before = gateway.attempt_write_count();
    let resubmit = session.submit_current_level().await;
    assert!(matches!(resubmit, Err(Error::InvalidState(_))));
    assert_eq!(gateway.attempt_write_count(), writes_before);
    assert_eq!(gateway.level_results(attempt.id).await?.len(), 1);
    Ok(())
}

/// Manual submission before the debounce fires still persists the freshest
/// answers: the submission write carries the in-memory snapshot.
#[tokio::test(start_paused = true)]
async fn submission_carries_unsaved_answers() -> anyhow::Result<()> {
    let gateway = Arc::new(MemoryGateway::new());
    let exam = exam(1, 60, 50.0);
    gateway.seed_exam(exam.clone());
    let q = question(exam.id, 1, 0, 5, "a");
    gateway.seed_questions([q.clone()]);

    let student = Identity::student(Uuid::new_v4());
    let session = ExamSession::start(
        Arc::clone(&gateway),
        &student,
        exam.id,
        EngineConfig::default(),
    )
    .await?;

    session.record_answer(q.id, Answer::scalar("a"))?;
    // Submit immediately, well inside the debounce window.
    let result = session.submit_current_level().await?;
    assert_eq!(result.score, 100.0);

    let stored = gateway.attempt(session.attempt().id).await?;
    assert_eq!(stored.answers.len(), 1);
    assert_eq!(stored.status, AttemptStatus::Completed);
    Ok(())
}

/// A timer expiry landing while a manual submission is still in its
/// prepare phase does not produce a second result for the same level.
#[tokio::test(start_paused = true)]
async fn expiry_racing_manual_submission_submits_once() -> anyhow::Result<()> {
    let inner = MemoryGateway::new();
    let exam = exam(1, 1, 50.0);
    inner.seed_exam(exam.clone());
    let q = question(exam.id, 1, 0, 5, "a");
    inner.seed_questions([q.clone()]);
    let gateway = Arc::new(FlakyGateway {
        results_delay: Some(Duration::from_secs(3)),
        ..FlakyGateway::new(inner)
    });

    let student = Identity::student(Uuid::new_v4());
    let session = ExamSession::start(
        Arc::clone(&gateway),
        &student,
        exam.id,
        EngineConfig::default(),
    )
    .await?;
    session.record_answer(q.id, Answer::scalar("a"))?;

    // Park just before expiry; the countdown hits zero while the manual
    // submission is awaiting its prepare-phase read.
    tokio::time::sleep(Duration::from_secs(58)).await;
    let result = session.submit_current_level().await?;
    assert_eq!(result.score, 100.0);

    tokio::time::sleep(Duration::from_secs(5)).await;

    let attempt = session.attempt();
    assert_eq!(attempt.status, AttemptStatus::Completed);
    assert!(attempt.passed);
    let results = gateway.inner.level_results(attempt.id).await?;
    assert_eq!(results.len(), 1);
    Ok(())
}

/// A transient failure loading the next level's questions cannot leave the
/// store ahead of the session: the submission still reports success, the
/// session advances with the writes, and a reload recovers the questions.
#[tokio::test(start_paused = true)]
async fn question_load_failure_after_submission_is_recoverable() -> anyhow::Result<()> {
    let inner = MemoryGateway::new();
    let exam = exam(2, 60, 50.0);
    inner.seed_exam(exam.clone());
    let q1 = question(exam.id, 1, 0, 5, "a");
    let q2 = question(exam.id, 2, 0, 5, "b");
    inner.seed_questions([q1.clone(), q2.clone()]);
    let gateway = Arc::new(FlakyGateway::new(inner));
    *gateway.fail_questions_for_level.lock().unwrap() = Some(2);

    let student = Identity::student(Uuid::new_v4());
    let session = ExamSession::start(
        Arc::clone(&gateway),
        &student,
        exam.id,
        EngineConfig::default(),
    )
    .await?;
    session.record_answer(q1.id, Answer::scalar("a"))?;

    let result = session.submit_current_level().await?;
    assert_eq!(result.level_number, 1);

    // Memory and store agree on the advance; only the question set is
    // missing.
    let attempt = session.attempt();
    assert_eq!(attempt.current_level, 2);
    assert_eq!(gateway.inner.attempt(attempt.id).await?.current_level, 2);
    assert!(session.current_questions().is_empty());
    assert_eq!(gateway.inner.level_results(attempt.id).await?.len(), 1);

    session.reload_current_questions().await?;
    assert_eq!(session.current_questions().len(), 1);

    session.record_answer(q2.id, Answer::scalar("b"))?;
    let second = session.submit_current_level().await?;
    assert_eq!(second.level_number, 2);
    assert_eq!(session.attempt().status, AttemptStatus::Completed);
    let results = gateway.inner.level_results(attempt.id).await?;
    assert_eq!(results.len(), 2);
    Ok(())
}

/// An auto-save still in flight when a submission is requested lands
/// first through the write queue; the submission's advance is never
/// overwritten and the save is never lost.
#[tokio::test(start_paused = true)]
async fn in_flight_autosave_lands_before_submission() -> anyhow::Result<()> {
    let inner = MemoryGateway::new();
    let exam = exam(2, 60, 50.0);
    inner.seed_exam(exam.clone());
    let q1 = question(exam.id, 1, 0, 5, "a");
    let q2 = question(exam.id, 2, 0, 5, "b");
    inner.seed_questions([q1.clone(), q2.clone()]);
    let gateway = Arc::new(FlakyGateway {
        update_delay: Some(Duration::from_secs(2)),
        ..FlakyGateway::new(inner)
    });

    let student = Identity::student(Uuid::new_v4());
    let session = ExamSession::start(
        Arc::clone(&gateway),
        &student,
        exam.id,
        EngineConfig::default(),
    )
    .await?;

    session.record_answer(q1.id, Answer::scalar("a"))?;
    // Let the debounce fire so the save occupies the write queue, then
    // submit while its write is still in flight.
    tokio::time::sleep(Duration::from_millis(3100)).await;
    let result = session.submit_current_level().await?;
    assert_eq!(result.level_number, 1);

    assert!(matches!(session.save_status(), SaveStatus::Saved { .. }));
    let stored = gateway.inner.attempt(session.attempt().id).await?;
    assert_eq!(stored.current_level, 2);
    assert_eq!(stored.answers.len(), 1);
    // Insert, save, submission update: the save landed, it was not
    // reordered past the submission.
    assert_eq!(gateway.inner.attempt_write_count(), 3);
    assert_eq!(gateway.inner.level_results(stored.id).await?.len(), 1);
    Ok(())
}

/// A transient write failure at expiry does not strand the attempt: the
/// forced submission retries on the next tick.
#[tokio::test(start_paused = true)]
async fn forced_submission_retries_after_transient_failure() -> anyhow::Result<()> {
    let gateway = Arc::new(MemoryGateway::new());
    let exam = exam(1, 1, 50.0);
    gateway.seed_exam(exam.clone());
    gateway.seed_questions([question(exam.id, 1, 0, 5, "a")]);

    let student = Identity::student(Uuid::new_v4());
    let session = ExamSession::start(
        Arc::clone(&gateway),
        &student,
        exam.id,
        EngineConfig::default(),
    )
    .await?;
    gateway.fail_next_write();

    tokio::time::sleep(Duration::from_secs(70)).await;

    let attempt = session.attempt();
    assert_eq!(attempt.status, AttemptStatus::Completed);
    assert!(!attempt.passed);
    assert_eq!(gateway.level_results(attempt.id).await?.len(), 1);
    Ok(())
}

/// Progress and urgency read surface.
#[tokio::test(start_paused = true)]
async fn progress_reflects_answers_and_level() -> anyhow::Result<()> {
    let gateway = Arc::new(MemoryGateway::new());
    let exam = exam(2, 60, 50.0);
    gateway.seed_exam(exam.clone());
    let q1 = question(exam.id, 1, 0, 1, "a");
    let q2 = question(exam.id, 1, 1, 1, "b");
    let q3 = question(exam.id, 2, 0, 1, "c");
    gateway.seed_questions([q1.clone(), q2.clone(), q3.clone()]);

    let student = Identity::student(Uuid::new_v4());
    let session = ExamSession::start(
        Arc::clone(&gateway),
        &student,
        exam.id,
        EngineConfig::default(),
    )
    .await?;

    let progress = session.progress();
    assert_eq!(progress.answered, 0);
    assert_eq!(progress.total_questions, 2);
    assert_eq!(progress.current_level, 1);
    assert_eq!(progress.total_levels, 2);

    session.record_answer(q1.id, Answer::scalar("a"))?;
    assert_eq!(session.progress().answered, 1);

    session.submit_current_level().await?;
    let progress = session.progress();
    assert_eq!(progress.current_level, 2);
    assert_eq!(progress.total_questions, 1);
    Ok(())
}
