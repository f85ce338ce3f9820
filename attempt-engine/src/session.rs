//! One active exam-taking session: the single mutator of its attempt.
//!
//! Timer ticks, answer edits and auto-save completions are discrete
//! callbacks against shared in-memory state; durable writes are serialized
//! through the session's write queue. All background tasks are aborted when
//! the session is dropped so no orphaned callback can touch released state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use records::{Answer, Exam, ExamAttempt, LevelResult, Question};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::autosave::{self, SaveStatus};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::gateway::{AttemptPatch, PersistenceGateway};
use crate::identity::Identity;
use crate::lifecycle::{self, AttemptEngine};
use crate::timer::{ExamTimer, TimerSignal, Urgency};
use crate::writer::{self, WriterHandle};

/// Read-only progress snapshot for the presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub answered: usize,
    pub total_questions: usize,
    pub current_level: u32,
    pub total_levels: u32,
}

struct SessionState {
    attempt: ExamAttempt,
    questions: Vec<Question>,
    timer: ExamTimer,
    /// Cumulative seconds at the moment the current level began; the
    /// difference to the live value is the level's own time.
    level_started_at: u64,
}

struct SessionCore<G: PersistenceGateway> {
    engine: AttemptEngine<G>,
    exam: Exam,
    state: Mutex<SessionState>,
    writer: WriterHandle,
    /// Held for the span of one submission. A timer expiry racing a manual
    /// submission waits here, re-reads the advanced state and fails the
    /// level precondition instead of inserting a second result.
    submit_lock: tokio::sync::Mutex<()>,
    dirty_tx: mpsc::UnboundedSender<()>,
    status_rx: watch::Receiver<SaveStatus>,
}

pub struct ExamSession<G: PersistenceGateway> {
    core: Arc<SessionCore<G>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<G: PersistenceGateway> ExamSession<G> {
    /// Starts (or resumes) the attempt, loads the current level's questions
    /// and spawns the write queue, auto-save and timer tasks.
    #[tracing::instrument(skip_all, fields(exam = %exam_id), err(Debug))]
    pub async fn start(
        gateway: Arc<G>,
        identity: &Identity,
        exam_id: Uuid,
        config: EngineConfig,
    ) -> Result<Self, Error> {
        let engine = AttemptEngine::new(Arc::clone(&gateway));
        let (exam, attempt) = engine.start_or_resume(identity, exam_id).await?;
        let questions = engine
            .load_level_questions(&exam, &attempt, attempt.current_level)
            .await?;

        let timer = ExamTimer::new(exam.duration_minutes, attempt.time_spent_seconds);
        let (writer, writer_task) = writer::spawn(gateway, attempt.id);
        let (dirty_tx, dirty_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SaveStatus::Idle);

        let level_started_at = attempt.time_spent_seconds;
        let core = Arc::new(SessionCore {
            engine,
            exam,
            state: Mutex::new(SessionState {
                attempt,
                questions,
                timer,
                level_started_at,
            }),
            writer,
            submit_lock: tokio::sync::Mutex::new(()),
            dirty_tx,
            status_rx,
        });

        let autosave_task = autosave::spawn(
            config.autosave_debounce,
            dirty_rx,
            {
                let core = Arc::clone(&core);
                move || core.snapshot_patch()
            },
            core.writer.clone(),
            status_tx,
        );
        let timer_task = spawn_timer(Arc::clone(&core), config.timer_tick);

        Ok(ExamSession {
            core,
            tasks: vec![writer_task, autosave_task, timer_task],
        })
    }

    /// Upserts an answer in memory and wakes the auto-save debounce. Never
    /// blocks on I/O.
    pub fn record_answer(&self, question_id: Uuid, answer: Answer) -> Result<(), Error> {
        {
            let mut guard = self.core.state.lock().expect("session state poisoned");
            let state = &mut *guard;
            lifecycle::record_answer(&mut state.attempt, &state.questions, question_id, answer)?;
        }
        let _ = self.core.dirty_tx.send(());
        Ok(())
    }

    /// Scores and submits the current level. Advances to the next level on
    /// success, or finalizes the attempt after the last one. If the next
    /// level's question load fails, the session still advances with the
    /// durable writes and `Ok` is returned; `reload_current_questions`
    /// recovers the question set.
    pub async fn submit_current_level(&self) -> Result<LevelResult, Error> {
        self.core.submit_current_level(false).await
    }

    /// Re-fetches the current level's questions after a failed load.
    pub async fn reload_current_questions(&self) -> Result<(), Error> {
        self.core.reload_current_questions().await
    }

    pub fn exam(&self) -> &Exam {
        &self.core.exam
    }

    pub fn attempt(&self) -> ExamAttempt {
        self.core
            .state
            .lock()
            .expect("session state poisoned")
            .attempt
            .clone()
    }

    /// Current level's questions in presentation order.
    pub fn current_questions(&self) -> Vec<Question> {
        self.core
            .state
            .lock()
            .expect("session state poisoned")
            .questions
            .clone()
    }

    pub fn save_status(&self) -> SaveStatus {
        self.core.status_rx.borrow().clone()
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.core
            .state
            .lock()
            .expect("session state poisoned")
            .timer
            .remaining_seconds()
    }

    pub fn urgency(&self) -> Urgency {
        self.core
            .state
            .lock()
            .expect("session state poisoned")
            .timer
            .urgency()
    }

    pub fn progress(&self) -> SessionProgress {
        let state = self.core.state.lock().expect("session state poisoned");
        let answered = state
            .questions
            .iter()
            .filter(|q| state.attempt.answers.contains_key(&q.id))
            .count();
        SessionProgress {
            answered,
            total_questions: state.questions.len(),
            current_level: state.attempt.current_level,
            total_levels: self.core.exam.total_levels,
        }
    }
}

impl<G: PersistenceGateway> Drop for ExamSession<G> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl<G: PersistenceGateway> SessionCore<G> {
    /// Freshest auto-save snapshot: answers plus elapsed time. `None` once
    /// the attempt is terminal, so a late debounce cannot mutate it.
    fn snapshot_patch(&self) -> Option<AttemptPatch> {
        let state = self.state.lock().expect("session state poisoned");
        if state.attempt.status.is_terminal() {
            return None;
        }
        Some(AttemptPatch::snapshot(
            state.attempt.answers.clone(),
            state.attempt.time_spent_seconds,
        ))
    }

    async fn submit_current_level(&self, forced: bool) -> Result<LevelResult, Error> {
        // One submission at a time per session; the loser of a race
        // re-reads state the winner already advanced.
        let _submitting = self.submit_lock.lock().await;

        // Snapshot under the lock, never hold it across I/O.
        let (attempt, mut questions, level, level_seconds) = {
            let state = self.state.lock().expect("session state poisoned");
            (
                state.attempt.clone(),
                state.questions.clone(),
                state.attempt.current_level,
                state
                    .attempt
                    .time_spent_seconds
                    .saturating_sub(state.level_started_at),
            )
        };

        if forced {
            tracing::info!(attempt = %attempt.id, level, "time expired; forcing submission");
        }

        if questions.is_empty() {
            // A previous submission advanced the level but its question
            // load failed; fetch them now.
            questions = self
                .engine
                .load_level_questions(&self.exam, &attempt, level)
                .await?;
            let mut state = self.state.lock().expect("session state poisoned");
            state.questions = questions.clone();
        }

        let prepared = self
            .engine
            .prepare_submission(&self.exam, &attempt, &questions, level, level_seconds)
            .await?;
        let is_last = prepared.is_last;

        // Routed through the write queue so an in-flight auto-save lands
        // first and can never overwrite the level advance afterwards.
        let (stored, updated) = self.writer.submit(prepared.result, prepared.patch).await?;

        // Memory advances as soon as the durable writes land; the next
        // level's question load comes afterwards so a failed read cannot
        // leave the store ahead of the session.
        let next_attempt = {
            let mut state = self.state.lock().expect("session state poisoned");
            // Edits and ticks that arrived while the write was in flight
            // stay authoritative in memory.
            let live_answers = std::mem::take(&mut state.attempt.answers);
            let live_seconds = state.attempt.time_spent_seconds;
            state.attempt = updated;
            state.attempt.answers = live_answers;
            state.attempt.time_spent_seconds =
                state.attempt.time_spent_seconds.max(live_seconds);
            if !is_last {
                state.questions.clear();
                state.level_started_at = state.attempt.time_spent_seconds;
            }
            state.attempt.clone()
        };

        if !is_last {
            match self
                .engine
                .load_level_questions(&self.exam, &next_attempt, next_attempt.current_level)
                .await
            {
                Ok(next_questions) => {
                    let mut state = self.state.lock().expect("session state poisoned");
                    state.questions = next_questions;
                }
                Err(error) => {
                    // The submission already landed; the question set is
                    // recovered by `reload_current_questions` or the next
                    // submission.
                    tracing::warn!(%error, "next level question load failed");
                }
            }
        }

        Ok(stored)
    }

    async fn reload_current_questions(&self) -> Result<(), Error> {
        let _submitting = self.submit_lock.lock().await;
        let attempt = {
            let state = self.state.lock().expect("session state poisoned");
            if state.attempt.status.is_terminal() {
                return Ok(());
            }
            state.attempt.clone()
        };
        let questions = self
            .engine
            .load_level_questions(&self.exam, &attempt, attempt.current_level)
            .await?;
        let mut state = self.state.lock().expect("session state poisoned");
        state.questions = questions;
        Ok(())
    }
}

fn spawn_timer<G: PersistenceGateway>(
    core: Arc<SessionCore<G>>,
    tick: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        // First tick completes immediately; skip it.
        interval.tick().await;
        loop {
            interval.tick().await;
            let signal = {
                let mut state = core.state.lock().expect("session state poisoned");
                if state.attempt.status.is_terminal() {
                    break;
                }
                state.attempt.time_spent_seconds += 1;
                state.timer.tick()
            };
            match signal {
                TimerSignal::Running(_) => {}
                TimerSignal::Expired => {
                    loop {
                        match core.submit_current_level(true).await {
                            Ok(_) => break,
                            // A racing manual submission already advanced
                            // or finished the attempt.
                            Err(Error::InvalidState(_)) => break,
                            Err(error) => {
                                tracing::warn!(
                                    %error,
                                    "forced submission failed; retrying on next tick"
                                );
                                interval.tick().await;
                            }
                        }
                    }
                    break;
                }
                TimerSignal::Idle => break,
            }
        }
    })
}
