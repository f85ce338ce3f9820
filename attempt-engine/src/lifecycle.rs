use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;
use records::{Answer, AttemptStatus, Exam, ExamAttempt, LevelResult, Question};
use uuid::Uuid;

use crate::error::Error;
use crate::gateway::{AttemptPatch, PersistenceGateway};
use crate::identity::Identity;
use crate::scoring;

/// Drives one attempt from creation through level submissions to completion.
pub struct AttemptEngine<G> {
    gateway: Arc<G>,
}

impl<G> Clone for AttemptEngine<G> {
    fn clone(&self) -> Self {
        AttemptEngine {
            gateway: Arc::clone(&self.gateway),
        }
    }
}

/// A level submission scored and shaped for the durable writes, computed
/// before anything is persisted so a failed write leaves no trace.
pub struct PreparedSubmission {
    pub result: LevelResult,
    pub patch: AttemptPatch,
    pub is_last: bool,
}

impl<G: PersistenceGateway> AttemptEngine<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        AttemptEngine { gateway }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Resumes the single in-progress attempt for (exam, student) if one
    /// exists, otherwise creates and persists a fresh one at level 1.
    #[tracing::instrument(skip_all, fields(exam = %exam_id), err(Debug))]
    pub async fn start_or_resume(
        &self,
        identity: &Identity,
        exam_id: Uuid,
    ) -> Result<(Exam, ExamAttempt), Error> {
        identity.require_student()?;
        let exam = self.gateway.exam(exam_id).await?;

        if let Some(existing) = self
            .gateway
            .find_in_progress_attempt(exam_id, identity.id)
            .await?
        {
            tracing::debug!(attempt = %existing.id, "resuming in-progress attempt");
            return Ok((exam, existing));
        }

        let mut attempt = ExamAttempt::new(exam_id, identity.id);
        if exam.randomize_questions {
            attempt.level_order = self.shuffled_level_order(&exam).await?;
        }
        let stored = self.gateway.insert_attempt(&attempt).await?;
        tracing::debug!(attempt = %stored.id, "created attempt");
        Ok((exam, stored))
    }

    /// Shuffles each level's question order once at attempt creation and
    /// persists it, so reviewing a past attempt reproduces the exact order
    /// that was presented.
    async fn shuffled_level_order(&self, exam: &Exam) -> Result<BTreeMap<u32, Vec<Uuid>>, Error> {
        let mut order = BTreeMap::new();
        for level in 1..=exam.total_levels {
            let questions = self.gateway.level_questions(exam.id, level).await?;
            let mut ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();
            {
                let mut rng = rand::rng();
                ids.shuffle(&mut rng);
            }
            order.insert(level, ids);
        }
        Ok(order)
    }

    /// Question set for a level in presentation order: the persisted
    /// per-attempt order when the exam randomizes, `order_index` otherwise.
    #[tracing::instrument(skip_all, fields(exam = %exam.id, level), err(Debug))]
    pub async fn load_level_questions(
        &self,
        exam: &Exam,
        attempt: &ExamAttempt,
        level: u32,
    ) -> Result<Vec<Question>, Error> {
        if level < 1 || level > exam.total_levels {
            return Err(Error::NotFound(format!(
                "exam {} has no level {level}",
                exam.id
            )));
        }
        let mut questions = self.gateway.level_questions(exam.id, level).await?;
        questions.sort_by_key(|q| q.order_index);
        if let Some(order) = attempt.level_order.get(&level) {
            questions.sort_by_key(|q| {
                order
                    .iter()
                    .position(|id| *id == q.id)
                    .unwrap_or(usize::MAX)
            });
        }
        Ok(questions)
    }

    /// Scores the current level and shapes the two durable writes without
    /// issuing them. Fails the same preconditions as a direct submission.
    pub async fn prepare_submission(
        &self,
        exam: &Exam,
        attempt: &ExamAttempt,
        questions: &[Question],
        level_number: u32,
        level_seconds: u64,
    ) -> Result<PreparedSubmission, Error> {
        check_submittable(attempt, level_number)?;

        let score = scoring::score_level(questions, &attempt.answers, exam.passing_score);
        let now = Utc::now();
        let result = LevelResult {
            id: Uuid::new_v4(),
            attempt_id: attempt.id,
            level_number,
            score: score.score,
            total_questions: score.total_questions,
            correct_answers: score.correct_answers,
            passed: score.passed,
            completed_at: now,
            time_spent_seconds: level_seconds,
        };

        let prior = self.gateway.level_results(attempt.id).await?;
        let (total_score, overall_passed) = aggregate_score(&prior, &result);

        let is_last = level_number >= exam.total_levels;
        // `attempt.time_spent_seconds` is the live cumulative value;
        // `level_seconds` only feeds the per-level result.
        let mut patch = AttemptPatch {
            answers: Some(attempt.answers.clone()),
            time_spent_seconds: Some(attempt.time_spent_seconds),
            total_score: Some(total_score),
            ..Default::default()
        };
        if is_last {
            patch.status = Some(AttemptStatus::Completed);
            patch.completed_at = Some(now);
            patch.passed = Some(overall_passed);
        } else {
            patch.current_level = Some(level_number + 1);
        }

        Ok(PreparedSubmission {
            result,
            patch,
            is_last,
        })
    }

    /// Submits the current level: appends its result, then advances the
    /// attempt (or finalizes it on the last level). Both writes complete
    /// before the in-memory attempt is touched, so a failed submission can
    /// be retried safely.
    #[tracing::instrument(skip_all, fields(attempt = %attempt.id, level = level_number), err(Debug))]
    pub async fn submit_level(
        &self,
        exam: &Exam,
        attempt: &mut ExamAttempt,
        questions: &[Question],
        level_number: u32,
        level_seconds: u64,
    ) -> Result<LevelResult, Error> {
        let prepared = self
            .prepare_submission(exam, attempt, questions, level_number, level_seconds)
            .await?;
        let stored = self.gateway.insert_level_result(&prepared.result).await?;
        let updated = self.gateway.update_attempt(attempt.id, prepared.patch).await?;
        *attempt = updated;
        Ok(stored)
    }

    /// Attempt plus its per-level results, for results review.
    #[tracing::instrument(skip_all, fields(attempt = %attempt_id), err(Debug))]
    pub async fn attempt_with_results(
        &self,
        attempt_id: Uuid,
    ) -> Result<(ExamAttempt, Vec<LevelResult>), Error> {
        let attempt = self.gateway.attempt(attempt_id).await?;
        let results = self.gateway.level_results(attempt_id).await?;
        Ok((attempt, results))
    }

    /// All of the caller's attempts, newest first.
    pub async fn student_attempts(&self, identity: &Identity) -> Result<Vec<ExamAttempt>, Error> {
        self.gateway.student_attempts(identity.id).await
    }
}

/// In-memory answer upsert. Value shape is not validated beyond the tag;
/// correctness is only judged at scoring time.
pub fn record_answer(
    attempt: &mut ExamAttempt,
    level_questions: &[Question],
    question_id: Uuid,
    answer: Answer,
) -> Result<(), Error> {
    if attempt.status.is_terminal() {
        return Err(Error::InvalidState(format!(
            "attempt {} is already completed",
            attempt.id
        )));
    }
    if !level_questions.iter().any(|q| q.id == question_id) {
        return Err(Error::NotFound(format!(
            "question {question_id} is not part of level {}",
            attempt.current_level
        )));
    }
    attempt.answers.insert(question_id, answer);
    Ok(())
}

fn check_submittable(attempt: &ExamAttempt, level_number: u32) -> Result<(), Error> {
    if attempt.status.is_terminal() {
        return Err(Error::InvalidState(format!(
            "attempt {} is already completed",
            attempt.id
        )));
    }
    if level_number != attempt.current_level {
        return Err(Error::InvalidState(format!(
            "cannot submit level {level_number} while attempt {} is on level {}",
            attempt.id, attempt.current_level
        )));
    }
    Ok(())
}

/// Aggregate policy for multi-level exams: the attempt's total score is the
/// mean of all submitted level scores, and the attempt passes only if every
/// level passed. (The reference behavior stored just the last level's score,
/// which reads like a bug rather than a design.)
fn aggregate_score(prior: &[LevelResult], current: &LevelResult) -> (f64, bool) {
    let mut scores = Vec::new();
    let mut all_passed = true;
    for result in prior.iter().filter(|r| r.level_number != current.level_number) {
        scores.push(result.score);
        all_passed &= result.passed;
    }
    scores.push(current.score);
    all_passed &= current.passed;
    let total = scoring::round2(scores.iter().sum::<f64>() / scores.len() as f64);
    (total, all_passed)
}
