//! Single in-order write queue per session.
//!
//! All durable writes for one attempt flow through one task, so a debounced
//! auto-save can never land after the level submission it preceded and
//! overwrite the submission's level advance with stale data.

use std::sync::Arc;

use records::{ExamAttempt, LevelResult};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::Error;
use crate::gateway::{AttemptPatch, PersistenceGateway};

enum WriteCommand {
    Save {
        patch: AttemptPatch,
        reply: oneshot::Sender<Result<ExamAttempt, Error>>,
    },
    Submit {
        result: LevelResult,
        patch: AttemptPatch,
        reply: oneshot::Sender<Result<(LevelResult, ExamAttempt), Error>>,
    },
}

#[derive(Clone)]
pub(crate) struct WriterHandle {
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl WriterHandle {
    pub(crate) async fn save(&self, patch: AttemptPatch) -> Result<ExamAttempt, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WriteCommand::Save { patch, reply })
            .map_err(|_| Error::Persistence("write queue closed".into()))?;
        rx.await
            .map_err(|_| Error::Persistence("write queue dropped reply".into()))?
    }

    pub(crate) async fn submit(
        &self,
        result: LevelResult,
        patch: AttemptPatch,
    ) -> Result<(LevelResult, ExamAttempt), Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WriteCommand::Submit {
                result,
                patch,
                reply,
            })
            .map_err(|_| Error::Persistence("write queue closed".into()))?;
        rx.await
            .map_err(|_| Error::Persistence("write queue dropped reply".into()))?
    }
}

pub(crate) fn spawn<G: PersistenceGateway>(
    gateway: Arc<G>,
    attempt_id: Uuid,
) -> (WriterHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                WriteCommand::Save { patch, reply } => {
                    let _ = reply.send(gateway.update_attempt(attempt_id, patch).await);
                }
                WriteCommand::Submit {
                    result,
                    patch,
                    reply,
                } => {
                    let outcome: Result<(LevelResult, ExamAttempt), Error> = async {
                        let stored = gateway.insert_level_result(&result).await?;
                        let updated = gateway.update_attempt(attempt_id, patch).await?;
                        Ok((stored, updated))
                    }
                    .await;
                    let _ = reply.send(outcome);
                }
            }
        }
    });
    (WriterHandle { tx }, handle)
}
