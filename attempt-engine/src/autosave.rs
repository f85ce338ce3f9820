//! Debounced background persistence of in-memory answer and timer state.
//!
//! Any answer edit schedules a save after a quiet period; edits inside the
//! window coalesce into one write. A failed save is not fatal: the status
//! surface reports `Error` and the unsaved changes ride along with the next
//! debounce cycle. Up to one window of answers can be lost on an abrupt
//! process exit; that is an accepted limitation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::gateway::AttemptPatch;
use crate::writer::WriterHandle;

/// Read-only save state for the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved { at: DateTime<Utc> },
    Error,
}

pub(crate) fn spawn<F>(
    debounce: Duration,
    mut dirty_rx: mpsc::UnboundedReceiver<()>,
    snapshot: F,
    writer: WriterHandle,
    status_tx: watch::Sender<SaveStatus>,
) -> JoinHandle<()>
where
    F: Fn() -> Option<AttemptPatch> + Send + 'static,
{
    tokio::spawn(async move {
        while dirty_rx.recv().await.is_some() {
            // Quiet-period debounce: every further edit restarts the window.
            loop {
                match tokio::time::timeout(debounce, dirty_rx.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => break,
                    Err(_) => break,
                }
            }

            // Always the freshest snapshot at flush time, never a stale one.
            // `None` means the attempt completed meanwhile; nothing to save.
            let Some(patch) = snapshot() else {
                continue;
            };
            let _ = status_tx.send(SaveStatus::Saving);
            match writer.save(patch).await {
                Ok(_) => {
                    let _ = status_tx.send(SaveStatus::Saved { at: Utc::now() });
                }
                Err(error) => {
                    tracing::warn!(%error, "auto-save failed; will retry on next edit");
                    let _ = status_tx.send(SaveStatus::Error);
                }
            }
        }
    })
}
