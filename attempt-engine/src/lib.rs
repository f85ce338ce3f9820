//! Timed multi-level exam attempt engine.
//!
//! ## Current API
//!
//! - Start or resume an attempt
//! - Record answers and score level submissions
//! - Debounced auto-save of in-memory progress
//! - Countdown timer with forced submission on expiry
//!
pub mod autosave;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod lifecycle;
pub mod memory;
pub mod scoring;
pub mod session;
pub mod timer;
mod writer;

pub use autosave::SaveStatus;
pub use config::EngineConfig;
pub use error::Error;
pub use gateway::{AttemptPatch, PersistenceGateway};
pub use identity::{Identity, IdentityProvider, StaticIdentity};
pub use lifecycle::AttemptEngine;
pub use memory::MemoryGateway;
pub use scoring::LevelScore;
pub use session::{ExamSession, SessionProgress};
pub use timer::{ExamTimer, TimerSignal, Urgency};
