use std::{env::var, time::Duration};

use tracing::warn;

/// Tunable engine timings. `from_env` reads overrides; anything unset or
/// unparsable falls back to the defaults with a warning.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Quiet period after the last answer edit before an auto-save fires.
    pub autosave_debounce: Duration,
    /// Countdown cadence for the exam timer.
    pub timer_tick: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            autosave_debounce: Duration::from_secs(3),
            timer_tick: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = EngineConfig::default();

        if let Ok(v) = var("ATTEMPT_AUTOSAVE_DEBOUNCE_IN_S") {
            match v.parse::<u64>() {
                Ok(secs) if secs > 0 => config.autosave_debounce = Duration::from_secs(secs),
                Ok(_) => warn!("ATTEMPT_AUTOSAVE_DEBOUNCE_IN_S must be > 0; ignoring"),
                Err(e) => warn!("failed to parse ATTEMPT_AUTOSAVE_DEBOUNCE_IN_S ('{v}'): {e}; ignoring"),
            }
        }

        if let Ok(v) = var("ATTEMPT_TIMER_TICK_IN_MS") {
            match v.parse::<u64>() {
                Ok(ms) if ms > 0 => config.timer_tick = Duration::from_millis(ms),
                Ok(_) => warn!("ATTEMPT_TIMER_TICK_IN_MS must be > 0; ignoring"),
                Err(e) => warn!("failed to parse ATTEMPT_TIMER_TICK_IN_MS ('{v}'): {e}; ignoring"),
            }
        }

        config
    }
}
