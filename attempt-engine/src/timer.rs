/// Countdown state for one attempt.
///
/// Pure in-memory; the async driver in the session owns the tick cadence.
/// The fire guard makes expiry observable exactly once, even if ticks keep
/// arriving after a manual submission is already in flight.
#[derive(Clone, Debug)]
pub struct ExamTimer {
    remaining: u64,
    fired: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerSignal {
    /// Still counting down; carries the remaining seconds.
    Running(u64),
    /// Countdown just hit zero. Reported exactly once.
    Expired,
    /// Already expired earlier; nothing to do.
    Idle,
}

/// Rendering hint only; carries no behavioral contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Normal,
    Warning,
    Critical,
}

const CRITICAL_SECONDS: u64 = 300;
const WARNING_SECONDS: u64 = 900;

impl ExamTimer {
    /// Remaining time is the exam budget minus time already spent on the
    /// attempt, floored at zero.
    pub fn new(duration_minutes: u32, time_spent_seconds: u64) -> Self {
        let remaining = (duration_minutes as u64 * 60).saturating_sub(time_spent_seconds);
        ExamTimer {
            remaining,
            fired: false,
        }
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining
    }

    pub fn tick(&mut self) -> TimerSignal {
        if self.fired {
            return TimerSignal::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.fired = true;
            TimerSignal::Expired
        } else {
            TimerSignal::Running(self.remaining)
        }
    }

    pub fn urgency(&self) -> Urgency {
        if self.remaining <= CRITICAL_SECONDS {
            Urgency::Critical
        } else if self.remaining <= WARNING_SECONDS {
            Urgency::Warning
        } else {
            Urgency::Normal
        }
    }
}
