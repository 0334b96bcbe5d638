use serde::{Deserialize, Serialize};

use crate::storage::TimerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Focus,
    ShortBreak,
    LongBreak,
}

impl PhaseKind {
    pub fn label(self) -> &'static str {
        match self {
            PhaseKind::Focus => "Focus",
            PhaseKind::ShortBreak => "Short Break",
            PhaseKind::LongBreak => "Long Break",
        }
    }
}

/// Why a phase ended, from the point of view of someone writing a
/// notification for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    /// A focus phase ended and a short or long break begins.
    FocusToBreak,
    /// A short break ended.
    BreakToFocus,
    /// A long break ended; the cycle starts over.
    LongBreakCompleted,
}

/// Countdown state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    /// Length of the current phase as configured when it started (or as
    /// last adjusted by a settings change).
    pub total_duration_ms: u64,
    /// Counts down to zero. Only goes negative for the instant between the
    /// last tick and the transition.
    pub remaining_ms: i64,
    pub is_running: bool,
    pub phase: PhaseKind,
    /// Focus phases completed since the last long break.
    pub cycle_position: u32,
}

impl TimerState {
    /// Paused focus phase at the start of a cycle.
    pub fn initial(settings: &TimerSettings) -> Self {
        Self::entering(PhaseKind::Focus, 0, settings)
    }

    pub(crate) fn entering(phase: PhaseKind, cycle_position: u32, settings: &TimerSettings) -> Self {
        let total = settings.duration_ms(phase);
        Self {
            total_duration_ms: total,
            remaining_ms: to_signed_ms(total),
            is_running: false,
            phase,
            cycle_position,
        }
    }

    /// Elapsed fraction of the current phase, 0.0 ..= 1.0.
    pub fn progress(&self) -> f64 {
        if self.total_duration_ms == 0 {
            return 0.0;
        }
        let remaining = self.remaining_ms.max(0) as f64;
        (1.0 - remaining / self.total_duration_ms as f64).clamp(0.0, 1.0)
    }

    /// Whole seconds left, rounded up, never negative.
    pub fn remaining_secs(&self) -> u64 {
        (self.remaining_ms.max(0) as u64).div_ceil(1000)
    }
}

pub(crate) fn to_signed_ms(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}
