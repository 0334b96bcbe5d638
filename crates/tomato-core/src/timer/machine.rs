//! Phase state machine.
//!
//! [`PhaseMachine`] holds no clock and no storage. It is told when a tick
//! has elapsed and when to advance, and reports what happened as a
//! [`Transition`]. The async [`PhaseEngine`](super::PhaseEngine) owns one and
//! supplies time, persistence, and publication.
//!
//! ## Cadence
//!
//! ```text
//! Focus(0) -> ShortBreak(1) -> Focus(1) -> ... -> Focus(n-1) -> LongBreak(n) -> Focus(0)
//! ```
//!
//! where `n` is `pomodoros_before_long_break` and the number in parentheses
//! is the cycle position.

use serde::{Deserialize, Serialize};

use super::phase::{to_signed_ms, PhaseKind, TimerState, TransitionCause};
use crate::error::PhaseError;
use crate::storage::TimerSettings;

/// Countdown decrement per tick.
pub const TICK_MS: i64 = 1_000;

/// Outcome of a phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: PhaseKind,
    pub to: PhaseKind,
    pub cause: TransitionCause,
    /// Cycle position after the transition.
    pub cycle_position: u32,
    /// Triggered by a manual skip rather than expiry.
    pub forced: bool,
    /// A completed focus session must be recorded.
    pub record_session: bool,
    /// The new phase is already running.
    pub auto_started: bool,
}

#[derive(Debug, Clone)]
pub struct PhaseMachine {
    state: TimerState,
    settings: TimerSettings,
}

impl PhaseMachine {
    pub fn new(settings: TimerSettings) -> Self {
        Self {
            state: TimerState::initial(&settings),
            settings,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    pub fn is_expired(&self) -> bool {
        self.state.remaining_ms <= 0
    }

    /// Returns `false` if already running.
    pub fn start(&mut self) -> bool {
        if self.state.is_running {
            return false;
        }
        self.state.is_running = true;
        true
    }

    /// Returns `false` if already paused.
    pub fn pause(&mut self) -> bool {
        if !self.state.is_running {
            return false;
        }
        self.state.is_running = false;
        true
    }

    /// Back to a paused focus phase at cycle position 0.
    pub fn reset(&mut self) {
        self.state = TimerState::initial(&self.settings);
    }

    /// Count down by `elapsed_ms` if running. Returns `true` once the phase
    /// has expired.
    pub fn tick(&mut self, elapsed_ms: i64) -> bool {
        if !self.state.is_running {
            return false;
        }
        self.state.remaining_ms = self.state.remaining_ms.saturating_sub(elapsed_ms);
        self.is_expired()
    }

    /// Move to the next phase.
    ///
    /// Stops the countdown first. A forced advance never records a session
    /// and never auto-starts the next phase.
    ///
    /// # Errors
    /// Returns [`PhaseError::InvalidPhaseState`] when a focus phase sits at a
    /// cycle position the current cadence cannot reach. The state is left as
    /// it was, apart from being stopped.
    pub fn advance(&mut self, forced: bool) -> Result<Transition, PhaseError> {
        self.state.is_running = false;

        let s = &self.settings;
        let cycle = self.state.cycle_position;
        let cadence = s.pomodoros_before_long_break;

        let (to, cause, cycle_position, auto_flag) = match self.state.phase {
            PhaseKind::ShortBreak => (
                PhaseKind::Focus,
                TransitionCause::BreakToFocus,
                cycle,
                s.auto_start_focus_after_break,
            ),
            PhaseKind::LongBreak => (
                PhaseKind::Focus,
                TransitionCause::LongBreakCompleted,
                0,
                s.auto_start_focus_after_long_break,
            ),
            PhaseKind::Focus if cycle.saturating_add(1) < cadence => (
                PhaseKind::ShortBreak,
                TransitionCause::FocusToBreak,
                cycle + 1,
                s.auto_start_break,
            ),
            PhaseKind::Focus if cycle.saturating_add(1) == cadence => (
                PhaseKind::LongBreak,
                TransitionCause::FocusToBreak,
                cycle + 1,
                s.auto_start_break,
            ),
            PhaseKind::Focus => {
                return Err(PhaseError::InvalidPhaseState {
                    phase: self.state.phase,
                    cycle_position: cycle,
                    pomodoros_before_long_break: cadence,
                })
            }
        };

        let from = self.state.phase;
        let auto_started = !forced && auto_flag;
        self.state = TimerState::entering(to, cycle_position, &self.settings);
        self.state.is_running = auto_started;

        Ok(Transition {
            from,
            to,
            cause,
            cycle_position,
            forced,
            record_session: !forced && from == PhaseKind::Focus,
            auto_started,
        })
    }

    /// Adopt a new settings snapshot.
    ///
    /// The active phase takes the new configured length as its total and
    /// its remaining time is clamped down to it; remaining time is never
    /// extended. Other phases pick up their new lengths when next entered.
    pub fn apply_settings(&mut self, settings: TimerSettings) {
        let configured = settings.duration_ms(self.state.phase);
        self.state.total_duration_ms = configured;
        self.state.remaining_ms = self.state.remaining_ms.min(to_signed_ms(configured));
        self.settings = settings;
    }
}
