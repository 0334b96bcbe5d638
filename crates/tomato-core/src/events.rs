use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{PhaseKind, TimerState, TransitionCause};

/// Every state change in the engine produces an Event.
///
/// UIs subscribe to all of them. A notification collaborator only needs
/// [`Event::PhaseCompleted`], which fires once per natural transition and
/// never for skips, start, pause, or reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        phase: PhaseKind,
        remaining_ms: i64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        phase: PhaseKind,
        remaining_ms: i64,
        at: DateTime<Utc>,
    },
    TimerReset {
        at: DateTime<Utc>,
    },
    /// The countdown ran out and the engine moved on.
    PhaseCompleted {
        from: PhaseKind,
        to: PhaseKind,
        cause: TransitionCause,
        cycle_position: u32,
        auto_started: bool,
        at: DateTime<Utc>,
    },
    /// The user skipped the rest of a phase.
    PhaseSkipped {
        from: PhaseKind,
        to: PhaseKind,
        cycle_position: u32,
        at: DateTime<Utc>,
    },
    SessionRecorded {
        date: NaiveDate,
        day_sessions: u32,
        total_pomodori: u64,
        at: DateTime<Utc>,
    },
    /// The transition happened but the session could not be persisted.
    SessionRecordFailed {
        date: NaiveDate,
        message: String,
        at: DateTime<Utc>,
    },
    /// Expiry found a phase/cycle combination no rule covers. The engine
    /// stopped; `reset` recovers.
    InvalidPhaseState {
        phase: PhaseKind,
        cycle_position: u32,
        pomodoros_before_long_break: u32,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        state: TimerState,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn snapshot(state: TimerState) -> Self {
        Event::StateSnapshot {
            state,
            at: Utc::now(),
        }
    }
}
