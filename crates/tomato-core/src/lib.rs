//! # Tomato Core Library
//!
//! Core logic for the Tomato Pomodoro timer. Every operation is available
//! through the `tomato` CLI; any GUI is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Phase engine**: a tokio actor that owns the focus/break state machine,
//!   counts down in one-second ticks, and publishes state and events
//! - **Storage**: SQLite for the session ledger, lifetime stats, and app-open
//!   days; TOML for settings
//! - **Stats**: streaks, daily goal progress, lifetime totals
//! - **Notify**: notification text for phase transitions
//!
//! ## Key Components
//!
//! - [`PhaseEngine`]: async handle on the running engine
//! - [`PhaseMachine`]: the synchronous transition rules it drives
//! - [`StatsAggregator`]: session recording and published statistics
//! - [`SettingsStore`]: settings persistence and change notification
//! - [`Database`]: SQLite persistence

pub mod clock;
pub mod error;
pub mod events;
pub mod notify;
pub mod stats;
pub mod storage;
pub mod timer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CoreError, DatabaseError, PhaseError, Result, SettingsError};
pub use events::Event;
pub use notify::{goal_notification, notification_for, Notification};
pub use stats::{compute_streak, DailyProgress, Ledger, RecordOutcome, StatsAggregator, StreakSummary};
pub use storage::{Database, Settings, SettingsStore, SettingsSubscription, TimerSettings};
pub use timer::{PhaseEngine, PhaseKind, PhaseMachine, TimerState, Transition, TransitionCause};
