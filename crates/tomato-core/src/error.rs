//! Core error types for tomato-core.
//!
//! Every fallible operation in the library returns [`CoreError`] (through the
//! [`Result`] alias). The variants map to the three failure families the
//! engine knows about: phase-state faults, settings read/write failures, and
//! storage failures.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::PhaseKind;

/// Core error type for tomato-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Phase state machine faults
    #[error("Phase error: {0}")]
    Phase(#[from] PhaseError),

    /// Settings-related errors
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// The engine actor is gone; no command can be applied.
    #[error("Phase engine has been shut down")]
    EngineStopped,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Phase state machine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseError {
    /// The phase/cycle combination matches no transition rule.
    ///
    /// Happens when `pomodoros_before_long_break` is lowered below the
    /// current cycle position in the middle of a cycle. `reset()` recovers.
    #[error(
        "Invalid phase state: {phase:?} at cycle position {cycle_position} \
         with {pomodoros_before_long_break} pomodoros before long break"
    )]
    InvalidPhaseState {
        phase: PhaseKind,
        cycle_position: u32,
        pomodoros_before_long_break: u32,
    },
}

/// Settings-specific errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The settings file exists but could not be read or parsed.
    #[error("Failed to read settings from {path}: {message}")]
    ReadFailed { path: PathBuf, message: String },

    /// Failed to persist settings
    #[error("Failed to write settings to {path}: {message}")]
    WriteFailed { path: PathBuf, message: String },

    /// Invalid settings value
    #[error("Invalid settings value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown settings key: {0}")]
    UnknownKey(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_phase_state_message_names_the_cycle() {
        let err = PhaseError::InvalidPhaseState {
            phase: PhaseKind::Focus,
            cycle_position: 5,
            pomodoros_before_long_break: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("cycle position 5"));
        assert!(msg.contains("3 pomodoros"));
    }

    #[test]
    fn rusqlite_errors_become_query_failures() {
        let err: DatabaseError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, DatabaseError::QueryFailed(_)));
    }
}
