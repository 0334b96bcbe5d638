pub mod database;
pub mod migrations;
mod settings;

pub use database::Database;
pub use settings::{
    DisplaySettings, NotificationSettings, Settings, SettingsStore, SettingsSubscription,
    TimerSettings,
};

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};

/// Completed focus sessions for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub date: NaiveDate,
    pub completed_sessions: u32,
}

/// Lifetime aggregates, stored as a single row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub best_streak: u32,
    pub total_pomodori: u64,
}

/// Durable per-day ledger of completed focus sessions.
pub trait SessionLedger {
    /// Add one session to `date`, creating the row if needed.
    /// Returns the day's new count.
    fn increment_day(&mut self, date: NaiveDate) -> Result<u32, DatabaseError>;

    /// Sessions recorded on `date`, 0 if there is no row.
    fn session_count(&self, date: NaiveDate) -> Result<u32, DatabaseError>;

    /// Every record, oldest first.
    fn all_records(&self) -> Result<Vec<SessionRecord>, DatabaseError>;

    /// Delete every record. Returns how many rows were removed.
    fn clear_records(&mut self) -> Result<usize, DatabaseError>;
}

/// Durable single-row lifetime statistics.
pub trait StatsStore {
    fn load_stats(&self) -> Result<Option<UserStats>, DatabaseError>;

    /// Write the whole row, replacing any existing one.
    fn save_stats(&mut self, stats: UserStats) -> Result<(), DatabaseError>;

    /// Add one to `total_pomodori`, creating the row if needed.
    /// Returns the new total.
    fn increment_total(&mut self) -> Result<u64, DatabaseError>;
}

/// Days on which the app was opened.
pub trait AppOpenLog {
    /// Record `date`; repeated calls for the same day are no-ops.
    fn log_open(&mut self, date: NaiveDate) -> Result<(), DatabaseError>;

    fn has_opened_on(&self, date: NaiveDate) -> Result<bool, DatabaseError>;

    fn oldest_open_day(&self) -> Result<Option<NaiveDate>, DatabaseError>;
}

/// Everything the statistics layer needs from persistence.
pub trait Storage: SessionLedger + StatsStore + AppOpenLog + Send {}

impl<T: SessionLedger + StatsStore + AppOpenLog + Send> Storage for T {}

/// Returns the data directory.
///
/// `TOMATO_HOME` wins if set. Otherwise `~/.config/tomato[-dev]/`, with the
/// `-dev` suffix when `TOMATO_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("TOMATO_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("TOMATO_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("tomato-dev")
            } else {
                base_dir.join("tomato")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
