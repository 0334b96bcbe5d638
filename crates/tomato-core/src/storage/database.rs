//! SQLite-based session ledger and statistics.
//!
//! Provides persistent storage for:
//! - Completed focus sessions, one row per calendar day
//! - Lifetime statistics (best streak, total pomodori)
//! - Days on which the app was opened

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use super::migrations;
use super::{data_dir, AppOpenLog, SessionLedger, SessionRecord, StatsStore, UserStats};
use crate::error::{DatabaseError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database backing the ledger, stats row, and app-open log.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data dir>/tomato.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(data_dir()?.join("tomato.db"))
    }

    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(DatabaseError::from)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        migrations::migrate(&self.conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }
}

impl SessionLedger for Database {
    fn increment_day(&mut self, date: NaiveDate) -> Result<u32, DatabaseError> {
        let count = self.conn.query_row(
            "INSERT INTO session_records (date, completed_sessions) VALUES (?1, 1)
             ON CONFLICT(date) DO UPDATE SET completed_sessions = completed_sessions + 1
             RETURNING completed_sessions",
            params![date],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }

    fn session_count(&self, date: NaiveDate) -> Result<u32, DatabaseError> {
        let count = self
            .conn
            .query_row(
                "SELECT completed_sessions FROM session_records WHERE date = ?1",
                params![date],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    fn all_records(&self) -> Result<Vec<SessionRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT date, completed_sessions FROM session_records ORDER BY date ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionRecord {
                date: row.get(0)?,
                completed_sessions: row.get(1)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn clear_records(&mut self) -> Result<usize, DatabaseError> {
        Ok(self.conn.execute("DELETE FROM session_records", [])?)
    }
}

impl StatsStore for Database {
    fn load_stats(&self) -> Result<Option<UserStats>, DatabaseError> {
        let stats = self
            .conn
            .query_row(
                "SELECT best_streak, total_pomodori FROM user_stats WHERE id = 0",
                [],
                |row| {
                    Ok(UserStats {
                        best_streak: row.get(0)?,
                        total_pomodori: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(stats)
    }

    fn save_stats(&mut self, stats: UserStats) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO user_stats (id, best_streak, total_pomodori) VALUES (0, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                best_streak = excluded.best_streak,
                total_pomodori = excluded.total_pomodori",
            params![stats.best_streak, stats.total_pomodori],
        )?;
        Ok(())
    }

    fn increment_total(&mut self) -> Result<u64, DatabaseError> {
        let total = self.conn.query_row(
            "INSERT INTO user_stats (id, best_streak, total_pomodori) VALUES (0, 0, 1)
             ON CONFLICT(id) DO UPDATE SET total_pomodori = total_pomodori + 1
             RETURNING total_pomodori",
            [],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(total)
    }
}

impl AppOpenLog for Database {
    fn log_open(&mut self, date: NaiveDate) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO app_open_days (date) VALUES (?1)",
            params![date],
        )?;
        Ok(())
    }

    fn has_opened_on(&self, date: NaiveDate) -> Result<bool, DatabaseError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM app_open_days WHERE date = ?1",
            params![date],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn oldest_open_day(&self) -> Result<Option<NaiveDate>, DatabaseError> {
        let oldest = self.conn.query_row("SELECT MIN(date) FROM app_open_days", [], |row| {
            row.get::<_, Option<NaiveDate>>(0)
        })?;
        Ok(oldest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
    }

    #[test]
    fn increment_day_creates_then_increments() {
        let mut db = Database::open_memory().unwrap();
        assert_eq!(db.session_count(day(1)).unwrap(), 0);
        assert_eq!(db.increment_day(day(1)).unwrap(), 1);
        assert_eq!(db.increment_day(day(1)).unwrap(), 2);
        assert_eq!(db.increment_day(day(2)).unwrap(), 1);
        assert_eq!(db.session_count(day(1)).unwrap(), 2);
    }

    #[test]
    fn all_records_are_sorted_by_date() {
        let mut db = Database::open_memory().unwrap();
        db.increment_day(day(3)).unwrap();
        db.increment_day(day(1)).unwrap();
        db.increment_day(day(2)).unwrap();
        let dates: Vec<_> = db.all_records().unwrap().iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(1), day(2), day(3)]);
    }

    #[test]
    fn clear_records_leaves_stats() {
        let mut db = Database::open_memory().unwrap();
        db.increment_day(day(1)).unwrap();
        db.increment_total().unwrap();
        assert_eq!(db.clear_records().unwrap(), 1);
        assert!(db.all_records().unwrap().is_empty());
        assert_eq!(db.load_stats().unwrap().unwrap().total_pomodori, 1);
    }

    #[test]
    fn stats_row_is_created_lazily() {
        let mut db = Database::open_memory().unwrap();
        assert!(db.load_stats().unwrap().is_none());
        assert_eq!(db.increment_total().unwrap(), 1);
        assert_eq!(db.increment_total().unwrap(), 2);
        let stats = db.load_stats().unwrap().unwrap();
        assert_eq!(stats.total_pomodori, 2);
        assert_eq!(stats.best_streak, 0);
    }

    #[test]
    fn save_stats_replaces_row() {
        let mut db = Database::open_memory().unwrap();
        db.save_stats(UserStats {
            best_streak: 4,
            total_pomodori: 9,
        })
        .unwrap();
        db.save_stats(UserStats {
            best_streak: 5,
            total_pomodori: 9,
        })
        .unwrap();
        assert_eq!(
            db.load_stats().unwrap(),
            Some(UserStats {
                best_streak: 5,
                total_pomodori: 9
            })
        );
    }

    #[test]
    fn app_open_log() {
        let mut db = Database::open_memory().unwrap();
        assert!(db.oldest_open_day().unwrap().is_none());
        db.log_open(day(5)).unwrap();
        db.log_open(day(5)).unwrap();
        db.log_open(day(2)).unwrap();
        assert!(db.has_opened_on(day(5)).unwrap());
        assert!(!db.has_opened_on(day(4)).unwrap());
        assert_eq!(db.oldest_open_day().unwrap(), Some(day(2)));
    }

    #[test]
    fn file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tomato.db");
        {
            let mut db = Database::open_at(&path).unwrap();
            db.increment_day(day(1)).unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.session_count(day(1)).unwrap(), 1);
    }
}
