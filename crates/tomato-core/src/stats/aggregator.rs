//! Session recording and lifetime statistics.
//!
//! [`StatsAggregator`] is the only writer of the ledger and stats row. It
//! serializes access to storage behind a mutex and republishes totals, best
//! streak, and the ledger over `watch` channels after every successful write.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use super::streak::{compute_streak, StreakSummary};
use crate::error::Result;
use crate::storage::{Storage, UserStats};

/// Completed sessions per day.
pub type Ledger = BTreeMap<NaiveDate, u32>;

/// Result of recording one completed focus session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub date: NaiveDate,
    /// Sessions on `date` including this one.
    pub day_sessions: u32,
    pub total_pomodori: u64,
}

/// How far a day got towards the daily goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyProgress {
    pub date: NaiveDate,
    pub completed: u32,
    pub goal: u32,
    pub goal_reached: bool,
}

struct Inner {
    store: Mutex<Box<dyn Storage>>,
    total_tx: watch::Sender<u64>,
    best_streak_tx: watch::Sender<u32>,
    ledger_tx: watch::Sender<Ledger>,
}

/// Cheap to clone; clones share storage and published values.
#[derive(Clone)]
pub struct StatsAggregator {
    inner: Arc<Inner>,
}

impl StatsAggregator {
    /// Wrap `store` and seed the published values from it.
    ///
    /// # Errors
    /// Returns an error if the initial read fails.
    pub fn new(store: impl Storage + 'static) -> Result<Self> {
        let (total_tx, _) = watch::channel(0);
        let (best_streak_tx, _) = watch::channel(0);
        let (ledger_tx, _) = watch::channel(Ledger::new());
        let store: Box<dyn Storage> = Box::new(store);
        let aggregator = Self {
            inner: Arc::new(Inner {
                store: Mutex::new(store),
                total_tx,
                best_streak_tx,
                ledger_tx,
            }),
        };
        aggregator.reload()?;
        Ok(aggregator)
    }

    fn store(&self) -> MutexGuard<'_, Box<dyn Storage>> {
        self.inner
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-read totals, best streak, and ledger from storage and publish them.
    pub fn reload(&self) -> Result<()> {
        let store = self.store();
        let stats = store.load_stats()?.unwrap_or_default();
        let ledger: Ledger = store
            .all_records()?
            .into_iter()
            .map(|r| (r.date, r.completed_sessions))
            .collect();
        drop(store);

        self.inner.total_tx.send_replace(stats.total_pomodori);
        self.inner.best_streak_tx.send_replace(stats.best_streak);
        self.inner.ledger_tx.send_replace(ledger);
        Ok(())
    }

    /// Count one completed focus session on `date`.
    ///
    /// Upserts the day's ledger row, then bumps the lifetime total. The two
    /// writes are independent: if the second fails the ledger keeps the new
    /// count and the error is returned.
    ///
    /// # Errors
    /// Returns the storage error of whichever write failed.
    pub fn record_session(&self, date: NaiveDate) -> Result<RecordOutcome> {
        let mut store = self.store();

        let day_sessions = store.increment_day(date)?;
        self.inner.ledger_tx.send_modify(|ledger| {
            ledger.insert(date, day_sessions);
        });

        let total_pomodori = store.increment_total()?;
        self.inner.total_tx.send_replace(total_pomodori);

        info!(%date, day_sessions, total_pomodori, "recorded focus session");
        Ok(RecordOutcome {
            date,
            day_sessions,
            total_pomodori,
        })
    }

    /// Offer `candidate` as a new best streak. The stored value only ever
    /// grows.
    ///
    /// Returns the best streak now published, which is the larger of the
    /// previous value and `candidate`.
    ///
    /// # Errors
    /// Returns an error if the stats row cannot be read or written; the
    /// published value is left alone in that case.
    pub fn update_best_streak(&self, candidate: u32) -> Result<u32> {
        let mut store = self.store();
        match store.load_stats()? {
            None => store.save_stats(UserStats {
                best_streak: candidate,
                total_pomodori: 0,
            })?,
            Some(current) if candidate > current.best_streak => {
                debug!(from = current.best_streak, to = candidate, "new best streak");
                store.save_stats(UserStats {
                    best_streak: candidate,
                    ..current
                })?
            }
            Some(_) => {}
        }
        drop(store);

        self.inner
            .best_streak_tx
            .send_if_modified(|best| {
                if candidate > *best {
                    *best = candidate;
                    true
                } else {
                    false
                }
            });
        Ok(*self.inner.best_streak_tx.borrow())
    }

    /// Compute today's streak from the ledger and feed it to
    /// [`update_best_streak`](Self::update_best_streak).
    pub fn refresh_streak(&self, today: NaiveDate) -> Result<StreakSummary> {
        let current = self.current_streak(today);
        let best = self.update_best_streak(current)?;
        Ok(StreakSummary { current, best })
    }

    /// Delete the whole ledger. Lifetime totals and best streak survive.
    pub fn clear_all_sessions(&self) -> Result<usize> {
        let removed = self.store().clear_records()?;
        self.inner.ledger_tx.send_replace(Ledger::new());
        info!(removed, "cleared session history");
        Ok(removed)
    }

    /// Zero the lifetime totals and best streak. The ledger is untouched.
    pub fn reset_stats(&self) -> Result<()> {
        self.store().save_stats(UserStats::default())?;
        self.inner.total_tx.send_replace(0);
        self.inner.best_streak_tx.send_replace(0);
        info!("reset lifetime statistics");
        Ok(())
    }

    pub fn log_app_open(&self, date: NaiveDate) -> Result<()> {
        self.store().log_open(date)?;
        Ok(())
    }

    pub fn has_opened_on(&self, date: NaiveDate) -> Result<bool> {
        Ok(self.store().has_opened_on(date)?)
    }

    /// First day the app was ever opened, if known.
    pub fn oldest_open_day(&self) -> Result<Option<NaiveDate>> {
        Ok(self.store().oldest_open_day()?)
    }

    pub fn current_streak(&self, today: NaiveDate) -> u32 {
        compute_streak(&self.inner.ledger_tx.borrow(), today)
    }

    pub fn daily_progress(&self, date: NaiveDate, goal: u32) -> DailyProgress {
        let completed = self.inner.ledger_tx.borrow().get(&date).copied().unwrap_or(0);
        DailyProgress {
            date,
            completed,
            goal,
            goal_reached: completed >= goal,
        }
    }

    pub fn total_pomodori(&self) -> u64 {
        *self.inner.total_tx.borrow()
    }

    pub fn best_streak(&self) -> u32 {
        *self.inner.best_streak_tx.borrow()
    }

    pub fn ledger(&self) -> Ledger {
        self.inner.ledger_tx.borrow().clone()
    }

    pub fn subscribe_total(&self) -> watch::Receiver<u64> {
        self.inner.total_tx.subscribe()
    }

    pub fn subscribe_best_streak(&self) -> watch::Receiver<u32> {
        self.inner.best_streak_tx.subscribe()
    }

    pub fn subscribe_ledger(&self) -> watch::Receiver<Ledger> {
        self.inner.ledger_tx.subscribe()
    }
}
