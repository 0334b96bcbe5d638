//! Consecutive-day streak calculation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Current and best streak, as shown side by side in the history view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSummary {
    pub current: u32,
    pub best: u32,
}

/// Number of consecutive days with at least one session, ending today.
///
/// If nothing has been recorded today yet the streak is counted from
/// yesterday, so it survives until the day is over.
pub fn compute_streak(ledger: &BTreeMap<NaiveDate, u32>, today: NaiveDate) -> u32 {
    let has_sessions = |day: NaiveDate| ledger.get(&day).is_some_and(|&count| count > 0);

    let mut day = if has_sessions(today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) => yesterday,
            None => return 0,
        }
    };

    let mut streak = 0;
    while has_sessions(day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}
