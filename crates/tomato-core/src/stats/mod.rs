mod aggregator;
mod streak;

pub use aggregator::{DailyProgress, Ledger, RecordOutcome, StatsAggregator};
pub use streak::{compute_streak, StreakSummary};
