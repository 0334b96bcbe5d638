use clap::Subcommand;
use serde::Serialize;
use tomato_core::{Clock, DailyProgress, Database, SettingsStore, StatsAggregator, SystemClock};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Totals, streaks, and today's progress as JSON
    Summary,
    /// Completed sessions per day
    History {
        /// Print the ledger as a JSON object instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Current and best streak as JSON
    Streak,
    /// Delete the per-day history (totals and best streak are kept)
    Clear,
    /// Zero the lifetime totals and best streak (history is kept)
    Reset,
}

#[derive(Serialize)]
struct Summary {
    total_pomodori: u64,
    best_streak: u32,
    current_streak: u32,
    today: DailyProgress,
    first_opened: Option<chrono::NaiveDate>,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let stats = StatsAggregator::new(Database::open()?)?;
    let today = SystemClock.today();

    match action {
        StatsAction::Summary => {
            let goal = SettingsStore::open()?.snapshot().timer.daily_pomodori_goal;
            let streak = stats.refresh_streak(today)?;
            let summary = Summary {
                total_pomodori: stats.total_pomodori(),
                best_streak: streak.best,
                current_streak: streak.current,
                today: stats.daily_progress(today, goal),
                first_opened: stats.oldest_open_day()?,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        StatsAction::History { json } => {
            let ledger = stats.ledger();
            if json {
                println!("{}", serde_json::to_string_pretty(&ledger)?);
            } else if ledger.is_empty() {
                println!("no sessions recorded");
            } else {
                for (date, count) in ledger.iter().rev() {
                    let marker = if *date == today { " (today)" } else { "" };
                    println!("{date}  {count:>3}{marker}");
                }
            }
        }
        StatsAction::Streak => {
            let streak = stats.refresh_streak(today)?;
            println!("{}", serde_json::to_string_pretty(&streak)?);
        }
        StatsAction::Clear => {
            let removed = stats.clear_all_sessions()?;
            println!("cleared {removed} day(s) of history");
        }
        StatsAction::Reset => {
            stats.reset_stats()?;
            println!("lifetime statistics reset");
        }
    }
    Ok(())
}
