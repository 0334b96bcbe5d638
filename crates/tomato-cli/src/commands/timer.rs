use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use serde_json::json;
use tomato_core::{
    goal_notification, notification_for, Clock, Database, Event, Notification, PhaseEngine,
    SettingsStore, StatsAggregator, SystemClock, TimerState,
};
use tracing::{info, warn};

/// How often `timer run` re-reads settings.toml for edits made elsewhere.
const SETTINGS_POLL: Duration = Duration::from_secs(2);

#[derive(Subcommand)]
pub enum TimerAction {
    /// Print the idle timer state and today's progress as JSON
    Status,
    /// Run the timer in the foreground, printing events as JSON lines
    Run {
        /// Stop after this many phases have completed
        #[arg(long, default_value = "1")]
        phases: u32,
        /// Auto-start every phase for this run, whatever the settings say
        #[arg(long)]
        auto: bool,
    },
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        TimerAction::Status => status(),
        TimerAction::Run { phases, auto } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_foreground(phases, auto))
        }
    }
}

fn status() -> Result<(), Box<dyn std::error::Error>> {
    let settings = SettingsStore::open()?.snapshot();
    let stats = StatsAggregator::new(Database::open()?)?;
    let today = SystemClock.today();
    stats.log_app_open(today)?;

    let output = json!({
        "state": TimerState::initial(&settings.timer),
        "today": stats.daily_progress(today, settings.timer.daily_pomodori_goal),
        "total_pomodori": stats.total_pomodori(),
        "current_streak": stats.current_streak(today),
        "best_streak": stats.best_streak(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_line(value: &impl serde::Serialize) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_notification(n: &Notification) -> Result<(), serde_json::Error> {
    print_line(&json!({ "type": "notification", "title": n.title, "body": n.body }))
}

async fn run_foreground(phases: u32, auto: bool) -> Result<(), Box<dyn std::error::Error>> {
    let file_settings = SettingsStore::open()?;
    // `--auto` runs on a private copy, so it neither persists nor follows
    // the file.
    let overlay = auto.then(|| {
        let mut s = file_settings.snapshot();
        s.timer.auto_start_break = true;
        s.timer.auto_start_focus_after_break = true;
        s.timer.auto_start_focus_after_long_break = true;
        SettingsStore::in_memory(s)
    });
    let settings = overlay.as_ref().unwrap_or(&file_settings);

    let stats = StatsAggregator::new(Database::open()?)?;
    let clock = SystemClock;
    stats.log_app_open(clock.today())?;

    let engine = PhaseEngine::spawn(settings.subscribe(), stats.clone(), Arc::new(clock));
    let mut events = engine.subscribe_events();
    print_line(&Event::snapshot(engine.start().await?))?;
    info!(phases, auto, "timer running");

    let poll = file_settings.watch_file(SETTINGS_POLL);
    tokio::pin!(poll);

    let mut completed = 0;
    let outcome = loop {
        let received = tokio::select! {
            received = events.recv() => received,
            () = &mut poll, if !auto => continue,
        };
        let event = match received {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "event output fell behind");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break Ok(()),
        };
        print_line(&event)?;

        let current = settings.snapshot();
        let notifications = &current.notifications;
        if let Some(n) = notification_for(&event, notifications) {
            print_notification(&n)?;
        }

        match event {
            Event::SessionRecorded { date, .. } => {
                let progress = stats.daily_progress(date, current.timer.daily_pomodori_goal);
                if let Some(n) = goal_notification(&progress, notifications) {
                    print_notification(&n)?;
                }
            }
            Event::PhaseCompleted { auto_started, .. } => {
                completed += 1;
                if completed >= phases {
                    break Ok(());
                }
                if !auto_started {
                    info!("next phase is not set to auto-start, stopping");
                    break Ok(());
                }
            }
            Event::InvalidPhaseState {
                cycle_position,
                pomodoros_before_long_break,
                ..
            } => {
                break Err(format!(
                    "cycle position {cycle_position} does not fit a cadence of \
                     {pomodoros_before_long_break}; run again to start a fresh cycle"
                )
                .into());
            }
            _ => {}
        }
    };

    print_line(&Event::snapshot(engine.state()))?;
    engine.shutdown().await;
    outcome
}
