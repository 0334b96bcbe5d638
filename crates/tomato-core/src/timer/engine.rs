//! Phase engine actor.
//!
//! The engine is a single tokio task that owns the [`PhaseMachine`]
//! exclusively. Everything that mutates timer state arrives as a message on
//! one queue, and the task handles them one at a time:
//! - user commands from [`PhaseEngine`] handles
//! - settings snapshots from the [`SettingsSubscription`]
//! - its own one-second tick deadline
//!
//! ## State Transitions
//!
//! ```text
//! paused --start--> running --tick--> running --expiry--> next phase (paused or auto-started)
//!    ^                 |
//!    +-----pause-------+        reset / skip: stop, then move
//! ```
//!
//! The tick deadline only exists while the machine is running. `pause`,
//! `reset`, and skips clear it while handling the command, so no decrement
//! can land after one of them has been processed.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = PhaseEngine::spawn(settings.subscribe(), stats, Arc::new(SystemClock));
//! let mut events = engine.subscribe_events();
//! engine.start().await?;
//! while let Ok(event) = events.recv().await { /* ... */ }
//! ```

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::machine::{PhaseMachine, Transition, TICK_MS};
use super::phase::TimerState;
use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::stats::StatsAggregator;
use crate::storage::{SettingsSubscription, TimerSettings};

/// Real time between countdown decrements.
pub const TICK_INTERVAL: Duration = Duration::from_millis(TICK_MS as u64);

const EVENT_CAPACITY: usize = 64;

type Reply = oneshot::Sender<Result<TimerState>>;

#[derive(Debug, Clone, Copy)]
enum Request {
    Start,
    Pause,
    Toggle,
    Reset,
    Skip,
}

enum Command {
    Request(Request, Reply),
    Shutdown(oneshot::Sender<()>),
}

/// Handle on a running phase engine.
///
/// Clones talk to the same actor. The actor stops when [`shutdown`] is
/// called or the last handle is dropped.
///
/// [`shutdown`]: PhaseEngine::shutdown
#[derive(Clone)]
pub struct PhaseEngine {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<TimerState>,
    events: broadcast::Sender<Event>,
}

impl PhaseEngine {
    /// Spawn the engine on the current tokio runtime.
    ///
    /// Starts paused in a focus phase at cycle position 0, sized from the
    /// subscription's current snapshot.
    pub fn spawn(
        mut settings: SettingsSubscription,
        stats: StatsAggregator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let machine = PhaseMachine::new(settings.current().timer);
        let (state_tx, state) = watch::channel(machine.state());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (commands, command_rx) = mpsc::unbounded_channel();

        let actor = EngineActor {
            machine,
            stats,
            clock,
            state_tx,
            events: events.clone(),
            next_tick: None,
        };
        tokio::spawn(actor.run(command_rx, settings));

        Self {
            commands,
            state,
            events,
        }
    }

    pub async fn start(&self) -> Result<TimerState> {
        self.request(Request::Start).await
    }

    pub async fn pause(&self) -> Result<TimerState> {
        self.request(Request::Pause).await
    }

    pub async fn toggle(&self) -> Result<TimerState> {
        self.request(Request::Toggle).await
    }

    pub async fn reset(&self) -> Result<TimerState> {
        self.request(Request::Reset).await
    }

    /// Skip the rest of the current phase.
    ///
    /// Never records a session and never auto-starts.
    ///
    /// # Errors
    /// Returns [`PhaseError::InvalidPhaseState`](crate::error::PhaseError)
    /// if the cycle position no longer fits the cadence; call
    /// [`reset`](Self::reset) to recover.
    pub async fn advance_to_next_phase(&self) -> Result<TimerState> {
        self.request(Request::Skip).await
    }

    /// Stop the actor and release the settings subscription.
    ///
    /// Waits until the actor has exited. Calling it twice is harmless.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }

    /// Latest published state.
    pub fn state(&self) -> TimerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TimerState> {
        self.state.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    async fn request(&self, request: Request) -> Result<TimerState> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Request(request, tx))
            .map_err(|_| CoreError::EngineStopped)?;
        rx.await.map_err(|_| CoreError::EngineStopped)?
    }
}

struct EngineActor {
    machine: PhaseMachine,
    stats: StatsAggregator,
    clock: Arc<dyn Clock>,
    state_tx: watch::Sender<TimerState>,
    events: broadcast::Sender<Event>,
    next_tick: Option<Instant>,
}

impl EngineActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        settings: SettingsSubscription,
    ) {
        let mut settings = Some(settings);
        let mut stopped = None;
        debug!("phase engine started");

        loop {
            let deadline = self.next_tick;
            tokio::select! {
                biased;

                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown(done)) => {
                        stopped = Some(done);
                        break;
                    }
                    Some(Command::Request(request, reply)) => self.handle(request, reply),
                    None => break,
                },

                changed = next_settings(&mut settings) => match changed {
                    Some(snapshot) => self.on_settings_changed(snapshot.timer),
                    None => {
                        debug!("settings store dropped, keeping last snapshot");
                        settings = None;
                    }
                },

                _ = tick_at(deadline) => self.on_tick().await,
            }
        }

        drop(settings);
        debug!("phase engine stopped");
        if let Some(done) = stopped {
            let _ = done.send(());
        }
    }

    fn handle(&mut self, request: Request, reply: Reply) {
        let result = match request {
            Request::Start => Ok(self.start()),
            Request::Pause => Ok(self.pause()),
            Request::Toggle if self.machine.state().is_running => Ok(self.pause()),
            Request::Toggle => Ok(self.start()),
            Request::Reset => Ok(self.reset()),
            Request::Skip => self.skip(),
        };
        self.publish_state();
        // The caller may have given up waiting.
        let _ = reply.send(result);
    }

    fn start(&mut self) -> TimerState {
        if self.machine.start() {
            self.schedule_tick();
            let state = self.machine.state();
            debug!(phase = ?state.phase, remaining_ms = state.remaining_ms, "timer started");
            self.emit(Event::TimerStarted {
                phase: state.phase,
                remaining_ms: state.remaining_ms,
                at: Utc::now(),
            });
        }
        self.machine.state()
    }

    fn pause(&mut self) -> TimerState {
        self.next_tick = None;
        if self.machine.pause() {
            let state = self.machine.state();
            debug!(phase = ?state.phase, remaining_ms = state.remaining_ms, "timer paused");
            self.emit(Event::TimerPaused {
                phase: state.phase,
                remaining_ms: state.remaining_ms,
                at: Utc::now(),
            });
        }
        self.machine.state()
    }

    fn reset(&mut self) -> TimerState {
        self.next_tick = None;
        self.machine.reset();
        debug!("timer reset");
        self.emit(Event::TimerReset { at: Utc::now() });
        self.machine.state()
    }

    fn skip(&mut self) -> Result<TimerState> {
        self.next_tick = None;
        let transition = self.machine.advance(true).map_err(|e| {
            error!(error = %e, "skip rejected");
            e
        })?;
        debug!(from = ?transition.from, to = ?transition.to, "phase skipped");
        self.emit(Event::PhaseSkipped {
            from: transition.from,
            to: transition.to,
            cycle_position: transition.cycle_position,
            at: Utc::now(),
        });
        Ok(self.machine.state())
    }

    async fn on_tick(&mut self) {
        let Some(deadline) = self.next_tick else {
            return;
        };
        if self.machine.tick(TICK_MS) {
            self.next_tick = None;
            self.complete_phase().await;
        } else {
            self.next_tick = Some(deadline + TICK_INTERVAL);
        }
        self.publish_state();
    }

    /// Natural expiry of the current phase.
    async fn complete_phase(&mut self) {
        let transition = match self.machine.advance(false) {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "phase expired in an invalid state; reset required");
                let state = self.machine.state();
                self.emit(Event::InvalidPhaseState {
                    phase: state.phase,
                    cycle_position: state.cycle_position,
                    pomodoros_before_long_break: self
                        .machine
                        .settings()
                        .pomodoros_before_long_break,
                    at: Utc::now(),
                });
                return;
            }
        };

        if transition.record_session {
            self.record_session().await;
        }
        if transition.auto_started {
            self.schedule_tick();
        }
        self.announce(transition);
    }

    fn announce(&self, t: Transition) {
        debug!(
            from = ?t.from,
            to = ?t.to,
            cycle_position = t.cycle_position,
            auto_started = t.auto_started,
            "phase completed"
        );
        self.emit(Event::PhaseCompleted {
            from: t.from,
            to: t.to,
            cause: t.cause,
            cycle_position: t.cycle_position,
            auto_started: t.auto_started,
            at: Utc::now(),
        });
    }

    /// One attempt, no retry. A failure is logged and published but the
    /// transition stands.
    ///
    /// The write runs on the blocking pool: SQLite can sit in its busy
    /// timeout, and the runtime thread must keep serving other tasks.
    /// Commands sent meanwhile queue until the write returns.
    async fn record_session(&self) {
        let today = self.clock.today();
        let stats = self.stats.clone();
        let written = tokio::task::spawn_blocking(move || {
            let outcome = stats.record_session(today)?;
            Ok::<_, CoreError>((outcome, stats.refresh_streak(today)))
        })
        .await;

        let message = match written {
            Ok(Ok((outcome, streak))) => {
                self.emit(Event::SessionRecorded {
                    date: outcome.date,
                    day_sessions: outcome.day_sessions,
                    total_pomodori: outcome.total_pomodori,
                    at: Utc::now(),
                });
                match streak {
                    Ok(streak) => info!(current = streak.current, best = streak.best, "streak"),
                    Err(e) => warn!(error = %e, "failed to update best streak"),
                }
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };
        warn!(error = %message, %today, "failed to record completed session");
        self.emit(Event::SessionRecordFailed {
            date: today,
            message,
            at: Utc::now(),
        });
    }

    fn on_settings_changed(&mut self, settings: TimerSettings) {
        self.machine.apply_settings(settings);
        let state = self.machine.state();
        debug!(
            phase = ?state.phase,
            total_ms = state.total_duration_ms,
            remaining_ms = state.remaining_ms,
            "applied settings"
        );
        self.publish_state();
    }

    fn schedule_tick(&mut self) {
        self.next_tick = Some(Instant::now() + TICK_INTERVAL);
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.machine.state());
    }

    /// Publish the current state, then broadcast `event`, so a subscriber
    /// reacting to it always reads the state it describes.
    fn emit(&self, event: Event) {
        self.publish_state();
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn next_settings(
    settings: &mut Option<SettingsSubscription>,
) -> Option<crate::storage::Settings> {
    match settings {
        Some(sub) => sub.changed().await,
        None => pending().await,
    }
}

async fn tick_at(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::{DatabaseError, PhaseError};
    use crate::storage::{
        AppOpenLog, Database, SessionLedger, SessionRecord, Settings, SettingsStore, StatsStore,
        UserStats,
    };
    use crate::timer::{PhaseKind, TransitionCause};
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 10).unwrap()
    }

    fn minutes(focus: u32, short: u32, long: u32, cadence: u32) -> Settings {
        let mut s = Settings::default();
        s.timer.focus_duration = focus;
        s.timer.break_duration = short;
        s.timer.long_break_duration = long;
        s.timer.pomodoros_before_long_break = cadence;
        s
    }

    fn spawn(store: &SettingsStore) -> (PhaseEngine, StatsAggregator) {
        let stats = StatsAggregator::new(Database::open_memory().unwrap()).unwrap();
        let engine = PhaseEngine::spawn(
            store.subscribe(),
            stats.clone(),
            Arc::new(FixedClock::new(today())),
        );
        (engine, stats)
    }

    async fn next_completion(events: &mut broadcast::Receiver<Event>) -> Event {
        loop {
            let event = events.recv().await.unwrap();
            if matches!(event, Event::PhaseCompleted { .. }) {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_a_full_cycle_with_auto_start() {
        let mut settings = minutes(1, 1, 2, 2);
        settings.timer.auto_start_break = true;
        settings.timer.auto_start_focus_after_break = true;
        let store = SettingsStore::in_memory(settings);
        let (engine, stats) = spawn(&store);
        let mut events = engine.subscribe_events();

        engine.start().await.unwrap();

        let mut causes = Vec::new();
        let mut targets = Vec::new();
        for _ in 0..4 {
            if let Event::PhaseCompleted { cause, to, .. } = next_completion(&mut events).await {
                causes.push(cause);
                targets.push(to);
            }
        }

        assert_eq!(
            targets,
            vec![
                PhaseKind::ShortBreak,
                PhaseKind::Focus,
                PhaseKind::LongBreak,
                PhaseKind::Focus
            ]
        );
        assert_eq!(causes[3], TransitionCause::LongBreakCompleted);
        assert_eq!(stats.total_pomodori(), 2);
        assert_eq!(stats.ledger().get(&today()), Some(&2));
        assert_eq!(stats.best_streak(), 1);

        // Focus after a long break was not set to auto-start.
        let state = engine.state();
        assert_eq!(state.cycle_position, 0);
        assert!(!state.is_running);
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_records_exactly_one_session() {
        let store = SettingsStore::in_memory(minutes(1, 1, 1, 4));
        let (engine, stats) = spawn(&store);
        let mut events = engine.subscribe_events();

        engine.start().await.unwrap();
        let mut recorded = 0;
        loop {
            match events.recv().await.unwrap() {
                Event::SessionRecorded { day_sessions, .. } => {
                    recorded += 1;
                    assert_eq!(day_sessions, 1);
                }
                Event::PhaseCompleted { auto_started, .. } => {
                    assert!(!auto_started);
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(recorded, 1);
        assert_eq!(stats.total_pomodori(), 1);

        let state = engine.state();
        assert_eq!(state.phase, PhaseKind::ShortBreak);
        assert_eq!(state.remaining_ms, 60_000);
        assert!(!state.is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_never_records_or_auto_starts() {
        let mut settings = minutes(25, 5, 30, 4);
        settings.timer.auto_start_break = true;
        let store = SettingsStore::in_memory(settings);
        let (engine, stats) = spawn(&store);
        let mut events = engine.subscribe_events();

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let state = engine.advance_to_next_phase().await.unwrap();

        assert_eq!(state.phase, PhaseKind::ShortBreak);
        assert_eq!(state.cycle_position, 1);
        assert!(!state.is_running);
        assert_eq!(state.remaining_ms, 5 * 60_000);

        // Nothing ticks after the skip.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(engine.state(), state);
        assert_eq!(stats.total_pomodori(), 0);

        let mut saw_skip = false;
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(
                event,
                Event::SessionRecorded { .. } | Event::PhaseCompleted { .. }
            ));
            saw_skip |= matches!(event, Event::PhaseSkipped { .. });
        }
        assert!(saw_skip);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_the_countdown() {
        let store = SettingsStore::in_memory(minutes(1, 1, 1, 4));
        let (engine, _stats) = spawn(&store);

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let paused = engine.pause().await.unwrap();
        assert_eq!(paused.remaining_ms, 57_000);
        assert!(!paused.is_running);

        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert_eq!(engine.state().remaining_ms, 57_000);

        let resumed = engine.toggle().await.unwrap();
        assert!(resumed.is_running);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(engine.state().remaining_ms, 56_000);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_while_running_cancels_the_tick() {
        let store = SettingsStore::in_memory(minutes(1, 1, 1, 4));
        let (engine, stats) = spawn(&store);

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(999)).await;
        let state = engine.reset().await.unwrap();
        assert_eq!(state.remaining_ms, 60_000);

        // Long enough for the old deadline and a whole phase to pass.
        tokio::time::sleep(Duration::from_secs(120)).await;
        let state = engine.state();
        assert_eq!(state.remaining_ms, 60_000);
        assert!(!state.is_running);
        assert_eq!(state.phase, PhaseKind::Focus);
        assert_eq!(state.cycle_position, 0);
        assert_eq!(stats.total_pomodori(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn state_is_published_before_each_event() {
        let store = SettingsStore::in_memory(minutes(25, 5, 30, 4));
        let (engine, _stats) = spawn(&store);
        let mut events = engine.subscribe_events();
        let (ack_tx, mut acks) = mpsc::unbounded_channel();

        let watcher = engine.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                let state = watcher.state();
                match &event {
                    Event::TimerStarted { phase, .. } => {
                        assert!(state.is_running);
                        assert_eq!(state.phase, *phase);
                    }
                    Event::PhaseSkipped {
                        to, cycle_position, ..
                    } => {
                        assert!(!state.is_running);
                        assert_eq!(state.phase, *to);
                        assert_eq!(state.cycle_position, *cycle_position);
                    }
                    _ => continue,
                }
                if ack_tx.send(event).is_err() {
                    break;
                }
            }
        });

        // Wait for each check before moving the state again.
        for _ in 0..6 {
            engine.start().await.unwrap();
            assert!(matches!(acks.recv().await, Some(Event::TimerStarted { .. })));
            engine.advance_to_next_phase().await.unwrap();
            assert!(matches!(acks.recv().await, Some(Event::PhaseSkipped { .. })));
        }
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn settings_change_clamps_the_active_phase() {
        let store = SettingsStore::in_memory(minutes(25, 5, 30, 4));
        let (engine, _stats) = spawn(&store);
        let mut state_rx = engine.subscribe_state();

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(15 * 60_000 + 500)).await;
        let paused = engine.pause().await.unwrap();
        assert_eq!(paused.remaining_ms, 600_000);

        store.update(|s| s.timer.focus_duration = 5).unwrap();
        let state = *state_rx
            .wait_for(|s| s.total_duration_ms == 300_000)
            .await
            .unwrap();
        assert_eq!(state.remaining_ms, 300_000);
        assert_eq!(state.phase, PhaseKind::Focus);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_cycle_position_is_reported_and_reset_recovers() {
        let store = SettingsStore::in_memory(minutes(1, 1, 1, 4));
        let (engine, stats) = spawn(&store);
        let mut events = engine.subscribe_events();

        for _ in 0..4 {
            engine.advance_to_next_phase().await.unwrap();
        }
        assert_eq!(engine.state().cycle_position, 2);

        store
            .update(|s| s.timer.pomodoros_before_long_break = 2)
            .unwrap();
        // Commands win over settings in the actor, so let it catch up first.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = engine.advance_to_next_phase().await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Phase(PhaseError::InvalidPhaseState {
                cycle_position: 2,
                pomodoros_before_long_break: 2,
                ..
            })
        ));

        engine.start().await.unwrap();
        loop {
            if let Event::InvalidPhaseState { cycle_position, .. } = events.recv().await.unwrap() {
                assert_eq!(cycle_position, 2);
                break;
            }
        }
        let stuck = engine.state();
        assert!(!stuck.is_running);
        assert_eq!(stuck.phase, PhaseKind::Focus);
        assert_eq!(stuck.cycle_position, 2);
        assert_eq!(stats.total_pomodori(), 0);

        let state = engine.reset().await.unwrap();
        assert_eq!(state.cycle_position, 0);
        assert_eq!(state.remaining_ms, 60_000);
        assert!(engine.advance_to_next_phase().await.is_ok());
    }

    /// Ledger that refuses every write.
    struct Refusing;

    fn refused() -> DatabaseError {
        DatabaseError::Locked
    }

    impl SessionLedger for Refusing {
        fn increment_day(&mut self, _: NaiveDate) -> Result<u32, DatabaseError> {
            Err(refused())
        }
        fn session_count(&self, _: NaiveDate) -> Result<u32, DatabaseError> {
            Ok(0)
        }
        fn all_records(&self) -> Result<Vec<SessionRecord>, DatabaseError> {
            Ok(Vec::new())
        }
        fn clear_records(&mut self) -> Result<usize, DatabaseError> {
            Err(refused())
        }
    }

    impl StatsStore for Refusing {
        fn load_stats(&self) -> Result<Option<UserStats>, DatabaseError> {
            Ok(None)
        }
        fn save_stats(&mut self, _: UserStats) -> Result<(), DatabaseError> {
            Err(refused())
        }
        fn increment_total(&mut self) -> Result<u64, DatabaseError> {
            Err(refused())
        }
    }

    impl AppOpenLog for Refusing {
        fn log_open(&mut self, _: NaiveDate) -> Result<(), DatabaseError> {
            Err(refused())
        }
        fn has_opened_on(&self, _: NaiveDate) -> Result<bool, DatabaseError> {
            Ok(false)
        }
        fn oldest_open_day(&self) -> Result<Option<NaiveDate>, DatabaseError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failure_does_not_block_the_transition() {
        let store = SettingsStore::in_memory(minutes(1, 1, 1, 4));
        let stats = StatsAggregator::new(Refusing).unwrap();
        let engine = PhaseEngine::spawn(
            store.subscribe(),
            stats,
            Arc::new(FixedClock::new(today())),
        );
        let mut events = engine.subscribe_events();

        engine.start().await.unwrap();
        let mut failed = false;
        loop {
            match events.recv().await.unwrap() {
                Event::SessionRecordFailed { date, .. } => {
                    assert_eq!(date, today());
                    failed = true;
                }
                Event::PhaseCompleted { to, .. } => {
                    assert_eq!(to, PhaseKind::ShortBreak);
                    break;
                }
                _ => {}
            }
        }
        assert!(failed);
        assert_eq!(engine.state().phase, PhaseKind::ShortBreak);
    }

    /// Store whose first day write parks until the test releases it.
    struct Gated {
        entered: Option<oneshot::Sender<()>>,
        release: std::sync::mpsc::Receiver<()>,
    }

    impl SessionLedger for Gated {
        fn increment_day(&mut self, _: NaiveDate) -> Result<u32, DatabaseError> {
            if let Some(entered) = self.entered.take() {
                let _ = entered.send(());
                let _ = self.release.recv();
            }
            Ok(1)
        }
        fn session_count(&self, _: NaiveDate) -> Result<u32, DatabaseError> {
            Ok(1)
        }
        fn all_records(&self) -> Result<Vec<SessionRecord>, DatabaseError> {
            Ok(Vec::new())
        }
        fn clear_records(&mut self) -> Result<usize, DatabaseError> {
            Ok(0)
        }
    }

    impl StatsStore for Gated {
        fn load_stats(&self) -> Result<Option<UserStats>, DatabaseError> {
            Ok(None)
        }
        fn save_stats(&mut self, _: UserStats) -> Result<(), DatabaseError> {
            Ok(())
        }
        fn increment_total(&mut self) -> Result<u64, DatabaseError> {
            Ok(1)
        }
    }

    impl AppOpenLog for Gated {
        fn log_open(&mut self, _: NaiveDate) -> Result<(), DatabaseError> {
            Ok(())
        }
        fn has_opened_on(&self, _: NaiveDate) -> Result<bool, DatabaseError> {
            Ok(false)
        }
        fn oldest_open_day(&self) -> Result<Option<NaiveDate>, DatabaseError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn session_write_leaves_the_runtime_thread_free() {
        let (entered_tx, entered) = oneshot::channel();
        let (release, release_rx) = std::sync::mpsc::channel();
        let stats = StatsAggregator::new(Gated {
            entered: Some(entered_tx),
            release: release_rx,
        })
        .unwrap();
        let store = SettingsStore::in_memory(minutes(1, 1, 1, 4));
        let engine = PhaseEngine::spawn(
            store.subscribe(),
            stats,
            Arc::new(FixedClock::new(today())),
        );
        let mut events = engine.subscribe_events();
        engine.start().await.unwrap();

        // The write is parked on the gate and this task still runs.
        entered.await.unwrap();
        release.send(()).unwrap();
        loop {
            if let Event::SessionRecorded { day_sessions, .. } = events.recv().await.unwrap() {
                assert_eq!(day_sessions, 1);
                break;
            }
        }
        assert_eq!(engine.state().phase, PhaseKind::ShortBreak);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_actor() {
        let store = SettingsStore::in_memory(Settings::default());
        let (engine, _stats) = spawn(&store);
        engine.start().await.unwrap();

        engine.shutdown().await;
        engine.shutdown().await;
        assert!(engine.is_stopped());
        assert!(matches!(engine.start().await, Err(CoreError::EngineStopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_running_after_settings_store_is_dropped() {
        let store = SettingsStore::in_memory(minutes(1, 1, 1, 4));
        let (engine, _stats) = spawn(&store);
        drop(store);

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(engine.state().remaining_ms, 59_000);
    }
}
