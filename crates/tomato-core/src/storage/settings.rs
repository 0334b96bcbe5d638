//! TOML-backed timer settings with a reactive snapshot.
//!
//! Stores user preferences including:
//! - Phase durations and long-break cadence
//! - Auto-start policy for each transition
//! - Notification toggles
//! - Display flags
//!
//! Settings are stored at `<data dir>/settings.toml`. Every successful
//! update is pushed to subscribers through a [`SettingsSubscription`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::data_dir;
use crate::error::{Result, SettingsError};
use crate::timer::PhaseKind;

const MAX_POMODOROS_BEFORE_LONG_BREAK: u32 = 12;

/// Settings consumed by the phase engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    /// Focus phase length in minutes.
    #[serde(default = "default_focus_duration")]
    pub focus_duration: u32,
    /// Short break length in minutes.
    #[serde(default = "default_break_duration")]
    pub break_duration: u32,
    /// Long break length in minutes.
    #[serde(default = "default_long_break_duration")]
    pub long_break_duration: u32,
    #[serde(default = "default_pomodoros_before_long_break")]
    pub pomodoros_before_long_break: u32,
    #[serde(default = "default_daily_goal")]
    pub daily_pomodori_goal: u32,
    #[serde(default)]
    pub auto_start_break: bool,
    #[serde(default)]
    pub auto_start_focus_after_break: bool,
    #[serde(default)]
    pub auto_start_focus_after_long_break: bool,
}

/// Which transitions should raise a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub short_break: bool,
    #[serde(default)]
    pub long_break: bool,
    #[serde(default)]
    pub focus: bool,
    /// Long break finished, a new cycle begins.
    #[serde(default)]
    pub pomodoro_loop: bool,
    #[serde(default)]
    pub daily_goal_reached: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default)]
    pub status_bar_visible: bool,
}

/// Full settings snapshot.
///
/// Serialized to/from TOML at `<data dir>/settings.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub timer: TimerSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub display: DisplaySettings,
}

fn default_focus_duration() -> u32 {
    25
}
fn default_break_duration() -> u32 {
    5
}
fn default_long_break_duration() -> u32 {
    30
}
fn default_pomodoros_before_long_break() -> u32 {
    4
}
fn default_daily_goal() -> u32 {
    1
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            focus_duration: default_focus_duration(),
            break_duration: default_break_duration(),
            long_break_duration: default_long_break_duration(),
            pomodoros_before_long_break: default_pomodoros_before_long_break(),
            daily_pomodori_goal: default_daily_goal(),
            auto_start_break: false,
            auto_start_focus_after_break: false,
            auto_start_focus_after_long_break: false,
        }
    }
}

impl TimerSettings {
    /// Configured length of `phase` in minutes.
    pub fn duration_min(&self, phase: PhaseKind) -> u32 {
        match phase {
            PhaseKind::Focus => self.focus_duration,
            PhaseKind::ShortBreak => self.break_duration,
            PhaseKind::LongBreak => self.long_break_duration,
        }
    }

    /// Configured length of `phase` in milliseconds.
    pub fn duration_ms(&self, phase: PhaseKind) -> u64 {
        u64::from(self.duration_min(phase)).saturating_mul(60_000)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let minutes = [
            ("timer.focus_duration", self.focus_duration),
            ("timer.break_duration", self.break_duration),
            ("timer.long_break_duration", self.long_break_duration),
            ("timer.daily_pomodori_goal", self.daily_pomodori_goal),
        ];
        for (key, value) in minutes {
            if value < 1 {
                return Err(SettingsError::InvalidValue {
                    key: key.into(),
                    message: "must be at least 1".into(),
                });
            }
        }
        if !(1..=MAX_POMODOROS_BEFORE_LONG_BREAK).contains(&self.pomodoros_before_long_break) {
            return Err(SettingsError::InvalidValue {
                key: "timer.pomodoros_before_long_break".into(),
                message: format!("must be between 1 and {MAX_POMODOROS_BEFORE_LONG_BREAK}"),
            });
        }
        Ok(())
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.timer.validate()
    }

    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), SettingsError> {
        let unknown = || SettingsError::UnknownKey(key.to_string());
        let invalid = |message: String| SettingsError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as bool")))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u32>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    // Whole sections are not assignable from a single value.
                    serde_json::Value::Object(_) => return Err(unknown()),
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Get a settings value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Return a copy with `key` set to `value`, validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting settings are out of range.
    pub fn with_value(&self, key: &str, value: &str) -> Result<Self, SettingsError> {
        let mut json = serde_json::to_value(self).map_err(|e| SettingsError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Settings =
            serde_json::from_value(json).map_err(|e| SettingsError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        Ok(updated)
    }
}

/// Read and validate a settings file. `Ok(None)` means the file is absent.
fn read_file(path: &Path) -> Result<Option<Settings>, SettingsError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SettingsError::ReadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    };
    let settings: Settings = toml::from_str(&content).map_err(|e| SettingsError::ReadFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    settings.validate().map_err(|e| SettingsError::ReadFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(Some(settings))
}

fn write_file(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let failed = |message: String| SettingsError::WriteFailed {
        path: path.to_path_buf(),
        message,
    };
    let content = toml::to_string_pretty(settings).map_err(|e| failed(e.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| failed(e.to_string()))?;
    }
    std::fs::write(path, content).map_err(|e| failed(e.to_string()))
}

/// Durable settings source with push-based change notification.
///
/// Holds the last-known-good snapshot. Readers never block on the file:
/// they see the snapshot, and a failed reload leaves it untouched.
pub struct SettingsStore {
    path: Option<PathBuf>,
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    /// Open `<data dir>/settings.toml`.
    ///
    /// # Errors
    /// Returns an error only if the data directory cannot be determined.
    /// An unreadable file falls back to defaults.
    pub fn open() -> Result<Self> {
        Ok(Self::open_at(data_dir()?.join("settings.toml")))
    }

    /// Open a specific settings file.
    ///
    /// A missing file is created with defaults. An unreadable or invalid
    /// file is logged and replaced in memory by defaults; the file itself is
    /// left alone so the user can fix it.
    pub fn open_at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match read_file(&path) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                let settings = Settings::default();
                if let Err(e) = write_file(&path, &settings) {
                    warn!(error = %e, "could not write default settings");
                }
                settings
            }
            Err(e) => {
                warn!(error = %e, "settings unreadable, using defaults");
                Settings::default()
            }
        };
        let (tx, _rx) = watch::channel(settings);
        Self {
            path: Some(path),
            tx,
        }
    }

    /// A store with no backing file.
    pub fn in_memory(settings: Settings) -> Self {
        let (tx, _rx) = watch::channel(settings);
        Self { path: None, tx }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Settings {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> SettingsSubscription {
        SettingsSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Re-read the backing file and publish it if it changed.
    ///
    /// # Errors
    /// Returns `SettingsError::ReadFailed` if the file cannot be read or is
    /// invalid; the last-known-good snapshot stays published.
    pub fn reload(&self) -> Result<Settings> {
        let Some(path) = &self.path else {
            return Ok(self.snapshot());
        };
        match read_file(path) {
            Ok(Some(settings)) => {
                self.publish(settings.clone());
                Ok(settings)
            }
            Ok(None) => Ok(self.snapshot()),
            Err(e) => {
                warn!(error = %e, "settings reload failed, keeping last known good");
                Err(e.into())
            }
        }
    }

    /// Reload the backing file every `period` until the future is dropped.
    ///
    /// This is how edits made by another process (`tomato config set`
    /// while `tomato timer run` is up) reach subscribers. A failed read is
    /// logged by [`reload`](Self::reload) and the last-known-good snapshot
    /// stays published. Never completes.
    pub async fn watch_file(&self, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let _ = self.reload();
        }
    }

    /// Apply `f` to a copy of the snapshot, validate, persist, and publish.
    ///
    /// # Errors
    /// Returns an error if the result is invalid or cannot be written. The
    /// published snapshot is unchanged in that case.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) -> Result<Settings> {
        let mut settings = self.snapshot();
        f(&mut settings);
        settings.validate()?;
        self.persist_and_publish(settings)
    }

    /// Set a dot-path key, e.g. `timer.focus_duration`.
    ///
    /// # Errors
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the settings cannot be saved.
    pub fn set(&self, key: &str, value: &str) -> Result<Settings> {
        let settings = self.snapshot().with_value(key, value)?;
        self.persist_and_publish(settings)
    }

    /// Restore and persist defaults.
    pub fn reset(&self) -> Result<Settings> {
        self.persist_and_publish(Settings::default())
    }

    fn persist_and_publish(&self, settings: Settings) -> Result<Settings> {
        if let Some(path) = &self.path {
            write_file(path, &settings)?;
        }
        self.publish(settings.clone());
        Ok(settings)
    }

    fn publish(&self, settings: Settings) {
        self.tx.send_if_modified(|current| {
            if *current == settings {
                false
            } else {
                debug!(?settings, "settings changed");
                *current = settings;
                true
            }
        });
    }
}

/// Handle on the settings stream. Dropping it ends the subscription.
pub struct SettingsSubscription {
    rx: watch::Receiver<Settings>,
}

impl SettingsSubscription {
    /// The latest snapshot, marking it as seen.
    pub fn current(&mut self) -> Settings {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next published snapshot.
    ///
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Settings> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let t = TimerSettings::default();
        assert_eq!(t.focus_duration, 25);
        assert_eq!(t.break_duration, 5);
        assert_eq!(t.long_break_duration, 30);
        assert_eq!(t.pomodoros_before_long_break, 4);
        assert_eq!(t.daily_pomodori_goal, 1);
        assert!(!t.auto_start_break);
        assert!(!t.auto_start_focus_after_break);
        assert!(!t.auto_start_focus_after_long_break);
        assert!(!Settings::default().notifications.enabled);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let parsed: Settings = toml::from_str("[timer]\nfocus_duration = 50\n").unwrap();
        assert_eq!(parsed.timer.focus_duration, 50);
        assert_eq!(parsed.timer.long_break_duration, 30);
        assert_eq!(parsed.timer.pomodoros_before_long_break, 4);
    }

    #[test]
    fn duration_ms_per_phase() {
        let t = TimerSettings::default();
        assert_eq!(t.duration_ms(PhaseKind::Focus), 25 * 60_000);
        assert_eq!(t.duration_ms(PhaseKind::ShortBreak), 5 * 60_000);
        assert_eq!(t.duration_ms(PhaseKind::LongBreak), 30 * 60_000);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let s = Settings::default();
        assert_eq!(s.get("timer.focus_duration").as_deref(), Some("25"));
        assert_eq!(s.get("display.dark_mode").as_deref(), Some("false"));
        assert!(s.get("timer").is_none());
        assert!(s.get("timer.missing").is_none());
    }

    #[test]
    fn with_value_parses_by_existing_type() {
        let s = Settings::default()
            .with_value("timer.auto_start_break", "true")
            .unwrap()
            .with_value("timer.break_duration", "10")
            .unwrap();
        assert!(s.timer.auto_start_break);
        assert_eq!(s.timer.break_duration, 10);
    }

    #[test]
    fn with_value_rejects_bad_input() {
        let s = Settings::default();
        assert!(matches!(
            s.with_value("timer.nope", "1"),
            Err(SettingsError::UnknownKey(_))
        ));
        assert!(matches!(
            s.with_value("timer.auto_start_break", "maybe"),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            s.with_value("timer.pomodoros_before_long_break", "13"),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            s.with_value("timer.focus_duration", "0"),
            Err(SettingsError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let store = SettingsStore::in_memory(Settings::default());
        let mut sub = store.subscribe();
        assert_eq!(sub.current().timer.focus_duration, 25);

        store.set("timer.focus_duration", "40").unwrap();
        let next = sub.changed().await.unwrap();
        assert_eq!(next.timer.focus_duration, 40);
    }

    #[tokio::test]
    async fn subscription_ends_when_store_dropped() {
        let store = SettingsStore::in_memory(Settings::default());
        let mut sub = store.subscribe();
        drop(store);
        assert!(sub.changed().await.is_none());
    }

    #[test]
    fn identical_update_is_not_republished() {
        let store = SettingsStore::in_memory(Settings::default());
        let mut sub = store.subscribe();
        sub.current();
        store.update(|_| {}).unwrap();
        assert!(!sub.rx.has_changed().unwrap());
    }
}
