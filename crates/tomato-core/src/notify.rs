//! Notification text for phase transitions.
//!
//! Nothing here talks to the OS. Callers subscribe to engine events, ask
//! for a [`Notification`], and hand it to whatever desktop or terminal
//! surface they have.

use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::stats::DailyProgress;
use crate::storage::NotificationSettings;
use crate::timer::{PhaseKind, TransitionCause};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    fn new(title: &str, body: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            body: body.into(),
        }
    }
}

/// Notification for a natural phase completion, if the toggles allow it.
///
/// Only [`Event::PhaseCompleted`] produces anything; skips and controls are
/// silent.
pub fn notification_for(event: &Event, settings: &NotificationSettings) -> Option<Notification> {
    if !settings.enabled {
        return None;
    }
    let Event::PhaseCompleted {
        to,
        cause,
        cycle_position,
        ..
    } = event
    else {
        return None;
    };

    match (cause, to) {
        (TransitionCause::FocusToBreak, PhaseKind::LongBreak) if settings.long_break => Some(
            Notification::new(to.label(), "Cycle finished. Time for a long break."),
        ),
        (TransitionCause::FocusToBreak, PhaseKind::ShortBreak) if settings.short_break => {
            Some(Notification::new(
                to.label(),
                format!("Pomodoro {cycle_position} done. Take a short break."),
            ))
        }
        (TransitionCause::BreakToFocus, _) if settings.focus => Some(Notification::new(
            to.label(),
            "Break is over. Back to work.",
        )),
        (TransitionCause::LongBreakCompleted, _) if settings.pomodoro_loop => Some(
            Notification::new("New cycle", "Long break is over. Starting a new cycle."),
        ),
        _ => None,
    }
}

/// Fires once, on the session that makes the day's count hit the goal.
pub fn goal_notification(
    progress: &DailyProgress,
    settings: &NotificationSettings,
) -> Option<Notification> {
    if !settings.enabled || !settings.daily_goal_reached || progress.completed != progress.goal {
        return None;
    }
    Some(Notification::new(
        "Daily goal reached",
        format!("{} pomodori completed today.", progress.completed),
    ))
}
