//! System notifications for session transitions.

use crate::engine::CompletionEvent;
use crate::models::Settings;
use notify_rust::Notification;
use std::thread;
use tracing::warn;

/// Which emitters fire when a session completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alerts {
    pub chime: bool,
    pub notification: bool,
    pub long_break_mins: u32,
}

impl Alerts {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            chime: settings.sound_enabled,
            notification: settings.notifications_enabled,
            long_break_mins: settings.long_break_secs / 60,
        }
    }
}

/// Title and body of the notification shown for `event`.
pub fn notification_text(event: CompletionEvent, long_break_mins: u32) -> (String, String) {
    match event {
        CompletionEvent::FocusComplete {
            is_long_break: true,
            ..
        } => (
            "Long Break Time! 🎉".to_string(),
            format!(
                "Cycle complete. You've earned a {} minute break.",
                long_break_mins
            ),
        ),
        CompletionEvent::FocusComplete {
            sessions_in_cycle, ..
        } => (
            "Focus Complete! 🍅".to_string(),
            format!(
                "{} of 4 sessions done in this cycle.\nTime for a short break.",
                sessions_in_cycle
            ),
        ),
        CompletionEvent::ShortBreakComplete => (
            "Break Over! ☕".to_string(),
            "Ready for the next focus session?".to_string(),
        ),
        CompletionEvent::LongBreakComplete => (
            "Long Break Over! 🌱".to_string(),
            "A new cycle starts now.".to_string(),
        ),
    }
}

/// Shows a notification for a completed session.
/// Runs in a background thread to avoid blocking.
pub fn notify_completion(event: CompletionEvent, long_break_mins: u32) {
    let (summary, body) = notification_text(event, long_break_mins);
    thread::spawn(move || {
        if let Err(e) = Notification::new()
            .summary(&summary)
            .body(&body)
            .sound_name("default")
            .show()
        {
            warn!(error = %e, "failed to show notification");
        }
    });
}
