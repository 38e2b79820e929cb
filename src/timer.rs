//! Timer tick loop for driving the engine once per second.

use crate::app::App;
use crate::engine::CompletionEvent;
use crate::models::{format_time, TimerState, SESSIONS_BEFORE_LONG_BREAK};
use crate::recovery::{SignalHub, SuspendDetector};
use chrono::Utc;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{error, info};

/// A wake-up later than this after the previous one counts as a suspension.
pub const SUSPEND_THRESHOLD_SECS: i64 = 2;

/// Message sent from the timer thread to the main thread.
#[derive(Debug, Clone)]
pub enum TimerMessage {
    /// Timer state has changed, status line needs update.
    StateChanged { status: String },
    /// A session completed, trigger notification/sound.
    Completed(CompletionEvent),
}

/// Runs the timer loop, ticking every second.
///
/// When the thread wakes up much later than expected the machine was asleep;
/// the gap is reported through `hub` and credited by the app's background
/// recovery instead of by a single tick.
pub fn run_timer_loop(app: Arc<Mutex<App>>, hub: Arc<Mutex<SignalHub>>, tx: Sender<TimerMessage>) {
    let mut detector = SuspendDetector::new(
        Utc::now(),
        chrono::Duration::seconds(SUSPEND_THRESHOLD_SECS),
    );

    loop {
        thread::sleep(Duration::from_secs(1));
        let now = Utc::now();

        let Ok(mut app) = app.lock() else {
            error!("app state poisoned, stopping timer loop");
            return;
        };

        let (changed, completions) = match detector.observe(now) {
            Some(events) => {
                info!("wake-up gap detected, recovering elapsed time");
                if let Ok(mut hub) = hub.lock() {
                    for event in events {
                        hub.emit(event);
                    }
                }
                (true, app.process_lifecycle())
            }
            None => {
                let (changed, event) = app.tick();
                (changed, event.into_iter().collect::<Vec<_>>())
            }
        };

        for event in completions {
            if tx.send(TimerMessage::Completed(event)).is_err() {
                return;
            }
        }

        if changed {
            let status = format_status(&app);
            if tx.send(TimerMessage::StateChanged { status }).is_err() {
                return;
            }
        }
    }
}

/// Formats the status line for the app's current state.
pub fn format_status(app: &App) -> String {
    let task = app.tasks.selected_task().map(|t| t.name.as_str());
    format_status_line(app.state(), app.engine.progress(), task)
}

/// Formats the status line: icon, clock, progress, cycle position and
/// selected task.
pub fn format_status_line(state: &TimerState, progress: f64, task: Option<&str>) -> String {
    let icon = if !state.is_running {
        "⏸"
    } else if state.current_mode.is_break() {
        "☕"
    } else {
        "🍅"
    };
    let mut line = format!(
        "{} {} {} {:>3.0}% [{}/{}]",
        icon,
        state.current_mode.label(),
        format_time(state.time_remaining),
        progress,
        state.completed_sessions_in_cycle,
        SESSIONS_BEFORE_LONG_BREAK
    );
    if let Some(task) = task {
        line.push_str(" · ");
        line.push_str(task);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimerMode;

    fn state(mode: TimerMode, remaining: u32, running: bool, sessions: u32) -> TimerState {
        TimerState {
            current_mode: mode,
            time_remaining: remaining,
            is_running: running,
            completed_sessions_in_cycle: sessions,
            completed_cycles: 0,
        }
    }

    #[test]
    fn test_format_status_focus_running() {
        let s = state(TimerMode::Focus, 1432, true, 1);
        assert_eq!(format_status_line(&s, 4.6, None), "🍅 Focus 23:52   5% [1/4]");
    }

    #[test]
    fn test_format_status_paused() {
        let s = state(TimerMode::Focus, 600, false, 0);
        assert_eq!(format_status_line(&s, 60.0, None), "⏸ Focus 10:00  60% [0/4]");
    }

    #[test]
    fn test_format_status_break_with_task() {
        let s = state(TimerMode::ShortBreak, 272, true, 2);
        assert_eq!(
            format_status_line(&s, 9.3, Some("Code review")),
            "☕ Short Break 04:32   9% [2/4] · Code review"
        );
    }

    #[test]
    fn test_format_status_long_break() {
        let s = state(TimerMode::LongBreak, 900, true, 4);
        assert_eq!(format_status_line(&s, 0.0, None), "☕ Long Break 15:00   0% [4/4]");
    }
}
