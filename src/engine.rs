//! Timer state machine.
//!
//! The engine has no thread of its own. A driver calls [`Engine::tick`] once
//! per second while the timer runs, and [`Engine::tick_multiple`] after the
//! process was suspended. Every transition between modes is reported back to
//! the caller as a [`CompletionEvent`].

use crate::models::{next_mode, progress, Settings, TaskTimerState, TimerMode, TimerState};
use tracing::{debug, info};

/// A finished session, reported so the caller can notify the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEvent {
    /// A focus session ended; `sessions_in_cycle` is the count after it.
    FocusComplete {
        sessions_in_cycle: u32,
        is_long_break: bool,
    },
    ShortBreakComplete,
    LongBreakComplete,
}

/// The single shared pomodoro clock.
#[derive(Debug, Clone)]
pub struct Engine {
    state: TimerState,
    settings: Settings,
}

impl Engine {
    /// Creates an engine in the initial state for the given settings.
    pub fn new(settings: Settings) -> Self {
        Self {
            state: TimerState::initial(&settings),
            settings,
        }
    }

    /// Creates an engine from a previously persisted state.
    pub fn restore(settings: Settings, state: TimerState) -> Self {
        Self {
            state: state.sanitized(&settings),
            settings,
        }
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    /// Length of the current mode in seconds.
    pub fn total_secs(&self) -> u32 {
        self.settings.duration(self.state.current_mode)
    }

    /// Percentage of the current session already elapsed.
    pub fn progress(&self) -> f64 {
        progress(self.state.time_remaining, self.total_secs())
    }

    /// Replaces the duration table.
    ///
    /// A stopped session that has not been touched yet is refilled with the
    /// new duration; otherwise the remaining time is clamped to it.
    pub fn set_settings(&mut self, settings: Settings) {
        let untouched =
            !self.state.is_running && self.state.time_remaining == self.total_secs();
        self.settings = settings;
        self.state.time_remaining = if untouched {
            self.total_secs()
        } else {
            self.state.time_remaining.min(self.total_secs())
        };
    }

    pub fn start(&mut self) {
        self.state.is_running = true;
    }

    pub fn pause(&mut self) {
        self.state.is_running = false;
    }

    /// Refills the current mode and stops. Mode and counters are kept.
    pub fn reset(&mut self) {
        self.state.time_remaining = self.total_secs();
        self.state.is_running = false;
    }

    /// Advances the clock by one second.
    ///
    /// Landing on zero completes the session in the same call.
    pub fn tick(&mut self) -> Option<CompletionEvent> {
        if !self.state.is_running || self.state.time_remaining == 0 {
            return None;
        }
        self.state.time_remaining -= 1;
        if self.state.time_remaining == 0 {
            Some(self.complete_session())
        } else {
            None
        }
    }

    /// Advances the clock by `seconds`, crossing as many session boundaries
    /// as the budget covers.
    ///
    /// Consumption stops as soon as the timer is no longer running; whatever
    /// is left of the budget at that point is dropped.
    pub fn tick_multiple(&mut self, seconds: u64) -> Vec<CompletionEvent> {
        let mut budget = seconds;
        let mut events = Vec::new();

        while budget > 0 && self.state.is_running && self.state.time_remaining > 0 {
            let step = budget.min(u64::from(self.state.time_remaining));
            // step <= time_remaining, which fits in u32
            self.state.time_remaining -= step as u32;
            budget -= step;
            if self.state.time_remaining == 0 {
                events.push(self.complete_session());
            }
        }

        if budget > 0 {
            debug!(discarded_secs = budget, "timer stopped before elapsed time was consumed");
        }
        events
    }

    /// Enters `mode` with a full clock. This never resumes a partial session.
    pub fn switch_mode(&mut self, mode: TimerMode, auto_start: bool) {
        self.state.current_mode = mode;
        self.state.time_remaining = self.settings.duration(mode);
        self.state.is_running = auto_start;
    }

    /// Ends the current session and moves to the next mode.
    ///
    /// The next session starts running only when `auto_start` is enabled in
    /// the settings.
    pub fn complete_session(&mut self) -> CompletionEvent {
        let auto_start = self.settings.auto_start;
        let event = match self.state.current_mode {
            TimerMode::Focus => {
                let sessions = self.state.completed_sessions_in_cycle + 1;
                let next = next_mode(TimerMode::Focus, sessions);
                let is_long_break = next == TimerMode::LongBreak;
                self.state.completed_sessions_in_cycle = sessions;
                if is_long_break {
                    self.state.completed_cycles += 1;
                }
                self.switch_mode(next, auto_start);
                CompletionEvent::FocusComplete {
                    sessions_in_cycle: sessions,
                    is_long_break,
                }
            }
            TimerMode::ShortBreak => {
                self.switch_mode(TimerMode::Focus, auto_start);
                CompletionEvent::ShortBreakComplete
            }
            TimerMode::LongBreak => {
                self.state.completed_sessions_in_cycle = 0;
                self.switch_mode(TimerMode::Focus, auto_start);
                CompletionEvent::LongBreakComplete
            }
        };
        info!(?event, mode = ?self.state.current_mode, "session complete");
        event
    }

    /// Sets the remaining time directly, capped at the current mode's duration.
    pub fn set_time_remaining(&mut self, secs: u32) {
        self.state.time_remaining = secs.min(self.total_secs());
    }

    pub fn set_completed_sessions(&mut self, count: u32) {
        self.state.completed_sessions_in_cycle = count;
    }

    /// Loads a task's saved timer position. The timer is left stopped and the
    /// global cycle count is untouched.
    pub fn apply_snapshot(&mut self, snapshot: TaskTimerState) {
        let snapshot = snapshot.sanitized(&self.settings);
        self.switch_mode(snapshot.current_mode, false);
        self.set_time_remaining(snapshot.time_remaining);
        self.set_completed_sessions(snapshot.completed_sessions_in_cycle);
    }
}
