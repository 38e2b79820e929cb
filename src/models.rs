//! Data models for the Pomotask application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of Focus sessions that make up one cycle.
pub const SESSIONS_BEFORE_LONG_BREAK: u32 = 4;

/// Version stamped into every persisted snapshot.
pub const CURRENT_DATA_VERSION: u32 = 1;

/// Tasks created on a fresh install.
pub const DEFAULT_TASKS: [&str; 3] = [
    "Create proposal document",
    "Code review",
    "Meeting preparation",
];

/// The three phases of a pomodoro cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    /// Work interval.
    #[default]
    Focus,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    /// Returns true for either kind of break.
    pub fn is_break(&self) -> bool {
        matches!(self, Self::ShortBreak | Self::LongBreak)
    }

    /// Human readable name used in the status line.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Focus => "Focus",
            Self::ShortBreak => "Short Break",
            Self::LongBreak => "Long Break",
        }
    }
}

/// User-configurable settings for the pomodoro timer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Duration of a focus session in seconds.
    pub focus_secs: u32,
    /// Duration of a short break in seconds.
    pub short_break_secs: u32,
    /// Duration of a long break in seconds.
    pub long_break_secs: u32,
    /// Whether the next session starts by itself after a transition.
    pub auto_start: bool,
    /// Whether to play sounds on timer completion.
    pub sound_enabled: bool,
    /// Whether to show system notifications.
    pub notifications_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            focus_secs: 25 * 60,
            short_break_secs: 5 * 60,
            long_break_secs: 15 * 60,
            auto_start: false,
            sound_enabled: true,
            notifications_enabled: true,
        }
    }
}

impl Settings {
    /// Configured length of `mode` in seconds.
    pub fn duration(&self, mode: TimerMode) -> u32 {
        match mode {
            TimerMode::Focus => self.focus_secs,
            TimerMode::ShortBreak => self.short_break_secs,
            TimerMode::LongBreak => self.long_break_secs,
        }
    }
}

/// The shared clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub current_mode: TimerMode,
    /// Seconds left in the current mode, never above its duration.
    pub time_remaining: u32,
    pub is_running: bool,
    /// Focus completions since the last long break.
    pub completed_sessions_in_cycle: u32,
    /// Long breaks entered so far.
    pub completed_cycles: u32,
}

impl TimerState {
    /// Fresh state: a stopped, full-length Focus session with zeroed counters.
    pub fn initial(settings: &Settings) -> Self {
        Self {
            current_mode: TimerMode::Focus,
            time_remaining: settings.duration(TimerMode::Focus),
            is_running: false,
            completed_sessions_in_cycle: 0,
            completed_cycles: 0,
        }
    }

    /// Returns the per-task portion of this state.
    pub fn snapshot(&self) -> TaskTimerState {
        TaskTimerState {
            current_mode: self.current_mode,
            time_remaining: self.time_remaining,
            completed_sessions_in_cycle: self.completed_sessions_in_cycle,
        }
    }

    /// Clamps values that could only come from a corrupt or hand-edited store.
    pub fn sanitized(mut self, settings: &Settings) -> Self {
        self.time_remaining = self
            .time_remaining
            .min(settings.duration(self.current_mode));
        if self.completed_sessions_in_cycle > SESSIONS_BEFORE_LONG_BREAK {
            self.completed_sessions_in_cycle = 0;
        }
        self
    }
}

/// Timer fields that travel with a task when the selection changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTimerState {
    pub current_mode: TimerMode,
    pub time_remaining: u32,
    pub completed_sessions_in_cycle: u32,
}

impl TaskTimerState {
    /// Snapshot for a task that has never been worked on.
    pub fn fresh(settings: &Settings) -> Self {
        Self {
            current_mode: TimerMode::Focus,
            time_remaining: settings.duration(TimerMode::Focus),
            completed_sessions_in_cycle: 0,
        }
    }

    pub fn sanitized(mut self, settings: &Settings) -> Self {
        self.time_remaining = self
            .time_remaining
            .min(settings.duration(self.current_mode));
        if self.completed_sessions_in_cycle > SESSIONS_BEFORE_LONG_BREAK {
            self.completed_sessions_in_cycle = 0;
        }
        self
    }
}

/// A unit of work the user attributes focus sessions to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub is_completed: bool,
    /// Lifetime count of focus sessions finished while this task was selected.
    pub sessions_completed: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_state: Option<TaskTimerState>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_completed: false,
            sessions_completed: 0,
            created_at: now,
            updated_at: now,
            timer_state: None,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Whole-application snapshot written to storage after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedData {
    pub version: u32,
    pub timer: TimerState,
    pub tasks: Vec<Task>,
    pub selected_task_id: Option<Uuid>,
    pub saved_at: DateTime<Utc>,
}

impl PersistedData {
    pub fn new(timer: TimerState, tasks: Vec<Task>, selected_task_id: Option<Uuid>) -> Self {
        Self {
            version: CURRENT_DATA_VERSION,
            timer,
            tasks,
            selected_task_id,
            saved_at: Utc::now(),
        }
    }

    /// Applies the range rules to the timer and to every task snapshot.
    pub fn sanitized(mut self, settings: &Settings) -> Self {
        self.timer = self.timer.sanitized(settings);
        for task in &mut self.tasks {
            task.timer_state = task.timer_state.map(|s| s.sanitized(settings));
        }
        if let Some(id) = self.selected_task_id {
            if !self.tasks.iter().any(|t| t.id == id) {
                self.selected_task_id = None;
            }
        }
        self
    }
}

/// Elapsed fraction of a session as a percentage in `[0, 100]`.
pub fn progress(remaining: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let elapsed = total as f64 - remaining as f64;
    (elapsed / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Mode that follows `current` given the focus sessions completed in the cycle.
pub fn next_mode(current: TimerMode, completed_focus_sessions: u32) -> TimerMode {
    match current {
        TimerMode::Focus
            if completed_focus_sessions > 0
                && completed_focus_sessions % SESSIONS_BEFORE_LONG_BREAK == 0 =>
        {
            TimerMode::LongBreak
        }
        TimerMode::Focus => TimerMode::ShortBreak,
        TimerMode::ShortBreak | TimerMode::LongBreak => TimerMode::Focus,
    }
}

/// Formats time in MM:SS format.
pub fn format_time(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
