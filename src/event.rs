//! Command handling for the interactive prompt.

use crate::app::App;
use crate::engine::CompletionEvent;
use crate::models::{format_time, TimerMode};
use crate::tasks::TaskStore;
use uuid::Uuid;

// Command words as constants
pub const CMD_START: &str = "start";
pub const CMD_PAUSE: &str = "pause";
pub const CMD_RESET: &str = "reset";
pub const CMD_SKIP: &str = "skip";
pub const CMD_FOCUS: &str = "focus";
pub const CMD_SHORT: &str = "short";
pub const CMD_LONG: &str = "long";
pub const CMD_ADD: &str = "add";
pub const CMD_DELETE: &str = "delete";
pub const CMD_TOGGLE: &str = "toggle";
pub const CMD_SELECT: &str = "select";
pub const CMD_TASKS: &str = "tasks";
pub const CMD_STATUS: &str = "status";
pub const CMD_SOUND: &str = "sound";
pub const CMD_NOTIFY: &str = "notify";
pub const CMD_AUTO: &str = "auto";
pub const CMD_CLEAR: &str = "clear";
pub const CMD_QUIT: &str = "quit";

/// Result of handling a command.
#[derive(Debug, Clone, PartialEq)]
pub enum EventResult {
    /// Event handled, nothing to show.
    Continue,
    /// User requested quit.
    Quit,
    /// State changed, status line needs update.
    StateChanged,
    /// State changed with a completion event.
    StateChangedWithCompletion(CompletionEvent),
    /// Text to show to the user.
    Output(String),
    /// The input was not understood.
    Invalid(String),
}

/// Input arriving at the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A line typed at the prompt.
    Line(String),
    /// Ctrl-C or a termination signal.
    Interrupted,
}

/// Handles one piece of input. An interrupt quits like the `quit` command.
pub fn handle_input(app: &mut App, input: Input) -> EventResult {
    match input {
        Input::Line(line) => handle_command(app, &line),
        Input::Interrupted => EventResult::Quit,
    }
}

/// Handles one line of user input and updates the app state accordingly.
pub fn handle_command(app: &mut App, line: &str) -> EventResult {
    let line = line.trim();
    let (word, arg) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word {
        "" => EventResult::Continue,
        CMD_START => {
            app.start();
            EventResult::StateChanged
        }
        CMD_PAUSE => {
            app.pause();
            EventResult::StateChanged
        }
        CMD_RESET => {
            app.reset();
            EventResult::StateChanged
        }
        CMD_SKIP => EventResult::StateChangedWithCompletion(app.skip()),
        CMD_FOCUS => {
            app.switch_mode(TimerMode::Focus);
            EventResult::StateChanged
        }
        CMD_SHORT => {
            app.switch_mode(TimerMode::ShortBreak);
            EventResult::StateChanged
        }
        CMD_LONG => {
            app.switch_mode(TimerMode::LongBreak);
            EventResult::StateChanged
        }
        CMD_ADD => match app.add_task(arg) {
            Some(_) => EventResult::Output(format_task_list(&app.tasks)),
            None => EventResult::Invalid("task name must not be empty".to_string()),
        },
        CMD_DELETE => with_task(app, arg, |app, id| app.delete_task(id)),
        CMD_TOGGLE => with_task(app, arg, |app, id| app.toggle_task(id)),
        CMD_SELECT if arg == "none" => {
            app.select_task(None);
            EventResult::StateChanged
        }
        CMD_SELECT => match resolve_task(&app.tasks, arg) {
            Some(id) => {
                app.select_task(Some(id));
                EventResult::StateChanged
            }
            None => EventResult::Invalid(format!("no task {:?}", arg)),
        },
        CMD_TASKS => EventResult::Output(format_task_list(&app.tasks)),
        CMD_STATUS => EventResult::StateChanged,
        CMD_SOUND => {
            app.update_setting(|s| s.sound_enabled = !s.sound_enabled);
            EventResult::Output(format!("sound {}", on_off(app.settings().sound_enabled)))
        }
        CMD_NOTIFY => {
            app.update_setting(|s| s.notifications_enabled = !s.notifications_enabled);
            EventResult::Output(format!(
                "notifications {}",
                on_off(app.settings().notifications_enabled)
            ))
        }
        CMD_AUTO => {
            app.update_setting(|s| s.auto_start = !s.auto_start);
            EventResult::Output(format!("auto start {}", on_off(app.settings().auto_start)))
        }
        CMD_CLEAR => {
            app.reset_data();
            EventResult::StateChanged
        }
        CMD_QUIT => EventResult::Quit,
        _ => {
            // Duration changes look like "focus_secs=1500"
            if let Some(result) = handle_duration_change(app, line) {
                return result;
            }
            EventResult::Invalid(format!("unknown command {:?}", word))
        }
    }
}

/// Handles duration setting changes of the form `<mode>_secs=<n>`.
fn handle_duration_change(app: &mut App, line: &str) -> Option<EventResult> {
    let (key, value) = line.split_once('=')?;
    let secs = value.trim().parse::<u32>().ok().filter(|s| *s > 0)?;
    match key.trim() {
        "focus_secs" => app.update_setting(|s| s.focus_secs = secs),
        "short_break_secs" => app.update_setting(|s| s.short_break_secs = secs),
        "long_break_secs" => app.update_setting(|s| s.long_break_secs = secs),
        _ => return None,
    }
    Some(EventResult::StateChanged)
}

fn with_task<F>(app: &mut App, arg: &str, action: F) -> EventResult
where
    F: FnOnce(&mut App, Uuid),
{
    match resolve_task(&app.tasks, arg) {
        Some(id) => {
            action(app, id);
            EventResult::Output(format_task_list(&app.tasks))
        }
        None => EventResult::Invalid(format!("no task {:?}", arg)),
    }
}

/// Resolves a 1-based position in the task list.
fn resolve_task(tasks: &TaskStore, arg: &str) -> Option<Uuid> {
    let index = arg.parse::<usize>().ok()?.checked_sub(1)?;
    tasks.tasks().get(index).map(|t| t.id)
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Renders the numbered task list with selection and completion markers.
pub fn format_task_list(tasks: &TaskStore) -> String {
    if tasks.is_empty() {
        return "no tasks".to_string();
    }
    let selected = tasks.selected_task_id();
    let mut out = String::new();
    for (i, task) in tasks.tasks().iter().enumerate() {
        let marker = if Some(task.id) == selected { '>' } else { ' ' };
        let check = if task.is_completed { 'x' } else { ' ' };
        let saved = task
            .timer_state
            .map(|s| format!(" ({} {})", s.current_mode.label(), format_time(s.time_remaining)))
            .unwrap_or_default();
        out.push_str(&format!(
            "{} {}. [{}] {} - {} sessions{}\n",
            marker,
            i + 1,
            check,
            task.name,
            task.sessions_completed,
            saved
        ));
    }
    out.push_str(&format!(
        "{} tasks, {} active, {} done, {} sessions total",
        tasks.len(),
        tasks.active_tasks().count(),
        tasks.completed_tasks().count(),
        tasks.total_sessions()
    ));
    out
}
