//! Task list, selection and per-task timer snapshots.

use crate::models::{Settings, Task, TaskTimerState, DEFAULT_TASKS};
use uuid::Uuid;

/// Owns the task collection and the current selection.
///
/// The store never touches the timer. Switching the timer between tasks is
/// done by the caller through [`TaskStore::save_timer_state`] and
/// [`TaskStore::get_timer_state`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskStore {
    tasks: Vec<Task>,
    selected_task_id: Option<Uuid>,
}

impl TaskStore {
    pub fn new(tasks: Vec<Task>, selected_task_id: Option<Uuid>) -> Self {
        let selected_task_id = selected_task_id.filter(|id| tasks.iter().any(|t| t.id == *id));
        Self {
            tasks,
            selected_task_id,
        }
    }

    /// Store for a fresh install: the default tasks, with the first selected.
    pub fn with_defaults() -> Self {
        let tasks: Vec<Task> = DEFAULT_TASKS.iter().map(|name| Task::new(*name)).collect();
        let selected = tasks.first().map(|t| t.id);
        Self::new(tasks, selected)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn selected_task_id(&self) -> Option<Uuid> {
        self.selected_task_id
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.selected_task_id.and_then(|id| self.get(id))
    }

    /// Appends a new task and returns its id.
    pub fn add_task(&mut self, name: impl Into<String>) -> Uuid {
        let task = Task::new(name);
        let id = task.id;
        self.tasks.push(task);
        id
    }

    /// Removes a task, clearing the selection if it pointed at it.
    pub fn delete_task(&mut self, id: Uuid) {
        self.tasks.retain(|t| t.id != id);
        if self.selected_task_id == Some(id) {
            self.selected_task_id = None;
        }
    }

    pub fn toggle_completion(&mut self, id: Uuid) {
        self.update(id, |task| task.is_completed = !task.is_completed);
    }

    pub fn increment_session_count(&mut self, id: Uuid) {
        self.update(id, |task| task.sessions_completed += 1);
    }

    pub fn select_task(&mut self, id: Option<Uuid>) {
        self.selected_task_id = id;
    }

    /// Overwrites the timer snapshot stored on a task.
    pub fn save_timer_state(&mut self, id: Uuid, snapshot: TaskTimerState) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.timer_state = Some(snapshot);
        }
    }

    /// Snapshot stored on a task, or a fresh focus session when there is none.
    pub fn get_timer_state(&self, id: Uuid, settings: &Settings) -> TaskTimerState {
        self.get(id)
            .and_then(|t| t.timer_state)
            .unwrap_or_else(|| TaskTimerState::fresh(settings))
    }

    pub fn active_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| !t.is_completed)
    }

    pub fn completed_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.is_completed)
    }

    pub fn total_sessions(&self) -> u32 {
        self.tasks.iter().map(|t| t.sessions_completed).sum()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn update<F>(&mut self, id: Uuid, updater: F)
    where
        F: FnOnce(&mut Task),
    {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            updater(task);
            task.touch();
        }
    }
}
