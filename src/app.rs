//! Main application state and logic.

use crate::engine::{CompletionEvent, Engine};
use crate::models::{PersistedData, Settings, TimerMode, TimerState};
use crate::persistence::{Database, DatabaseError};
use crate::recovery::{BackgroundSync, LifecycleEvent, LifecycleSignal};
use crate::tasks::TaskStore;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// What was last written to storage, minus the save timestamp.
#[derive(Debug, Clone, PartialEq)]
struct Saved {
    timer: TimerState,
    tasks: TaskStore,
}

/// Main application state: the shared timer, the task list and storage.
///
/// Every public mutation ends in [`App::persist`], which writes a snapshot
/// only when something actually changed.
pub struct App {
    pub engine: Engine,
    pub tasks: TaskStore,
    pub db: Database,
    sync: BackgroundSync,
    last_saved: Option<Saved>,
}

impl App {
    /// Creates a new application instance backed by the default database.
    pub fn new() -> Result<Self, AppError> {
        let db = Database::new()?;
        Ok(Self::new_with_db(db))
    }

    /// Creates an app on top of an already opened database.
    ///
    /// Unreadable settings or snapshots fall back to a fresh install.
    pub fn new_with_db(db: Database) -> Self {
        let settings = db.load_settings().unwrap_or_else(|e| {
            warn!(error = %e, "using default settings");
            Settings::default()
        });

        let (engine, tasks) = match db.load_snapshot() {
            Some(data) => {
                let data = data.sanitized(&settings);
                info!(tasks = data.tasks.len(), "restored saved state");
                (
                    Engine::restore(settings, data.timer),
                    TaskStore::new(data.tasks, data.selected_task_id),
                )
            }
            None => {
                info!("no saved state, starting fresh");
                (Engine::new(settings), TaskStore::with_defaults())
            }
        };

        let mut app = Self {
            engine,
            tasks,
            db,
            sync: BackgroundSync::new(),
            last_saved: None,
        };
        app.persist();
        app
    }

    pub fn state(&self) -> &TimerState {
        self.engine.state()
    }

    pub fn settings(&self) -> &Settings {
        self.engine.settings()
    }

    pub fn start(&mut self) {
        self.engine.start();
        self.persist();
    }

    pub fn pause(&mut self) {
        self.engine.pause();
        self.persist();
    }

    pub fn reset(&mut self) {
        self.engine.reset();
        self.persist();
    }

    /// Jumps to `mode` with a full, stopped clock.
    pub fn switch_mode(&mut self, mode: TimerMode) {
        self.engine.switch_mode(mode, false);
        self.persist();
    }

    /// Ends the current session right away.
    pub fn skip(&mut self) -> CompletionEvent {
        let event = self.engine.complete_session();
        self.record_completion(event);
        self.persist();
        event
    }

    /// Advances the timer by one second.
    /// Returns (state_changed, optional_completion_event).
    pub fn tick(&mut self) -> (bool, Option<CompletionEvent>) {
        if !self.engine.is_running() {
            return (false, None);
        }
        let event = self.engine.tick();
        if let Some(event) = event {
            self.record_completion(event);
        }
        self.persist();
        (true, event)
    }

    /// Credits `secs` of background time to the timer.
    pub fn resume(&mut self, secs: u64) -> Vec<CompletionEvent> {
        let events = self.engine.tick_multiple(secs);
        for event in &events {
            self.record_completion(*event);
        }
        self.persist();
        events
    }

    /// Subscribes to host visibility changes.
    pub fn attach_lifecycle(&mut self, signal: &mut impl LifecycleSignal) {
        self.sync.attach(signal);
    }

    pub fn detach_lifecycle(&mut self, signal: &mut impl LifecycleSignal) {
        self.sync.detach(signal);
    }

    /// Handles every lifecycle event received since the last call.
    pub fn process_lifecycle(&mut self) -> Vec<CompletionEvent> {
        let mut events = Vec::new();
        for event in self.sync.pending() {
            events.extend(self.handle_lifecycle(event));
        }
        events
    }

    /// Handles one visibility change directly.
    pub fn handle_lifecycle(&mut self, event: LifecycleEvent) -> Vec<CompletionEvent> {
        match self.sync.handle(event, &self.db, self.engine.is_running()) {
            Some(secs) => self.resume(secs),
            None => Vec::new(),
        }
    }

    /// Credits time that passed while the process was not running at all.
    pub fn recover_on_start(&mut self, now: DateTime<Utc>) -> Vec<CompletionEvent> {
        match BackgroundSync::check_on_start(&self.db, now) {
            Some(secs) => self.resume(secs),
            None => Vec::new(),
        }
    }

    /// Leaves the host: records the moment of leaving if the timer runs, so
    /// a later start can credit the time away, then unsubscribes.
    pub fn shutdown(&mut self, signal: &mut impl LifecycleSignal, now: DateTime<Utc>) {
        self.handle_lifecycle(LifecycleEvent::Hidden { at: now });
        self.detach_lifecycle(signal);
        info!(running = self.engine.is_running(), "pomotask shut down");
    }

    /// Adds a task. Names are trimmed; blank names are rejected.
    pub fn add_task(&mut self, name: &str) -> Option<Uuid> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let id = self.tasks.add_task(name);
        self.persist();
        Some(id)
    }

    pub fn delete_task(&mut self, id: Uuid) {
        self.tasks.delete_task(id);
        self.persist();
    }

    pub fn toggle_task(&mut self, id: Uuid) {
        self.tasks.toggle_completion(id);
        self.persist();
    }

    /// Moves the timer over to another task.
    ///
    /// The outgoing task keeps a snapshot of where its cycle was; the incoming
    /// task's snapshot (or a fresh focus session) is loaded into the engine.
    pub fn select_task(&mut self, id: Option<Uuid>) {
        let current = self.tasks.selected_task_id();
        if current == id {
            return;
        }
        if let Some(outgoing) = current {
            let snapshot = self.engine.state().snapshot();
            self.tasks.save_timer_state(outgoing, snapshot);
        }
        self.tasks.select_task(id);
        if let Some(incoming) = id {
            let snapshot = self.tasks.get_timer_state(incoming, self.engine.settings());
            self.engine.apply_snapshot(snapshot);
        }
        self.persist();
    }

    /// Updates a setting and saves to database.
    pub fn update_setting<F>(&mut self, updater: F)
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.engine.settings().clone();
        updater(&mut settings);
        if let Err(e) = self.db.save_settings(&settings) {
            warn!(error = %e, "failed to save settings");
        }
        self.engine.set_settings(settings);
        self.persist();
    }

    /// Wipes all stored data and starts over as a fresh install.
    pub fn reset_data(&mut self) {
        if let Err(e) = self.db.clear_all() {
            warn!(error = %e, "failed to clear stored data");
        }
        self.engine = Engine::new(Settings::default());
        self.tasks = TaskStore::with_defaults();
        self.last_saved = None;
        self.persist();
    }

    /// Writes a snapshot if the timer or the tasks changed since the last one.
    pub fn persist(&mut self) {
        let current = Saved {
            timer: self.engine.state().clone(),
            tasks: self.tasks.clone(),
        };
        if self.last_saved.as_ref() == Some(&current) {
            return;
        }
        let data = PersistedData::new(
            current.timer.clone(),
            current.tasks.tasks().to_vec(),
            current.tasks.selected_task_id(),
        );
        match self.db.save_snapshot(&data) {
            Ok(()) => self.last_saved = Some(current),
            Err(e) => warn!(error = %e, "failed to save snapshot"),
        }
    }

    fn record_completion(&mut self, event: CompletionEvent) {
        if let CompletionEvent::FocusComplete { .. } = event {
            if let Some(id) = self.tasks.selected_task_id() {
                self.tasks.increment_session_count(id);
            }
        }
    }
}
