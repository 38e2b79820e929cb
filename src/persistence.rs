//! SQLite persistence layer for settings, the app snapshot and the
//! background timestamp.

use crate::models::{PersistedData, Settings, CURRENT_DATA_VERSION};
use crate::recovery::TimestampStore;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to create database directory")]
    DirectoryCreation,
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens the database in the user's data directory, initializing tables if needed.
    pub fn new() -> Result<Self, DatabaseError> {
        Self::open(&Self::db_path())
    }

    /// Opens (or creates) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|_| DatabaseError::DirectoryCreation)?;
        }

        let conn = Connection::open(path)?;
        Self::initialize_tables(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing).
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_tables(&conn)?;
        Ok(Self { conn })
    }

    fn initialize_tables(conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS snapshot (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS background (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    fn db_path() -> PathBuf {
        ProjectDirs::from("com", "pomotask", "Pomotask")
            .map(|dirs| dirs.data_dir().join("pomotask.db"))
            .unwrap_or_else(|| PathBuf::from("pomotask.db"))
    }

    /// Loads settings from the database, returning defaults if not found.
    pub fn load_settings(&self) -> Result<Settings, DatabaseError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'config'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(j) => Ok(serde_json::from_str(&j)?),
            None => Ok(Settings::default()),
        }
    }

    /// Saves settings to the database.
    pub fn save_settings(&self, settings: &Settings) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(settings)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES ('config', ?)",
            [&json],
        )?;
        Ok(())
    }

    /// Writes the whole-app snapshot, replacing the previous one.
    pub fn save_snapshot(&self, data: &PersistedData) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(data)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO snapshot (key, value) VALUES ('app', ?)",
            [&json],
        )?;
        Ok(())
    }

    /// Reads the stored snapshot. `Ok(None)` means nothing was saved yet.
    pub fn try_load_snapshot(&self) -> Result<Option<PersistedData>, DatabaseError> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT value FROM snapshot WHERE key = 'app'", [], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(json) = json else {
            return Ok(None);
        };
        let data: PersistedData = serde_json::from_str(&json)?;
        if data.version != CURRENT_DATA_VERSION {
            return Err(DatabaseError::UnsupportedVersion {
                found: data.version,
                expected: CURRENT_DATA_VERSION,
            });
        }
        Ok(Some(data))
    }

    /// Like [`Database::try_load_snapshot`], but any failure is logged and
    /// reported as "no snapshot".
    pub fn load_snapshot(&self) -> Option<PersistedData> {
        match self.try_load_snapshot() {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "ignoring stored snapshot");
                None
            }
        }
    }

    /// Removes all persisted data, including settings.
    pub fn clear_all(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(
            r#"
            DELETE FROM settings;
            DELETE FROM snapshot;
            DELETE FROM background;
        "#,
        )?;
        Ok(())
    }

    fn take_background_time(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let millis: Option<i64> = self
            .conn
            .query_row(
                "DELETE FROM background WHERE key = 'background_time' RETURNING value",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }
}

impl TimestampStore for Database {
    fn save_background_time(&self, at: DateTime<Utc>) {
        let result = self.conn.execute(
            "INSERT OR REPLACE INTO background (key, value) VALUES ('background_time', ?)",
            [at.timestamp_millis()],
        );
        if let Err(e) = result {
            warn!(error = %e, "failed to save background time");
        }
    }

    fn get_and_clear_background_time(&self) -> Option<DateTime<Utc>> {
        match self.take_background_time() {
            Ok(at) => at,
            Err(e) => {
                warn!(error = %e, "failed to read background time");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Task, TaskTimerState, TimerMode, TimerState};
    use chrono::TimeZone;

    fn sample_snapshot() -> PersistedData {
        let settings = Settings::default();
        let mut task = Task::new("Code review");
        task.sessions_completed = 3;
        task.timer_state = Some(TaskTimerState {
            current_mode: TimerMode::ShortBreak,
            time_remaining: 120,
            completed_sessions_in_cycle: 3,
        });
        let selected = Some(task.id);
        let timer = TimerState {
            current_mode: TimerMode::ShortBreak,
            time_remaining: 120,
            is_running: true,
            completed_sessions_in_cycle: 3,
            completed_cycles: 2,
        };
        let data = PersistedData::new(timer, vec![task, Task::new("Meeting preparation")], selected);
        data.sanitized(&settings)
    }

    #[test]
    fn test_database_creation() {
        let db = Database::new_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_settings_save_and_load() {
        let db = Database::new_in_memory().unwrap();

        // Default settings should be returned when nothing is saved
        let settings = db.load_settings().unwrap();
        assert_eq!(settings, Settings::default());

        let custom_settings = Settings {
            focus_secs: 120,
            short_break_secs: 60,
            long_break_secs: 60,
            auto_start: true,
            sound_enabled: false,
            notifications_enabled: true,
        };
        db.save_settings(&custom_settings).unwrap();

        let loaded = db.load_settings().unwrap();
        assert_eq!(loaded, custom_settings);
    }

    #[test]
    fn test_settings_overwrite() {
        let db = Database::new_in_memory().unwrap();

        let settings1 = Settings {
            focus_secs: 30 * 60,
            ..Settings::default()
        };
        db.save_settings(&settings1).unwrap();

        let settings2 = Settings {
            focus_secs: 45 * 60,
            ..Settings::default()
        };
        db.save_settings(&settings2).unwrap();

        let loaded = db.load_settings().unwrap();
        assert_eq!(loaded.focus_secs, 45 * 60);
    }

    #[test]
    fn test_snapshot_missing_is_none() {
        let db = Database::new_in_memory().unwrap();
        assert!(db.try_load_snapshot().unwrap().is_none());
        assert!(db.load_snapshot().is_none());
    }

    #[test]
    fn test_snapshot_save_and_load() {
        let db = Database::new_in_memory().unwrap();
        let data = sample_snapshot();
        db.save_snapshot(&data).unwrap();

        let loaded = db.load_snapshot().unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_snapshot_uses_camel_case_fields() {
        let db = Database::new_in_memory().unwrap();
        db.save_snapshot(&sample_snapshot()).unwrap();

        let json: String = db
            .conn
            .query_row("SELECT value FROM snapshot WHERE key = 'app'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(json.contains("\"version\":1"));
        assert!(json.contains("\"currentMode\":\"shortBreak\""));
        assert!(json.contains("\"completedSessionsInCycle\":3"));
        assert!(json.contains("\"selectedTaskId\""));
        assert!(json.contains("\"sessionsCompleted\":3"));
    }

    #[test]
    fn test_corrupt_snapshot_reads_as_none() {
        let db = Database::new_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO snapshot (key, value) VALUES ('app', '{not json')",
                [],
            )
            .unwrap();
        assert!(matches!(db.try_load_snapshot(), Err(DatabaseError::Json(_))));
        assert!(db.load_snapshot().is_none());
    }

    #[test]
    fn test_other_version_reads_as_none() {
        let db = Database::new_in_memory().unwrap();
        let mut data = sample_snapshot();
        data.version = 2;
        db.save_snapshot(&data).unwrap();
        assert!(matches!(
            db.try_load_snapshot(),
            Err(DatabaseError::UnsupportedVersion { found: 2, expected: 1 })
        ));
        assert!(db.load_snapshot().is_none());
    }

    #[test]
    fn test_background_time_read_clears() {
        let db = Database::new_in_memory().unwrap();
        assert_eq!(db.get_and_clear_background_time(), None);

        let at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        db.save_background_time(at);
        assert_eq!(db.get_and_clear_background_time(), Some(at));
        assert_eq!(db.get_and_clear_background_time(), None);
    }

    #[test]
    fn test_background_time_overwrite() {
        let db = Database::new_in_memory().unwrap();
        let first = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        db.save_background_time(first);
        db.save_background_time(second);
        assert_eq!(db.get_and_clear_background_time(), Some(second));
    }

    #[test]
    fn test_clear_all() {
        let db = Database::new_in_memory().unwrap();
        db.save_settings(&Settings {
            focus_secs: 60,
            ..Settings::default()
        })
        .unwrap();
        db.save_snapshot(&sample_snapshot()).unwrap();
        db.save_background_time(Utc::now());

        db.clear_all().unwrap();

        assert_eq!(db.load_settings().unwrap(), Settings::default());
        assert!(db.load_snapshot().is_none());
        assert_eq!(db.get_and_clear_background_time(), None);
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pomotask.db");
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();

        let data = sample_snapshot();
        {
            let db = Database::open(&path).unwrap();
            db.save_snapshot(&data).unwrap();
            db.save_background_time(at);
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.load_snapshot(), Some(data));
        assert_eq!(db.get_and_clear_background_time(), Some(at));
    }
}
