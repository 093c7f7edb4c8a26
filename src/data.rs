use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::internal_error::InternalResult;

pub type DBConnection = Arc<Mutex<Connection>>;
pub type UserID = i64;

pub fn open_database(path: &str) -> InternalResult<Connection> {
    log::info!("opening task database at {}", path);
    let connection = Connection::open(path)?;
    init_schema(&connection)?;

    Ok(connection)
}

pub fn init_schema(connection: &Connection) -> InternalResult<()> {
    connection.execute_batch(
        "PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            text TEXT NOT NULL,
            category TEXT,
            has_limit INTEGER NOT NULL DEFAULT 0,
            target_value REAL,
            unit TEXT,
            increment_value REAL NOT NULL DEFAULT 1,
            per_check_enabled INTEGER NOT NULL DEFAULT 0,
            current_value REAL NOT NULL DEFAULT 0,
            progress INTEGER NOT NULL DEFAULT 0,
            completed INTEGER NOT NULL DEFAULT 0,
            last_reset_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS tasks_user_id ON tasks (user_id);
        CREATE TABLE IF NOT EXISTS task_histories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL REFERENCES tasks (id) ON DELETE CASCADE,
            value REAL NOT NULL,
            note TEXT,
            timestamp TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS task_histories_task_id ON task_histories (task_id);
        CREATE TABLE IF NOT EXISTS activity_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            description TEXT NOT NULL,
            created_at TEXT NOT NULL
        );",
    )?;

    Ok(())
}
