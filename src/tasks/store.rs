use rusqlite::{params, Connection, OptionalExtension, Row};

use std::collections::HashSet;

use crate::data::UserID;
use crate::internal_error::{InternalError, InternalResult};

use super::data::*;

/// Durable storage for tasks and their history.
///
/// Writes are not wrapped in their own transaction; callers that need a
/// read-compute-write to be atomic open one around the whole sequence.
pub trait TaskStore {
    fn create_task(&self, draft: &Task) -> InternalResult<Task>;
    fn list_tasks(&self, user_id: UserID, category: Option<&str>) -> InternalResult<Vec<Task>>;
    fn load_task_with_history(&self, task_id: TaskID) -> InternalResult<Option<Task>>;
    fn save_task_with_history(&self, task: &Task) -> InternalResult<Task>;
    fn delete_task(&self, task_id: TaskID) -> InternalResult<()>;
}

pub struct SqliteTaskStore<'a> {
    connection: &'a Connection,
}

impl<'a> SqliteTaskStore<'a> {
    pub fn new(connection: &'a Connection) -> SqliteTaskStore<'a> {
        SqliteTaskStore { connection }
    }

    fn load_history(&self, task_id: TaskID) -> InternalResult<Vec<TaskHistory>> {
        let mut statement = self.connection.prepare(
            "SELECT id, value, note, timestamp FROM task_histories
            WHERE task_id = (?1) ORDER BY timestamp DESC, id DESC",
        )?;

        let rows = statement.query_map(params![task_id], history_from_row)?;

        let mut history = vec![];
        for row_result in rows {
            history.push(row_result?);
        }

        Ok(history)
    }

    fn save_history(&self, task: &Task) -> InternalResult<()> {
        let kept: HashSet<HistoryID> = task.history.iter().filter_map(|entry| entry.id).collect();

        let mut existing_statement = self
            .connection
            .prepare("SELECT id FROM task_histories WHERE task_id = (?1)")?;
        let existing = existing_statement
            .query_map(params![task.id], |row| row.get::<usize, HistoryID>(0))?
            .collect::<Result<Vec<HistoryID>, rusqlite::Error>>()?;

        for history_id in existing.iter().filter(|id| !kept.contains(*id)) {
            self.connection.execute(
                "DELETE FROM task_histories WHERE id = (?1)",
                params![history_id],
            )?;
        }

        // Oldest first so new rows get ascending ids in creation order.
        for entry in task.history.iter().rev() {
            match entry.id {
                Some(history_id) => {
                    let updated = self.connection.execute(
                        "UPDATE task_histories SET value = (?1), note = (?2)
                        WHERE id = (?3) AND task_id = (?4)",
                        params![entry.value, entry.note, history_id, task.id],
                    )?;
                    if updated == 0 {
                        return Err(InternalError::not_found("history entry not found"));
                    }
                }
                None => {
                    self.connection.execute(
                        "INSERT INTO task_histories (task_id, value, note, timestamp)
                        VALUES (?1, ?2, ?3, ?4)",
                        params![task.id, entry.value, entry.note, entry.timestamp],
                    )?;
                }
            }
        }

        Ok(())
    }
}

const TASK_COLUMNS: &str = "id, user_id, text, category, unit, has_limit, target_value,
    increment_value, per_check_enabled, current_value, progress, completed,
    last_reset_at, created_at, updated_at";

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        text: row.get(2)?,
        category: row.get(3)?,
        unit: row.get(4)?,
        config: ProgressConfig {
            has_limit: row.get(5)?,
            target_value: row.get(6)?,
            increment_value: row.get(7)?,
            per_check_enabled: row.get(8)?,
        },
        current_value: row.get(9)?,
        progress: row.get(10)?,
        completed: row.get(11)?,
        last_reset_at: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        history: vec![],
    })
}

fn history_from_row(row: &Row) -> rusqlite::Result<TaskHistory> {
    Ok(TaskHistory {
        id: Some(row.get(0)?),
        value: row.get(1)?,
        note: row.get(2)?,
        timestamp: row.get(3)?,
    })
}

impl<'a> TaskStore for SqliteTaskStore<'a> {
    fn create_task(&self, draft: &Task) -> InternalResult<Task> {
        self.connection.execute(
            "INSERT INTO tasks (user_id, text, category, unit, has_limit, target_value,
                increment_value, per_check_enabled, current_value, progress, completed,
                last_reset_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                draft.user_id,
                draft.text,
                draft.category,
                draft.unit,
                draft.config.has_limit,
                draft.config.target_value,
                draft.config.increment_value,
                draft.config.per_check_enabled,
                draft.current_value,
                draft.progress,
                draft.completed,
                draft.last_reset_at,
                draft.created_at,
                draft.updated_at,
            ],
        )?;
        let id = self.connection.last_insert_rowid();

        self.load_task_with_history(id)?
            .ok_or_else(|| InternalError::Internal("created task could not be read back".to_string()))
    }

    fn list_tasks(&self, user_id: UserID, category: Option<&str>) -> InternalResult<Vec<Task>> {
        let mut statement = self.connection.prepare(&format!(
            "SELECT {} FROM tasks WHERE user_id = (?1) AND ((?2) IS NULL OR category = (?2))
            ORDER BY created_at DESC, id DESC",
            TASK_COLUMNS
        ))?;

        let rows = statement.query_map(params![user_id, category], task_from_row)?;

        let mut tasks = vec![];
        for row_result in rows {
            let mut task = row_result?;
            task.history = self.load_history(task.id)?;
            tasks.push(task);
        }

        Ok(tasks)
    }

    fn load_task_with_history(&self, task_id: TaskID) -> InternalResult<Option<Task>> {
        let task = self
            .connection
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = (?1)", TASK_COLUMNS),
                params![task_id],
                task_from_row,
            )
            .optional()?;

        match task {
            Some(mut task) => {
                task.history = self.load_history(task.id)?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    fn save_task_with_history(&self, task: &Task) -> InternalResult<Task> {
        let updated = self.connection.execute(
            "UPDATE tasks SET text = (?1), category = (?2), unit = (?3), has_limit = (?4),
                target_value = (?5), increment_value = (?6), per_check_enabled = (?7),
                current_value = (?8), progress = (?9), completed = (?10),
                last_reset_at = (?11), updated_at = (?12)
            WHERE id = (?13)",
            params![
                task.text,
                task.category,
                task.unit,
                task.config.has_limit,
                task.config.target_value,
                task.config.increment_value,
                task.config.per_check_enabled,
                task.current_value,
                task.progress,
                task.completed,
                task.last_reset_at,
                task.updated_at,
                task.id,
            ],
        )?;
        if updated == 0 {
            return Err(InternalError::not_found("task not found"));
        }

        self.save_history(task)?;

        self.load_task_with_history(task.id)?
            .ok_or_else(|| InternalError::not_found("task not found"))
    }

    /// History rows go with the task through `ON DELETE CASCADE`.
    fn delete_task(&self, task_id: TaskID) -> InternalResult<()> {
        self.connection
            .execute("DELETE FROM tasks WHERE id = (?1)", params![task_id])?;

        Ok(())
    }
}
