use chrono::offset::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::data::UserID;
use crate::internal_error::InternalResult;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: UserID,
    pub action: String,
    pub description: String,
    pub created_at: String,
}

/// Audit trail for user actions. Recording never fails the caller.
pub trait ActivityLogger {
    fn record(&self, user_id: UserID, action: &str, description: &str);
}

pub struct SqliteActivityLog<'a> {
    connection: &'a Connection,
}

impl<'a> SqliteActivityLog<'a> {
    pub fn new(connection: &'a Connection) -> SqliteActivityLog<'a> {
        SqliteActivityLog { connection }
    }

    pub fn recent(&self, user_id: UserID, limit: u32) -> InternalResult<Vec<ActivityEntry>> {
        let mut statement = self.connection.prepare(
            "SELECT id, user_id, action, description, created_at FROM activity_logs
            WHERE user_id = (?1) ORDER BY id DESC LIMIT (?2)",
        )?;

        let rows = statement.query_map(params![user_id, limit], |row| {
            Ok(ActivityEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                action: row.get(2)?,
                description: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;

        let mut entries = vec![];
        for row_result in rows {
            entries.push(row_result?);
        }

        Ok(entries)
    }
}

impl<'a> ActivityLogger for SqliteActivityLog<'a> {
    fn record(&self, user_id: UserID, action: &str, description: &str) {
        let result = self.connection.execute(
            "INSERT INTO activity_logs (user_id, action, description, created_at)
            VALUES (?1, ?2, ?3, ?4)",
            params![user_id, action, description, Utc::now().to_rfc3339()],
        );

        if let Err(e) = result {
            log::warn!("could not record activity {} for user {}: {}", action, user_id, e);
        }
    }
}
