use serde::{Deserialize, Serialize};

use crate::data::UserID;

pub type TaskID = i64;
pub type HistoryID = i64;

/// One recorded delta applied to a task's progress.
///
/// `id` is `None` until the entry has been written by the store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskHistory {
    pub id: Option<HistoryID>,
    pub value: f64,
    pub note: Option<String>,
    pub timestamp: String,
}

/// Settings that decide how a task's history turns into progress.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressConfig {
    pub has_limit: bool,
    pub target_value: Option<f64>,
    pub increment_value: f64,
    pub per_check_enabled: bool,
}

/// Values derived from a task's history by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciled {
    pub current_value: f64,
    pub progress: i64,
    pub completed: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskID,
    pub user_id: UserID,
    pub text: String,
    pub category: Option<String>,
    pub unit: Option<String>,
    #[serde(flatten)]
    pub config: ProgressConfig,
    pub current_value: f64,
    pub progress: i64,
    pub completed: bool,
    pub last_reset_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Newest first. Only the engine's operations mutate this.
    pub(in crate::tasks) history: Vec<TaskHistory>,
}

impl Task {
    pub fn history(&self) -> &[TaskHistory] {
        &self.history
    }
}

fn default_increment() -> f64 {
    1.0
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewTaskRequest {
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub has_limit: bool,
    #[serde(default)]
    pub target_value: Option<f64>,
    #[serde(default = "default_increment")]
    pub increment_value: f64,
    #[serde(default)]
    pub per_check_enabled: bool,
}

/// Partial update; absent fields are left alone, an empty `category` or
/// `unit` clears it.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub text: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub has_limit: Option<bool>,
    pub target_value: Option<f64>,
    pub increment_value: Option<f64>,
    pub per_check_enabled: Option<bool>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AddProgressRequest {
    pub value: f64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct EditHistoryRequest {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
}
