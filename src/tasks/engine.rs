//! Progress reconciliation for tasks.
//!
//! Every operation that touches a task's history ends in [`reconcile`], which
//! derives `current_value`, `progress` and `completed` from the whole history
//! rather than adjusting the cached fields incrementally.

use crate::data::UserID;
use crate::internal_error::{InternalError, InternalResult};

use super::data::*;

const BINARY_TARGET: f64 = 1.0;

pub fn history_sum(history: &[TaskHistory]) -> f64 {
    history.iter().map(|entry| entry.value).sum()
}

fn percent(current_value: f64, target_value: f64) -> i64 {
    if target_value.is_nan() || target_value <= 0.0 || current_value.is_nan() {
        return 0;
    }
    if current_value == f64::INFINITY {
        return 100;
    }

    let raw = (100.0 * current_value / target_value).round();
    raw.max(0.0).min(100.0) as i64
}

/// Derives progress from history.
///
/// Limited tasks report the history sum floored at zero; it may exceed the
/// target, only `progress` is capped. Binary tasks are held to `0..=1`.
pub fn reconcile(config: &ProgressConfig, history: &[TaskHistory]) -> Reconciled {
    let sum = history_sum(history).max(0.0);

    if config.has_limit {
        match config.target_value {
            Some(target) if target > 0.0 => Reconciled {
                current_value: sum,
                progress: percent(sum, target),
                completed: sum >= target,
            },
            _ => Reconciled {
                current_value: sum,
                progress: 0,
                completed: false,
            },
        }
    } else {
        let current_value = sum.min(BINARY_TARGET);
        let completed = current_value >= BINARY_TARGET;
        Reconciled {
            current_value,
            progress: if completed { 100 } else { 0 },
            completed,
        }
    }
}

pub fn validate_config(config: &ProgressConfig) -> InternalResult<()> {
    if config.has_limit {
        match config.target_value {
            Some(target) if target.is_finite() && target > 0.0 => {}
            _ => {
                return Err(InternalError::validation(
                    "targetValue must be a positive number when hasLimit is set",
                ))
            }
        }
    }

    if !config.increment_value.is_finite() || config.increment_value <= 0.0 {
        return Err(InternalError::validation(
            "incrementValue must be a positive number",
        ));
    }

    Ok(())
}

fn ensure_finite_total(total: f64) -> InternalResult<()> {
    if !total.is_finite() {
        return Err(InternalError::validation(
            "total progress is too large to record",
        ));
    }

    Ok(())
}

fn validate_text(text: &str) -> InternalResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(InternalError::validation("text must not be empty"));
    }

    Ok(text.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Task {
    /// Builds an unsaved task; the store assigns its id.
    pub fn draft(user_id: UserID, request: NewTaskRequest, now: &str) -> InternalResult<Task> {
        let config = ProgressConfig {
            has_limit: request.has_limit,
            target_value: request.target_value,
            increment_value: request.increment_value,
            per_check_enabled: request.per_check_enabled,
        };
        validate_config(&config)?;

        let mut task = Task {
            id: 0,
            user_id,
            text: validate_text(&request.text)?,
            category: non_empty(request.category),
            unit: non_empty(request.unit),
            config,
            current_value: 0.0,
            progress: 0,
            completed: false,
            last_reset_at: None,
            created_at: now.to_string(),
            updated_at: now.to_string(),
            history: vec![],
        };
        task.recompute();

        Ok(task)
    }

    fn recompute(&mut self) {
        let reconciled = reconcile(&self.config, &self.history);
        self.current_value = reconciled.current_value;
        self.progress = reconciled.progress;
        self.completed = reconciled.completed;
    }

    fn push_entry(&mut self, value: f64, note: Option<String>, now: &str) {
        self.history.insert(
            0,
            TaskHistory {
                id: None,
                value,
                note,
                timestamp: now.to_string(),
            },
        );
    }

    fn full_value(&self) -> f64 {
        if self.config.has_limit {
            self.config.target_value.unwrap_or(BINARY_TARGET)
        } else {
            BINARY_TARGET
        }
    }

    /// Checks or unchecks the task, recording the change as one history entry.
    pub fn toggle(&mut self, now: &str) -> InternalResult<()> {
        let sum = history_sum(&self.history);

        let delta = if self.completed {
            -sum
        } else if self.config.has_limit && self.config.per_check_enabled {
            self.config.increment_value
        } else {
            self.full_value() - sum
        };
        ensure_finite_total(sum + delta)?;

        self.push_entry(delta, None, now);
        self.recompute();

        Ok(())
    }

    pub fn add_progress(&mut self, value: f64, note: Option<String>, now: &str) -> InternalResult<()> {
        if !value.is_finite() || value <= 0.0 {
            return Err(InternalError::validation("value must be a positive number"));
        }
        if !self.config.has_limit {
            return Err(InternalError::invalid_operation(
                "progress can only be recorded on tasks with a target",
            ));
        }

        ensure_finite_total(history_sum(&self.history) + value)?;

        self.push_entry(value, note, now);
        self.recompute();

        Ok(())
    }

    pub fn edit_history_entry(
        &mut self,
        entry_id: HistoryID,
        value: Option<f64>,
        note: Option<String>,
    ) -> InternalResult<()> {
        let index = self
            .history
            .iter()
            .position(|entry| entry.id == Some(entry_id))
            .ok_or_else(|| InternalError::not_found("history entry not found"))?;

        if let Some(value) = value {
            if !value.is_finite() || value < 0.0 {
                return Err(InternalError::validation(
                    "value must be a non-negative number",
                ));
            }
            let total: f64 = self
                .history
                .iter()
                .enumerate()
                .map(|(i, entry)| if i == index { value } else { entry.value })
                .sum();
            ensure_finite_total(total)?;
        }

        let entry = &mut self.history[index];
        if let Some(value) = value {
            entry.value = value;
        }
        if let Some(note) = note {
            entry.note = non_empty(Some(note));
        }

        self.recompute();

        Ok(())
    }

    pub fn delete_history_entry(&mut self, entry_id: HistoryID) -> InternalResult<()> {
        let index = self
            .history
            .iter()
            .position(|entry| entry.id == Some(entry_id))
            .ok_or_else(|| InternalError::not_found("history entry not found"))?;

        self.history.remove(index);
        self.recompute();

        Ok(())
    }

    /// Applies a partial update. Changing the target re-derives progress
    /// from the existing history.
    pub fn apply_update(&mut self, request: UpdateTaskRequest) -> InternalResult<()> {
        let mut config = self.config;
        if let Some(has_limit) = request.has_limit {
            config.has_limit = has_limit;
        }
        if request.target_value.is_some() {
            config.target_value = request.target_value;
        }
        if let Some(increment_value) = request.increment_value {
            config.increment_value = increment_value;
        }
        if let Some(per_check_enabled) = request.per_check_enabled {
            config.per_check_enabled = per_check_enabled;
        }
        validate_config(&config)?;

        let text = match request.text {
            Some(text) => Some(validate_text(&text)?),
            None => None,
        };

        if let Some(text) = text {
            self.text = text;
        }
        if request.category.is_some() {
            self.category = non_empty(request.category);
        }
        if request.unit.is_some() {
            self.unit = non_empty(request.unit);
        }
        self.config = config;
        self.recompute();

        Ok(())
    }
}
