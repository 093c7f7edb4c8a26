use chrono::offset::Utc;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, State};

use crate::activity::{ActivityEntry, ActivityLogger, SqliteActivityLog};
use crate::auth::{ActingUser, AuthorizationGate};
use crate::data::DBConnection;
use crate::internal_error::InternalResult;

use super::data::*;
use super::store::{SqliteTaskStore, TaskStore};

const DEFAULT_ACTIVITY_LIMIT: u32 = 50;
const MAX_ACTIVITY_LIMIT: u32 = 500;

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Runs one engine operation on an owned task as a single transaction and
/// records the activity once it has committed.
fn mutate_task<F>(
    db_connection: &State<DBConnection>,
    user: ActingUser,
    task_id: TaskID,
    action: &str,
    operation: F,
) -> InternalResult<Task>
where
    F: FnOnce(&mut Task, &str) -> InternalResult<()>,
{
    let mut db_connection = db_connection.lock()?;
    let transaction = db_connection.transaction()?;

    let saved = {
        let store = SqliteTaskStore::new(&transaction);
        let mut task = store.assert_owns_task(user.0, task_id)?;

        let timestamp = now();
        operation(&mut task, timestamp.as_str())?;
        task.updated_at = timestamp;

        store.save_task_with_history(&task)?
    };
    transaction.commit()?;

    log::info!(
        "{} on task {} by user {}: current {} progress {} completed {}",
        action,
        saved.id,
        user.0,
        saved.current_value,
        saved.progress,
        saved.completed
    );
    SqliteActivityLog::new(&db_connection).record(
        user.0,
        action,
        &format!("{} \"{}\"", action, saved.text),
    );

    Ok(saved)
}

#[get("/tasks?<category>")]
pub fn list_tasks(
    user: ActingUser,
    category: Option<&str>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<Vec<Task>>> {
    let db_connection = db_connection.lock()?;

    let tasks = SqliteTaskStore::new(&db_connection).list_tasks(user.0, category)?;

    Ok(Json(tasks))
}

#[post("/tasks", format = "json", data = "<request>")]
pub fn create_task(
    user: ActingUser,
    request: Json<NewTaskRequest>,
    db_connection: &State<DBConnection>,
) -> InternalResult<(Status, Json<Task>)> {
    let draft = Task::draft(user.0, request.into_inner(), &now())?;

    let db_connection = db_connection.lock()?;
    let task = SqliteTaskStore::new(&db_connection).create_task(&draft)?;

    log::info!("task {} created by user {}", task.id, user.0);
    SqliteActivityLog::new(&db_connection).record(
        user.0,
        "task.created",
        &format!("task.created \"{}\"", task.text),
    );

    Ok((Status::Created, Json(task)))
}

#[get("/tasks/<task_id>")]
pub fn get_task(
    user: ActingUser,
    task_id: TaskID,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<Task>> {
    let db_connection = db_connection.lock()?;

    let task = SqliteTaskStore::new(&db_connection).assert_owns_task(user.0, task_id)?;

    Ok(Json(task))
}

#[put("/tasks/<task_id>", format = "json", data = "<request>")]
pub fn update_task(
    user: ActingUser,
    task_id: TaskID,
    request: Json<UpdateTaskRequest>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<Task>> {
    let request = request.into_inner();
    mutate_task(db_connection, user, task_id, "task.updated", |task, _| {
        task.apply_update(request)
    })
    .map(Json)
}

#[delete("/tasks/<task_id>")]
pub fn delete_task(
    user: ActingUser,
    task_id: TaskID,
    db_connection: &State<DBConnection>,
) -> InternalResult<Status> {
    let mut db_connection = db_connection.lock()?;
    let transaction = db_connection.transaction()?;

    let task = {
        let store = SqliteTaskStore::new(&transaction);
        let task = store.assert_owns_task(user.0, task_id)?;
        store.delete_task(task.id)?;
        task
    };
    transaction.commit()?;

    log::info!("task {} deleted by user {}", task.id, user.0);
    SqliteActivityLog::new(&db_connection).record(
        user.0,
        "task.deleted",
        &format!("task.deleted \"{}\"", task.text),
    );

    Ok(Status::NoContent)
}

#[post("/tasks/<task_id>/toggle")]
pub fn toggle_task(
    user: ActingUser,
    task_id: TaskID,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<Task>> {
    mutate_task(db_connection, user, task_id, "task.toggled", |task, now| {
        task.toggle(now)
    })
    .map(Json)
}

#[post("/tasks/<task_id>/progress", format = "json", data = "<request>")]
pub fn add_progress(
    user: ActingUser,
    task_id: TaskID,
    request: Json<AddProgressRequest>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<Task>> {
    let request = request.into_inner();
    mutate_task(db_connection, user, task_id, "task.progress_added", |task, now| {
        task.add_progress(request.value, request.note, now)
    })
    .map(Json)
}

#[get("/tasks/<task_id>/history")]
pub fn get_history(
    user: ActingUser,
    task_id: TaskID,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<Vec<TaskHistory>>> {
    let db_connection = db_connection.lock()?;

    let task = SqliteTaskStore::new(&db_connection).assert_owns_task(user.0, task_id)?;

    Ok(Json(task.history().to_vec()))
}

#[put(
    "/tasks/<task_id>/history/<history_id>",
    format = "json",
    data = "<request>"
)]
pub fn update_history(
    user: ActingUser,
    task_id: TaskID,
    history_id: HistoryID,
    request: Json<EditHistoryRequest>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<Task>> {
    let request = request.into_inner();
    mutate_task(db_connection, user, task_id, "task.history_updated", |task, _| {
        task.edit_history_entry(history_id, request.value, request.note)
    })
    .map(Json)
}

#[delete("/tasks/<task_id>/history/<history_id>")]
pub fn delete_history(
    user: ActingUser,
    task_id: TaskID,
    history_id: HistoryID,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<Task>> {
    mutate_task(db_connection, user, task_id, "task.history_deleted", |task, _| {
        task.delete_history_entry(history_id)
    })
    .map(Json)
}

#[get("/activity?<limit>")]
pub fn get_activity(
    user: ActingUser,
    limit: Option<u32>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<Vec<ActivityEntry>>> {
    let db_connection = db_connection.lock()?;

    let limit = limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .min(MAX_ACTIVITY_LIMIT);
    let entries = SqliteActivityLog::new(&db_connection).recent(user.0, limit)?;

    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use crate::auth::USER_HEADER;
    use crate::data::init_schema;
    use crate::tasks::data::{Task, TaskHistory};
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::blocking::Client;
    use rusqlite::Connection;
    use serde_json::{json, Value};

    fn client() -> Client {
        let connection = Connection::open_in_memory().unwrap();
        init_schema(&connection).unwrap();
        Client::tracked(crate::mount(rocket::build(), connection)).unwrap()
    }

    fn user(id: i64) -> Header<'static> {
        Header::new(USER_HEADER, id.to_string())
    }

    fn create(client: &Client, body: Value) -> Task {
        let response = client
            .post("/api/tasks")
            .header(user(1))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch();
        assert_eq!(response.status(), Status::Created);
        response.into_json::<Task>().unwrap()
    }

    fn limited(client: &Client, target: f64, increment: f64) -> Task {
        create(
            client,
            json!({
                "text": "Read Qur'an",
                "hasLimit": true,
                "targetValue": target,
                "incrementValue": increment,
                "perCheckEnabled": true,
                "unit": "pages"
            }),
        )
    }

    fn add_progress(client: &Client, task: &Task, value: f64) -> Task {
        let response = client
            .post(format!("/api/tasks/{}/progress", task.id))
            .header(user(1))
            .header(ContentType::JSON)
            .body(json!({ "value": value }).to_string())
            .dispatch();
        assert_eq!(response.status(), Status::Ok);
        response.into_json::<Task>().unwrap()
    }

    fn toggle(client: &Client, task: &Task) -> Task {
        let response = client
            .post(format!("/api/tasks/{}/toggle", task.id))
            .header(user(1))
            .dispatch();
        assert_eq!(response.status(), Status::Ok);
        response.into_json::<Task>().unwrap()
    }

    fn entry_with_value(task: &Task, value: f64) -> i64 {
        task.history()
            .iter()
            .find(|e| e.value == value)
            .and_then(|e| e.id)
            .unwrap()
    }

    #[test]
    fn requests_without_user_are_unauthorized() {
        let client = client();
        let response = client.get("/api/tasks").dispatch();
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[test]
    fn binary_toggle_completes_task() {
        let client = client();
        let task = create(&client, json!({ "text": "Dhuha prayer" }));
        assert!(!task.completed);

        let toggled = toggle(&client, &task);
        assert!(toggled.completed);
        assert_eq!(toggled.progress, 100);
        assert_eq!(toggled.history().len(), 1);
        assert_eq!(toggled.history()[0].value, 1.0);
    }

    #[test]
    fn per_check_toggle_adds_increment() {
        let client = client();
        let task = limited(&client, 100.0, 10.0);

        let toggled = toggle(&client, &task);
        assert_eq!(toggled.current_value, 10.0);
        assert_eq!(toggled.progress, 10);
        assert!(!toggled.completed);
    }

    #[test]
    fn toggle_reaching_target_completes() {
        let client = client();
        let task = limited(&client, 100.0, 10.0);
        add_progress(&client, &task, 90.0);

        let toggled = toggle(&client, &task);
        assert_eq!(toggled.current_value, 100.0);
        assert_eq!(toggled.progress, 100);
        assert!(toggled.completed);
    }

    #[test]
    fn progress_calculation_caps_at_100() {
        let client = client();
        let task = limited(&client, 100.0, 10.0);
        add_progress(&client, &task, 95.0);

        let toggled = toggle(&client, &task);
        assert_eq!(toggled.current_value, 105.0);
        assert_eq!(toggled.progress, 100);
        assert!(toggled.completed);
    }

    #[test]
    fn add_progress_rejects_zero() {
        let client = client();
        let task = limited(&client, 100.0, 10.0);

        let response = client
            .post(format!("/api/tasks/{}/progress", task.id))
            .header(user(1))
            .header(ContentType::JSON)
            .body(json!({ "value": 0 }).to_string())
            .dispatch();
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body = response.into_json::<Value>().unwrap();
        assert_eq!(body["message"], "value must be a positive number");
    }

    #[test]
    fn add_progress_rejects_overflowing_total() {
        let client = client();
        let task = limited(&client, 100.0, 10.0);
        add_progress(&client, &task, f64::MAX);

        let response = client
            .post(format!("/api/tasks/{}/progress", task.id))
            .header(user(1))
            .header(ContentType::JSON)
            .body(json!({ "value": f64::MAX }).to_string())
            .dispatch();
        assert_eq!(response.status(), Status::UnprocessableEntity);

        let loaded = client
            .get(format!("/api/tasks/{}", task.id))
            .header(user(1))
            .dispatch()
            .into_json::<Task>()
            .unwrap();
        assert!(loaded.current_value.is_finite());
        assert!(loaded.current_value > 1e307);
        assert_eq!(loaded.progress, 100);
        assert!(loaded.completed);
        assert_eq!(loaded.history().len(), 1);
    }

    #[test]
    fn add_progress_on_binary_task_is_rejected() {
        let client = client();
        let task = create(&client, json!({ "text": "Witr" }));

        let response = client
            .post(format!("/api/tasks/{}/progress", task.id))
            .header(user(1))
            .header(ContentType::JSON)
            .body(json!({ "value": 2 }).to_string())
            .dispatch();
        assert_eq!(response.status(), Status::UnprocessableEntity);
    }

    #[test]
    fn deleting_history_entry_recalculates() {
        let client = client();
        let task = limited(&client, 100.0, 10.0);
        add_progress(&client, &task, 10.0);
        let task = add_progress(&client, &task, 20.0);
        assert_eq!(task.current_value, 30.0);

        let response = client
            .delete(format!(
                "/api/tasks/{}/history/{}",
                task.id,
                entry_with_value(&task, 10.0)
            ))
            .header(user(1))
            .dispatch();
        assert_eq!(response.status(), Status::Ok);
        let task = response.into_json::<Task>().unwrap();
        assert_eq!(task.current_value, 20.0);
        assert_eq!(task.progress, 20);
    }

    #[test]
    fn deleting_completing_entry_uncompletes() {
        let client = client();
        let task = limited(&client, 100.0, 10.0);
        let task = add_progress(&client, &task, 100.0);
        assert!(task.completed);

        let response = client
            .delete(format!(
                "/api/tasks/{}/history/{}",
                task.id,
                entry_with_value(&task, 100.0)
            ))
            .header(user(1))
            .dispatch();
        let task = response.into_json::<Task>().unwrap();
        assert!(!task.completed);
        assert_eq!(task.current_value, 0.0);
        assert_eq!(task.progress, 0);
    }

    #[test]
    fn note_only_edit_keeps_progress() {
        let client = client();
        let task = limited(&client, 100.0, 10.0);
        let task = add_progress(&client, &task, 40.0);
        let entry_id = entry_with_value(&task, 40.0);

        let response = client
            .put(format!("/api/tasks/{}/history/{}", task.id, entry_id))
            .header(user(1))
            .header(ContentType::JSON)
            .body(json!({ "note": "before maghrib" }).to_string())
            .dispatch();
        assert_eq!(response.status(), Status::Ok);
        let edited = response.into_json::<Task>().unwrap();

        assert_eq!(edited.current_value, task.current_value);
        assert_eq!(edited.progress, task.progress);
        assert_eq!(edited.completed, task.completed);
        assert_eq!(edited.history()[0].note.as_deref(), Some("before maghrib"));
    }

    #[test]
    fn editing_missing_entry_is_not_found() {
        let client = client();
        let task = limited(&client, 100.0, 10.0);

        let response = client
            .put(format!("/api/tasks/{}/history/999", task.id))
            .header(user(1))
            .header(ContentType::JSON)
            .body(json!({ "value": 5 }).to_string())
            .dispatch();
        assert_eq!(response.status(), Status::NotFound);
    }

    #[test]
    fn read_after_write_matches_mutation_result() {
        let client = client();
        let task = limited(&client, 50.0, 5.0);
        let toggled = toggle(&client, &task);

        let loaded = client
            .get(format!("/api/tasks/{}", task.id))
            .header(user(1))
            .dispatch()
            .into_json::<Task>()
            .unwrap();
        assert_eq!(loaded, toggled);

        let history = client
            .get(format!("/api/tasks/{}/history", task.id))
            .header(user(1))
            .dispatch()
            .into_json::<Vec<TaskHistory>>()
            .unwrap();
        assert_eq!(history, toggled.history().to_vec());
    }

    #[test]
    fn other_users_cannot_see_or_mutate_task() {
        let client = client();
        let task = limited(&client, 100.0, 10.0);

        let response = client
            .post(format!("/api/tasks/{}/toggle", task.id))
            .header(user(2))
            .dispatch();
        assert_eq!(response.status(), Status::NotFound);

        let response = client
            .get(format!("/api/tasks/{}", task.id))
            .header(user(2))
            .dispatch();
        assert_eq!(response.status(), Status::NotFound);

        let listed = client
            .get("/api/tasks")
            .header(user(2))
            .dispatch()
            .into_json::<Vec<Task>>()
            .unwrap();
        assert!(listed.is_empty());
    }

    #[test]
    fn update_and_delete_task() {
        let client = client();
        let task = limited(&client, 10.0, 10.0);
        let task = toggle(&client, &task);
        assert!(task.completed);

        let response = client
            .put(format!("/api/tasks/{}", task.id))
            .header(user(1))
            .header(ContentType::JSON)
            .body(json!({ "targetValue": 20, "category": "tilawah" }).to_string())
            .dispatch();
        assert_eq!(response.status(), Status::Ok);
        let updated = response.into_json::<Task>().unwrap();
        assert!(!updated.completed);
        assert_eq!(updated.progress, 50);
        assert_eq!(updated.category.as_deref(), Some("tilawah"));

        let response = client
            .delete(format!("/api/tasks/{}", task.id))
            .header(user(1))
            .dispatch();
        assert_eq!(response.status(), Status::NoContent);

        let response = client
            .get(format!("/api/tasks/{}", task.id))
            .header(user(1))
            .dispatch();
        assert_eq!(response.status(), Status::NotFound);
    }

    #[test]
    fn create_validates_target() {
        let client = client();
        let response = client
            .post("/api/tasks")
            .header(user(1))
            .header(ContentType::JSON)
            .body(json!({ "text": "Fast", "hasLimit": true }).to_string())
            .dispatch();
        assert_eq!(response.status(), Status::UnprocessableEntity);
    }

    #[test]
    fn mutations_are_recorded_in_activity_log() {
        let client = client();
        let task = create(&client, json!({ "text": "Dhuha prayer" }));
        toggle(&client, &task);

        let entries = client
            .get("/api/activity")
            .header(user(1))
            .dispatch()
            .into_json::<Vec<Value>>()
            .unwrap();
        let actions: Vec<&str> = entries
            .iter()
            .filter_map(|e| e["action"].as_str())
            .collect();
        assert_eq!(actions, vec!["task.toggled", "task.created"]);
    }
}
