use rocket::http::Status;
use rocket::serde::json::{json, Json, Value};
use rocket::{Build, Request, Rocket};
use rusqlite::Connection;

use std::error::Error;
use std::sync::{Arc, Mutex};

mod activity;
mod auth;
mod config;
mod data;
mod internal_error;
mod tasks;

use config::AppConfig;
use data::open_database;
use tasks::endpoints;

#[macro_use]
extern crate rocket;

#[catch(default)]
fn default_catcher(status: Status, _request: &Request) -> (Status, Json<Value>) {
    let message = match status.code {
        401 => "a valid X-User-Id header is required",
        _ => status.reason().unwrap_or("request failed"),
    };

    (status, Json(json!({ "message": message })))
}

pub fn mount(rocket: Rocket<Build>, connection: Connection) -> Rocket<Build> {
    let connection = Arc::new(Mutex::new(connection));

    rocket
        .manage(connection)
        .mount(
            "/api",
            routes![
                endpoints::list_tasks,
                endpoints::create_task,
                endpoints::get_task,
                endpoints::update_task,
                endpoints::delete_task,
                endpoints::toggle_task,
                endpoints::add_progress,
                endpoints::get_history,
                endpoints::update_history,
                endpoints::delete_history,
                endpoints::get_activity,
            ],
        )
        .register("/", catchers![default_catcher])
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let rocket = rocket::build();
    let config = AppConfig::from_figment(rocket.figment())?;
    let connection = open_database(&config.database)?;

    mount(rocket, connection).launch().await?;

    Ok(())
}
