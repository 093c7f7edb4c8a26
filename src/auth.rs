use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

use crate::data::UserID;
use crate::internal_error::{InternalError, InternalResult};
use crate::tasks::data::{Task, TaskID};
use crate::tasks::store::TaskStore;

pub const USER_HEADER: &str = "X-User-Id";

/// The user a request acts on behalf of. Session handling lives in front of
/// this service, which only trusts the forwarded user id header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActingUser(pub UserID);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ActingUser {
    type Error = InternalError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request
            .headers()
            .get_one(USER_HEADER)
            .and_then(|value| value.trim().parse::<UserID>().ok())
        {
            Some(user_id) if user_id > 0 => Outcome::Success(ActingUser(user_id)),
            _ => Outcome::Error((Status::Unauthorized, InternalError::Unauthenticated)),
        }
    }
}

pub trait AuthorizationGate {
    /// Returns the task if `user_id` owns it. Tasks owned by someone else are
    /// reported exactly like missing ones.
    fn assert_owns_task(&self, user_id: UserID, task_id: TaskID) -> InternalResult<Task>;
}

impl<S: TaskStore> AuthorizationGate for S {
    fn assert_owns_task(&self, user_id: UserID, task_id: TaskID) -> InternalResult<Task> {
        match self.load_task_with_history(task_id)? {
            Some(task) if task.user_id == user_id => Ok(task),
            _ => Err(InternalError::not_found("task not found")),
        }
    }
}
