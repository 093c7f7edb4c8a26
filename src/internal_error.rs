use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use serde::Serialize;
use thiserror::Error;

use std::sync::PoisonError;

#[derive(Debug, Error, PartialEq)]
pub enum InternalError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidOperation(String),
    #[error("a valid X-User-Id header is required")]
    Unauthenticated,
    #[error("Generic internal error: {0}")]
    Internal(String),
}

impl InternalError {
    pub fn validation(what: &str) -> InternalError {
        InternalError::Validation(what.to_string())
    }

    pub fn not_found(what: &str) -> InternalError {
        InternalError::NotFound(what.to_string())
    }

    pub fn invalid_operation(what: &str) -> InternalError {
        InternalError::InvalidOperation(what.to_string())
    }

    pub fn status(&self) -> Status {
        match self {
            InternalError::Validation(_) | InternalError::InvalidOperation(_) => {
                Status::UnprocessableEntity
            }
            InternalError::NotFound(_) => Status::NotFound,
            InternalError::Unauthenticated => Status::Unauthorized,
            InternalError::Internal(_) => Status::InternalServerError,
        }
    }
}

impl<T> From<PoisonError<T>> for InternalError {
    fn from(e: PoisonError<T>) -> InternalError {
        InternalError::Internal(e.to_string())
    }
}

impl From<rusqlite::Error> for InternalError {
    fn from(e: rusqlite::Error) -> InternalError {
        InternalError::Internal(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl<'r> Responder<'r, 'static> for InternalError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status == Status::InternalServerError {
            log::error!("{}", self);
        }

        let body = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, body).respond_to(request)
    }
}

pub type InternalResult<T> = Result<T, InternalError>;
