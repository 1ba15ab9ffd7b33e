use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::model::{ApplicationStatus, Transition};

/// Outcome of every store, lifecycle and gate operation that can fail.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Conflict(#[from] Conflict),

    #[error("not authorized to {0}")]
    Forbidden(&'static str),

    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("storage unavailable: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("cannot hash password: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
}

/// The ways an otherwise well-formed request can collide with stored state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    #[error("project is not accepting applications")]
    NotAcceptingApplications,

    #[error("application deadline has passed")]
    DeadlinePassed,

    #[error("you have already applied to this project")]
    AlreadyApplied,

    #[error("project has reached maximum capacity")]
    AtCapacity,

    #[error("cannot {transition} an application which is {from}")]
    InvalidTransition {
        from: ApplicationStatus,
        transition: Transition,
    },

    #[error("maximum number of students cannot be lower than {current}")]
    CapacityBelowEnrolled { current: i64 },

    #[error("user already exists with this email")]
    EmailTaken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthenticated | Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::Storage(_) | Error::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Turn a unique constraint violation into `conflict`, leaving other
/// database errors as storage failures.
pub fn unique_violation(conflict: Conflict) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => Error::Conflict(conflict),
        e => Error::Storage(e),
    }
}

/// Requests which cannot even be decoded are reported like any other
/// validation failure, against the part of the request at fault.
fn malformed(part: &'static str, message: String) -> Error {
    Error::Validation(vec![FieldError::new(part, message)])
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        malformed("body", rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        malformed("query", rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        malformed("path", rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Error::Validation(errors) => json!({ "message": self.to_string(), "errors": errors }),
            Error::Storage(e) => {
                error!(error = %e, "storage failure");
                json!({ "message": "Server error" })
            }
            Error::PasswordHash(e) => {
                error!(error = %e, "password hashing failure");
                json!({ "message": "Server error" })
            }
            Error::Conflict(c) => json!({ "message": c.to_string(), "reason": c.reason() }),
            _ => json!({ "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl Conflict {
    /// Stable machine-readable tag so that clients can tell conflicts apart.
    pub fn reason(&self) -> &'static str {
        match self {
            Conflict::NotAcceptingApplications => "not_accepting_applications",
            Conflict::DeadlinePassed => "deadline_passed",
            Conflict::AlreadyApplied => "already_applied",
            Conflict::AtCapacity => "at_capacity",
            Conflict::InvalidTransition { .. } => "invalid_transition",
            Conflict::CapacityBelowEnrolled { .. } => "capacity_below_enrolled",
            Conflict::EmailTaken => "email_taken",
        }
    }
}
