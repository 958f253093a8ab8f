//! Error types shared by every Traffic Ops service crate.
//!
//! Handlers return a single [`ApiError`] instead of separate user and system
//! errors plus a status code. The [`ErrorKind`] decides what the caller gets
//! to see: user-facing messages are returned verbatim, system messages are
//! logged and replaced by a generic description.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::error_builder;
use crate::problemdetails::Problem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caused by the request: bad identifiers, missing configuration the caller asked for, locks.
    UserFacing,
    /// Caused by the server or one of its backends.
    System,
}

#[derive(Error, Debug)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn user(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::UserFacing,
            status,
            message: message.into(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::System,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::user(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::user(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::user(StatusCode::FORBIDDEN, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_user_facing(&self) -> bool {
        self.kind == ErrorKind::UserFacing
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self::system(format!("{error:#}"))
    }
}

impl From<ApiError> for Problem {
    fn from(error: ApiError) -> Self {
        match error.kind {
            ErrorKind::UserFacing => error_builder::for_status(error.status)
                .detail(error.message)
                .build(),
            ErrorKind::System => {
                error!("internal error: {}", error.message);
                error_builder::internal_server_error().build()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        Problem::from(self).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
