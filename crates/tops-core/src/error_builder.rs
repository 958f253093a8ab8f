use crate::problemdetails;
use axum::http::StatusCode;
use serde::Serialize;
use std::collections::HashMap;

const PROBLEM_BASE: &str = "https://trafficops.dev/probs";

pub struct ErrorBuilder {
    status: StatusCode,
    type_: String,
    title: String,
    detail: String,
    instance: String,
    values: HashMap<String, serde_json::Value>,
}

impl ErrorBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            type_: String::new(),
            title: String::new(),
            detail: String::new(),
            instance: String::new(),
            values: HashMap::new(),
        }
    }

    pub fn type_(mut self, type_: impl Into<String>) -> Self {
        self.type_ = type_.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn value<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.values.insert(key.to_string(), value);
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn build(self) -> problemdetails::Problem {
        let mut problem = problemdetails::new(self.status)
            .with_type(self.type_)
            .with_title(self.title)
            .with_detail(self.detail)
            .with_instance(self.instance)
            .with_value("timestamp", chrono::Utc::now().to_rfc3339());

        for (key, value) in self.values {
            problem = problem.with_value(&key, value);
        }

        problem
    }
}

fn preset(status: StatusCode, slug: &str, title: &str, code: &str) -> ErrorBuilder {
    ErrorBuilder::new(status)
        .type_(format!("{PROBLEM_BASE}/{slug}"))
        .title(title)
        .instance(format!("/error/{slug}"))
        .value("error_code", code)
}

pub fn internal_server_error() -> ErrorBuilder {
    preset(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal-server-error",
        "Internal Server Error",
        "INTERNAL_SERVER_ERROR",
    )
    .detail("An unexpected error occurred while processing your request")
}

pub fn not_found() -> ErrorBuilder {
    preset(
        StatusCode::NOT_FOUND,
        "not-found",
        "Resource Not Found",
        "NOT_FOUND",
    )
}

pub fn bad_request() -> ErrorBuilder {
    preset(
        StatusCode::BAD_REQUEST,
        "bad-request",
        "Bad Request",
        "BAD_REQUEST",
    )
    .detail("The request was malformed or invalid")
}

pub fn unauthorized() -> ErrorBuilder {
    preset(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "Unauthorized",
        "UNAUTHORIZED",
    )
    .detail("Authentication is required to access this resource")
}

pub fn forbidden() -> ErrorBuilder {
    preset(StatusCode::FORBIDDEN, "forbidden", "Forbidden", "FORBIDDEN")
        .detail("You do not have permission to access this resource")
}

pub fn conflict() -> ErrorBuilder {
    preset(StatusCode::CONFLICT, "conflict", "Conflict", "CONFLICT")
}

pub fn service_unavailable() -> ErrorBuilder {
    preset(
        StatusCode::SERVICE_UNAVAILABLE,
        "service-unavailable",
        "Service Unavailable",
        "SERVICE_UNAVAILABLE",
    )
}

/// Picks the preset builder matching a status code.
pub fn for_status(status: StatusCode) -> ErrorBuilder {
    match status {
        StatusCode::NOT_FOUND => not_found(),
        StatusCode::BAD_REQUEST => bad_request(),
        StatusCode::UNAUTHORIZED => unauthorized(),
        StatusCode::FORBIDDEN => forbidden(),
        StatusCode::CONFLICT => conflict(),
        StatusCode::SERVICE_UNAVAILABLE => service_unavailable(),
        StatusCode::INTERNAL_SERVER_ERROR => internal_server_error(),
        other => ErrorBuilder::new(other).title(other.canonical_reason().unwrap_or("Error")),
    }
}
