//! Core utilities and types shared across all Traffic Ops crates

pub mod audit;
pub mod error;
pub mod error_builder;
pub mod notifications;
pub mod problemdetails;
pub mod types;

pub use audit::*;
pub use error::*;
pub use error_builder::ErrorBuilder;
pub use notifications::*;
pub use problemdetails::{Problem, ProblemDetails};
pub use types::*;

// Re-export external dependencies
pub use anyhow;
pub use axum::http::StatusCode;
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use tracing;
