//! Shared response and time types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Canonical UTC timestamp used in API responses and database columns.
pub type UtcDateTime = DateTime<Utc>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Alert {
    pub level: AlertLevel,
    pub text: String,
}

impl Alert {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Warning,
            text: text.into(),
        }
    }
}

/// Success envelope: an optional payload and the alerts shown to the operator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<Alert>,
}

impl<T> ApiResponse<T> {
    pub fn with_response(response: T) -> Self {
        Self {
            response: Some(response),
            alerts: Vec::new(),
        }
    }

    pub fn alert(mut self, alert: Alert) -> Self {
        self.alerts.push(alert);
        self
    }
}

impl ApiResponse<()> {
    pub fn alerts(alerts: Vec<Alert>) -> Self {
        Self {
            response: None,
            alerts,
        }
    }
}
