//! Change-log contract. Every operation that alters certificate material
//! records a human readable line attributed to the acting user.

use anyhow::Result;
use serde::Serialize;

pub const API_CHANGE_LEVEL: &str = "APICHANGE";

/// An operation worth recording in the change log.
pub trait ChangeOperation: Send + Sync {
    /// The line written to the log, e.g. `DS: demo1, ID: 4, ACTION: Deleted SSL keys`.
    fn message(&self) -> String;

    fn username(&self) -> &str;

    fn level(&self) -> &str {
        API_CHANGE_LEVEL
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChangeEntry {
    pub level: String,
    pub message: String,
    pub username: String,
}

impl ChangeEntry {
    pub fn from_operation(operation: &dyn ChangeOperation) -> Self {
        Self {
            level: operation.level().to_string(),
            message: operation.message(),
            username: operation.username().to_string(),
        }
    }
}

#[async_trait::async_trait]
pub trait ChangeLogger: Send + Sync {
    async fn record_change(&self, operation: &dyn ChangeOperation) -> Result<()>;
}
