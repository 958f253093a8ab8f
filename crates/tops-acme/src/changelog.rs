use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::*;
use tops_core::{ChangeLogger, ChangeOperation};
use tops_database::DbConnection;
use tops_entities::log;
use tracing::warn;

/// A change to a delivery service's SSL keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslKeyChange {
    pub xml_id: String,
    pub ds_id: i32,
    pub action: String,
    pub username: String,
}

impl SslKeyChange {
    pub fn new(
        xml_id: impl Into<String>,
        ds_id: i32,
        action: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            xml_id: xml_id.into(),
            ds_id,
            action: action.into(),
            username: username.into(),
        }
    }

    pub fn added_with(xml_id: &str, ds_id: i32, provider: &str, username: &str) -> Self {
        Self::new(xml_id, ds_id, format!("Added SSL keys with {provider}"), username)
    }

    pub fn failed_with(xml_id: &str, ds_id: i32, provider: &str, username: &str) -> Self {
        Self::new(
            xml_id,
            ds_id,
            format!("FAILED to add SSL keys with {provider}"),
            username,
        )
    }
}

impl ChangeOperation for SslKeyChange {
    fn message(&self) -> String {
        format!(
            "DS: {}, ID: {}, ACTION: {}",
            self.xml_id, self.ds_id, self.action
        )
    }

    fn username(&self) -> &str {
        &self.username
    }
}

/// Change log kept in the `log` table.
pub struct DbChangeLogger {
    db: Arc<DbConnection>,
}

impl DbChangeLogger {
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChangeLogger for DbChangeLogger {
    async fn record_change(&self, operation: &dyn ChangeOperation) -> anyhow::Result<()> {
        log::ActiveModel {
            level: Set(operation.level().to_string()),
            message: Set(operation.message()),
            username: Set(operation.username().to_string()),
            last_updated: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(())
    }
}

/// Records `operation`. A change log failure never fails the change itself.
pub async fn record(logger: &dyn ChangeLogger, operation: &dyn ChangeOperation) {
    if let Err(e) = logger.record_change(operation).await {
        warn!("failed to write change log entry {:?}: {}", operation.message(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tops_core::API_CHANGE_LEVEL;
    use tops_database::test_utils::TestDatabase;

    #[test]
    fn messages_name_the_delivery_service_and_provider() {
        let added = SslKeyChange::added_with("demo1", 7, "Lets Encrypt", "admin");
        assert_eq!(
            added.message(),
            "DS: demo1, ID: 7, ACTION: Added SSL keys with Lets Encrypt"
        );

        let failed = SslKeyChange::failed_with("demo1", 7, "Example CA", "admin");
        assert_eq!(
            failed.message(),
            "DS: demo1, ID: 7, ACTION: FAILED to add SSL keys with Example CA"
        );
    }

    #[tokio::test]
    async fn entries_are_written_to_the_log_table() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let logger = DbChangeLogger::new(test_db.db.clone());

        record(&logger, &SslKeyChange::new("demo1", 3, "Deleted SSL keys", "admin")).await;

        let rows = log::Entity::find().all(test_db.db.as_ref()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].level, API_CHANGE_LEVEL);
        assert_eq!(rows[0].username, "admin");
        assert_eq!(rows[0].message, "DS: demo1, ID: 3, ACTION: Deleted SSL keys");
    }
}
