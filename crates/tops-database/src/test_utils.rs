//! Test utilities for database-backed tests
//!
//! Every `TestDatabase` is a private in-memory sqlite database with the full
//! schema applied, so tests are isolated from each other and need no
//! external services.

use crate::DbConnection;
use sea_orm::{ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, Set, Statement};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tops_entities::{cdn, cdn_lock, deliveryservice};
use tops_migrations::Migrator;

pub struct TestDatabase {
    pub db: Arc<DbConnection>,
}

impl TestDatabase {
    /// Connect to a fresh in-memory database and run all migrations.
    ///
    /// The pool is pinned to one connection: each sqlite memory connection
    /// is its own database.
    pub async fn with_migrations() -> anyhow::Result<Self> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let db = Database::connect(opt).await?;
        Migrator::up(&db, None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

        Ok(Self { db: Arc::new(db) })
    }

    pub async fn test_connection(&self) -> anyhow::Result<()> {
        let backend = self.db.get_database_backend();
        self.db
            .query_one(Statement::from_string(backend, "SELECT 1".to_owned()))
            .await?;
        Ok(())
    }

    pub async fn insert_cdn(&self, name: &str) -> anyhow::Result<cdn::Model> {
        let model = cdn::ActiveModel {
            name: Set(name.to_string()),
            domain_name: Set(format!("{name}.example.net")),
            dnssec_enabled: Set(false),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(model)
    }

    pub async fn insert_delivery_service(
        &self,
        xml_id: &str,
        cdn_id: i32,
        ssl_key_version: i32,
    ) -> anyhow::Result<deliveryservice::Model> {
        let model = deliveryservice::ActiveModel {
            xml_id: Set(xml_id.to_string()),
            cdn_id: Set(cdn_id),
            ssl_key_version: Set(ssl_key_version),
            example_url: Set(Some(format!("https://{xml_id}.example.net"))),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(model)
    }

    pub async fn lock_cdn(&self, cdn: &str, username: &str, soft: bool) -> anyhow::Result<()> {
        cdn_lock::ActiveModel {
            cdn: Set(cdn.to_string()),
            username: Set(username.to_string()),
            message: Set(None),
            soft: Set(soft),
            created_at: Set(chrono::Utc::now()),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(())
    }
}
