//! Database connection management

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tops_migrations::{Migrator, MigratorTrait};
use tracing::info;

pub type DbConnection = DatabaseConnection;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Failed to run migrations: {0}")]
    Migration(String),
}

pub async fn establish_connection(
    database_url: &str,
    max_connections: u32,
) -> Result<Arc<DbConnection>, DatabaseError> {
    let mut opt = ConnectOptions::new(database_url);
    opt.max_connections(max_connections.max(1))
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let db = Database::connect(opt)
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;

    Migrator::up(&db, None)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

    info!("database ready ({} connections max)", max_connections.max(1));
    Ok(Arc::new(db))
}
