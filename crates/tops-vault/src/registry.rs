use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tops_database::DbConnection;
use tracing::info;

use crate::backend::TrafficVault;
use crate::errors::VaultError;
use crate::postgres::{PostgresTrafficVault, POSTGRES_BACKEND_NAME};

/// Builds a backend from its opaque JSON configuration.
pub type VaultConstructor = fn(
    serde_json::Value,
    Arc<DbConnection>,
) -> BoxFuture<'static, Result<Arc<dyn TrafficVault>, VaultError>>;

/// Named backend constructors. The server picks one by the configured name.
#[derive(Clone)]
pub struct VaultRegistry {
    constructors: BTreeMap<String, VaultConstructor>,
}

impl VaultRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, constructor: VaultConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub async fn build(
        &self,
        name: &str,
        config: serde_json::Value,
        db: Arc<DbConnection>,
    ) -> Result<Arc<dyn TrafficVault>, VaultError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| VaultError::UnknownBackend(name.to_string()))?;
        let vault = constructor(config, db).await?;
        info!("Traffic Vault backend {} loaded", name);
        Ok(vault)
    }
}

impl Default for VaultRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(POSTGRES_BACKEND_NAME, |config, db| {
            Box::pin(async move {
                let vault = PostgresTrafficVault::from_config(config, db).await?;
                Ok(Arc::new(vault) as Arc<dyn TrafficVault>)
            })
        });
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InMemoryTrafficVault;
    use tops_database::test_utils::TestDatabase;

    #[tokio::test]
    async fn default_registry_builds_postgres_backend() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let registry = VaultRegistry::default();

        let vault = registry
            .build("postgres", serde_json::Value::Null, test_db.db.clone())
            .await
            .unwrap();
        assert_eq!(vault.backend_name(), "postgres");
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let registry = VaultRegistry::default();

        let result = registry
            .build("riak", serde_json::Value::Null, test_db.db.clone())
            .await;
        assert!(matches!(result, Err(VaultError::UnknownBackend(name)) if name == "riak"));
    }

    #[tokio::test]
    async fn additional_backends_can_be_registered() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let mut registry = VaultRegistry::default();
        registry.register("memory", |_, _| {
            Box::pin(async { Ok(Arc::new(InMemoryTrafficVault::new()) as Arc<dyn TrafficVault>) })
        });

        assert_eq!(registry.backend_names(), vec!["memory", "postgres"]);
        let vault = registry
            .build("memory", serde_json::Value::Null, test_db.db.clone())
            .await
            .unwrap();
        assert_eq!(vault.backend_name(), "memory");
    }

    #[tokio::test]
    async fn bad_backend_config_is_reported() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let result = VaultRegistry::default()
            .build("postgres", serde_json::json!({"database_url": 5}), test_db.db.clone())
            .await;
        assert!(matches!(result, Err(VaultError::InvalidConfig(_))));
    }
}
