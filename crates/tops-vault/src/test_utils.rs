//! In-memory Traffic Vault for tests of code that sits above the vault.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{resolve_version, TrafficVault, LATEST_VERSION};
use crate::errors::VaultError;
use crate::models::{CdnSslKey, DeliveryServiceSslKeys, DnssecKeys, PingResponse};

pub const MEMORY_BACKEND_NAME: &str = "memory";

#[derive(Default)]
pub struct InMemoryTrafficVault {
    ssl_keys: RwLock<HashMap<(String, String), DeliveryServiceSslKeys>>,
    dnssec: RwLock<HashMap<String, DnssecKeys>>,
    buckets: RwLock<HashMap<(String, String), Vec<u8>>>,
    failing_reads: RwLock<HashSet<String>>,
    puts: AtomicUsize,
}

impl InMemoryTrafficVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read of `xml_id`'s keys fail with `Unavailable`.
    pub async fn fail_reads_for(&self, xml_id: &str) {
        self.failing_reads.write().await.insert(xml_id.to_string());
    }

    /// Number of successful bundle writes so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn versions_of(&self, xml_id: &str) -> Vec<String> {
        let mut versions: Vec<String> = self
            .ssl_keys
            .read()
            .await
            .keys()
            .filter(|(ds, _)| ds == xml_id)
            .map(|(_, version)| version.clone())
            .collect();
        versions.sort();
        versions
    }
}

#[async_trait]
impl TrafficVault for InMemoryTrafficVault {
    fn backend_name(&self) -> &str {
        MEMORY_BACKEND_NAME
    }

    async fn get_delivery_service_ssl_keys(
        &self,
        xml_id: &str,
        version: Option<&str>,
    ) -> Result<Option<DeliveryServiceSslKeys>, VaultError> {
        if self.failing_reads.read().await.contains(xml_id) {
            return Err(VaultError::Unavailable(format!("reads of {xml_id} are failing")));
        }
        let key = (xml_id.to_string(), resolve_version(version));
        Ok(self.ssl_keys.read().await.get(&key).cloned())
    }

    async fn put_delivery_service_ssl_keys(
        &self,
        keys: &DeliveryServiceSslKeys,
    ) -> Result<(), VaultError> {
        let mut ssl_keys = self.ssl_keys.write().await;
        ssl_keys.insert(
            (keys.delivery_service.clone(), keys.version.to_string()),
            keys.clone(),
        );
        ssl_keys.insert(
            (keys.delivery_service.clone(), LATEST_VERSION.to_string()),
            keys.clone(),
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_delivery_service_ssl_keys(
        &self,
        xml_id: &str,
        version: Option<&str>,
    ) -> Result<(), VaultError> {
        let key = (xml_id.to_string(), resolve_version(version));
        self.ssl_keys.write().await.remove(&key);
        Ok(())
    }

    async fn delete_old_delivery_service_ssl_keys(
        &self,
        existing_xml_ids: &HashSet<String>,
        cdn: &str,
    ) -> Result<u64, VaultError> {
        let mut ssl_keys = self.ssl_keys.write().await;
        let before = ssl_keys.len();
        ssl_keys.retain(|(xml_id, _), keys| {
            keys.cdn != cdn || existing_xml_ids.contains(xml_id)
        });
        Ok((before - ssl_keys.len()) as u64)
    }

    async fn get_cdn_ssl_keys(&self, cdn: &str) -> Result<Vec<CdnSslKey>, VaultError> {
        let mut keys: Vec<CdnSslKey> = self
            .ssl_keys
            .read()
            .await
            .iter()
            .filter(|((_, version), keys)| version == LATEST_VERSION && keys.cdn == cdn)
            .map(|(_, keys)| CdnSslKey::from(keys))
            .collect();
        keys.sort_by(|a, b| a.delivery_service.cmp(&b.delivery_service));
        Ok(keys)
    }

    async fn get_dnssec_keys(&self, cdn: &str) -> Result<Option<DnssecKeys>, VaultError> {
        Ok(self.dnssec.read().await.get(cdn).cloned())
    }

    async fn put_dnssec_keys(&self, cdn: &str, keys: &DnssecKeys) -> Result<(), VaultError> {
        self.dnssec.write().await.insert(cdn.to_string(), keys.clone());
        Ok(())
    }

    async fn delete_dnssec_keys(&self, cdn: &str) -> Result<(), VaultError> {
        self.dnssec.write().await.remove(cdn);
        Ok(())
    }

    async fn get_bucket_key(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        let entry = (bucket.to_string(), key.to_string());
        Ok(self.buckets.read().await.get(&entry).cloned())
    }

    async fn put_bucket_key(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), VaultError> {
        self.buckets
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }

    async fn delete_bucket_key(&self, bucket: &str, key: &str) -> Result<(), VaultError> {
        self.buckets
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn ping(&self) -> Result<PingResponse, VaultError> {
        Ok(PingResponse {
            status: "OK".to_string(),
            server: MEMORY_BACKEND_NAME.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SslKeyCertificate;

    fn bundle(xml_id: &str, cdn: &str, version: i32) -> DeliveryServiceSslKeys {
        DeliveryServiceSslKeys {
            delivery_service: xml_id.to_string(),
            cdn: cdn.to_string(),
            version,
            certificate: SslKeyCertificate::default(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn put_is_visible_as_latest_and_failing_reads_error() {
        let vault = InMemoryTrafficVault::new();
        vault.put_delivery_service_ssl_keys(&bundle("ds1", "cdn1", 2)).await.unwrap();

        let latest = vault.get_delivery_service_ssl_keys("ds1", None).await.unwrap();
        assert_eq!(latest.map(|k| k.version), Some(2));
        assert_eq!(vault.versions_of("ds1").await, vec!["2", "latest"]);
        assert_eq!(vault.put_count(), 1);

        vault.fail_reads_for("ds1").await;
        assert!(vault.get_delivery_service_ssl_keys("ds1", None).await.is_err());
    }

    #[tokio::test]
    async fn delete_old_only_touches_the_given_cdn() {
        let vault = InMemoryTrafficVault::new();
        vault.put_delivery_service_ssl_keys(&bundle("ds1", "cdn1", 1)).await.unwrap();
        vault.put_delivery_service_ssl_keys(&bundle("ds2", "cdn1", 1)).await.unwrap();
        vault.put_delivery_service_ssl_keys(&bundle("ds3", "cdn2", 1)).await.unwrap();

        let existing: HashSet<String> = ["ds1".to_string()].into_iter().collect();
        let removed = vault
            .delete_old_delivery_service_ssl_keys(&existing, "cdn1")
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(vault.get_cdn_ssl_keys("cdn1").await.unwrap().len(), 1);
        assert_eq!(vault.get_cdn_ssl_keys("cdn2").await.unwrap().len(), 1);
    }
}
