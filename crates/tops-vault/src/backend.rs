use std::collections::HashSet;

use async_trait::async_trait;

use crate::errors::VaultError;
use crate::models::{CdnSslKey, DeliveryServiceSslKeys, DnssecKeys, PingResponse};

/// Capability interface over a secret-storage backend.
///
/// A `version` of `None` (or an empty string) addresses the `latest` alias.
#[async_trait]
pub trait TrafficVault: Send + Sync {
    fn backend_name(&self) -> &str;

    async fn get_delivery_service_ssl_keys(
        &self,
        xml_id: &str,
        version: Option<&str>,
    ) -> Result<Option<DeliveryServiceSslKeys>, VaultError>;

    /// Store `keys` under its own version and as `latest`.
    async fn put_delivery_service_ssl_keys(
        &self,
        keys: &DeliveryServiceSslKeys,
    ) -> Result<(), VaultError>;

    async fn delete_delivery_service_ssl_keys(
        &self,
        xml_id: &str,
        version: Option<&str>,
    ) -> Result<(), VaultError>;

    /// Remove every bundle of `cdn` whose delivery service is not in `existing_xml_ids`.
    async fn delete_old_delivery_service_ssl_keys(
        &self,
        existing_xml_ids: &HashSet<String>,
        cdn: &str,
    ) -> Result<u64, VaultError>;

    async fn get_cdn_ssl_keys(&self, cdn: &str) -> Result<Vec<CdnSslKey>, VaultError>;

    async fn get_dnssec_keys(&self, cdn: &str) -> Result<Option<DnssecKeys>, VaultError>;

    async fn put_dnssec_keys(&self, cdn: &str, keys: &DnssecKeys) -> Result<(), VaultError>;

    async fn delete_dnssec_keys(&self, cdn: &str) -> Result<(), VaultError>;

    async fn get_bucket_key(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, VaultError>;

    async fn put_bucket_key(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), VaultError>;

    async fn delete_bucket_key(&self, bucket: &str, key: &str) -> Result<(), VaultError>;

    async fn ping(&self) -> Result<PingResponse, VaultError>;
}

pub(crate) const LATEST_VERSION: &str = tops_entities::sslkey::LATEST_VERSION;

pub(crate) fn resolve_version(version: Option<&str>) -> String {
    match version.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => LATEST_VERSION.to_string(),
    }
}
