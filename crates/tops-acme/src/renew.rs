//! Renewal of an existing ACME certificate bundle.
//!
//! A renewal writes two stores that share no transaction: the new bundle
//! goes to the vault first, then `deliveryservice.ssl_key_version` is bumped
//! in its own transaction. A failure between the two leaves the vault one
//! version ahead; it is logged with both versions and not reconciled.
//! Two renewals of the same delivery service are not serialized and the
//! last one to write wins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use tops_config::AcmeAccountConfig;
use tops_core::ChangeLogger;
use tops_database::UnitOfWork;
use tops_entities::deliveryservice;
use tops_vault::{DeliveryServiceSslKeys, SslKeyCertificate, TrafficVault};
use tracing::{error, info, warn};

use crate::account::{AccountLookup, AccountManager};
use crate::changelog::{self, SslKeyChange};
use crate::codec::{
    decode_legacy_pem, encode_legacy_double, generate_rsa_key, parse_expiration_and_sans,
    summarize_certificate, RsaKey,
};
use crate::errors::{CodecError, RenewError};
use crate::protocol::CertificateRequest;

/// CSR field of renewed bundles. A renewal produces no CSR worth keeping.
pub const RENEWED_CSR_PLACEHOLDER: &[u8] = b"ACME Generated";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewedCertificate {
    pub xml_id: String,
    pub version: i32,
    pub expiration: DateTime<Utc>,
}

pub(crate) async fn find_delivery_service<C: ConnectionTrait>(
    db: &C,
    xml_id: &str,
) -> Result<deliveryservice::Model, RenewError> {
    deliveryservice::Entity::find()
        .filter(deliveryservice::Column::XmlId.eq(xml_id))
        .one(db)
        .await?
        .ok_or_else(|| RenewError::DeliveryServiceNotFound(xml_id.to_string()))
}

/// Fresh certificate key. RSA generation is CPU bound and kept off the
/// async workers.
pub(crate) async fn fresh_key() -> Result<RsaKey, CodecError> {
    tokio::task::spawn_blocking(generate_rsa_key)
        .await
        .map_err(|e| CodecError::Generation(e.to_string()))?
}

pub(crate) async fn bump_key_version(
    uow: &UnitOfWork,
    xml_id: &str,
    version: i32,
) -> Result<(), RenewError> {
    let ds = xml_id.to_string();
    let updated = uow
        .run_in_new_transaction::<_, u64, RenewError>(move |txn| {
            Box::pin(async move {
                let result = deliveryservice::Entity::update_many()
                    .col_expr(deliveryservice::Column::SslKeyVersion, Expr::value(version))
                    .filter(deliveryservice::Column::XmlId.eq(ds.as_str()))
                    .exec(txn)
                    .await?;
                Ok(result.rows_affected)
            })
        })
        .await?;

    if updated == 0 {
        return Err(RenewError::DeliveryServiceNotFound(xml_id.to_string()));
    }
    Ok(())
}

/// Vault write followed by the version bump.
///
/// Both writes run on a spawned task so that dropping the caller (a batch
/// deadline or a cancelled job) cannot stop between them.
pub(crate) async fn store_bundle(
    vault: &Arc<dyn TrafficVault>,
    uow: &UnitOfWork,
    keys: &DeliveryServiceSslKeys,
    previous_version: i32,
) -> Result<(), RenewError> {
    tokio::spawn(write_bundle(
        Arc::clone(vault),
        uow.clone(),
        keys.clone(),
        previous_version,
    ))
    .await
    .map_err(|e| RenewError::Database(format!("SSL key store task failed: {e}")))?
}

async fn write_bundle(
    vault: Arc<dyn TrafficVault>,
    uow: UnitOfWork,
    keys: DeliveryServiceSslKeys,
    previous_version: i32,
) -> Result<(), RenewError> {
    vault.put_delivery_service_ssl_keys(&keys).await?;

    if let Err(e) = bump_key_version(&uow, &keys.delivery_service, keys.version).await {
        error!(
            "SSL keys for {} were stored as version {} but ssl_key_version is still {}: {}",
            keys.delivery_service, keys.version, previous_version, e
        );
        return Err(e);
    }
    Ok(())
}

/// Every name to put in the new certificate, common name first.
fn certificate_domains(keys: &DeliveryServiceSslKeys) -> Result<Vec<String>, RenewError> {
    let crt = decode_legacy_pem(&keys.certificate.crt)?;
    let mut domains = summarize_certificate(&crt)?.domains();
    if domains.is_empty() && !keys.hostname.is_empty() {
        domains.push(keys.hostname.clone());
    }
    if domains.is_empty() {
        return Err(CodecError::MalformedCert("certificate names no domains".to_string()).into());
    }
    Ok(domains)
}

pub struct RenewalEngine {
    vault: Arc<dyn TrafficVault>,
    uow: UnitOfWork,
    accounts: AccountManager,
    lookup: Arc<dyn AccountLookup>,
    change_log: Arc<dyn ChangeLogger>,
}

impl RenewalEngine {
    pub fn new(
        vault: Arc<dyn TrafficVault>,
        uow: UnitOfWork,
        accounts: AccountManager,
        lookup: Arc<dyn AccountLookup>,
        change_log: Arc<dyn ChangeLogger>,
    ) -> Self {
        Self {
            vault,
            uow,
            accounts,
            lookup,
            change_log,
        }
    }

    /// Renews the bundle at `current_version` with the provider its auth
    /// type names.
    pub async fn renew(
        &self,
        xml_id: &str,
        current_version: i32,
        username: &str,
    ) -> Result<RenewedCertificate, RenewError> {
        let ds = find_delivery_service(self.uow.connection(), xml_id).await?;
        let keys = self.load_bundle(xml_id, current_version).await?;
        let config = self
            .lookup
            .account_config(&keys.auth_type)
            .ok_or_else(|| RenewError::NoAccountConfig(keys.auth_type.clone()))?;

        let result = self.renew_loaded(&config, &keys).await;
        self.record_outcome(&ds, &config.acme_provider, username, &result)
            .await;
        result
    }

    pub async fn renew_certificate(
        &self,
        config: &AcmeAccountConfig,
        xml_id: &str,
        current_version: i32,
        username: &str,
    ) -> Result<RenewedCertificate, RenewError> {
        let ds = find_delivery_service(self.uow.connection(), xml_id).await?;
        let keys = self.load_bundle(xml_id, current_version).await?;

        let result = self.renew_loaded(config, &keys).await;
        self.record_outcome(&ds, &config.acme_provider, username, &result)
            .await;
        result
    }

    async fn load_bundle(
        &self,
        xml_id: &str,
        version: i32,
    ) -> Result<DeliveryServiceSslKeys, RenewError> {
        let version = version.to_string();
        self.vault
            .get_delivery_service_ssl_keys(xml_id, Some(&version))
            .await?
            .ok_or_else(|| RenewError::KeyNotFound {
                xml_id: xml_id.to_string(),
                version,
            })
    }

    async fn renew_loaded(
        &self,
        config: &AcmeAccountConfig,
        keys: &DeliveryServiceSslKeys,
    ) -> Result<RenewedCertificate, RenewError> {
        let xml_id = keys.delivery_service.as_str();
        let domains = certificate_domains(keys)?;

        let client = self
            .accounts
            .get_or_create_acme_client(config, &self.uow, xml_id)
            .await?;

        let key = fresh_key().await?;
        let csr_der = key.certificate_request(&domains)?;
        let issued = client.obtain(&CertificateRequest { domains, csr_der }).await?;
        let (expiration, sans) = parse_expiration_and_sans(&issued.chain_pem)?;

        let renewed = DeliveryServiceSslKeys {
            version: keys.version + 1,
            certificate: SslKeyCertificate {
                crt: encode_legacy_double(issued.chain_pem.as_bytes()),
                key: encode_legacy_double(key.pkcs1_pem.as_bytes()),
                csr: encode_legacy_double(RENEWED_CSR_PLACEHOLDER),
            },
            expiration: Some(expiration),
            sans,
            ..keys.clone()
        };

        store_bundle(&self.vault, &self.uow, &renewed, keys.version).await?;
        info!(
            "renewed certificate for {}: version {} expires {}",
            xml_id, renewed.version, expiration
        );

        Ok(RenewedCertificate {
            xml_id: xml_id.to_string(),
            version: renewed.version,
            expiration,
        })
    }

    async fn record_outcome(
        &self,
        ds: &deliveryservice::Model,
        provider: &str,
        username: &str,
        result: &Result<RenewedCertificate, RenewError>,
    ) {
        let change = match result {
            Ok(_) => SslKeyChange::added_with(&ds.xml_id, ds.id, provider, username),
            Err(e) => {
                warn!("renewal of {} with {} failed: {}", ds.xml_id, provider, e);
                SslKeyChange::failed_with(&ds.xml_id, ds.id, provider, username)
            }
        };
        changelog::record(self.change_log.as_ref(), &change).await;
    }
}
