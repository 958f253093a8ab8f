//! New certificates from an ACME provider, for delivery services that ask
//! for one and for Let's Encrypt bundles the batch renews.

use std::sync::Arc;

use sea_orm::*;
use serde::{Deserialize, Deserializer, Serialize};
use tops_config::AcmeAccountConfig;
use tops_core::{ApiError, ApiResult, ChangeLogger};
use tops_database::{DbConnection, UnitOfWork};
use tops_entities::cdn;
use tops_queue::TaskQueue;
use tops_vault::{DeliveryServiceSslKeys, SslKeyCertificate, TrafficVault, AUTH_TYPE_LETS_ENCRYPT};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::account::{AccountLookup, AccountManager};
use crate::authorization::check_cdn_locks;
use crate::autorenew::{RENEWAL_COMPLETE, RENEWAL_FAILED};
use crate::changelog::{self, SslKeyChange};
use crate::codec::{
    encode_legacy_double, parse_expiration_and_sans, pem_encode, verify_certificate_chain,
};
use crate::errors::RenewError;
use crate::protocol::CertificateRequest;
use crate::renew::{find_delivery_service, fresh_key, store_bundle, RenewedCertificate};
use crate::status::{submit_tracked, AsyncStatusStore, JobTicket, STATUS_FAILED, STATUS_SUCCEEDED};

/// Body of the certificate generation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AcmeGenerateRequest {
    #[serde(rename = "deliveryservice")]
    pub delivery_service: String,
    pub cdn: String,
    pub hostname: String,
    /// Version to store the bundle as. Absent means one past the current one.
    #[serde(default, deserialize_with = "optional_version")]
    #[schema(value_type = Option<String>)]
    pub version: Option<i32>,
    /// Provider to use. The Let's Encrypt endpoint ignores it.
    #[serde(rename = "authType", default)]
    pub auth_type: Option<String>,
}

fn optional_version<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i32),
        Str(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(n)) => Ok(Some(n)),
        Some(Raw::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Str(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Names to order for `hostname`. A wildcard also covers its base domain.
pub fn requested_domains(hostname: &str) -> Vec<String> {
    let mut domains = vec![hostname.to_string()];
    if let Some(base) = hostname.strip_prefix("*.") {
        domains.push(base.to_string());
    }
    domains
}

pub struct Issuer {
    vault: Arc<dyn TrafficVault>,
    uow: UnitOfWork,
    accounts: AccountManager,
    lookup: Arc<dyn AccountLookup>,
    change_log: Arc<dyn ChangeLogger>,
}

impl Issuer {
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

    /// Orders a certificate for `request.hostname` from `provider` and
    /// stores it as the delivery service's next bundle.
    pub async fn obtain_certificate(
        &self,
        request: &AcmeGenerateRequest,
        provider: &str,
        username: &str,
    ) -> Result<RenewedCertificate, RenewError> {
        let ds = find_delivery_service(self.uow.connection(), &request.delivery_service).await?;
        let config = self
            .lookup
            .account_config(provider)
            .ok_or_else(|| RenewError::NoAccountConfig(provider.to_string()))?;
        let version = request.version.unwrap_or(ds.ssl_key_version + 1);

        let result = self
            .issue(request, &config, version, ds.ssl_key_version)
            .await;

        let change = match &result {
            Ok(_) => SslKeyChange::added_with(&ds.xml_id, ds.id, provider, username),
            Err(e) => {
                warn!(
                    "{} certificate for {} failed: {}",
                    provider, request.delivery_service, e
                );
                SslKeyChange::failed_with(&ds.xml_id, ds.id, provider, username)
            }
        };
        changelog::record(self.change_log.as_ref(), &change).await;
        result
    }

    /// Replaces a stored Let's Encrypt (or converted self-signed) bundle with
    /// a fresh Let's Encrypt certificate one version up.
    pub async fn renew_with_lets_encrypt(
        &self,
        keys: &DeliveryServiceSslKeys,
        username: &str,
    ) -> Result<RenewedCertificate, RenewError> {
        let request = AcmeGenerateRequest {
            delivery_service: keys.delivery_service.clone(),
            cdn: keys.cdn.clone(),
            hostname: keys.hostname.clone(),
            version: Some(keys.version + 1),
            auth_type: Some(AUTH_TYPE_LETS_ENCRYPT.to_string()),
        };
        self.obtain_certificate(&request, AUTH_TYPE_LETS_ENCRYPT, username)
            .await
    }

    async fn issue(
        &self,
        request: &AcmeGenerateRequest,
        config: &AcmeAccountConfig,
        version: i32,
        previous_version: i32,
    ) -> Result<RenewedCertificate, RenewError> {
        let xml_id = request.delivery_service.as_str();
        let client = self
            .accounts
            .get_or_create_acme_client(config, &self.uow, xml_id)
            .await?;

        let domains = requested_domains(&request.hostname);
        let key = fresh_key().await?;
        let csr_der = key.certificate_request(&domains)?;
        let csr_pem = pem_encode("CERTIFICATE REQUEST", &csr_der);
        let issued = client.obtain(&CertificateRequest { domains, csr_der }).await?;

        let verified = verify_certificate_chain(&issued.chain_pem, &key.pkcs1_pem, None)?;
        if verified.unknown_authority {
            warn!(
                "certificate for {} from {} chains to an unknown authority",
                xml_id,
                client.provider()
            );
        }
        let (expiration, sans) = parse_expiration_and_sans(&verified.chain_pem)?;

        let keys = DeliveryServiceSslKeys {
            delivery_service: xml_id.to_string(),
            cdn: request.cdn.clone(),
            hostname: request.hostname.clone(),
            key: xml_id.to_string(),
            auth_type: config.acme_provider.clone(),
            version,
            certificate: SslKeyCertificate {
                crt: encode_legacy_double(verified.chain_pem.as_bytes()),
                key: encode_legacy_double(key.pkcs1_pem.as_bytes()),
                csr: encode_legacy_double(csr_pem.as_bytes()),
            },
            expiration: Some(expiration),
            sans,
        };

        store_bundle(&self.vault, &self.uow, &keys, previous_version).await?;
        info!(
            "stored {} certificate for {} as version {}",
            config.acme_provider, xml_id, version
        );

        Ok(RenewedCertificate {
            xml_id: xml_id.to_string(),
            version,
            expiration,
        })
    }
}

/// Generation requests run on the worker pool. The request is checked
/// before anything is queued.
pub struct IssueJobs {
    issuer: Arc<Issuer>,
    queue: Arc<dyn TaskQueue>,
    status: AsyncStatusStore,
    db: Arc<DbConnection>,
}

impl IssueJobs {
    pub fn new(
        issuer: Arc<Issuer>,
        queue: Arc<dyn TaskQueue>,
        status: AsyncStatusStore,
        db: Arc<DbConnection>,
    ) -> Self {
        Self {
            issuer,
            queue,
            status,
            db,
        }
    }

    async fn validate(&self, request: &AcmeGenerateRequest, username: &str) -> ApiResult<()> {
        let ds = find_delivery_service(self.db.as_ref(), &request.delivery_service).await?;
        let owner = cdn::Entity::find()
            .filter(cdn::Column::Name.eq(request.cdn.as_str()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| ApiError::system(e.to_string()))?
            .ok_or_else(|| ApiError::not_found(format!("CDN {} not found", request.cdn)))?;
        if ds.cdn_id != owner.id {
            return Err(ApiError::bad_request(format!(
                "delivery service {} is not in CDN {}",
                ds.xml_id, owner.name
            )));
        }
        check_cdn_locks(self.db.as_ref(), username, &[owner.name.as_str()]).await
    }

    /// Checks the request and queues the order. The certificate is stored
    /// by the job; progress is on the returned status row.
    pub async fn start(
        &self,
        request: AcmeGenerateRequest,
        provider: &str,
        username: &str,
    ) -> ApiResult<JobTicket> {
        self.validate(&request, username).await?;
        if self.issuer.lookup.account_config(provider).is_none() {
            return Err(ApiError::bad_request(format!(
                "no ACME account configuration for {provider}"
            )));
        }

        let issuer = self.issuer.clone();
        let status = self.status.clone();
        let provider = provider.to_string();
        let username = username.to_string();
        submit_tracked(
            &self.status,
            self.queue.as_ref(),
            "acme-generate",
            move |status_id, _cancel| async move {
                let (state, message) = match issuer
                    .obtain_certificate(&request, &provider, &username)
                    .await
                {
                    Ok(_) => (STATUS_SUCCEEDED, RENEWAL_COMPLETE),
                    Err(e) => {
                        error!(
                            "{} certificate for {} failed: {}",
                            provider, request.delivery_service, e
                        );
                        (STATUS_FAILED, RENEWAL_FAILED)
                    }
                };
                if let Err(e) = status.finish(status_id, state, message).await {
                    error!("could not finalize async status {}: {}", status_id, e);
                }
            },
        )
        .await
    }
}
