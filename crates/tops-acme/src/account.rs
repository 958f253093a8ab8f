//! ACME accounts: which provider configuration applies to a bundle, and a
//! registered client for it.
//!
//! Nothing is cached in memory. Each client construction re-reads the
//! `acme_account` row, asks the CA whether the stored registration is still
//! valid and registers again when it is not.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use tops_config::{AcmeAccountConfig, ServerConfig};
use tops_database::UnitOfWork;
use tops_entities::acme_account;
use tops_vault::AUTH_TYPE_LETS_ENCRYPT;
use tracing::{debug, info, warn};

use crate::dns01::DnsChallengeProvider;
use crate::errors::{AccountError, ProtocolError};
use crate::protocol::{
    AcmeProtocol, CertificateRequest, ExternalAccountBinding, IssuedCertificate, Registration,
    VALID_REGISTRATION,
};

/// Resolves the ACME account configuration for a bundle's auth type.
pub trait AccountLookup: Send + Sync {
    fn account_config(&self, auth_type: &str) -> Option<AcmeAccountConfig>;
}

/// Provider configurations taken from the server configuration. Let's
/// Encrypt is built from the `lets_encrypt` section; every other provider
/// comes from `acme_accounts`.
#[derive(Debug, Clone)]
pub struct ConfiguredAccounts {
    lets_encrypt: AcmeAccountConfig,
    accounts: Vec<AcmeAccountConfig>,
}

impl ConfiguredAccounts {
    pub fn from_config(config: &ServerConfig) -> Self {
        let directory = if config.lets_encrypt.is_staging() {
            instant_acme::LetsEncrypt::Staging.url()
        } else {
            instant_acme::LetsEncrypt::Production.url()
        };
        Self {
            lets_encrypt: AcmeAccountConfig {
                acme_provider: AUTH_TYPE_LETS_ENCRYPT.to_string(),
                user_email: config.lets_encrypt.user_email.clone(),
                acme_url: directory.to_string(),
                ..Default::default()
            },
            accounts: config.acme_accounts.clone(),
        }
    }
}

impl AccountLookup for ConfiguredAccounts {
    fn account_config(&self, auth_type: &str) -> Option<AcmeAccountConfig> {
        if auth_type == AUTH_TYPE_LETS_ENCRYPT {
            return Some(self.lets_encrypt.clone());
        }
        self.accounts
            .iter()
            .find(|account| account.acme_provider == auth_type)
            .cloned()
    }
}

/// A registered client, ready to order certificates for one delivery service.
pub struct AcmeClient {
    protocol: Arc<dyn AcmeProtocol>,
    provider: String,
    directory_url: String,
    registration: Registration,
    solver: DnsChallengeProvider,
}

impl AcmeClient {
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    pub async fn obtain(
        &self,
        request: &CertificateRequest,
    ) -> Result<IssuedCertificate, ProtocolError> {
        debug!(
            "requesting certificate for {:?} from {}",
            request.domains, self.provider
        );
        self.protocol
            .obtain_certificate(&self.directory_url, &self.registration, request, &self.solver)
            .await
    }
}

/// Stored account key must at least be PEM with a private key in it.
fn check_stored_key(private_key_pem: &str) -> Result<(), AccountError> {
    let mut reader = private_key_pem.as_bytes();
    for item in rustls_pemfile::read_all(&mut reader) {
        match item.map_err(|e| AccountError::DecodingKey(e.to_string()))? {
            rustls_pemfile::Item::Pkcs1Key(_)
            | rustls_pemfile::Item::Pkcs8Key(_)
            | rustls_pemfile::Item::Sec1Key(_) => return Ok(()),
            _ => continue,
        }
    }
    Err(AccountError::DecodingKey(
        "no private key in stored PEM".to_string(),
    ))
}

#[derive(Clone)]
pub struct AccountManager {
    protocol: Arc<dyn AcmeProtocol>,
}

impl AccountManager {
    pub fn new(protocol: Arc<dyn AcmeProtocol>) -> Self {
        Self { protocol }
    }

    pub async fn find_account(
        &self,
        uow: &UnitOfWork,
        email: &str,
        provider: &str,
    ) -> Result<Option<acme_account::Model>, AccountError> {
        Ok(acme_account::Entity::find()
            .filter(acme_account::Column::Email.eq(email))
            .filter(acme_account::Column::Provider.eq(provider))
            .one(uow.connection())
            .await?)
    }

    /// Client for `config`, registering (or registering again) when needed.
    /// DNS-01 answers are published on behalf of `xml_id`.
    pub async fn get_or_create_acme_client(
        &self,
        config: &AcmeAccountConfig,
        uow: &UnitOfWork,
        xml_id: &str,
    ) -> Result<AcmeClient, AccountError> {
        let email = config.user_email.trim();
        if email.is_empty() {
            return Err(AccountError::MissingEmail);
        }
        let provider = config.acme_provider.as_str();
        let directory_url = config.acme_url.as_str();

        let stored = match self.find_account(uow, email, provider).await? {
            Some(row) => {
                check_stored_key(&row.private_key)?;
                Some(Registration {
                    uri: row.uri,
                    private_key_pem: row.private_key,
                })
            }
            None => None,
        };

        let reusable = match stored {
            Some(registration) => {
                match self
                    .protocol
                    .registration_status(directory_url, &registration)
                    .await
                {
                    Ok(status) if status == VALID_REGISTRATION => Some(registration),
                    Ok(status) => {
                        warn!(
                            "ACME account {} for {} with {} is {}; registering again",
                            registration.uri, email, provider, status
                        );
                        None
                    }
                    Err(
                        e @ (ProtocolError::AccountDoesNotExist
                        | ProtocolError::UnsupportedKey(_)),
                    ) => {
                        warn!(
                            "ACME account {} for {} with {} is unusable: {}; registering again",
                            registration.uri, email, provider, e
                        );
                        None
                    }
                    Err(e) => {
                        warn!(
                            "could not confirm ACME account {} for {} with {}: {}",
                            registration.uri, email, provider, e
                        );
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        let registration = match reusable {
            Some(registration) => registration,
            None => {
                let binding = config
                    .has_external_account_binding()
                    .then(|| ExternalAccountBinding {
                        kid: config.kid.clone(),
                        hmac_encoded: config.hmac_encoded.clone(),
                    });
                let registration = self
                    .protocol
                    .register(directory_url, email, binding.as_ref())
                    .await?;
                store_account(uow, email, provider, &registration).await?;
                info!("stored ACME account for {} with {}", email, provider);
                registration
            }
        };

        Ok(AcmeClient {
            protocol: self.protocol.clone(),
            provider: provider.to_string(),
            directory_url: directory_url.to_string(),
            registration,
            solver: DnsChallengeProvider::new(uow.clone(), xml_id),
        })
    }
}

/// Upsert on (email, provider). Two first-time registrations racing for
/// the same identity both succeed at the CA; the later write wins here.
async fn store_account(
    uow: &UnitOfWork,
    email: &str,
    provider: &str,
    registration: &Registration,
) -> Result<(), AccountError> {
    let model = acme_account::ActiveModel {
        email: Set(email.to_string()),
        private_key: Set(registration.private_key_pem.clone()),
        uri: Set(registration.uri.clone()),
        provider: Set(provider.to_string()),
        last_updated: Set(Utc::now()),
        ..Default::default()
    };

    let rows = uow
        .run_in_new_transaction::<_, u64, AccountError>(move |txn| {
            Box::pin(async move {
                let rows = acme_account::Entity::insert(model)
                    .on_conflict(
                        OnConflict::columns([
                            acme_account::Column::Email,
                            acme_account::Column::Provider,
                        ])
                        .update_columns([
                            acme_account::Column::PrivateKey,
                            acme_account::Column::Uri,
                            acme_account::Column::LastUpdated,
                        ])
                        .to_owned(),
                    )
                    .exec_without_returning(txn)
                    .await?;
                Ok(rows)
            })
        })
        .await?;

    if rows == 0 {
        return Err(AccountError::AccountNotStored {
            email: email.to_string(),
            provider: provider.to_string(),
        });
    }
    Ok(())
}
