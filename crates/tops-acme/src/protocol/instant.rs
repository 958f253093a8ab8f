use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, ExternalAccountKey,
    Identifier, NewAccount, NewOrder, Order, OrderStatus,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::{
    probe, AcmeProtocol, CertificateRequest, ExternalAccountBinding, IssuedCertificate,
    Registration,
};
use crate::codec::pem_encode;
use crate::dns01::Dns01Solver;
use crate::errors::ProtocolError;

const ORDER_POLL_ATTEMPTS: u32 = 8;
const ORDER_POLL_BASE_DELAY_SECS: u64 = 2;
const ORDER_POLL_MAX_DELAY_SECS: u64 = 30;
const CERTIFICATE_POLL_ATTEMPTS: u32 = 10;

/// Fields of instant-acme's serialized credentials this crate relies on.
#[derive(Deserialize)]
struct CredentialFields {
    id: String,
    key_pkcs8: String,
}

/// [`AcmeProtocol`] over the `instant-acme` client.
///
/// The library only creates ECDSA P-256 account keys, so registrations made
/// here always carry a PKCS#8 EC key. Stored PKCS#1 RSA keys from older
/// registrations are reported as unusable and get replaced.
#[derive(Clone, Default)]
pub struct InstantAcmeProtocol {
    http: reqwest::Client,
}

impl InstantAcmeProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    async fn load_account(
        &self,
        directory_url: &str,
        registration: &Registration,
    ) -> Result<Account, ProtocolError> {
        let pkcs8 = probe::account_key_der(&registration.private_key_pem)?;
        let credentials: AccountCredentials = serde_json::from_value(serde_json::json!({
            "id": registration.uri,
            "key_pkcs8": URL_SAFE_NO_PAD.encode(pkcs8),
            "directory": directory_url,
        }))
        .map_err(|e| ProtocolError::UnsupportedKey(e.to_string()))?;

        Ok(Account::from_credentials(credentials).await?)
    }

    async fn wait_for_order_ready(order: &mut Order) -> Result<(), ProtocolError> {
        for attempt in 1..=ORDER_POLL_ATTEMPTS {
            let delay = std::cmp::min(
                ORDER_POLL_BASE_DELAY_SECS * 2u64.pow(attempt - 1),
                ORDER_POLL_MAX_DELAY_SECS,
            );
            tokio::time::sleep(Duration::from_secs(delay)).await;

            let state = order.refresh().await?;
            match state.status {
                OrderStatus::Ready | OrderStatus::Valid => {
                    debug!("order ready after {} attempt(s)", attempt);
                    return Ok(());
                }
                OrderStatus::Invalid => {
                    let message = format!("order became invalid after {attempt} attempt(s)");
                    error!("{}", message);
                    return Err(ProtocolError::ChallengeFailed(message));
                }
                _ => debug!("order not ready yet (attempt {}/{})", attempt, ORDER_POLL_ATTEMPTS),
            }
        }
        Err(ProtocolError::ChallengeFailed(format!(
            "order validation timed out after {ORDER_POLL_ATTEMPTS} attempts"
        )))
    }

    async fn validate_and_download(
        order: &mut Order,
        request: &CertificateRequest,
        solver: &dyn Dns01Solver,
        presented: &mut Vec<(String, String, String)>,
    ) -> Result<IssuedCertificate, ProtocolError> {
        let authorizations = order.authorizations().await?;
        for authz in &authorizations {
            match authz.status {
                AuthorizationStatus::Pending => {}
                AuthorizationStatus::Valid => continue,
                other => {
                    return Err(ProtocolError::ChallengeFailed(format!(
                        "authorization is {other:?}"
                    )))
                }
            }

            let Identifier::Dns(domain) = &authz.identifier;
            let challenge = authz
                .challenges
                .iter()
                .find(|c| c.r#type == ChallengeType::Dns01)
                .ok_or_else(|| {
                    ProtocolError::ChallengeFailed(format!("no DNS-01 challenge offered for {domain}"))
                })?;

            let key_authorization = order.key_authorization(challenge);
            solver
                .present(domain, &challenge.token, key_authorization.as_str())
                .await
                .map_err(|e| ProtocolError::ChallengeFailed(e.to_string()))?;
            presented.push((
                domain.clone(),
                challenge.token.clone(),
                key_authorization.as_str().to_string(),
            ));

            order.set_challenge_ready(&challenge.url).await?;
        }

        Self::wait_for_order_ready(order).await?;
        if order.state().status == OrderStatus::Ready {
            order.finalize(&request.csr_der).await?;
        }

        for _ in 0..CERTIFICATE_POLL_ATTEMPTS {
            if let Some(chain_pem) = order.certificate().await? {
                return Ok(IssuedCertificate { chain_pem });
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Err(ProtocolError::Acme(
            "certificate was not issued in time".to_string(),
        ))
    }
}

#[async_trait]
impl AcmeProtocol for InstantAcmeProtocol {
    async fn register(
        &self,
        directory_url: &str,
        email: &str,
        binding: Option<&ExternalAccountBinding>,
    ) -> Result<Registration, ProtocolError> {
        let external_key = match binding {
            Some(binding) => {
                let hmac = URL_SAFE_NO_PAD
                    .decode(binding.hmac_encoded.trim_end_matches('='))
                    .map_err(|e| ProtocolError::Acme(format!("invalid EAB HMAC: {e}")))?;
                Some(ExternalAccountKey::new(binding.kid.clone(), &hmac))
            }
            None => None,
        };

        let contact = format!("mailto:{email}");
        let (_account, credentials) = Account::create(
            &NewAccount {
                contact: &[contact.as_str()],
                terms_of_service_agreed: true,
                only_return_existing: false,
            },
            directory_url,
            external_key.as_ref(),
        )
        .await?;

        let fields: CredentialFields = serde_json::to_value(&credentials)
            .and_then(serde_json::from_value)
            .map_err(|e| ProtocolError::Acme(format!("unreadable account credentials: {e}")))?;
        let key_der = URL_SAFE_NO_PAD
            .decode(fields.key_pkcs8.as_bytes())
            .map_err(|e| ProtocolError::Acme(format!("unreadable account key: {e}")))?;

        info!("registered ACME account {} at {}", fields.id, directory_url);
        Ok(Registration {
            uri: fields.id,
            private_key_pem: pem_encode("PRIVATE KEY", &key_der),
        })
    }

    async fn registration_status(
        &self,
        directory_url: &str,
        registration: &Registration,
    ) -> Result<String, ProtocolError> {
        probe::fetch_account_status(&self.http, directory_url, registration).await
    }

    async fn obtain_certificate(
        &self,
        directory_url: &str,
        registration: &Registration,
        request: &CertificateRequest,
        solver: &dyn Dns01Solver,
    ) -> Result<IssuedCertificate, ProtocolError> {
        let account = self.load_account(directory_url, registration).await?;
        let identifiers: Vec<Identifier> = request
            .domains
            .iter()
            .map(|domain| Identifier::Dns(domain.clone()))
            .collect();

        let mut order = account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await?;

        let mut presented = Vec::new();
        let result = Self::validate_and_download(&mut order, request, solver, &mut presented).await;

        // The CA has either validated or given up by now.
        for (domain, token, key_authorization) in &presented {
            if let Err(e) = solver.cleanup(domain, token, key_authorization).await {
                warn!("failed to clean up DNS-01 challenge for {}: {}", domain, e);
            }
        }

        result
    }
}
