//! DNS-01 challenges published through the `dnschallenges` table, which
//! the traffic routers serve as TXT records.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sea_orm::*;
use sha2::{Digest, Sha256};
use tops_database::UnitOfWork;
use tops_entities::dnschallenges;
use tracing::{debug, info};

use crate::errors::DnsChallengeError;

const CHALLENGE_LABEL: &str = "_acme-challenge.";

/// Fully qualified name of the TXT record that answers a challenge for `domain`.
pub fn challenge_fqdn(domain: &str) -> String {
    let domain = domain.strip_prefix("*.").unwrap_or(domain);
    if domain.ends_with('.') {
        format!("{CHALLENGE_LABEL}{domain}")
    } else {
        format!("{CHALLENGE_LABEL}{domain}.")
    }
}

/// TXT record value for a key authorization: `base64url(sha256(key_auth))`, unpadded.
pub fn challenge_record(key_authorization: &str) -> String {
    let digest = Sha256::digest(key_authorization.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Publishes and withdraws DNS-01 answers while an ACME order is validated.
#[async_trait]
pub trait Dns01Solver: Send + Sync {
    async fn present(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<(), DnsChallengeError>;

    async fn cleanup(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<(), DnsChallengeError>;
}

/// Challenge provider bound to one delivery service for the lifetime of
/// one ACME client.
#[derive(Clone)]
pub struct DnsChallengeProvider {
    uow: UnitOfWork,
    xml_id: String,
}

impl DnsChallengeProvider {
    pub fn new(uow: UnitOfWork, xml_id: impl Into<String>) -> Self {
        Self {
            uow,
            xml_id: xml_id.into(),
        }
    }

    pub fn xml_id(&self) -> &str {
        &self.xml_id
    }
}

#[async_trait]
impl Dns01Solver for DnsChallengeProvider {
    async fn present(
        &self,
        domain: &str,
        _token: &str,
        key_authorization: &str,
    ) -> Result<(), DnsChallengeError> {
        let fqdn = challenge_fqdn(domain);
        let record = challenge_record(key_authorization);
        let xml_id = self.xml_id.clone();
        let row_fqdn = fqdn.clone();

        let inserted = self
            .uow
            .run_in_new_transaction::<_, u64, DnsChallengeError>(move |txn| {
                Box::pin(async move {
                    let challenge = dnschallenges::ActiveModel {
                        fqdn: Set(row_fqdn),
                        record: Set(record),
                        xml_id: Set(xml_id),
                        ..Default::default()
                    };
                    let rows = dnschallenges::Entity::insert(challenge)
                        .exec_without_returning(txn)
                        .await?;
                    Ok(rows)
                })
            })
            .await?;

        if inserted == 0 {
            return Err(DnsChallengeError::NotInserted { fqdn });
        }
        info!("published DNS-01 challenge {} for {}", fqdn, self.xml_id);
        Ok(())
    }

    async fn cleanup(
        &self,
        domain: &str,
        _token: &str,
        key_authorization: &str,
    ) -> Result<(), DnsChallengeError> {
        let fqdn = challenge_fqdn(domain);
        let record = challenge_record(key_authorization);

        let deleted = dnschallenges::Entity::delete_many()
            .filter(dnschallenges::Column::Fqdn.eq(fqdn.as_str()))
            .filter(dnschallenges::Column::Record.eq(record))
            .exec(self.uow.connection())
            .await?;

        if deleted.rows_affected == 0 {
            return Err(DnsChallengeError::NotFound { fqdn });
        }
        debug!("removed DNS-01 challenge {}", fqdn);
        Ok(())
    }
}

/// Challenge records currently published, optionally for one FQDN.
pub async fn list_challenges(
    db: &DatabaseConnection,
    fqdn: Option<&str>,
) -> Result<Vec<dnschallenges::Model>, DnsChallengeError> {
    let mut query = dnschallenges::Entity::find().order_by_asc(dnschallenges::Column::Id);
    if let Some(fqdn) = fqdn {
        query = query.filter(dnschallenges::Column::Fqdn.eq(fqdn));
    }
    Ok(query.all(db).await?)
}
