use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tops_config::ServerConfig;
use tops_core::{ChangeLogger, NotificationService};
use tops_database::{DbConnection, UnitOfWork};
use tops_entities::dnschallenges;
use tops_queue::{CdnWorkerSupervisor, TaskQueue};
use tops_vault::TrafficVault;
use utoipa::{IntoParams, ToSchema};

use crate::account::{AccountLookup, AccountManager, ConfiguredAccounts};
use crate::autorenew::{AutoRenewer, RenewalJob, RenewalSettings};
use crate::changelog::DbChangeLogger;
use crate::issue::{IssueJobs, Issuer};
use crate::keys::KeyService;
use crate::protocol::AcmeProtocol;
use crate::renew::RenewalEngine;
use crate::status::AsyncStatusStore;

pub struct AcmeAppState {
    pub db: Arc<DbConnection>,
    pub vault: Arc<dyn TrafficVault>,
    pub renewal_engine: Arc<RenewalEngine>,
    pub renewal_job: Arc<RenewalJob>,
    pub auto_renewer: Arc<AutoRenewer>,
    pub issue_jobs: Arc<IssueJobs>,
    pub keys: Arc<KeyService>,
    pub status: AsyncStatusStore,
}

/// Shared services the ACME state is assembled from.
pub struct AcmeDependencies {
    pub db: Arc<DbConnection>,
    pub vault: Arc<dyn TrafficVault>,
    pub protocol: Arc<dyn AcmeProtocol>,
    pub queue: Arc<dyn TaskQueue>,
    pub supervisor: Arc<CdnWorkerSupervisor>,
    pub notifier: Arc<dyn NotificationService>,
}

pub fn create_acme_app_state(config: &ServerConfig, deps: AcmeDependencies) -> Arc<AcmeAppState> {
    let AcmeDependencies {
        db,
        vault,
        protocol,
        queue,
        supervisor,
        notifier,
    } = deps;

    let uow = UnitOfWork::new(db.clone());
    let lookup: Arc<dyn AccountLookup> = Arc::new(ConfiguredAccounts::from_config(config));
    let change_log: Arc<dyn ChangeLogger> = Arc::new(DbChangeLogger::new(db.clone()));
    let status = AsyncStatusStore::new(db.clone());

    let renewal_engine = Arc::new(RenewalEngine::new(
        vault.clone(),
        uow.clone(),
        AccountManager::new(protocol.clone()),
        lookup.clone(),
        change_log.clone(),
    ));
    let issuer = Arc::new(Issuer::new(
        vault.clone(),
        uow.clone(),
        AccountManager::new(protocol),
        lookup.clone(),
        change_log.clone(),
    ));
    let renewal_job = Arc::new(RenewalJob::new(
        vault.clone(),
        renewal_engine.clone(),
        issuer.clone(),
        lookup,
        status.clone(),
        notifier,
        RenewalSettings::from_config(config),
    ));
    let auto_renewer = Arc::new(AutoRenewer::new(
        renewal_job.clone(),
        queue.clone(),
        status.clone(),
        db.clone(),
    ));
    let issue_jobs = Arc::new(IssueJobs::new(issuer, queue, status.clone(), db.clone()));
    let keys = Arc::new(KeyService::new(
        vault.clone(),
        uow,
        change_log,
        supervisor,
        config.default_certificate_info.clone(),
    ));

    Arc::new(AcmeAppState {
        db,
        vault,
        renewal_engine,
        renewal_job,
        auto_renewer,
        issue_jobs,
        keys,
        status,
    })
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SslKeysQuery {
    /// Bundle version. Absent means the latest.
    pub version: Option<String>,
    /// Return PEM text instead of the stored encoding.
    #[serde(default)]
    pub decode: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeleteSslKeysQuery {
    pub version: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DnsRecordsQuery {
    pub fqdn: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DnsRecord {
    pub fqdn: String,
    pub record: String,
    #[serde(rename = "xmlId")]
    pub xml_id: String,
}

impl From<dnschallenges::Model> for DnsRecord {
    fn from(model: dnschallenges::Model) -> Self {
        Self {
            fqdn: model.fqdn,
            record: model.record,
            xml_id: model.xml_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RenewResponse {
    pub version: i32,
    #[schema(value_type = String, format = DateTime)]
    pub expiration: tops_core::UtcDateTime,
}
