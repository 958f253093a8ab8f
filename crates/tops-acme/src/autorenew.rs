//! Batch renewal of every stored certificate that is close to expiring.
//!
//! One job per invocation runs on the worker pool. Candidates are handled
//! one at a time in enumeration order, a failing candidate never stops the
//! loop, and the async status row is updated after every candidate.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::*;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tops_config::ServerConfig;
use tops_core::{ApiError, ApiResult, EmailMessage, NotificationService};
use tops_database::DbConnection;
use tops_entities::{cdn, deliveryservice};
use tops_queue::TaskQueue;
use tops_vault::{DeliveryServiceSslKeys, TrafficVault, AUTH_TYPE_LETS_ENCRYPT, AUTH_TYPE_SELF_SIGNED};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::account::AccountLookup;
use crate::authorization::check_cdn_locks;
use crate::codec::{decode_legacy_pem, parse_expiration_and_sans};
use crate::errors::RenewError;
use crate::issue::Issuer;
use crate::renew::{RenewalEngine, RenewedCertificate};
use crate::status::{
    submit_tracked, AsyncStatusStore, JobTicket, STATUS_FAILED, STATUS_SUCCEEDED,
};

/// Time allowed per candidate. The whole job gets this times the candidate count.
pub const ACME_TIMEOUT_PER_ITEM: Duration = Duration::from_secs(20 * 60);

pub const RENEWAL_COMPLETE: &str = "ACME renewal complete.";
pub const RENEWAL_FAILED: &str = "ACME renewal failed.";

const SUMMARY_SUBJECT: &str = "Certificate Expiration Summary";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalCandidate {
    pub xml_id: String,
    pub ds_id: i32,
    pub cdn: String,
    pub version: i32,
}

/// Delivery services that have stored keys.
#[derive(Clone)]
pub struct RenewalCandidateSource {
    db: Arc<DbConnection>,
}

impl RenewalCandidateSource {
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self { db }
    }

    pub async fn list_candidates(&self, cdn_filter: Option<&str>) -> Result<Vec<RenewalCandidate>, DbErr> {
        let cdns: HashMap<i32, String> = cdn::Entity::find()
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let services = deliveryservice::Entity::find()
            .filter(deliveryservice::Column::SslKeyVersion.ne(0))
            .order_by_asc(deliveryservice::Column::XmlId)
            .all(self.db.as_ref())
            .await?;

        Ok(services
            .into_iter()
            .filter_map(|ds| {
                let cdn = cdns.get(&ds.cdn_id)?.clone();
                Some(RenewalCandidate {
                    xml_id: ds.xml_id,
                    ds_id: ds.id,
                    cdn,
                    version: ds.ssl_key_version,
                })
            })
            .filter(|c| cdn_filter.map_or(true, |name| c.cdn == name))
            .collect())
    }
}

/// Rejects the batch when any candidate's CDN is locked by someone else.
pub async fn authorize<C: ConnectionTrait>(
    db: &C,
    username: &str,
    candidates: &[RenewalCandidate],
) -> ApiResult<()> {
    let cdns: BTreeSet<&str> = candidates.iter().map(|c| c.cdn.as_str()).collect();
    let cdns: Vec<&str> = cdns.into_iter().collect();
    check_cdn_locks(db, username, &cdns).await
}

/// Result for one candidate that was due or could not be examined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RenewalOutcome {
    pub xml_id: String,
    pub version: i32,
    pub expiration: Option<DateTime<Utc>>,
    pub auth_type: String,
    /// Short category of the failure. Never the underlying error text.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ExpirationSummary {
    pub lets_encrypt: Vec<RenewalOutcome>,
    pub self_signed: Vec<RenewalOutcome>,
    pub acme: Vec<RenewalOutcome>,
    pub other: Vec<RenewalOutcome>,
}

impl ExpirationSummary {
    fn buckets(&self) -> [(&'static str, &Vec<RenewalOutcome>); 4] {
        [
            ("Let's Encrypt", &self.lets_encrypt),
            ("Self Signed", &self.self_signed),
            ("ACME", &self.acme),
            ("Other", &self.other),
        ]
    }

    pub fn len(&self) -> usize {
        self.buckets().iter().map(|(_, bucket)| bucket.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    LetsEncrypt,
    SelfSigned,
    Acme,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub summary: ExpirationSummary,
    pub renewed: usize,
    pub errors: usize,
    pub total: usize,
    pub status: &'static str,
}

/// Settings the batch reads from the server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalSettings {
    pub lets_encrypt_window_days: i64,
    pub acme_window_days: i64,
    pub convert_self_signed: bool,
    /// Where the summary goes. `None` sends nothing.
    pub summary_email: Option<String>,
}

impl RenewalSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        let summary_email = (config.lets_encrypt.send_expiration_email
            && !config.acme_renewal.summary_email.is_empty())
        .then(|| config.acme_renewal.summary_email.clone());
        Self {
            lets_encrypt_window_days: config.lets_encrypt.renew_days_before_expiration,
            acme_window_days: config.acme_renewal.renew_days_before_expiration,
            convert_self_signed: config.lets_encrypt.convert_self_signed,
            summary_email,
        }
    }
}

enum Examined {
    NotDue,
    Filed {
        bucket: Bucket,
        outcome: RenewalOutcome,
        renewed: bool,
    },
}

fn failed(
    bucket: Bucket,
    candidate: &RenewalCandidate,
    auth_type: &str,
    expiration: Option<DateTime<Utc>>,
    error: &RenewError,
) -> Examined {
    warn!(
        "renewal of {} version {} failed: {}",
        candidate.xml_id, candidate.version, error
    );
    Examined::Filed {
        bucket,
        outcome: RenewalOutcome {
            xml_id: candidate.xml_id.clone(),
            version: candidate.version,
            expiration,
            auth_type: auth_type.to_string(),
            error: Some(error.category().to_string()),
        },
        renewed: false,
    }
}

fn renewal_result(
    bucket: Bucket,
    candidate: &RenewalCandidate,
    auth_type: &str,
    expiration: DateTime<Utc>,
    result: Result<RenewedCertificate, RenewError>,
) -> Examined {
    match result {
        Ok(renewed) => Examined::Filed {
            bucket,
            outcome: RenewalOutcome {
                xml_id: candidate.xml_id.clone(),
                version: renewed.version,
                expiration: Some(renewed.expiration),
                auth_type: auth_type.to_string(),
                error: None,
            },
            renewed: true,
        },
        Err(e) => failed(bucket, candidate, auth_type, Some(expiration), &e),
    }
}

/// Stop conditions of a batch run.
struct BatchLimits {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl BatchLimits {
    fn unbounded() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    fn exceeded(&self) -> Option<&'static str> {
        if self.cancel.is_cancelled() {
            Some("cancelled")
        } else if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some("timed out")
        } else {
            None
        }
    }
}

pub struct RenewalJob {
    vault: Arc<dyn TrafficVault>,
    engine: Arc<RenewalEngine>,
    issuer: Arc<Issuer>,
    lookup: Arc<dyn AccountLookup>,
    status: AsyncStatusStore,
    notifier: Arc<dyn NotificationService>,
    settings: RenewalSettings,
}

impl RenewalJob {
    pub fn new(
        vault: Arc<dyn TrafficVault>,
        engine: Arc<RenewalEngine>,
        issuer: Arc<Issuer>,
        lookup: Arc<dyn AccountLookup>,
        status: AsyncStatusStore,
        notifier: Arc<dyn NotificationService>,
        settings: RenewalSettings,
    ) -> Self {
        Self {
            vault,
            engine,
            issuer,
            lookup,
            status,
            notifier,
            settings,
        }
    }

    /// Entry point on the worker pool: the batch under a deadline scaled by
    /// candidate count, stopped early when the pool shuts down.
    ///
    /// Both limits are checked between candidates. A candidate already in
    /// progress finishes, so its stores and changelog entry stay consistent.
    pub async fn execute(
        &self,
        candidates: Vec<RenewalCandidate>,
        status_id: i32,
        username: &str,
        cancel: CancellationToken,
    ) {
        let budget = ACME_TIMEOUT_PER_ITEM * candidates.len().max(1) as u32;
        let limits = BatchLimits {
            deadline: Some(Instant::now() + budget),
            cancel,
        };
        self.run_within(&candidates, status_id, username, &limits).await;
    }

    /// Processes every candidate, finalizes the status row, then emails the
    /// summary.
    pub async fn run(
        &self,
        candidates: &[RenewalCandidate],
        status_id: i32,
        username: &str,
    ) -> BatchReport {
        self.run_within(candidates, status_id, username, &BatchLimits::unbounded())
            .await
    }

    async fn run_within(
        &self,
        candidates: &[RenewalCandidate],
        status_id: i32,
        username: &str,
        limits: &BatchLimits,
    ) -> BatchReport {
        let total = candidates.len();
        let mut summary = ExpirationSummary::default();
        let mut renewed = 0;
        let mut errors = 0;
        let mut stopped = None;

        for (index, candidate) in candidates.iter().enumerate() {
            if let Some(reason) = limits.exceeded() {
                error!(
                    "ACME renewal job {} {} with {} of {} candidates left",
                    status_id,
                    reason,
                    total - index,
                    total
                );
                stopped = Some(reason);
                break;
            }

            if let Examined::Filed {
                bucket,
                outcome,
                renewed: ok,
            } = self.examine(candidate, username).await
            {
                if ok {
                    renewed += 1;
                }
                if outcome.error.is_some() {
                    errors += 1;
                }
                match bucket {
                    Bucket::LetsEncrypt => summary.lets_encrypt.push(outcome),
                    Bucket::SelfSigned => summary.self_signed.push(outcome),
                    Bucket::Acme => summary.acme.push(outcome),
                    Bucket::Other => summary.other.push(outcome),
                }
            }

            let progress = format!(
                "ACME renewal in progress: {} renewed, {} errors, {} of {} processed.",
                renewed,
                errors,
                index + 1,
                total
            );
            if let Err(e) = self.status.update_message(status_id, &progress).await {
                warn!("could not update async status {}: {}", status_id, e);
            }
        }

        let (status, message) = if stopped.is_some() || (renewed == 0 && errors > 0) {
            (STATUS_FAILED, RENEWAL_FAILED)
        } else {
            (STATUS_SUCCEEDED, RENEWAL_COMPLETE)
        };
        if let Err(e) = self.status.finish(status_id, status, message).await {
            error!("could not finalize async status {}: {}", status_id, e);
        }
        info!(
            "ACME renewal job {} {}: {} renewed, {} errors, {} candidates",
            status_id, status, renewed, errors, total
        );

        self.send_summary(&summary).await;

        BatchReport {
            summary,
            renewed,
            errors,
            total,
            status,
        }
    }

    async fn examine(&self, candidate: &RenewalCandidate, username: &str) -> Examined {
        let version = candidate.version.to_string();
        let keys: DeliveryServiceSslKeys = match self
            .vault
            .get_delivery_service_ssl_keys(&candidate.xml_id, Some(&version))
            .await
        {
            Ok(Some(keys)) => keys,
            Ok(None) => {
                let err = RenewError::KeyNotFound {
                    xml_id: candidate.xml_id.clone(),
                    version,
                };
                return failed(Bucket::Other, candidate, "", None, &err);
            }
            Err(e) => return failed(Bucket::Other, candidate, "", None, &e.into()),
        };

        let expiration = match decode_legacy_pem(&keys.certificate.crt)
            .and_then(|crt| parse_expiration_and_sans(&crt))
        {
            Ok((expiration, _)) => expiration,
            Err(e) => return failed(Bucket::Other, candidate, &keys.auth_type, None, &e.into()),
        };

        let lets_encrypt_path = keys.auth_type == AUTH_TYPE_LETS_ENCRYPT
            || (keys.auth_type == AUTH_TYPE_SELF_SIGNED && self.settings.convert_self_signed);
        let window = if lets_encrypt_path || keys.auth_type == AUTH_TYPE_SELF_SIGNED {
            self.settings.lets_encrypt_window_days
        } else {
            self.settings.acme_window_days
        };
        if expiration - Utc::now() > chrono::Duration::days(window) {
            debug!("{} expires {}; not due", candidate.xml_id, expiration);
            return Examined::NotDue;
        }

        if lets_encrypt_path {
            let result = self.issuer.renew_with_lets_encrypt(&keys, username).await;
            return renewal_result(Bucket::LetsEncrypt, candidate, &keys.auth_type, expiration, result);
        }

        if keys.auth_type == AUTH_TYPE_SELF_SIGNED {
            return Examined::Filed {
                bucket: Bucket::SelfSigned,
                outcome: RenewalOutcome {
                    xml_id: candidate.xml_id.clone(),
                    version: candidate.version,
                    expiration: Some(expiration),
                    auth_type: keys.auth_type.clone(),
                    error: None,
                },
                renewed: false,
            };
        }

        let Some(config) = self.lookup.account_config(&keys.auth_type) else {
            let err = RenewError::NoAccountConfig(keys.auth_type.clone());
            return failed(Bucket::Other, candidate, &keys.auth_type, Some(expiration), &err);
        };
        let result = self
            .engine
            .renew_certificate(&config, &candidate.xml_id, candidate.version, username)
            .await;
        renewal_result(Bucket::Acme, candidate, &keys.auth_type, expiration, result)
    }

    async fn send_summary(&self, summary: &ExpirationSummary) {
        let Some(to) = &self.settings.summary_email else {
            return;
        };
        let mut message = EmailMessage::new(to.clone(), SUMMARY_SUBJECT);
        message.body = summary_text(summary);
        message.html_body = Some(summary_html(summary));

        match self.notifier.send_email(message).await {
            Ok(()) => info!("sent certificate expiration summary to {}", to),
            Err(e) => error!("could not send certificate expiration summary to {}: {}", to, e),
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn expiration_text(outcome: &RenewalOutcome) -> String {
    outcome
        .expiration
        .map(|e| e.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn summary_text(summary: &ExpirationSummary) -> String {
    let mut text = String::new();
    for (title, bucket) in summary.buckets() {
        text.push_str(&format!("{title} ({})\n", bucket.len()));
        for outcome in bucket {
            text.push_str(&format!(
                "  {} v{} expires {}{}\n",
                outcome.xml_id,
                outcome.version,
                expiration_text(outcome),
                outcome
                    .error
                    .as_deref()
                    .map(|e| format!(" error: {e}"))
                    .unwrap_or_default()
            ));
        }
    }
    text
}

fn summary_html(summary: &ExpirationSummary) -> String {
    let mut html = String::from("<html><body><h1>Certificate Expiration Summary</h1>");
    for (title, bucket) in summary.buckets() {
        html.push_str(&format!("<h2>{} ({})</h2>", escape_html(title), bucket.len()));
        if bucket.is_empty() {
            continue;
        }
        html.push_str(
            "<table><tr><th>Delivery Service</th><th>Version</th><th>Expiration</th>\
             <th>Auth Type</th><th>Error</th></tr>",
        );
        for outcome in bucket {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&outcome.xml_id),
                outcome.version,
                escape_html(&expiration_text(outcome)),
                escape_html(&outcome.auth_type),
                escape_html(outcome.error.as_deref().unwrap_or(""))
            ));
        }
        html.push_str("</table>");
    }
    html.push_str("</body></html>");
    html
}

/// Starts batch renewals on the worker pool.
pub struct AutoRenewer {
    job: Arc<RenewalJob>,
    candidates: RenewalCandidateSource,
    queue: Arc<dyn TaskQueue>,
    status: AsyncStatusStore,
    db: Arc<DbConnection>,
}

impl AutoRenewer {
    pub fn new(
        job: Arc<RenewalJob>,
        queue: Arc<dyn TaskQueue>,
        status: AsyncStatusStore,
        db: Arc<DbConnection>,
    ) -> Self {
        Self {
            job,
            candidates: RenewalCandidateSource::new(db.clone()),
            queue,
            status,
            db,
        }
    }

    /// Authorizes and queues a batch over every candidate. Returns as soon
    /// as the job is queued.
    pub async fn start(&self, username: &str) -> ApiResult<JobTicket> {
        let candidates = self
            .candidates
            .list_candidates(None)
            .await
            .map_err(|e| ApiError::system(e.to_string()))?;
        authorize(self.db.as_ref(), username, &candidates).await?;
        info!(
            "user {} started ACME renewal over {} candidates",
            username,
            candidates.len()
        );

        let job = self.job.clone();
        let username = username.to_string();
        submit_tracked(
            &self.status,
            self.queue.as_ref(),
            "acme-autorenew",
            move |status_id, cancel| async move {
                job.execute(candidates, status_id, &username, cancel).await;
            },
        )
        .await
    }
}
