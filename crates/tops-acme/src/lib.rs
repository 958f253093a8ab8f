//! ACME certificate pipeline for delivery services: issuance, renewal,
//! batch auto-renewal and manual key management.

pub mod account;
pub mod authorization;
pub mod autorenew;
pub mod changelog;
pub mod codec;
pub mod dns01;
pub mod errors;
pub mod handlers;
pub mod issue;
pub mod keys;
pub mod protocol;
pub mod renew;
pub mod status;

#[cfg(test)]
pub(crate) mod test_utils;

pub use account::{AccountLookup, AccountManager, ConfiguredAccounts};
pub use autorenew::{
    AutoRenewer, BatchReport, ExpirationSummary, RenewalCandidate, RenewalCandidateSource,
    RenewalJob, RenewalOutcome, RenewalSettings,
};
pub use errors::{AccountError, CodecError, DnsChallengeError, ProtocolError, RenewError};
pub use handlers::{
    configure_routes, create_acme_app_state, AcmeApiDoc, AcmeAppState, AcmeDependencies,
};
pub use issue::{AcmeGenerateRequest, IssueJobs, Issuer};
pub use keys::{KeyService, StaleKeyCleanup};
pub use protocol::{AcmeProtocol, InstantAcmeProtocol};
pub use renew::{RenewalEngine, RenewedCertificate};
pub use status::{AsyncJobStatus, AsyncStatusStore, JobTicket};
