use thiserror::Error;
use tops_core::ApiError;
use tops_vault::VaultError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid legacy encoding: {0}")]
    Base64(String),

    #[error("No certificate chain found in the input")]
    NoChain,

    #[error("Malformed certificate: {0}")]
    MalformedCert(String),

    #[error("Malformed private key: {0}")]
    MalformedKey(String),

    #[error("Certificate public key does not match the private key")]
    KeyMismatch,

    #[error("Certificate bundle holds no usable certificates")]
    EmptyBundle,

    #[error("Certificate is expired or not yet valid: {0}")]
    Expired(String),

    #[error("Certificate chain verification produced no valid chain")]
    EmptyChain,

    #[error("Certificate generation failed: {0}")]
    Generation(String),
}

impl From<rcgen::Error> for CodecError {
    fn from(error: rcgen::Error) -> Self {
        CodecError::Generation(error.to_string())
    }
}

/// Failures talking to an ACME server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("ACME account does not exist")]
    AccountDoesNotExist,

    #[error("ACME account key is not usable: {0}")]
    UnsupportedKey(String),

    #[error("ACME error: {0}")]
    Acme(String),

    #[error("Challenge failed: {0}")]
    ChallengeFailed(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<instant_acme::Error> for ProtocolError {
    fn from(error: instant_acme::Error) -> Self {
        ProtocolError::Acme(error.to_string())
    }
}

impl From<reqwest::Error> for ProtocolError {
    fn from(error: reqwest::Error) -> Self {
        ProtocolError::Network(error.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsChallengeError {
    #[error("DNS challenge store error: {0}")]
    Database(String),

    #[error("DNS challenge record for {fqdn} was not inserted")]
    NotInserted { fqdn: String },

    #[error("No DNS challenge record for {fqdn} to clean up")]
    NotFound { fqdn: String },
}

impl From<sea_orm::DbErr> for DnsChallengeError {
    fn from(error: sea_orm::DbErr) -> Self {
        DnsChallengeError::Database(error.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("An email address is required to use ACME")]
    MissingEmail,

    #[error("Stored ACME account key could not be decoded: {0}")]
    DecodingKey(String),

    #[error("No ACME account configuration for provider {0}")]
    NoAccountConfig(String),

    #[error("ACME account for {email} with {provider} was not stored")]
    AccountNotStored { email: String, provider: String },

    #[error("ACME account store error: {0}")]
    Database(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<sea_orm::DbErr> for AccountError {
    fn from(error: sea_orm::DbErr) -> Self {
        AccountError::Database(error.to_string())
    }
}

impl From<AccountError> for ApiError {
    fn from(error: AccountError) -> Self {
        match error {
            AccountError::MissingEmail | AccountError::NoAccountConfig(_) => {
                ApiError::bad_request(error.to_string())
            }
            other => ApiError::system(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum RenewError {
    #[error("No SSL keys found for delivery service {xml_id} at version {version}")]
    KeyNotFound { xml_id: String, version: String },

    #[error("Delivery service {0} not found")]
    DeliveryServiceNotFound(String),

    #[error("No ACME account configuration for provider {0}")]
    NoAccountConfig(String),

    #[error("Stored certificate could not be read: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for RenewError {
    fn from(error: sea_orm::DbErr) -> Self {
        RenewError::Database(error.to_string())
    }
}

impl RenewError {
    /// Short category used wherever the raw message must not leak, such as
    /// the renewal summary email.
    pub fn category(&self) -> &'static str {
        match self {
            RenewError::KeyNotFound { .. } => "SSL keys not found",
            RenewError::DeliveryServiceNotFound(_) => "delivery service not found",
            RenewError::NoAccountConfig(_) => "no ACME account configuration",
            RenewError::Codec(_) => "stored certificate could not be decoded",
            RenewError::Account(_) => "ACME account error",
            RenewError::Protocol(_) => "ACME request failed",
            RenewError::Vault(_) => "Traffic Vault error",
            RenewError::Database(_) => "database error",
        }
    }
}

impl From<RenewError> for ApiError {
    fn from(error: RenewError) -> Self {
        match error {
            RenewError::KeyNotFound { .. } | RenewError::DeliveryServiceNotFound(_) => {
                ApiError::not_found(error.to_string())
            }
            RenewError::NoAccountConfig(_) => ApiError::bad_request(error.to_string()),
            RenewError::Account(inner) => inner.into(),
            other => ApiError::system(other.to_string()),
        }
    }
}

impl From<CodecError> for ApiError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Generation(_) => ApiError::system(error.to_string()),
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

impl From<DnsChallengeError> for ApiError {
    fn from(error: DnsChallengeError) -> Self {
        ApiError::system(error.to_string())
    }
}
