//! The ACME client seam. [`AcmeProtocol`] is what the rest of the crate
//! talks to; [`InstantAcmeProtocol`] implements it against real ACME
//! servers.

mod instant;
mod probe;

use async_trait::async_trait;

pub use instant::InstantAcmeProtocol;

use crate::dns01::Dns01Solver;
use crate::errors::ProtocolError;

/// Status an ACME server reports for a usable account.
pub const VALID_REGISTRATION: &str = "valid";

/// Pre-shared credentials for CAs that require External Account Binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAccountBinding {
    pub kid: String,
    /// HMAC key, base64url encoded.
    pub hmac_encoded: String,
}

/// A registered ACME account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Account URL the server assigned.
    pub uri: String,
    /// Account key, PEM encoded.
    pub private_key_pem: String,
}

#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub domains: Vec<String>,
    /// DER encoded CSR signed with the certificate's fresh key.
    pub csr_der: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    /// Leaf first, as returned by the CA.
    pub chain_pem: String,
}

#[async_trait]
pub trait AcmeProtocol: Send + Sync {
    /// Create an account with a newly generated key.
    async fn register(
        &self,
        directory_url: &str,
        email: &str,
        binding: Option<&ExternalAccountBinding>,
    ) -> Result<Registration, ProtocolError>;

    /// Status the server reports for an existing account, `valid` when usable.
    async fn registration_status(
        &self,
        directory_url: &str,
        registration: &Registration,
    ) -> Result<String, ProtocolError>;

    /// Order, validate over DNS-01 and download a certificate.
    async fn obtain_certificate(
        &self,
        directory_url: &str,
        registration: &Registration,
        request: &CertificateRequest,
        solver: &dyn Dns01Solver,
    ) -> Result<IssuedCertificate, ProtocolError>;
}
