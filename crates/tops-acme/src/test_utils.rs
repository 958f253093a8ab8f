//! Fixtures for tests: throwaway certificates, a scripted ACME server and a
//! notifier that keeps what it was asked to send.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams,
    DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use time::{Duration, OffsetDateTime};
use tops_core::{EmailMessage, NotificationError, NotificationService};

use crate::codec::pem_encode;
use crate::dns01::Dns01Solver;
use crate::errors::ProtocolError;
use crate::protocol::{
    AcmeProtocol, CertificateRequest, ExternalAccountBinding, IssuedCertificate, Registration,
    VALID_REGISTRATION,
};

fn named(cn: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    dn
}

/// Self-signed ECDSA server certificate valid until `valid_days` from now
/// (negative for one that has already expired). Returns certificate and key PEM.
pub(crate) fn self_signed_certificate(
    cn: &str,
    sans: &[&str],
    valid_days: i64,
) -> (String, String) {
    let names: Vec<String> = if sans.is_empty() {
        vec![cn.to_string()]
    } else {
        sans.iter().map(|s| s.to_string()).collect()
    };
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(names).unwrap();
    params.distinguished_name = named(cn);
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::days(30);
    params.not_after = now + Duration::days(valid_days);

    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

/// CA certificate, self-signed or issued by `issuer`.
pub(crate) fn ca_certificate(
    cn: &str,
    issuer: Option<(&Certificate, &KeyPair)>,
) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name = named(cn);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::days(30);
    params.not_after = now + Duration::days(3650);

    let cert = match issuer {
        Some((issuer_cert, issuer_key)) => params.signed_by(&key, issuer_cert, issuer_key),
        None => params.self_signed(&key),
    }
    .unwrap();
    (cert, key)
}

/// ECDSA server certificate for `cn` issued by the given CA.
pub(crate) fn leaf_signed_by(
    cn: &str,
    issuer: &Certificate,
    issuer_key: &KeyPair,
) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec![cn.to_string()]).unwrap();
    params.distinguished_name = named(cn);
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::days(1);
    params.not_after = now + Duration::days(90);

    let cert = params.signed_by(&key, issuer, issuer_key).unwrap();
    (cert, key)
}

/// ACME server stand-in. Registrations get increasing account URLs; orders
/// publish a DNS-01 answer per domain through the solver and are signed by
/// a private test CA.
pub(crate) struct MockProtocol {
    ca: Certificate,
    ca_key: KeyPair,
    status: Mutex<Result<String, ProtocolError>>,
    registrations: AtomicUsize,
    orders: AtomicUsize,
    last_binding: Mutex<Option<ExternalAccountBinding>>,
    failing_domains: Mutex<HashSet<String>>,
    fail_all_orders: Mutex<bool>,
    requested: Mutex<Vec<Vec<String>>>,
}

impl MockProtocol {
    pub(crate) fn new() -> Self {
        let (ca, ca_key) = ca_certificate("Mock ACME CA", None);
        Self {
            ca,
            ca_key,
            status: Mutex::new(Ok(VALID_REGISTRATION.to_string())),
            registrations: AtomicUsize::new(0),
            orders: AtomicUsize::new(0),
            last_binding: Mutex::new(None),
            failing_domains: Mutex::new(HashSet::new()),
            fail_all_orders: Mutex::new(false),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub(crate) fn orders(&self) -> usize {
        self.orders.load(Ordering::SeqCst)
    }

    pub(crate) fn set_registration_status(&self, status: Result<String, ProtocolError>) {
        *self.status.lock().unwrap() = status;
    }

    pub(crate) fn last_binding(&self) -> Option<ExternalAccountBinding> {
        self.last_binding.lock().unwrap().clone()
    }

    /// Orders naming `domain` are rejected.
    pub(crate) fn fail_orders_for(&self, domain: &str) {
        self.failing_domains
            .lock()
            .unwrap()
            .insert(domain.to_string());
    }

    pub(crate) fn fail_all_orders(&self) {
        *self.fail_all_orders.lock().unwrap() = true;
    }

    /// Domain lists of every order received, in order.
    pub(crate) fn requested_domains(&self) -> Vec<Vec<String>> {
        self.requested.lock().unwrap().clone()
    }

    fn order_rejected(&self, domains: &[String]) -> bool {
        if *self.fail_all_orders.lock().unwrap() {
            return true;
        }
        let failing = self.failing_domains.lock().unwrap();
        domains.iter().any(|domain| failing.contains(domain))
    }

    fn sign(&self, csr_der: &[u8]) -> Result<String, ProtocolError> {
        let csr_pem = pem_encode("CERTIFICATE REQUEST", csr_der);
        let mut csr = CertificateSigningRequestParams::from_pem(&csr_pem)
            .map_err(|e| ProtocolError::Acme(format!("bad CSR: {e}")))?;
        let now = OffsetDateTime::now_utc();
        csr.params.not_before = now - Duration::minutes(5);
        csr.params.not_after = now + Duration::days(90);
        csr.params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        csr.params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let leaf = csr
            .signed_by(&self.ca, &self.ca_key)
            .map_err(|e| ProtocolError::Acme(format!("signing failed: {e}")))?;
        Ok(format!("{}{}", leaf.pem(), self.ca.pem()))
    }
}

#[async_trait]
impl AcmeProtocol for MockProtocol {
    async fn register(
        &self,
        directory_url: &str,
        _email: &str,
        binding: Option<&ExternalAccountBinding>,
    ) -> Result<Registration, ProtocolError> {
        let n = self.registrations.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_binding.lock().unwrap() = binding.cloned();
        *self.status.lock().unwrap() = Ok(VALID_REGISTRATION.to_string());
        let key = KeyPair::generate().map_err(|e| ProtocolError::Acme(e.to_string()))?;
        Ok(Registration {
            uri: format!("{}/acct/{n}", directory_url.trim_end_matches("/directory")),
            private_key_pem: key.serialize_pem(),
        })
    }

    async fn registration_status(
        &self,
        _directory_url: &str,
        _registration: &Registration,
    ) -> Result<String, ProtocolError> {
        self.status.lock().unwrap().clone()
    }

    async fn obtain_certificate(
        &self,
        _directory_url: &str,
        _registration: &Registration,
        request: &CertificateRequest,
        solver: &dyn Dns01Solver,
    ) -> Result<IssuedCertificate, ProtocolError> {
        self.orders.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(request.domains.clone());

        let mut presented = Vec::new();
        for domain in &request.domains {
            let key_authorization = format!("token-{domain}.thumbprint");
            solver
                .present(domain, "token", &key_authorization)
                .await
                .map_err(|e| ProtocolError::ChallengeFailed(e.to_string()))?;
            presented.push((domain.clone(), key_authorization));
        }

        let result = if self.order_rejected(&request.domains) {
            Err(ProtocolError::ChallengeFailed(
                "urn:ietf:params:acme:error:dns".to_string(),
            ))
        } else {
            self.sign(&request.csr_der)
                .map(|chain_pem| IssuedCertificate { chain_pem })
        };

        for (domain, key_authorization) in &presented {
            let _ = solver.cleanup(domain, "token", key_authorization).await;
        }
        result
    }
}

/// Keeps every email instead of sending it.
pub(crate) struct RecordingNotifier {
    configured: bool,
    fail: bool,
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            configured: true,
            fail: false,
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Accepts nothing: every send fails.
    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            configured: true,
            fail: true,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationService for RecordingNotifier {
    async fn send_email(&self, message: EmailMessage) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError::SendError("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn is_configured(&self) -> Result<bool, NotificationError> {
        Ok(self.configured)
    }
}
