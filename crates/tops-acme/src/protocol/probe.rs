//! Account status lookup.
//!
//! `instant-acme` has no call that reads an account back, so the status is
//! fetched with a signed POST to the account URL (RFC 8555 section 7.3.2).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{Algorithm, EncodingKey};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::Registration;
use crate::errors::ProtocolError;

const JOSE_CONTENT_TYPE: &str = "application/jose+json";
const REPLAY_NONCE: &str = "Replay-Nonce";
const ACCOUNT_DOES_NOT_EXIST: &str = "urn:ietf:params:acme:error:accountDoesNotExist";
const UNAUTHORIZED: &str = "urn:ietf:params:acme:error:unauthorized";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Directory {
    new_nonce: String,
}

#[derive(Deserialize)]
struct AccountObject {
    status: String,
}

#[derive(Deserialize, Default)]
struct AcmeProblem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    detail: String,
}

/// PKCS#8 DER of a stored account key. PKCS#1 keys written by older
/// releases cannot sign for this client and are reported as unusable.
pub(crate) fn account_key_der(private_key_pem: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut reader = private_key_pem.as_bytes();
    for item in rustls_pemfile::read_all(&mut reader) {
        match item.map_err(|e| ProtocolError::UnsupportedKey(e.to_string()))? {
            rustls_pemfile::Item::Pkcs8Key(der) => return Ok(der.secret_pkcs8_der().to_vec()),
            rustls_pemfile::Item::Pkcs1Key(_) | rustls_pemfile::Item::Sec1Key(_) => {
                return Err(ProtocolError::UnsupportedKey(
                    "account key is not a PKCS#8 key".to_string(),
                ))
            }
            _ => continue,
        }
    }
    Err(ProtocolError::UnsupportedKey(
        "no account key found".to_string(),
    ))
}

/// JWS in flattened JSON serialization, signed ES256 with the account key.
pub(crate) fn signed_request(
    key_der: &[u8],
    account_url: &str,
    nonce: &str,
    payload: &str,
) -> Result<serde_json::Value, ProtocolError> {
    let protected = json!({
        "alg": "ES256",
        "kid": account_url,
        "nonce": nonce,
        "url": account_url,
    });
    let protected = URL_SAFE_NO_PAD.encode(protected.to_string());
    let payload = URL_SAFE_NO_PAD.encode(payload);

    let key = EncodingKey::from_ec_der(key_der);
    let signature = jsonwebtoken::crypto::sign(
        format!("{protected}.{payload}").as_bytes(),
        &key,
        Algorithm::ES256,
    )
    .map_err(|e| ProtocolError::UnsupportedKey(e.to_string()))?;

    Ok(json!({
        "protected": protected,
        "payload": payload,
        "signature": signature,
    }))
}

pub(crate) async fn fetch_account_status(
    http: &reqwest::Client,
    directory_url: &str,
    registration: &Registration,
) -> Result<String, ProtocolError> {
    let key_der = account_key_der(&registration.private_key_pem)?;

    let directory: Directory = http
        .get(directory_url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let nonce_response = http.head(&directory.new_nonce).send().await?;
    let nonce = nonce_response
        .headers()
        .get(REPLAY_NONCE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ProtocolError::Acme("ACME server returned no nonce".to_string()))?
        .to_string();

    let body = signed_request(&key_der, &registration.uri, &nonce, "{}")?;
    let response = http
        .post(&registration.uri)
        .header(CONTENT_TYPE, JOSE_CONTENT_TYPE)
        .body(body.to_string())
        .send()
        .await?;

    if response.status().is_success() {
        let account: AccountObject = response.json().await?;
        debug!("ACME account {} is {}", registration.uri, account.status);
        return Ok(account.status);
    }

    let status = response.status();
    let problem: AcmeProblem = response.json().await.unwrap_or_default();
    match problem.kind.as_str() {
        ACCOUNT_DOES_NOT_EXIST | UNAUTHORIZED => Err(ProtocolError::AccountDoesNotExist),
        _ => Err(ProtocolError::Acme(format!(
            "account lookup failed with {status}: {} {}",
            problem.kind, problem.detail
        ))),
    }
}
