use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

pub const AUTH_TYPE_LETS_ENCRYPT: &str = "Lets Encrypt";
pub const AUTH_TYPE_SELF_SIGNED: &str = "Self Signed";
pub const AUTH_TYPE_CERTIFICATE_AUTHORITY: &str = "Certificate Authority";

/// Certificate material of one bundle. Every field holds legacy encoded PEM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SslKeyCertificate {
    #[serde(default)]
    pub crt: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub csr: String,
}

/// One version of a delivery service's certificate bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryServiceSslKeys {
    /// xml_id of the owning delivery service.
    #[serde(rename = "deliveryservice")]
    pub delivery_service: String,
    pub cdn: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub key: String,
    #[serde(rename = "authType", default)]
    pub auth_type: String,
    #[serde(with = "int_or_string")]
    #[schema(value_type = String)]
    pub version: i32,
    pub certificate: SslKeyCertificate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sans: Vec<String>,
}

/// Latest bundle of a delivery service, as listed per CDN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CdnSslKey {
    #[serde(rename = "deliveryservice")]
    pub delivery_service: String,
    pub hostname: String,
    pub certificate: CdnSslKeyCertificate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CdnSslKeyCertificate {
    pub crt: String,
    pub key: String,
}

impl From<&DeliveryServiceSslKeys> for CdnSslKey {
    fn from(keys: &DeliveryServiceSslKeys) -> Self {
        Self {
            delivery_service: keys.delivery_service.clone(),
            hostname: keys.hostname.clone(),
            certificate: CdnSslKeyCertificate {
                crt: keys.certificate.crt.clone(),
                key: keys.certificate.key.clone(),
            },
        }
    }
}

/// DNSSEC key sets of a CDN, kept opaque to this crate.
pub type DnssecKeys = serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PingResponse {
    pub status: String,
    pub server: String,
}

/// Versions travel as strings on the wire but older bundles stored numbers.
mod int_or_string {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }

    pub fn serialize<S: Serializer>(value: &i32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
        let raw = Raw::deserialize(deserializer)?;
        let parsed = match raw {
            Raw::Int(n) => i32::try_from(n).map_err(serde::de::Error::custom)?,
            Raw::Str(s) if s.trim().is_empty() => 0,
            Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom)?,
        };
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_reads_numbers_and_strings() {
        let from_string: DeliveryServiceSslKeys = serde_json::from_value(serde_json::json!({
            "deliveryservice": "demo1",
            "cdn": "cdn1",
            "version": "3",
            "certificate": {"crt": "", "key": "", "csr": ""}
        }))
        .unwrap();
        assert_eq!(from_string.version, 3);

        let from_number: DeliveryServiceSslKeys = serde_json::from_value(serde_json::json!({
            "deliveryservice": "demo1",
            "cdn": "cdn1",
            "version": 4,
            "certificate": {}
        }))
        .unwrap();
        assert_eq!(from_number.version, 4);

        let written = serde_json::to_value(&from_number).unwrap();
        assert_eq!(written["version"], "4");
        assert_eq!(written["authType"], "");
    }
}
