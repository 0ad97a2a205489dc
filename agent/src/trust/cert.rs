//! Parse stage of the certificate trust validator: raw PEM/DER bytes in,
//! immutable [`CertInfo`] facts out.

use super::policy::TrustError;
use x509_parser::certificate::X509Certificate;
use x509_parser::der_parser::oid::Oid;
use x509_parser::oid_registry::{
    OID_KEY_TYPE_EC_PUBLIC_KEY, OID_PKCS1_RSAENCRYPTION, OID_PKCS1_SHA256WITHRSA,
    OID_PKCS1_SHA384WITHRSA, OID_PKCS1_SHA512WITHRSA, OID_SIG_ECDSA_WITH_SHA256,
    OID_SIG_ECDSA_WITH_SHA384, OID_SIG_ECDSA_WITH_SHA512, OID_SIG_ED25519,
    OID_X509_COMMON_NAME, OID_X509_COUNTRY_NAME, OID_X509_LOCALITY_NAME,
    OID_X509_ORGANIZATIONAL_UNIT, OID_X509_ORGANIZATION_NAME,
    OID_X509_STATE_OR_PROVINCE_NAME,
};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::FromDer;
use x509_parser::public_key::PublicKey;
use x509_parser::x509::SubjectPublicKeyInfo;

/// Raw version field value identifying an X.509v3 certificate.
pub const X509_VERSION_3: u32 = 2;

/// Public-key family carried by a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    Ec,
    Ed25519,
    /// Unrecognized algorithm, identified by its OID.
    Unknown(String),
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyType::Rsa => write!(f, "RSA"),
            KeyType::Ec => write!(f, "EC"),
            KeyType::Ed25519 => write!(f, "ED25519"),
            KeyType::Unknown(oid) => write!(f, "{}", oid),
        }
    }
}

/// Facts from the basicConstraints extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicConstraintsInfo {
    pub ca: bool,
}

/// Facts from the keyUsage extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsageInfo {
    pub digital_signature: bool,
}

/// Parsed certificate facts, immutable after construction.
///
/// Validity bounds are unix timestamps; the policy stage compares them
/// against the clock at validation time, not at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    pub not_before: i64,
    pub not_after: i64,
    /// Raw X.509 version field (2 means v3).
    pub version: u32,
    pub key_type: KeyType,
    /// Public-key length in bits, when the key family defines one.
    pub key_bits: Option<u32>,
    pub signature_algorithm: String,
    pub basic_constraints: Option<BasicConstraintsInfo>,
    pub key_usage: Option<KeyUsageInfo>,
    /// Ordered subject components as (attribute type, value) pairs.
    pub subject: Vec<(String, String)>,
}

impl CertInfo {
    /// Parse a PEM- or DER-encoded certificate.
    pub fn parse(cert_bytes: &[u8]) -> Result<Self, TrustError> {
        if cert_bytes
            .windows(b"-----BEGIN".len())
            .any(|w| w == b"-----BEGIN")
        {
            let (_, pem) = parse_x509_pem(cert_bytes)
                .map_err(|e| TrustError::Parse(format!("invalid PEM: {}", e)))?;
            let cert = pem
                .parse_x509()
                .map_err(|e| TrustError::Parse(format!("invalid certificate: {}", e)))?;
            Self::from_certificate(&cert)
        } else {
            let (_, cert) = X509Certificate::from_der(cert_bytes)
                .map_err(|e| TrustError::Parse(format!("invalid certificate: {}", e)))?;
            Self::from_certificate(&cert)
        }
    }

    fn from_certificate(cert: &X509Certificate<'_>) -> Result<Self, TrustError> {
        let spki = cert.public_key();
        let key_type = key_type_of(spki);
        let key_bits = match spki.parsed() {
            Ok(PublicKey::RSA(rsa)) => Some(rsa.key_size() as u32),
            Ok(PublicKey::EC(point)) => Some(point.key_size() as u32),
            _ => None,
        };

        let subject = cert
            .subject()
            .iter_attributes()
            .map(|attr| {
                (
                    attr_type_name(attr.attr_type()),
                    attr.as_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        Ok(Self {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            version: cert.version().0,
            key_type,
            key_bits,
            signature_algorithm: signature_algorithm_name(&cert.signature_algorithm.algorithm),
            basic_constraints: cert
                .basic_constraints()
                .ok()
                .flatten()
                .map(|ext| BasicConstraintsInfo { ca: ext.value.ca }),
            key_usage: cert.key_usage().ok().flatten().map(|ext| KeyUsageInfo {
                digital_signature: ext.value.digital_signature(),
            }),
            subject,
        })
    }

    /// Value of the well-known commonName subject attribute.
    pub fn common_name(&self) -> Option<&str> {
        self.subject
            .iter()
            .find(|(attr_type, _)| attr_type == "CN")
            .map(|(_, value)| value.as_str())
    }
}

fn key_type_of(spki: &SubjectPublicKeyInfo<'_>) -> KeyType {
    let oid = &spki.algorithm.algorithm;
    if *oid == OID_PKCS1_RSAENCRYPTION {
        KeyType::Rsa
    } else if *oid == OID_KEY_TYPE_EC_PUBLIC_KEY {
        KeyType::Ec
    } else if *oid == OID_SIG_ED25519 {
        KeyType::Ed25519
    } else {
        KeyType::Unknown(oid.to_id_string())
    }
}

fn signature_algorithm_name(oid: &Oid<'_>) -> String {
    if *oid == OID_PKCS1_SHA256WITHRSA {
        "sha256WithRSAEncryption".to_string()
    } else if *oid == OID_PKCS1_SHA384WITHRSA {
        "sha384WithRSAEncryption".to_string()
    } else if *oid == OID_PKCS1_SHA512WITHRSA {
        "sha512WithRSAEncryption".to_string()
    } else if *oid == OID_SIG_ECDSA_WITH_SHA256 {
        "ecdsa-with-SHA256".to_string()
    } else if *oid == OID_SIG_ECDSA_WITH_SHA384 {
        "ecdsa-with-SHA384".to_string()
    } else if *oid == OID_SIG_ECDSA_WITH_SHA512 {
        "ecdsa-with-SHA512".to_string()
    } else if *oid == OID_SIG_ED25519 {
        "ED25519".to_string()
    } else {
        oid.to_id_string()
    }
}

fn attr_type_name(oid: &Oid<'_>) -> String {
    if *oid == OID_X509_COMMON_NAME {
        "CN".to_string()
    } else if *oid == OID_X509_ORGANIZATION_NAME {
        "O".to_string()
    } else if *oid == OID_X509_ORGANIZATIONAL_UNIT {
        "OU".to_string()
    } else if *oid == OID_X509_COUNTRY_NAME {
        "C".to_string()
    } else if *oid == OID_X509_STATE_OR_PROVINCE_NAME {
        "ST".to_string()
    } else if *oid == OID_X509_LOCALITY_NAME {
        "L".to_string()
    } else {
        oid.to_id_string()
    }
}
