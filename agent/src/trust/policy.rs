//! Policy stage of the certificate trust validator.
//!
//! Checks run in a fixed order and stop at the first failure; the error
//! names the failing check. Unlike every other failure in the supervisor,
//! trust violations propagate to the caller — silently trusting an
//! invalid peer is unacceptable.

use super::cert::{CertInfo, KeyType, X509_VERSION_3};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// A certificate was rejected; the message carries the failing check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustError {
    #[error("failed to parse certificate: {0}")]
    Parse(String),

    #[error("certificate is outside its validity window (not_before={not_before}, not_after={not_after}, now={now})")]
    ValidityWindow {
        not_before: i64,
        not_after: i64,
        now: i64,
    },

    #[error("unsupported certificate version {found}, expected X.509v3")]
    Version { found: u32 },

    #[error("unsupported public key type {0}")]
    KeyType(String),

    #[error("RSA key length {bits} bits is below the minimum {min} bits")]
    RsaKeyLength { bits: u32, min: u32 },

    #[error("EC key length {bits} bits is below the minimum {min} bits")]
    EcKeyLength { bits: u32, min: u32 },

    #[error("signature algorithm {0} is not allowed")]
    SignatureAlgorithm(String),

    #[error("basicConstraints extension missing or does not assert CA")]
    BasicConstraints,

    #[error("keyUsage extension missing or does not include digital signature")]
    KeyUsage,

    #[error("subject has no commonName attribute")]
    MissingCommonName,
}

/// Configurable thresholds and allow-lists for peer certificates.
///
/// The key-length minimums are policy gates on the parsed public-key bit
/// length, nothing more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustPolicy {
    /// Minimum RSA public-key length, in bits (inclusive)
    pub rsa_min_bits: u32,

    /// Minimum EC public-key length, in bits (inclusive)
    pub ec_min_bits: u32,

    /// Accepted signature algorithms, matched case-insensitively
    pub allowed_signature_algorithms: Vec<String>,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            rsa_min_bits: 2048,
            ec_min_bits: 256,
            allowed_signature_algorithms: vec![
                "sha256WithRSAEncryption".to_string(),
                "sha384WithRSAEncryption".to_string(),
                "sha512WithRSAEncryption".to_string(),
                "ecdsa-with-SHA256".to_string(),
                "ecdsa-with-SHA384".to_string(),
                "ecdsa-with-SHA512".to_string(),
                "ED25519".to_string(),
            ],
        }
    }
}

/// Decides whether a presented certificate authorizes a control-plane peer.
///
/// Pure with respect to external state; safe to call concurrently for
/// independent certificates.
#[derive(Debug, Clone, Default)]
pub struct CertTrustValidator {
    policy: TrustPolicy,
}

impl CertTrustValidator {
    pub fn new(policy: TrustPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Parse `cert_bytes` and apply the full policy pipeline.
    ///
    /// Returns the subject common name of a trusted peer.
    pub fn check_cert_info(&self, cert_bytes: &[u8]) -> Result<String, TrustError> {
        let info = CertInfo::parse(cert_bytes)?;
        self.apply(&info)
    }

    /// Apply the ordered policy checks to already-parsed facts.
    pub fn apply(&self, info: &CertInfo) -> Result<String, TrustError> {
        self.check_validity_window(info)?;
        self.check_version(info)?;
        self.check_key_type(info)?;
        self.check_key_length(info)?;
        self.check_signature_algorithm(info)?;
        self.check_extensions(info)?;

        info.common_name()
            .map(str::to_string)
            .ok_or(TrustError::MissingCommonName)
    }

    fn check_validity_window(&self, info: &CertInfo) -> Result<(), TrustError> {
        let now = unix_now();
        if now < info.not_before || now > info.not_after {
            return Err(TrustError::ValidityWindow {
                not_before: info.not_before,
                not_after: info.not_after,
                now,
            });
        }
        Ok(())
    }

    fn check_version(&self, info: &CertInfo) -> Result<(), TrustError> {
        if info.version != X509_VERSION_3 {
            return Err(TrustError::Version {
                found: info.version,
            });
        }
        Ok(())
    }

    fn check_key_type(&self, info: &CertInfo) -> Result<(), TrustError> {
        match info.key_type {
            KeyType::Rsa | KeyType::Ec | KeyType::Ed25519 => Ok(()),
            KeyType::Unknown(_) => Err(TrustError::KeyType(info.key_type.to_string())),
        }
    }

    fn check_key_length(&self, info: &CertInfo) -> Result<(), TrustError> {
        let bits = info.key_bits.unwrap_or(0);
        match info.key_type {
            KeyType::Rsa if bits < self.policy.rsa_min_bits => Err(TrustError::RsaKeyLength {
                bits,
                min: self.policy.rsa_min_bits,
            }),
            KeyType::Ec if bits < self.policy.ec_min_bits => Err(TrustError::EcKeyLength {
                bits,
                min: self.policy.ec_min_bits,
            }),
            // Other accepted families carry no length gate.
            _ => Ok(()),
        }
    }

    fn check_signature_algorithm(&self, info: &CertInfo) -> Result<(), TrustError> {
        let allowed = self
            .policy
            .allowed_signature_algorithms
            .iter()
            .any(|alg| alg.eq_ignore_ascii_case(&info.signature_algorithm));
        if !allowed {
            return Err(TrustError::SignatureAlgorithm(
                info.signature_algorithm.clone(),
            ));
        }
        Ok(())
    }

    fn check_extensions(&self, info: &CertInfo) -> Result<(), TrustError> {
        match info.basic_constraints {
            Some(bc) if bc.ca => {}
            _ => return Err(TrustError::BasicConstraints),
        }
        match info.key_usage {
            Some(ku) if ku.digital_signature => Ok(()),
            _ => Err(TrustError::KeyUsage),
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
