//! U2F cryptography operations
//!
//! Challenge generation, ECDSA P-256 signature verification and X.509
//! attestation certificate parsing.

use std::fmt;

use openssl::bn::BigNumContext;
use openssl::ec::PointConversionForm;
use openssl::nid::Nid;
use openssl::x509::X509;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use ring::rand::SecureRandom;

use super::codec;
use super::errors::U2fError;

/// Number of random bytes in a challenge
pub const CHALLENGE_LEN: usize = 32;

/// Generate a secure random challenge, base64url-encoded
///
/// # Errors
/// Returns `Internal` if the system random source fails
pub fn generate_challenge() -> Result<String, U2fError> {
    let mut bytes = [0u8; CHALLENGE_LEN];
    ring::rand::SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| U2fError::Internal("Failed to generate random challenge".to_string()))?;
    Ok(codec::websafe_encode(&bytes))
}

/// Check that `public_key` is a valid uncompressed P-256 point
///
/// # Errors
/// Returns `MalformedMessage` if the bytes do not encode a point on the curve
pub fn validate_public_key(public_key: &[u8]) -> Result<(), U2fError> {
    VerifyingKey::from_sec1_bytes(public_key)
        .map(|_| ())
        .map_err(|_| U2fError::malformed("public key is not a valid P-256 point"))
}

/// Verify an ES256 signature (ECDSA P-256 with SHA-256)
///
/// # Arguments
/// * `public_key` - SEC1-encoded P-256 public key
/// * `data` - The signed bytes (hashed with SHA-256 during verification)
/// * `signature` - DER-encoded `(r, s)` signature
///
/// # Returns
/// `true` only if the signature is well-formed and valid. A malformed key or
/// DER encoding is a verification failure, never a panic.
#[must_use]
pub fn verify_signature(public_key: &[u8], data: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(signature) else {
        return false;
    };
    key.verify(data, &signature).is_ok()
}

/// A parsed attestation certificate
#[derive(Clone)]
pub struct AttestationCertificate {
    der: Vec<u8>,
    x509: X509,
}

impl AttestationCertificate {
    /// Original DER encoding
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Underlying OpenSSL certificate, for chain validation
    #[must_use]
    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    /// Subject distinguished name in `key=value` form
    #[must_use]
    pub fn subject(&self) -> String {
        format_name(self.x509.subject_name())
    }

    /// Issuer distinguished name in `key=value` form
    #[must_use]
    pub fn issuer(&self) -> String {
        format_name(self.x509.issuer_name())
    }

    /// SHA-256 fingerprint of the DER encoding as lowercase hex
    #[must_use]
    pub fn fingerprint(&self) -> String {
        codec::sha256(&self.der)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// PEM encoding for logging and audit storage
    ///
    /// # Errors
    /// Returns `CertError` if OpenSSL cannot encode the certificate
    pub fn to_pem(&self) -> Result<String, U2fError> {
        let pem = self.x509.to_pem()?;
        String::from_utf8(pem).map_err(|e| U2fError::CertError(e.to_string()))
    }

    /// Uncompressed P-256 public key of the attestation key pair
    ///
    /// # Errors
    /// Returns `CertError` if the certificate key is not an EC P-256 key
    pub fn public_key(&self) -> Result<Vec<u8>, U2fError> {
        let pkey = self.x509.public_key()?;
        let ec_key = pkey
            .ec_key()
            .map_err(|_| U2fError::CertError("attestation key is not an EC key".to_string()))?;
        if ec_key.group().curve_name() != Some(Nid::X9_62_PRIME256V1) {
            return Err(U2fError::CertError(
                "attestation key is not on the P-256 curve".to_string(),
            ));
        }
        let mut ctx = BigNumContext::new()?;
        Ok(ec_key
            .public_key()
            .to_bytes(ec_key.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)?)
    }
}

impl fmt::Debug for AttestationCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttestationCertificate")
            .field("subject", &self.subject())
            .field("issuer", &self.issuer())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Parse a DER X.509 certificate
///
/// # Errors
/// Returns `CertError` if the bytes are not a parsable certificate
pub fn parse_certificate(der: &[u8]) -> Result<AttestationCertificate, U2fError> {
    let x509 = X509::from_der(der)
        .map_err(|e| U2fError::CertError(format!("unparsable attestation certificate: {e}")))?;
    Ok(AttestationCertificate {
        der: der.to_vec(),
        x509,
    })
}

fn format_name(name: &openssl::x509::X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("?");
            let value = entry
                .data()
                .as_utf8()
                .map_or_else(|_| "?".to_string(), |s| s.to_string());
            format!("{key}={value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}
