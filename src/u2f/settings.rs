//! U2F settings
//!
//! Engine settings independent of the HTTP server configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::attestation::{AttestationPolicy, AttestationVerifier};
use super::errors::U2fError;

/// U2F settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct U2fSettings {
    /// Fixed app id. When unset the app id is derived from each request's origin.
    pub app_id: Option<String>,
    /// Origins accepted in client data. Empty means exactly the app id.
    pub trusted_facets: Vec<String>,
    /// Pending challenges older than this are discarded (0 disables expiry)
    pub challenge_timeout_seconds: u64,
    /// Attestation trust policy
    pub attestation_policy: AttestationPolicy,
    /// PEM bundle of trusted attestation roots
    pub attestation_roots: Option<String>,
}

impl Default for U2fSettings {
    fn default() -> Self {
        Self {
            app_id: None,
            trusted_facets: Vec::new(),
            challenge_timeout_seconds: 300,
            attestation_policy: AttestationPolicy::Permissive,
            attestation_roots: None,
        }
    }
}

impl U2fSettings {
    /// Build the attestation verifier described by these settings
    ///
    /// # Errors
    /// Returns `CertError` if the roots cannot be loaded, or if the strict
    /// policy is selected without any roots
    pub fn attestation_verifier(&self) -> Result<AttestationVerifier, U2fError> {
        match (&self.attestation_roots, self.attestation_policy) {
            (Some(path), policy) => AttestationVerifier::from_pem_file(Path::new(path), policy),
            (None, AttestationPolicy::Permissive) => Ok(AttestationVerifier::permissive()),
            (None, AttestationPolicy::Strict) => Err(U2fError::CertError(
                "strict attestation policy requires attestation_roots".to_string(),
            )),
        }
    }
}
