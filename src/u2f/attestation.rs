//! U2F attestation trust
//!
//! Attestation chain validation is a capability, not a fixed policy. Real
//! tokens ship with a wide variety of vendor roots, many self-signed, so the
//! default policy only records the outcome. A caller that wants to restrict
//! enrollment to known vendors loads their roots and switches to `Strict`.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use openssl::stack::Stack;
use openssl::x509::store::{X509Store, X509StoreBuilder};
use openssl::x509::{X509StoreContext, X509};
use serde::{Deserialize, Serialize};

use super::crypto::AttestationCertificate;
use super::errors::U2fError;

/// How attestation chain failures are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationPolicy {
    /// Record the outcome, never reject
    #[default]
    Permissive,
    /// Reject certificates that do not chain to a configured root
    Strict,
}

impl std::str::FromStr for AttestationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(AttestationPolicy::Permissive),
            "strict" => Ok(AttestationPolicy::Strict),
            other => Err(format!("unknown attestation policy: {other}")),
        }
    }
}

/// Result of checking an attestation certificate against the trust roots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum AttestationStatus {
    /// No trust roots configured, chain not evaluated
    Unchecked,
    /// Certificate chains to a configured root
    Trusted,
    /// Chain validation failed (only returned under the permissive policy)
    Untrusted(String),
}

/// Callback invoked with every parsed attestation certificate
pub type AttestationObserver = Arc<dyn Fn(&AttestationCertificate, &AttestationStatus) + Send + Sync>;

/// Validates attestation certificates against an optional set of roots
#[derive(Clone, Default)]
pub struct AttestationVerifier {
    roots: Option<Arc<X509Store>>,
    policy: AttestationPolicy,
}

impl AttestationVerifier {
    /// Verifier that never evaluates chains
    #[must_use]
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Verifier trusting the given root certificates
    ///
    /// # Errors
    /// Returns `CertError` if the OpenSSL store cannot be built
    pub fn with_roots(roots: &[X509], policy: AttestationPolicy) -> Result<Self, U2fError> {
        let mut builder = X509StoreBuilder::new()?;
        for root in roots {
            builder.add_cert(root.clone())?;
        }
        Ok(Self {
            roots: Some(Arc::new(builder.build())),
            policy,
        })
    }

    /// Verifier trusting every certificate in a PEM bundle
    ///
    /// # Errors
    /// Returns `CertError` if the file cannot be read, holds no certificates,
    /// or the store cannot be built
    pub fn from_pem_file(path: &Path, policy: AttestationPolicy) -> Result<Self, U2fError> {
        let pem = std::fs::read(path).map_err(|e| {
            U2fError::CertError(format!("cannot read trust roots {}: {e}", path.display()))
        })?;
        let roots = X509::stack_from_pem(&pem)?;
        if roots.is_empty() {
            return Err(U2fError::CertError(format!(
                "no certificates found in {}",
                path.display()
            )));
        }
        Self::with_roots(&roots, policy)
    }

    /// Effective policy
    #[must_use]
    pub fn policy(&self) -> AttestationPolicy {
        self.policy
    }

    /// Evaluate `certificate` against the configured roots
    ///
    /// # Errors
    /// Returns `UntrustedAttestation` under the strict policy when the chain
    /// does not validate (or no roots are configured), and `CertError` if
    /// OpenSSL fails to run the check.
    pub fn verify(&self, certificate: &AttestationCertificate) -> Result<AttestationStatus, U2fError> {
        let Some(store) = &self.roots else {
            return match self.policy {
                AttestationPolicy::Permissive => Ok(AttestationStatus::Unchecked),
                AttestationPolicy::Strict => Err(U2fError::UntrustedAttestation(
                    "no trust roots configured".to_string(),
                )),
            };
        };

        let chain = Stack::new()?;
        let mut context = X509StoreContext::new()?;
        let (valid, result) = context.init(store, certificate.x509(), &chain, |ctx| {
            let valid = ctx.verify_cert()?;
            Ok((valid, ctx.error()))
        })?;

        match (valid, self.policy) {
            (true, _) => Ok(AttestationStatus::Trusted),
            (false, AttestationPolicy::Permissive) => {
                Ok(AttestationStatus::Untrusted(result.error_string().to_string()))
            }
            (false, AttestationPolicy::Strict) => Err(U2fError::UntrustedAttestation(
                result.error_string().to_string(),
            )),
        }
    }
}

impl fmt::Debug for AttestationVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttestationVerifier")
            .field("roots", &self.roots.is_some())
            .field("policy", &self.policy)
            .finish()
    }
}
