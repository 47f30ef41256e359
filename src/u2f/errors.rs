//! U2F error types
//!
//! Every failure in the engine is reported as a distinct `U2fError` variant so
//! the transport layer can decide the status code and message. Nothing here is
//! retried: each error is terminal for the operation that produced it.

use thiserror::Error;

/// Errors that can occur during U2F registration and authentication
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum U2fError {
    /// Structurally invalid wire bytes, base64 or JSON
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Client data type, challenge or origin did not match the pending challenge
    #[error("Client data mismatch: {0}")]
    ClientDataMismatch(String),

    /// ECDSA signature verification failed
    #[error("Invalid signature")]
    InvalidSignature,

    /// The response references a key handle that is not registered or was not challenged
    #[error("Unknown key handle")]
    UnknownKeyHandle,

    /// Complete was called without a matching begin (or the challenge was already used)
    #[error("No pending challenge")]
    NoPendingChallenge,

    /// Authentication was requested for a user without enrolled devices
    #[error("No registered devices")]
    NoRegisteredDevices,

    /// The signature counter did not advance; the device may have been cloned
    #[error("Possible cloned device: counter {received} is not greater than {stored}")]
    PossibleClone { stored: u32, received: u32 },

    /// The attestation certificate could not be parsed or used
    #[error("Certificate error: {0}")]
    CertError(String),

    /// Strict attestation policy rejected the attestation certificate chain
    #[error("Untrusted attestation: {0}")]
    UntrustedAttestation(String),

    /// Failure outside the protocol itself (e.g. the system RNG)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl U2fError {
    /// Short machine-readable code used in HTTP error bodies
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            U2fError::MalformedMessage(_) => "malformed_message",
            U2fError::ClientDataMismatch(_) => "client_data_mismatch",
            U2fError::InvalidSignature => "invalid_signature",
            U2fError::UnknownKeyHandle => "unknown_key_handle",
            U2fError::NoPendingChallenge => "no_pending_challenge",
            U2fError::NoRegisteredDevices => "no_registered_devices",
            U2fError::PossibleClone { .. } => "possible_clone",
            U2fError::CertError(_) => "cert_error",
            U2fError::UntrustedAttestation(_) => "untrusted_attestation",
            U2fError::Internal(_) => "internal_error",
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        U2fError::MalformedMessage(msg.into())
    }

    pub(crate) fn mismatch(msg: impl Into<String>) -> Self {
        U2fError::ClientDataMismatch(msg.into())
    }
}

impl From<openssl::error::ErrorStack> for U2fError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        U2fError::CertError(err.to_string())
    }
}
