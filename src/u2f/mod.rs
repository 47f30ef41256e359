//! U2F implementation
//!
//! This module provides the U2F (FIDO Universal 2nd Factor) registration and
//! authentication engine, independent of any HTTP layer or persistence. It
//! implements the U2F raw message formats and verification rules using
//! standard cryptography libraries.
//!
//! The engine never logs and never panics on client input: every failure is
//! returned as a [`U2fError`].

pub mod attestation;
pub mod authentication;
pub mod codec;
pub mod crypto;
mod errors;
pub mod registration;
mod service;
mod settings;
pub mod store;
mod types;

// Re-exports for public use
pub use attestation::{AttestationObserver, AttestationPolicy, AttestationStatus, AttestationVerifier};
pub use authentication::Authentication;
pub use crypto::AttestationCertificate;
pub use errors::U2fError;
pub use registration::Registration;
pub use service::U2fService;
pub use settings::U2fSettings;
pub use store::{
    ChallengeStore, ConfiguredChallengeStore, DeviceRegistry, ExpiringChallengeStore,
    MemoryChallengeStore, MemoryDeviceRegistry, Purpose,
};
pub use types::*;
