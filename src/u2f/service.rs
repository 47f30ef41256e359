//! U2F service implementation
//!
//! Ties the registration and authentication flows to a challenge store:
//! begin operations store the pending challenge for `(user, purpose)`,
//! complete operations take it atomically before verifying anything, so a
//! challenge can be consumed at most once whatever the outcome.

use super::attestation::{AttestationObserver, AttestationVerifier};
use super::authentication::{self, Authentication};
use super::errors::U2fError;
use super::registration::{self, Registration};
use super::settings::U2fSettings;
use super::store::{ChallengeStore, Purpose};
use super::types::{AuthenticationChallenge, RegisteredDevice, RegistrationChallenge};

/// Core U2F service
pub struct U2fService<S: ChallengeStore> {
    store: S,
    attestation: AttestationVerifier,
    trusted_facets: Vec<String>,
    observer: Option<AttestationObserver>,
}

impl<S: ChallengeStore> U2fService<S> {
    /// Create a service over `store` with the given attestation verifier
    #[must_use]
    pub fn new(store: S, attestation: AttestationVerifier) -> Self {
        Self {
            store,
            attestation,
            trusted_facets: Vec::new(),
            observer: None,
        }
    }

    /// Create a service from settings
    ///
    /// # Errors
    /// Returns `CertError` if the attestation roots cannot be loaded
    pub fn from_settings(store: S, settings: &U2fSettings) -> Result<Self, U2fError> {
        Ok(Self::new(store, settings.attestation_verifier()?)
            .with_trusted_facets(settings.trusted_facets.clone()))
    }

    /// Accept client data from these origins instead of only the app id
    #[must_use]
    pub fn with_trusted_facets(mut self, facets: Vec<String>) -> Self {
        self.trusted_facets = facets;
        self
    }

    /// Install a callback invoked with every verified attestation certificate
    #[must_use]
    pub fn with_attestation_observer(mut self, observer: AttestationObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The underlying challenge store
    pub fn store(&self) -> &S {
        &self.store
    }

    fn facets(&self, app_id: &str) -> Vec<String> {
        if self.trusted_facets.is_empty() {
            vec![app_id.to_string()]
        } else {
            self.trusted_facets.clone()
        }
    }

    /// Begin enrolling a device for `user`, replacing any pending enrollment
    ///
    /// # Errors
    /// Returns `Internal` if challenge generation fails
    pub fn start_registration(
        &self,
        user: &str,
        app_id: &str,
        existing_devices: &[RegisteredDevice],
    ) -> Result<RegistrationChallenge, U2fError> {
        let (request, pending) = registration::begin_registration(app_id, existing_devices)?;
        self.store.put(user, Purpose::Enroll, pending);
        Ok(request)
    }

    /// Complete enrollment for `user`
    ///
    /// # Errors
    /// `NoPendingChallenge` if no enrollment is pending, otherwise any error
    /// from [`registration::complete_registration`]
    pub fn finish_registration(
        &self,
        user: &str,
        app_id: &str,
        response_json: &str,
    ) -> Result<Registration, U2fError> {
        let pending = self
            .store
            .take_and_clear(user, Purpose::Enroll)
            .ok_or(U2fError::NoPendingChallenge)?;

        let registration = registration::complete_registration(
            &pending,
            response_json,
            &self.facets(app_id),
            &self.attestation,
        )?;

        if let Some(observer) = &self.observer {
            observer(&registration.certificate, &registration.attestation);
        }

        Ok(registration)
    }

    /// Begin a sign-in for `user` against all of `devices`
    ///
    /// `data`, when given, is what the token will sign: the challenge is its
    /// SHA-256.
    ///
    /// # Errors
    /// `NoRegisteredDevices` if `devices` is empty, `Internal` if challenge
    /// generation fails
    pub fn start_authentication(
        &self,
        user: &str,
        app_id: &str,
        devices: &[RegisteredDevice],
        data: Option<&[u8]>,
    ) -> Result<AuthenticationChallenge, U2fError> {
        let (request, pending) = authentication::begin_authentication(app_id, devices, data)?;
        self.store.put(user, Purpose::Sign, pending);
        Ok(request)
    }

    /// Complete a sign-in for `user`
    ///
    /// The returned counter is not persisted here; the caller writes it to
    /// its device registry.
    ///
    /// # Errors
    /// `NoPendingChallenge` if no sign-in is pending, otherwise any error
    /// from [`authentication::complete_authentication`]
    pub fn finish_authentication(
        &self,
        user: &str,
        app_id: &str,
        response_json: &str,
        devices: &[RegisteredDevice],
    ) -> Result<Authentication, U2fError> {
        let pending = self
            .store
            .take_and_clear(user, Purpose::Sign)
            .ok_or(U2fError::NoPendingChallenge)?;

        authentication::complete_authentication(
            &pending,
            response_json,
            &self.facets(app_id),
            devices,
        )
    }
}
