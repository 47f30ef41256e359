use std::sync::Arc;

use crate::settings::ServerSettings;
use crate::u2f::{
    AttestationObserver, ConfiguredChallengeStore, DeviceRegistry, MemoryDeviceRegistry, U2fError,
    U2fService,
};

/// Shared state for the U2F handlers
///
/// Holds the engine with its challenge store and the device registry. Both
/// stores are in memory, so enrolled devices are lost on restart.
pub struct U2fState {
    pub service: U2fService<ConfiguredChallengeStore>,
    pub registry: Box<dyn DeviceRegistry>,
}

impl U2fState {
    /// Build state from settings with an in-memory device registry
    ///
    /// # Errors
    ///
    /// Returns `CertError` if the attestation trust roots cannot be loaded
    pub fn from_settings(settings: &ServerSettings) -> Result<Self, U2fError> {
        let store = ConfiguredChallengeStore::in_memory(settings.u2f.challenge_timeout_seconds);
        let service = U2fService::from_settings(store, &settings.u2f)?;
        Ok(Self::new(service, Box::new(MemoryDeviceRegistry::new())))
    }

    #[must_use]
    pub fn new(
        service: U2fService<ConfiguredChallengeStore>,
        registry: Box<dyn DeviceRegistry>,
    ) -> Self {
        Self { service, registry }
    }

    /// Report every accepted attestation certificate to `observer`
    #[must_use]
    pub fn with_attestation_observer(self, observer: AttestationObserver) -> Self {
        Self {
            service: self.service.with_attestation_observer(observer),
            registry: self.registry,
        }
    }

    /// State whose observer logs attestation certificates
    ///
    /// # Errors
    ///
    /// Same as [`U2fState::from_settings`]
    pub fn with_logging(settings: &ServerSettings) -> Result<Self, U2fError> {
        Ok(Self::from_settings(settings)?
            .with_attestation_observer(Arc::new(crate::utils::LoggingHelper::log_attestation)))
    }
}
