// Centralized logging for the demo server; the U2F engine itself never logs
use log::{debug, error, info, warn};

use crate::settings::ServerSettings;
use crate::u2f::{
    AttestationCertificate, AttestationStatus, Authentication, RegisteredDevice, Registration,
    U2fError,
};

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log the effective configuration at startup
    pub fn log_startup(settings: &ServerSettings) {
        info!("🚀 Starting u2frs v{}", crate::VERSION);
        info!("📡 Listening on {}", settings.get_bind_address());
        match &settings.u2f.app_id {
            Some(app_id) => info!("🔑 Using fixed app id {app_id}"),
            None => info!("🔑 Deriving app id from each request's scheme and host"),
        }
        if !settings.u2f.trusted_facets.is_empty() {
            info!("🎯 Trusted facets: {:?}", settings.u2f.trusted_facets);
        }
        if settings.u2f.challenge_timeout_seconds == 0 {
            info!("⏱️  Pending challenges never expire");
        } else {
            info!(
                "⏱️  Pending challenges expire after {}s",
                settings.u2f.challenge_timeout_seconds
            );
        }
        info!(
            "📜 Attestation policy: {:?} (roots: {})",
            settings.u2f.attestation_policy,
            settings.u2f.attestation_roots.as_deref().unwrap_or("none")
        );
    }

    /// Log an attestation certificate as it is accepted
    ///
    /// Used as the engine's attestation observer.
    pub fn log_attestation(certificate: &AttestationCertificate, status: &AttestationStatus) {
        info!(
            "📜 Attestation certificate subject={} issuer={} sha256={}",
            certificate.subject(),
            certificate.issuer(),
            certificate.fingerprint()
        );
        match status {
            AttestationStatus::Trusted => info!("✅ Attestation chains to a trusted root"),
            AttestationStatus::Unchecked => debug!("Attestation not checked: no trust roots configured"),
            AttestationStatus::Untrusted(reason) => {
                warn!("⚠️  Attestation not trusted, accepting under permissive policy: {reason}");
            }
        }
        match certificate.to_pem() {
            Ok(pem) => debug!("Attestation certificate:\n{pem}"),
            Err(e) => debug!("Attestation certificate could not be PEM-encoded: {e}"),
        }
    }

    /// Log a newly enrolled device
    pub fn log_device_enrolled(user: &str, registration: &Registration) {
        info!(
            "✅ Enrolled device for user {user} (key handle {})",
            registration.device.key_handle_b64()
        );
    }

    /// Log an enrollment rejected because the key handle is already registered
    pub fn log_duplicate_device(user: &str, device: &RegisteredDevice) {
        warn!(
            "⚠️  Key handle {} is already registered for user {user}",
            device.key_handle_b64()
        );
    }

    /// Log a successful authentication
    pub fn log_authenticated(user: &str, authentication: &Authentication) {
        info!(
            "✅ Authenticated user {user} (counter {}, touch {})",
            authentication.counter, authentication.user_presence
        );
    }

    /// Log a failed U2F operation
    pub fn log_operation_failed(operation: &str, user: &str, error: &U2fError) {
        match error {
            U2fError::PossibleClone { stored, received } => warn!(
                "🚨 Possible cloned token for user {user}: counter {received} not above stored {stored}"
            ),
            U2fError::Internal(msg) => error!("❌ {operation} for user {user} failed internally: {msg}"),
            other => info!("❌ {operation} for user {user} rejected: {other}"),
        }
    }
}
