//! U2F registration flow
//!
//! `begin_registration` produces the challenge sent to the client and the
//! pending state the caller stores. `complete_registration` verifies the
//! token's response against that state and yields the new device record.

use chrono::Utc;

use super::attestation::{AttestationStatus, AttestationVerifier};
use super::codec;
use super::crypto::{self, AttestationCertificate};
use super::errors::U2fError;
use super::types::{
    parse_response, ClientData, PendingChallenge, RegisterRequest, RegisterResponse,
    RegisteredDevice, RegistrationChallenge, TYPE_REGISTER, U2F_VERSION,
};

/// Outcome of a successful registration
#[derive(Debug, Clone)]
pub struct Registration {
    /// Device record for the caller to persist
    pub device: RegisteredDevice,
    /// Parsed attestation certificate
    pub certificate: AttestationCertificate,
    /// Result of attestation chain validation
    pub attestation: AttestationStatus,
}

/// Create a registration challenge
///
/// Existing devices are listed in `registeredKeys` so the client can refuse
/// to enroll a token that is already bound to this user.
///
/// # Errors
/// Returns `Internal` if challenge generation fails
pub fn begin_registration(
    app_id: &str,
    existing_devices: &[RegisteredDevice],
) -> Result<(RegistrationChallenge, PendingChallenge), U2fError> {
    let challenge = crypto::generate_challenge()?;

    let request = RegistrationChallenge {
        app_id: app_id.to_string(),
        version: U2F_VERSION.to_string(),
        challenge: challenge.clone(),
        register_requests: vec![RegisterRequest {
            version: U2F_VERSION.to_string(),
            challenge: challenge.clone(),
            app_id: app_id.to_string(),
        }],
        registered_keys: existing_devices
            .iter()
            .map(|device| device.registered_key(app_id))
            .collect(),
    };

    let pending = PendingChallenge {
        challenge,
        app_id: app_id.to_string(),
        key_handles: Vec::new(),
        created_at: Utc::now(),
    };

    Ok((request, pending))
}

/// Verify a registration response
///
/// # Arguments
/// * `pending` - The challenge taken from the challenge store
/// * `response_json` - Raw `{registrationData, clientData, version}` JSON from the client
/// * `facets` - Origins accepted in the client data; empty means exactly the app id
/// * `attestation` - Trust policy for the attestation certificate
///
/// # Errors
/// `MalformedMessage`, `ClientDataMismatch`, `CertError`, `InvalidSignature`,
/// or `UntrustedAttestation` under a strict policy.
pub fn complete_registration(
    pending: &PendingChallenge,
    response_json: &str,
    facets: &[String],
    attestation: &AttestationVerifier,
) -> Result<Registration, U2fError> {
    let response: RegisterResponse = parse_response(response_json)?;

    let (client_data_raw, client_data) = codec::decode_client_data(&response.client_data)?;
    verify_client_data(&client_data, TYPE_REGISTER, pending, facets)?;

    let registration_data = codec::websafe_decode(&response.registration_data)?;
    let message = codec::decode_registration_response(&registration_data)?;
    crypto::validate_public_key(&message.public_key)?;

    let certificate = crypto::parse_certificate(&message.certificate)?;
    let attestation_key = certificate.public_key()?;

    // The attestation key signs the registration, not the new device key
    let signed = codec::registration_signed_bytes(
        &pending.app_id,
        &client_data_raw,
        &message.key_handle,
        &message.public_key,
    );
    if !crypto::verify_signature(&attestation_key, &signed, &message.signature) {
        return Err(U2fError::InvalidSignature);
    }

    let attestation = attestation.verify(&certificate)?;

    let device = RegisteredDevice {
        version: response.version.unwrap_or_else(|| U2F_VERSION.to_string()),
        key_handle: message.key_handle,
        public_key: message.public_key,
        app_id: pending.app_id.clone(),
        certificate: message.certificate,
        counter: 0,
        created_at: Utc::now(),
        last_used: None,
    };

    Ok(Registration {
        device,
        certificate,
        attestation,
    })
}

/// Check type, challenge and origin of decoded client data
///
/// # Errors
/// Returns `ClientDataMismatch` naming the first field that does not match
pub fn verify_client_data(
    client_data: &ClientData,
    expected_type: &str,
    pending: &PendingChallenge,
    facets: &[String],
) -> Result<(), U2fError> {
    if client_data.typ != expected_type {
        return Err(U2fError::mismatch(format!(
            "invalid type {}, expected {expected_type}",
            client_data.typ
        )));
    }

    if client_data.challenge != pending.challenge {
        return Err(U2fError::mismatch("challenge mismatch"));
    }

    let origin_ok = if facets.is_empty() {
        client_data.origin == pending.app_id
    } else {
        facets.iter().any(|facet| *facet == client_data.origin)
    };
    if !origin_ok {
        return Err(U2fError::mismatch(format!(
            "origin {} is not a trusted facet",
            client_data.origin
        )));
    }

    Ok(())
}
