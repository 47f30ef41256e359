//! U2F authentication flow
//!
//! `begin_authentication` challenges every device the user has enrolled;
//! `complete_authentication` verifies the assertion from whichever token
//! answered and enforces the signature counter.
//!
//! When the caller supplies data to sign, the challenge is the SHA-256 of
//! that data, so a verified assertion doubles as the token's signature over it.

use chrono::Utc;

use super::codec;
use super::crypto;
use super::errors::U2fError;
use super::registration::verify_client_data;
use super::types::{
    parse_response, AuthenticationChallenge, PendingChallenge, RegisteredDevice, SignResponse,
    TYPE_AUTHENTICATE,
};

/// Outcome of a successful authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    /// The device that signed, with its counter already advanced
    pub device: RegisteredDevice,
    /// New counter value for the caller to persist
    pub counter: u32,
    /// Whether the token reported a touch
    pub user_presence: bool,
}

/// Create an authentication challenge over all `devices`
///
/// With `data`, the challenge is the base64url SHA-256 of it; without, it is
/// 32 random bytes.
///
/// # Errors
/// Returns `NoRegisteredDevices` if `devices` is empty, `Internal` if
/// challenge generation fails
pub fn begin_authentication(
    app_id: &str,
    devices: &[RegisteredDevice],
    data: Option<&[u8]>,
) -> Result<(AuthenticationChallenge, PendingChallenge), U2fError> {
    if devices.is_empty() {
        return Err(U2fError::NoRegisteredDevices);
    }

    let challenge = match data {
        Some(data) => codec::websafe_encode(&codec::sha256(data)),
        None => crypto::generate_challenge()?,
    };
    let registered_keys: Vec<_> = devices
        .iter()
        .map(|device| device.registered_key(app_id))
        .collect();

    let pending = PendingChallenge {
        challenge: challenge.clone(),
        app_id: app_id.to_string(),
        key_handles: registered_keys.iter().map(|k| k.key_handle.clone()).collect(),
        created_at: Utc::now(),
    };

    let request = AuthenticationChallenge {
        app_id: app_id.to_string(),
        challenge,
        registered_keys,
    };

    Ok((request, pending))
}

/// Verify an authentication response
///
/// # Arguments
/// * `pending` - The challenge taken from the challenge store
/// * `response_json` - Raw `{keyHandle, signatureData, clientData}` JSON from the client
/// * `facets` - Origins accepted in the client data; empty means exactly the app id
/// * `devices` - The user's enrolled devices
///
/// # Errors
/// `MalformedMessage`, `UnknownKeyHandle`, `ClientDataMismatch`,
/// `InvalidSignature`, or `PossibleClone` when the counter did not advance.
pub fn complete_authentication(
    pending: &PendingChallenge,
    response_json: &str,
    facets: &[String],
    devices: &[RegisteredDevice],
) -> Result<Authentication, U2fError> {
    let response: SignResponse = parse_response(response_json)?;

    let key_handle = codec::websafe_decode(&response.key_handle)?;
    let device = devices
        .iter()
        .find(|device| device.key_handle == key_handle)
        .ok_or(U2fError::UnknownKeyHandle)?;
    if !pending.key_handles.is_empty() && !pending.key_handles.contains(&device.key_handle_b64()) {
        return Err(U2fError::UnknownKeyHandle);
    }

    let (client_data_raw, client_data) = codec::decode_client_data(&response.client_data)?;
    verify_client_data(&client_data, TYPE_AUTHENTICATE, pending, facets)?;

    let signature_data = codec::websafe_decode(&response.signature_data)?;
    let message = codec::decode_authentication_response(&signature_data)?;

    let signed = codec::authentication_signed_bytes(
        &pending.app_id,
        message.flags,
        message.counter,
        &client_data_raw,
    );
    if !crypto::verify_signature(&device.public_key, &signed, &message.signature) {
        return Err(U2fError::InvalidSignature);
    }

    check_counter(device, message.counter)?;

    let mut device = device.clone();
    device.counter = message.counter;
    device.last_used = Some(Utc::now());

    Ok(Authentication {
        device,
        counter: message.counter,
        user_presence: message.user_present(),
    })
}

/// Enforce counter monotonicity
///
/// A device that has never authenticated accepts any counter, including 0.
/// After that the new counter must be strictly greater than the stored one,
/// so a token stuck at 0 passes exactly once.
///
/// # Errors
/// Returns `PossibleClone` on a repeated or decreased counter
pub fn check_counter(device: &RegisteredDevice, received: u32) -> Result<(), U2fError> {
    let stored = device.counter;
    if device.has_authenticated() && received <= stored {
        return Err(U2fError::PossibleClone { stored, received });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::SoftToken;

    const APP_ID: &str = "https://example.com";

    fn facets() -> Vec<String> {
        vec![APP_ID.to_string()]
    }

    fn device_with_counter(token: &SoftToken, counter: u32) -> RegisteredDevice {
        let mut device = token.registered_device(APP_ID);
        device.counter = counter;
        if counter != 0 {
            device.last_used = Some(Utc::now());
        }
        device
    }

    fn authenticate(token: &SoftToken, stored: u32, counter: u32) -> Result<Authentication, U2fError> {
        let devices = vec![device_with_counter(token, stored)];
        let (_, pending) = begin_authentication(APP_ID, &devices, None).unwrap();
        let response = token.sign(APP_ID, &pending.challenge, APP_ID, counter, true);
        complete_authentication(&pending, &response, &facets(), &devices)
    }

    #[test]
    fn test_begin_authentication_requires_devices() {
        assert_eq!(
            begin_authentication(APP_ID, &[], None).unwrap_err(),
            U2fError::NoRegisteredDevices
        );
    }

    #[test]
    fn test_begin_authentication_lists_all_key_handles() {
        let first = SoftToken::new();
        let second = SoftToken::new();
        let devices = vec![first.registered_device(APP_ID), second.registered_device(APP_ID)];

        let (request, pending) = begin_authentication(APP_ID, &devices, None).unwrap();
        assert_eq!(request.app_id, APP_ID);
        assert_eq!(request.challenge, pending.challenge);
        assert_eq!(request.registered_keys.len(), 2);
        assert_eq!(request.registered_keys[1].key_handle, devices[1].key_handle_b64());
        assert_eq!(pending.key_handles.len(), 2);
    }

    #[test]
    fn test_counter_must_increase() {
        let token = SoftToken::new();
        assert_eq!(
            authenticate(&token, 5, 5).unwrap_err(),
            U2fError::PossibleClone { stored: 5, received: 5 }
        );
        assert_eq!(
            authenticate(&token, 5, 3).unwrap_err(),
            U2fError::PossibleClone { stored: 5, received: 3 }
        );

        let result = authenticate(&token, 5, 6).unwrap();
        assert_eq!(result.counter, 6);
        assert_eq!(result.device.counter, 6);
    }

    #[test]
    fn test_first_use_tolerates_zero_counter() {
        let token = SoftToken::new();
        let result = authenticate(&token, 0, 0).unwrap();
        assert_eq!(result.counter, 0);
        assert!(result.user_presence);
        assert!(result.device.last_used.is_some());
    }

    #[test]
    fn test_zero_counter_accepted_only_once() {
        let token = SoftToken::new();
        let mut devices = vec![token.registered_device(APP_ID)];

        let (_, pending) = begin_authentication(APP_ID, &devices, None).unwrap();
        let response = token.sign(APP_ID, &pending.challenge, APP_ID, 0, true);
        let first = complete_authentication(&pending, &response, &facets(), &devices).unwrap();
        devices[0] = first.device;

        let (_, pending) = begin_authentication(APP_ID, &devices, None).unwrap();
        let response = token.sign(APP_ID, &pending.challenge, APP_ID, 0, true);
        assert_eq!(
            complete_authentication(&pending, &response, &facets(), &devices).unwrap_err(),
            U2fError::PossibleClone { stored: 0, received: 0 }
        );
    }

    #[test]
    fn test_challenge_derived_from_submitted_data() {
        let token = SoftToken::new();
        let devices = vec![token.registered_device(APP_ID)];
        let data = b"pay 100 to bob";

        let (request, pending) = begin_authentication(APP_ID, &devices, Some(&data[..])).unwrap();
        assert_eq!(request.challenge, codec::websafe_encode(&codec::sha256(data)));
        assert_eq!(pending.challenge, request.challenge);

        let response = token.sign(APP_ID, &request.challenge, APP_ID, 1, true);
        assert!(complete_authentication(&pending, &response, &facets(), &devices).is_ok());
    }

    #[test]
    fn test_random_challenge_without_data() {
        let token = SoftToken::new();
        let devices = vec![token.registered_device(APP_ID)];

        let (first, _) = begin_authentication(APP_ID, &devices, None).unwrap();
        let (second, _) = begin_authentication(APP_ID, &devices, None).unwrap();
        assert_ne!(first.challenge, second.challenge);
        assert_eq!(codec::websafe_decode(&first.challenge).unwrap().len(), 32);
    }

    #[test]
    fn test_missing_user_presence_still_succeeds() {
        let token = SoftToken::new();
        let devices = vec![device_with_counter(&token, 0)];
        let (_, pending) = begin_authentication(APP_ID, &devices, None).unwrap();
        let response = token.sign(APP_ID, &pending.challenge, APP_ID, 1, false);

        let result = complete_authentication(&pending, &response, &facets(), &devices).unwrap();
        assert!(!result.user_presence);
        assert_eq!(result.counter, 1);
    }

    #[test]
    fn test_unknown_key_handle() {
        let registered = SoftToken::new();
        let stranger = SoftToken::new();
        let devices = vec![registered.registered_device(APP_ID)];
        let (_, pending) = begin_authentication(APP_ID, &devices, None).unwrap();
        let response = stranger.sign(APP_ID, &pending.challenge, APP_ID, 1, true);

        assert_eq!(
            complete_authentication(&pending, &response, &facets(), &devices).unwrap_err(),
            U2fError::UnknownKeyHandle
        );
    }

    #[test]
    fn test_key_handle_not_in_challenge() {
        let first = SoftToken::new();
        let second = SoftToken::new();
        let (_, pending) = begin_authentication(APP_ID, &[first.registered_device(APP_ID)], None).unwrap();
        // Device enrolled after the challenge was issued
        let devices = vec![first.registered_device(APP_ID), second.registered_device(APP_ID)];
        let response = second.sign(APP_ID, &pending.challenge, APP_ID, 1, true);

        assert_eq!(
            complete_authentication(&pending, &response, &facets(), &devices).unwrap_err(),
            U2fError::UnknownKeyHandle
        );
    }

    #[test]
    fn test_challenge_mismatch() {
        let token = SoftToken::new();
        let devices = vec![token.registered_device(APP_ID)];
        let (_, pending) = begin_authentication(APP_ID, &devices, None).unwrap();
        let other = crypto::generate_challenge().unwrap();
        let response = token.sign(APP_ID, &other, APP_ID, 1, true);

        assert!(matches!(
            complete_authentication(&pending, &response, &facets(), &devices),
            Err(U2fError::ClientDataMismatch(_))
        ));
    }

    #[test]
    fn test_registration_type_rejected() {
        let token = SoftToken::new();
        let devices = vec![token.registered_device(APP_ID)];
        let (_, pending) = begin_authentication(APP_ID, &devices, None).unwrap();
        let response = token.sign_with_type(
            APP_ID,
            &pending.challenge,
            APP_ID,
            1,
            "navigator.id.finishEnrollment",
        );

        assert!(matches!(
            complete_authentication(&pending, &response, &facets(), &devices),
            Err(U2fError::ClientDataMismatch(_))
        ));
    }

    #[test]
    fn test_signature_from_other_device_key() {
        let token = SoftToken::new();
        let impostor = SoftToken::with_key_handle(token.key_handle());
        let devices = vec![token.registered_device(APP_ID)];
        let (_, pending) = begin_authentication(APP_ID, &devices, None).unwrap();
        let response = impostor.sign(APP_ID, &pending.challenge, APP_ID, 1, true);

        assert_eq!(
            complete_authentication(&pending, &response, &facets(), &devices).unwrap_err(),
            U2fError::InvalidSignature
        );
    }

    #[test]
    fn test_check_counter() {
        let token = SoftToken::new();
        let fresh = token.registered_device(APP_ID);
        assert!(check_counter(&fresh, 0).is_ok());
        assert!(check_counter(&fresh, 7).is_ok());

        let mut used = fresh.clone();
        used.last_used = Some(Utc::now());
        assert!(check_counter(&used, 0).is_err());
        assert!(check_counter(&used, 1).is_ok());

        assert!(check_counter(&device_with_counter(&token, 1), 2).is_ok());
        assert!(check_counter(&device_with_counter(&token, 1), 1).is_err());
        assert!(check_counter(&device_with_counter(&token, u32::MAX), 0).is_err());
    }
}
