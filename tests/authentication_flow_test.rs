// Integration tests for sign-in through the public engine API
use u2frs::testing::constants::{TEST_APP_ID, TEST_USER};
use u2frs::testing::SoftToken;
use u2frs::u2f::{
    codec, AttestationVerifier, DeviceRegistry, MemoryChallengeStore, MemoryDeviceRegistry,
    RegisteredDevice, U2fError, U2fService,
};

struct Harness {
    service: U2fService<MemoryChallengeStore>,
    registry: MemoryDeviceRegistry,
}

impl Harness {
    fn new() -> Self {
        Self {
            service: U2fService::new(MemoryChallengeStore::new(), AttestationVerifier::permissive()),
            registry: MemoryDeviceRegistry::new(),
        }
    }

    fn enroll(&self, token: &SoftToken) {
        self.registry.ensure_user(TEST_USER);
        let request = self
            .service
            .start_registration(TEST_USER, TEST_APP_ID, &self.registry.list(TEST_USER))
            .unwrap();
        let response = token.register(TEST_APP_ID, &request.challenge, TEST_APP_ID);
        let registration = self
            .service
            .finish_registration(TEST_USER, TEST_APP_ID, &response)
            .unwrap();
        self.registry.append(TEST_USER, registration.device);
    }

    /// Sign in with `token` reporting `counter`, persisting the new counter on success
    fn sign_in(&self, token: &SoftToken, counter: u32) -> Result<u32, U2fError> {
        let devices = self.registry.list(TEST_USER);
        let request = self
            .service
            .start_authentication(TEST_USER, TEST_APP_ID, &devices, None)?;
        let response = token.sign(TEST_APP_ID, &request.challenge, TEST_APP_ID, counter, true);
        let authentication =
            self.service
                .finish_authentication(TEST_USER, TEST_APP_ID, &response, &devices)?;
        assert!(self.registry.update_counter(
            TEST_USER,
            &authentication.device.key_handle,
            authentication.counter
        ));
        Ok(authentication.counter)
    }

    fn stored_counter(&self, token: &SoftToken) -> u32 {
        self.registry
            .list(TEST_USER)
            .iter()
            .find(|device| device.key_handle == token.key_handle())
            .map(|device| device.counter)
            .unwrap()
    }
}

#[test]
fn test_enroll_then_sign_in() {
    let harness = Harness::new();
    let token = SoftToken::new();
    harness.enroll(&token);

    assert_eq!(harness.sign_in(&token, 1).unwrap(), 1);
    assert_eq!(harness.stored_counter(&token), 1);

    assert_eq!(harness.sign_in(&token, 2).unwrap(), 2);
    assert_eq!(harness.stored_counter(&token), 2);
}

#[test]
fn test_cloned_token_is_detected() {
    let harness = Harness::new();
    let token = SoftToken::new();
    harness.enroll(&token);

    harness.sign_in(&token, 10).unwrap();

    assert_eq!(
        harness.sign_in(&token, 10).unwrap_err(),
        U2fError::PossibleClone { stored: 10, received: 10 }
    );
    assert_eq!(
        harness.sign_in(&token, 4).unwrap_err(),
        U2fError::PossibleClone { stored: 10, received: 4 }
    );
    // The stored counter is left untouched by rejected attempts
    assert_eq!(harness.stored_counter(&token), 10);

    assert_eq!(harness.sign_in(&token, 11).unwrap(), 11);
}

#[test]
fn test_token_stuck_at_zero_passes_once() {
    let harness = Harness::new();
    let token = SoftToken::new();
    harness.enroll(&token);

    assert_eq!(harness.sign_in(&token, 0).unwrap(), 0);
    assert_eq!(
        harness.sign_in(&token, 0).unwrap_err(),
        U2fError::PossibleClone { stored: 0, received: 0 }
    );

    // Once it starts counting it is accepted again
    assert_eq!(harness.sign_in(&token, 1).unwrap(), 1);
}

#[test]
fn test_sign_submitted_data() {
    let harness = Harness::new();
    let token = SoftToken::new();
    harness.enroll(&token);
    let devices = harness.registry.list(TEST_USER);
    let data = b"pay 100 to bob";

    let request = harness
        .service
        .start_authentication(TEST_USER, TEST_APP_ID, &devices, Some(&data[..]))
        .unwrap();
    assert_eq!(request.challenge, codec::websafe_encode(&codec::sha256(data)));

    let response = token.sign(TEST_APP_ID, &request.challenge, TEST_APP_ID, 1, true);
    let authentication = harness
        .service
        .finish_authentication(TEST_USER, TEST_APP_ID, &response, &devices)
        .unwrap();
    assert_eq!(authentication.counter, 1);

    // The same data signed under a different challenge does not verify
    let request = harness
        .service
        .start_authentication(TEST_USER, TEST_APP_ID, &devices, Some(&b"pay 900 to bob"[..]))
        .unwrap();
    assert_ne!(request.challenge, codec::websafe_encode(&codec::sha256(data)));
    assert!(matches!(
        harness
            .service
            .finish_authentication(TEST_USER, TEST_APP_ID, &response, &devices),
        Err(U2fError::ClientDataMismatch(_))
    ));
}

#[test]
fn test_any_enrolled_device_can_sign_in() {
    let harness = Harness::new();
    let first = SoftToken::new();
    let second = SoftToken::new();
    harness.enroll(&first);
    harness.enroll(&second);

    assert_eq!(harness.sign_in(&second, 3).unwrap(), 3);
    assert_eq!(harness.stored_counter(&second), 3);
    assert_eq!(harness.stored_counter(&first), 0);

    assert_eq!(harness.sign_in(&first, 1).unwrap(), 1);
}

#[test]
fn test_sign_in_without_devices() {
    let harness = Harness::new();
    harness.registry.ensure_user(TEST_USER);

    assert_eq!(
        harness.sign_in(&SoftToken::new(), 1).unwrap_err(),
        U2fError::NoRegisteredDevices
    );
}

#[test]
fn test_assertion_replay_is_rejected() {
    let harness = Harness::new();
    let token = SoftToken::new();
    harness.enroll(&token);

    let devices = harness.registry.list(TEST_USER);
    let request = harness
        .service
        .start_authentication(TEST_USER, TEST_APP_ID, &devices, None)
        .unwrap();
    let response = token.sign(TEST_APP_ID, &request.challenge, TEST_APP_ID, 1, true);

    assert!(harness
        .service
        .finish_authentication(TEST_USER, TEST_APP_ID, &response, &devices)
        .is_ok());

    // A fresh challenge does not revive the old assertion either
    harness
        .service
        .start_authentication(TEST_USER, TEST_APP_ID, &devices, None)
        .unwrap();
    assert!(matches!(
        harness
            .service
            .finish_authentication(TEST_USER, TEST_APP_ID, &response, &devices),
        Err(U2fError::ClientDataMismatch(_))
    ));
}

#[test]
fn test_device_record_survives_serialization() {
    let harness = Harness::new();
    let token = SoftToken::new();
    harness.enroll(&token);

    // A durable registry would store the device as JSON
    let stored = serde_json::to_string(&harness.registry.list(TEST_USER)).unwrap();
    let devices: Vec<RegisteredDevice> = serde_json::from_str(&stored).unwrap();
    assert_eq!(devices, harness.registry.list(TEST_USER));

    let request = harness
        .service
        .start_authentication(TEST_USER, TEST_APP_ID, &devices, None)
        .unwrap();
    let response = token.sign(TEST_APP_ID, &request.challenge, TEST_APP_ID, 1, true);
    let authentication = harness
        .service
        .finish_authentication(TEST_USER, TEST_APP_ID, &response, &devices)
        .unwrap();
    assert_eq!(authentication.device.key_handle, token.key_handle());
}

#[test]
fn test_garbage_responses_never_panic() {
    let harness = Harness::new();
    let token = SoftToken::new();
    harness.enroll(&token);
    let devices = harness.registry.list(TEST_USER);

    let bodies = [
        "",
        "null",
        "[]",
        "{}",
        r#"{"keyHandle": "", "signatureData": "", "clientData": ""}"#,
        r#"{"keyHandle": "!!!", "signatureData": "AA", "clientData": "AA"}"#,
        r#"{"errorCode": 1}"#,
    ];

    for body in bodies {
        harness
            .service
            .start_authentication(TEST_USER, TEST_APP_ID, &devices, None)
            .unwrap();
        assert!(harness
            .service
            .finish_authentication(TEST_USER, TEST_APP_ID, body, &devices)
            .is_err());
    }
}
