//! Software U2F token and certificate fixtures
//!
//! Everything here produces genuine signatures: device keys are P-256 keys
//! from `p256`, attestation keys and certificates come from OpenSSL. Helpers
//! panic on failure since they only run inside tests.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, PointConversionForm};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer as OpensslSigner;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use ring::rand::SecureRandom;

use crate::u2f::codec::{self, AuthenticationMessage, RegistrationMessage, USER_PRESENCE_FLAG};
use crate::u2f::{
    ClientData, RegisterResponse, RegisteredDevice, SignResponse, TYPE_AUTHENTICATE, TYPE_REGISTER,
    U2F_VERSION,
};

static NEXT_SERIAL: AtomicU32 = AtomicU32::new(1);

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    ring::rand::SystemRandom::new()
        .fill(&mut bytes)
        .expect("system random source failed");
    bytes
}

/// A P-256 device key as minted by a token during registration
pub struct TestDeviceKey(SigningKey);

impl TestDeviceKey {
    /// Deterministic key derived from `seed`
    ///
    /// # Panics
    ///
    /// Never in practice: the derived scalar is always in range.
    #[must_use]
    pub fn from_seed(seed: u8) -> Self {
        let mut scalar = [0x11u8; 32];
        scalar[31] = seed;
        Self(SigningKey::from_slice(&scalar).expect("valid P-256 scalar"))
    }

    /// Fresh random key
    #[must_use]
    pub fn random() -> Self {
        loop {
            if let Ok(key) = SigningKey::from_slice(&random_bytes::<32>()) {
                return Self(key);
            }
        }
    }

    /// Uncompressed SEC1 public key (65 bytes)
    #[must_use]
    pub fn public_key(&self) -> Vec<u8> {
        self.0.verifying_key().to_encoded_point(false).as_bytes().to_vec()
    }
}

/// Sign `data` with ECDSA P-256/SHA-256, DER-encoded
#[must_use]
pub fn sign_with_device_key(key: &TestDeviceKey, data: &[u8]) -> Vec<u8> {
    let signature: Signature = key.0.sign(data);
    signature.to_der().as_bytes().to_vec()
}

/// An attestation (or CA) key pair held by OpenSSL
pub struct TestAttestationKey {
    key: PKey<Private>,
}

impl TestAttestationKey {
    /// # Panics
    ///
    /// Panics if OpenSSL cannot generate a P-256 key.
    #[must_use]
    pub fn generate() -> Self {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).expect("P-256 group");
        let ec_key = EcKey::generate(&group).expect("EC key generation");
        Self {
            key: PKey::from_ec_key(ec_key).expect("PKey from EC key"),
        }
    }

    /// Uncompressed SEC1 public key (65 bytes)
    ///
    /// # Panics
    ///
    /// Panics if OpenSSL cannot encode the point.
    #[must_use]
    pub fn public_key_bytes(&self) -> Vec<u8> {
        let ec_key = self.key.ec_key().expect("EC key");
        let mut ctx = BigNumContext::new().expect("bignum context");
        ec_key
            .public_key()
            .to_bytes(ec_key.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)
            .expect("encode public key")
    }

    /// DER-encoded ECDSA/SHA-256 signature over `data`
    ///
    /// # Panics
    ///
    /// Panics if OpenSSL signing fails.
    #[must_use]
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut signer = OpensslSigner::new(MessageDigest::sha256(), &self.key).expect("signer");
        signer.update(data).expect("signer update");
        signer.sign_to_vec().expect("sign")
    }
}

/// A certificate authority for attestation certificates
pub struct TestCa {
    key: TestAttestationKey,
    certificate: X509,
}

impl TestCa {
    /// Self-signed root with the given common name
    #[must_use]
    pub fn new(common_name: &str) -> Self {
        let key = TestAttestationKey::generate();
        let certificate = build_certificate(common_name, &key.key, None, true);
        Self { key, certificate }
    }

    /// Root certificate
    #[must_use]
    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    /// Issue an attestation certificate for a fresh key pair
    #[must_use]
    pub fn issue_attestation_cert(&self, common_name: &str) -> (TestAttestationKey, X509) {
        let key = TestAttestationKey::generate();
        let certificate = build_certificate(
            common_name,
            &key.key,
            Some((&self.certificate, &self.key.key)),
            false,
        );
        (key, certificate)
    }
}

fn build_certificate(
    common_name: &str,
    subject_key: &PKey<Private>,
    issuer: Option<(&X509, &PKey<Private>)>,
    is_ca: bool,
) -> X509 {
    let mut name = X509NameBuilder::new().expect("name builder");
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)
        .expect("common name");
    let name = name.build();

    let mut builder = X509Builder::new().expect("certificate builder");
    builder.set_version(2).expect("version");
    let serial = BigNum::from_u32(NEXT_SERIAL.fetch_add(1, Ordering::SeqCst))
        .and_then(|bn| bn.to_asn1_integer())
        .expect("serial");
    builder.set_serial_number(&serial).expect("set serial");
    builder.set_subject_name(&name).expect("subject");
    match issuer {
        Some((issuer_cert, _)) => builder.set_issuer_name(issuer_cert.subject_name()),
        None => builder.set_issuer_name(&name),
    }
    .expect("issuer");
    builder.set_pubkey(subject_key).expect("public key");

    let not_before = Asn1Time::from_str("20200101000000Z").expect("not before");
    let not_after = Asn1Time::days_from_now(3650).expect("not after");
    builder.set_not_before(&not_before).expect("set not before");
    builder.set_not_after(&not_after).expect("set not after");

    if is_ca {
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().expect("bc"))
            .expect("basic constraints");
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .expect("ku"),
            )
            .expect("key usage");
    }

    let signing_key = issuer.map_or(subject_key, |(_, key)| key);
    builder
        .sign(signing_key, MessageDigest::sha256())
        .expect("sign certificate");
    builder.build()
}

/// A software U2F token
///
/// Produces registration and authentication responses in the exact JSON
/// shape the browser U2F API hands to the server.
pub struct SoftToken {
    device_key: TestDeviceKey,
    key_handle: Vec<u8>,
    attestation_key: TestAttestationKey,
    attestation_cert: X509,
}

impl Default for SoftToken {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftToken {
    /// Token with a random device key and its own attestation root
    #[must_use]
    pub fn new() -> Self {
        Self::issued_by(&TestCa::new("Soft U2F Attestation Root"))
    }

    /// Token whose attestation certificate is issued by `ca`
    #[must_use]
    pub fn issued_by(ca: &TestCa) -> Self {
        let (attestation_key, attestation_cert) = ca.issue_attestation_cert("Soft U2F Token");
        Self {
            device_key: TestDeviceKey::random(),
            key_handle: random_bytes::<64>().to_vec(),
            attestation_key,
            attestation_cert,
        }
    }

    /// Token with a fresh device key but the given key handle
    #[must_use]
    pub fn with_key_handle(key_handle: Vec<u8>) -> Self {
        Self {
            key_handle,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn key_handle(&self) -> Vec<u8> {
        self.key_handle.clone()
    }

    #[must_use]
    pub fn public_key(&self) -> Vec<u8> {
        self.device_key.public_key()
    }

    /// DER attestation certificate
    ///
    /// # Panics
    ///
    /// Panics if OpenSSL cannot encode the certificate.
    #[must_use]
    pub fn attestation_der(&self) -> Vec<u8> {
        self.attestation_cert.to_der().expect("certificate DER")
    }

    /// Device record as registration would have produced it
    #[must_use]
    pub fn registered_device(&self, app_id: &str) -> RegisteredDevice {
        RegisteredDevice {
            version: U2F_VERSION.to_string(),
            key_handle: self.key_handle(),
            public_key: self.public_key(),
            app_id: app_id.to_string(),
            certificate: self.attestation_der(),
            counter: 0,
            created_at: Utc::now(),
            last_used: None,
        }
    }

    /// Client data JSON bytes
    ///
    /// # Panics
    ///
    /// Panics if serialization fails.
    #[must_use]
    pub fn client_data(typ: &str, challenge: &str, origin: &str) -> Vec<u8> {
        serde_json::to_vec(&ClientData {
            typ: typ.to_string(),
            challenge: challenge.to_string(),
            origin: origin.to_string(),
            cid_pubkey: Some(serde_json::Value::from("unused")),
        })
        .expect("client data JSON")
    }

    /// Registration response JSON
    #[must_use]
    pub fn register(&self, app_id: &str, challenge: &str, origin: &str) -> String {
        self.register_with_type(app_id, challenge, origin, TYPE_REGISTER)
    }

    /// Registration response JSON with an arbitrary client data type
    #[must_use]
    pub fn register_with_type(&self, app_id: &str, challenge: &str, origin: &str, typ: &str) -> String {
        self.build_registration(app_id, challenge, origin, typ, false)
    }

    /// Registration response JSON whose signature covers different bytes
    #[must_use]
    pub fn register_tampered(&self, app_id: &str, challenge: &str, origin: &str) -> String {
        self.build_registration(app_id, challenge, origin, TYPE_REGISTER, true)
    }

    fn build_registration(
        &self,
        app_id: &str,
        challenge: &str,
        origin: &str,
        typ: &str,
        tamper: bool,
    ) -> String {
        let client_data = Self::client_data(typ, challenge, origin);
        let public_key = self.public_key();

        let mut signed =
            codec::registration_signed_bytes(app_id, &client_data, &self.key_handle, &public_key);
        if tamper {
            signed[0] ^= 0x01;
        }

        let message = RegistrationMessage {
            public_key,
            key_handle: self.key_handle(),
            certificate: self.attestation_der(),
            signature: self.attestation_key.sign(&signed),
        };

        serde_json::to_string(&RegisterResponse {
            registration_data: codec::websafe_encode(&message.to_bytes().expect("key handle fits")),
            client_data: codec::websafe_encode(&client_data),
            version: Some(U2F_VERSION.to_string()),
        })
        .expect("registration JSON")
    }

    /// Authentication response JSON
    #[must_use]
    pub fn sign(
        &self,
        app_id: &str,
        challenge: &str,
        origin: &str,
        counter: u32,
        user_presence: bool,
    ) -> String {
        let flags = if user_presence { USER_PRESENCE_FLAG } else { 0 };
        self.build_assertion(app_id, challenge, origin, counter, flags, TYPE_AUTHENTICATE)
    }

    /// Authentication response JSON with an arbitrary client data type
    #[must_use]
    pub fn sign_with_type(
        &self,
        app_id: &str,
        challenge: &str,
        origin: &str,
        counter: u32,
        typ: &str,
    ) -> String {
        self.build_assertion(app_id, challenge, origin, counter, USER_PRESENCE_FLAG, typ)
    }

    fn build_assertion(
        &self,
        app_id: &str,
        challenge: &str,
        origin: &str,
        counter: u32,
        flags: u8,
        typ: &str,
    ) -> String {
        let client_data = Self::client_data(typ, challenge, origin);
        let signed = codec::authentication_signed_bytes(app_id, flags, counter, &client_data);

        let message = AuthenticationMessage {
            flags,
            counter,
            signature: sign_with_device_key(&self.device_key, &signed),
        };

        serde_json::to_string(&SignResponse {
            key_handle: codec::websafe_encode(&self.key_handle),
            signature_data: codec::websafe_encode(&message.to_bytes()),
            client_data: codec::websafe_encode(&client_data),
        })
        .expect("sign response JSON")
    }
}
