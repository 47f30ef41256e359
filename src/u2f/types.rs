//! U2F data types
//!
//! Serializable structures exchanged with the client (challenges and
//! responses) and the records the caller keeps for enrolled devices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::codec;
use super::errors::U2fError;

/// Protocol version string used in every request and registered key
pub const U2F_VERSION: &str = "U2F_V2";

/// Client data `typ` for registration
pub const TYPE_REGISTER: &str = "navigator.id.finishEnrollment";

/// Client data `typ` for authentication
pub const TYPE_AUTHENTICATE: &str = "navigator.id.getAssertion";

/// A challenge waiting for its matching complete operation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PendingChallenge {
    pub challenge: String, // Base64URL-encoded 32 random bytes
    pub app_id: String,    // Relying party identity bound into the challenge
    #[serde(default)]
    pub key_handles: Vec<String>, // Challenged key handles (authentication only)
    pub created_at: DateTime<Utc>,
}

/// One entry of `registerRequests` as consumed by `u2f.register`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub version: String,
    pub challenge: String,
    pub app_id: String,
}

/// Descriptor for an already enrolled key
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredKey {
    pub version: String,
    pub key_handle: String, // Base64URL-encoded key handle
    pub app_id: String,
}

/// Registration payload sent to the client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationChallenge {
    pub app_id: String,
    pub version: String,
    pub challenge: String,
    pub register_requests: Vec<RegisterRequest>,
    pub registered_keys: Vec<RegisteredKey>,
}

/// Authentication payload sent to the client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationChallenge {
    pub app_id: String,
    pub challenge: String,
    pub registered_keys: Vec<RegisteredKey>,
}

/// Registration response from the client
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub registration_data: String, // Base64URL-encoded raw registration message
    pub client_data: String,       // Base64URL-encoded client data JSON
    #[serde(default)]
    pub version: Option<String>,
}

/// Authentication response from the client
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    pub key_handle: String,     // Base64URL-encoded key handle
    pub signature_data: String, // Base64URL-encoded raw authentication message
    pub client_data: String,    // Base64URL-encoded client data JSON
}

/// Client data produced by the browser and hashed into every signature
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClientData {
    pub typ: String,
    pub challenge: String,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid_pubkey: Option<serde_json::Value>,
}

/// An enrolled U2F device
///
/// The caller's device registry owns these records. The engine only creates
/// them (registration) and proposes counter updates (authentication).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredDevice {
    pub version: String,
    #[serde(with = "base64url")]
    pub key_handle: Vec<u8>,
    #[serde(with = "base64url")]
    pub public_key: Vec<u8>, // Uncompressed P-256 point (65 bytes)
    pub app_id: String,
    #[serde(with = "base64url")]
    pub certificate: Vec<u8>, // DER attestation certificate, kept for audit
    pub counter: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>, // Set by the first successful authentication
}

impl RegisteredDevice {
    /// Whether the device has completed at least one authentication
    #[must_use]
    pub fn has_authenticated(&self) -> bool {
        self.last_used.is_some() || self.counter != 0
    }

    /// Key handle in transport encoding
    #[must_use]
    pub fn key_handle_b64(&self) -> String {
        codec::websafe_encode(&self.key_handle)
    }

    /// Descriptor for this device under the given app id
    #[must_use]
    pub fn registered_key(&self, app_id: &str) -> RegisteredKey {
        RegisteredKey {
            version: self.version.clone(),
            key_handle: self.key_handle_b64(),
            app_id: app_id.to_string(),
        }
    }
}

/// Error reported by the browser API instead of a response, e.g. `{"errorCode": 4}`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientErrorResponse {
    error_code: u32,
    #[serde(default)]
    error_message: Option<String>,
}

/// Parse a raw client response, surfacing browser-side error codes as malformed input
pub(crate) fn parse_response<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T, U2fError> {
    if let Ok(client_error) = serde_json::from_str::<ClientErrorResponse>(raw) {
        if client_error.error_code != 0 {
            return Err(U2fError::malformed(format!(
                "client reported error code {}{}",
                client_error.error_code,
                client_error
                    .error_message
                    .map(|m| format!(": {m}"))
                    .unwrap_or_default()
            )));
        }
    }
    serde_json::from_str(raw).map_err(|e| U2fError::malformed(format!("invalid response JSON: {e}")))
}

mod base64url {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::u2f::codec;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&codec::websafe_encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        codec::websafe_decode(&encoded).map_err(serde::de::Error::custom)
    }
}
