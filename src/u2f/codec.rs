//! U2F raw message codec
//!
//! Decodes and encodes the binary registration and authentication messages
//! defined by the FIDO U2F raw message formats, the base64url transport
//! encoding and the client data JSON.
//!
//! Every decoder is total: arbitrary input yields either a value or
//! `U2fError::MalformedMessage`, never a panic.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use super::errors::U2fError;
use super::types::ClientData;

/// Reserved first byte of a registration response
pub const REGISTRATION_RESERVED_BYTE: u8 = 0x05;

/// Length of an uncompressed P-256 point
pub const PUBLIC_KEY_LEN: usize = 65;

/// Smallest possible DER-encoded ECDSA signature (`30 06 02 01 r 02 01 s`)
pub const MIN_SIGNATURE_LEN: usize = 8;

/// Bit in the authentication flags byte signalling user presence
pub const USER_PRESENCE_FLAG: u8 = 0x01;

/// Decoded registration response message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationMessage {
    pub public_key: Vec<u8>,
    pub key_handle: Vec<u8>,
    pub certificate: Vec<u8>,
    pub signature: Vec<u8>,
}

impl RegistrationMessage {
    /// Encode to the raw wire layout
    ///
    /// # Errors
    /// Returns `MalformedMessage` if the key handle does not fit its one-byte length prefix
    pub fn to_bytes(&self) -> Result<Vec<u8>, U2fError> {
        let key_handle_len = u8::try_from(self.key_handle.len())
            .map_err(|_| U2fError::malformed("key handle longer than 255 bytes"))?;

        let mut out = Vec::with_capacity(
            2 + self.public_key.len()
                + self.key_handle.len()
                + self.certificate.len()
                + self.signature.len(),
        );
        out.push(REGISTRATION_RESERVED_BYTE);
        out.extend_from_slice(&self.public_key);
        out.push(key_handle_len);
        out.extend_from_slice(&self.key_handle);
        out.extend_from_slice(&self.certificate);
        out.extend_from_slice(&self.signature);
        Ok(out)
    }
}

/// Decoded authentication response message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationMessage {
    pub flags: u8,
    pub counter: u32,
    pub signature: Vec<u8>,
}

impl AuthenticationMessage {
    /// Whether the token reported that the user touched it
    #[must_use]
    pub fn user_present(&self) -> bool {
        self.flags & USER_PRESENCE_FLAG != 0
    }

    /// Encode to the raw wire layout
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.signature.len());
        out.push(self.flags);
        out.extend_from_slice(&self.counter.to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }
}

/// Base64url-encode without padding
#[must_use]
pub fn websafe_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Base64url-decode, accepting input with or without `=` padding
///
/// # Errors
/// Returns `MalformedMessage` for characters outside the URL-safe alphabet
pub fn websafe_decode(data: &str) -> Result<Vec<u8>, U2fError> {
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .map_err(|e| U2fError::malformed(format!("invalid base64url: {e}")))
}

/// SHA-256 digest
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Parse a raw registration response
///
/// Layout: `0x05 | public key (65) | L (1) | key handle (L) | certificate (DER) | signature`
///
/// # Errors
/// Returns `MalformedMessage` if the reserved byte is wrong, a length is
/// inconsistent, or too few bytes remain for a signature.
pub fn decode_registration_response(data: &[u8]) -> Result<RegistrationMessage, U2fError> {
    let (&reserved, rest) = data
        .split_first()
        .ok_or_else(|| U2fError::malformed("empty registration data"))?;
    if reserved != REGISTRATION_RESERVED_BYTE {
        return Err(U2fError::malformed(format!(
            "reserved byte is {reserved:#04x}, expected 0x05"
        )));
    }

    if rest.len() < PUBLIC_KEY_LEN {
        return Err(U2fError::malformed("registration data too short for public key"));
    }
    let (public_key, rest) = rest.split_at(PUBLIC_KEY_LEN);
    if public_key[0] != 0x04 {
        return Err(U2fError::malformed("public key is not an uncompressed point"));
    }

    let (&key_handle_len, rest) = rest
        .split_first()
        .ok_or_else(|| U2fError::malformed("registration data too short for key handle length"))?;
    let key_handle_len = usize::from(key_handle_len);
    if key_handle_len == 0 || rest.len() < key_handle_len {
        return Err(U2fError::malformed("key handle length inconsistent with data"));
    }
    let (key_handle, rest) = rest.split_at(key_handle_len);

    let certificate_len = der_element_len(rest)?;
    let (certificate, signature) = rest.split_at(certificate_len);

    if signature.len() < MIN_SIGNATURE_LEN {
        return Err(U2fError::malformed("registration data too short for signature"));
    }

    Ok(RegistrationMessage {
        public_key: public_key.to_vec(),
        key_handle: key_handle.to_vec(),
        certificate: certificate.to_vec(),
        signature: signature.to_vec(),
    })
}

/// Parse a raw authentication response
///
/// Layout: `flags (1) | counter (4, big-endian) | signature`
///
/// # Errors
/// Returns `MalformedMessage` if the data is too short
pub fn decode_authentication_response(data: &[u8]) -> Result<AuthenticationMessage, U2fError> {
    if data.len() < 5 + MIN_SIGNATURE_LEN {
        return Err(U2fError::malformed("signature data too short"));
    }
    let (header, signature) = data.split_at(5);
    let counter = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);

    Ok(AuthenticationMessage {
        flags: header[0],
        counter,
        signature: signature.to_vec(),
    })
}

/// Decode the base64url client data, returning both the raw bytes (which are
/// hashed into the signature) and the parsed structure.
///
/// # Errors
/// Returns `MalformedMessage` if base64url or JSON decoding fails
pub fn decode_client_data(encoded: &str) -> Result<(Vec<u8>, ClientData), U2fError> {
    let raw = websafe_decode(encoded)?;
    let client_data = serde_json::from_slice(&raw)
        .map_err(|e| U2fError::malformed(format!("invalid client data JSON: {e}")))?;
    Ok((raw, client_data))
}

/// Bytes signed by the attestation key during registration:
/// `0x00 | SHA-256(app id) | SHA-256(client data) | key handle | public key`
#[must_use]
pub fn registration_signed_bytes(
    app_id: &str,
    client_data: &[u8],
    key_handle: &[u8],
    public_key: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 32 + 32 + key_handle.len() + public_key.len());
    out.push(0x00);
    out.extend_from_slice(&sha256(app_id.as_bytes()));
    out.extend_from_slice(&sha256(client_data));
    out.extend_from_slice(key_handle);
    out.extend_from_slice(public_key);
    out
}

/// Bytes signed by the device key during authentication:
/// `SHA-256(app id) | flags | counter (big-endian) | SHA-256(client data)`
#[must_use]
pub fn authentication_signed_bytes(
    app_id: &str,
    flags: u8,
    counter: u32,
    client_data: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + 1 + 4 + 32);
    out.extend_from_slice(&sha256(app_id.as_bytes()));
    out.push(flags);
    out.extend_from_slice(&counter.to_be_bytes());
    out.extend_from_slice(&sha256(client_data));
    out
}

/// Total encoded length (header + content) of the DER element at the start of `data`
fn der_element_len(data: &[u8]) -> Result<usize, U2fError> {
    match data.first() {
        Some(0x30) => {}
        Some(tag) => {
            return Err(U2fError::malformed(format!(
                "certificate does not start with a SEQUENCE (tag {tag:#04x})"
            )))
        }
        None => return Err(U2fError::malformed("registration data too short for certificate")),
    }

    let first = *data
        .get(1)
        .ok_or_else(|| U2fError::malformed("certificate length missing"))?;

    let (header_len, content_len) = if first < 0x80 {
        (2, usize::from(first))
    } else {
        let num_bytes = usize::from(first & 0x7f);
        // 0x80 is the indefinite form, which DER forbids
        if num_bytes == 0 || num_bytes > 4 {
            return Err(U2fError::malformed("unsupported certificate length encoding"));
        }
        let len_bytes = data
            .get(2..2 + num_bytes)
            .ok_or_else(|| U2fError::malformed("certificate length truncated"))?;
        let content_len = len_bytes
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
        (2 + num_bytes, content_len)
    };

    let total = header_len
        .checked_add(content_len)
        .ok_or_else(|| U2fError::malformed("certificate length overflow"))?;
    if total > data.len() {
        return Err(U2fError::malformed("certificate length exceeds registration data"));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_certificate() -> Vec<u8> {
        // SEQUENCE with 200 content bytes, long-form length
        let mut cert = vec![0x30, 0x81, 200];
        cert.extend(std::iter::repeat(0xAA).take(200));
        cert
    }

    fn sample_message() -> RegistrationMessage {
        let mut public_key = vec![0x04];
        public_key.extend(1..=64u8);
        RegistrationMessage {
            public_key,
            key_handle: (0..64u8).collect(),
            certificate: sample_certificate(),
            signature: vec![0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01, 0xEE, 0xEE],
        }
    }

    #[test]
    fn test_registration_message_decodes_fields() {
        let message = sample_message();
        let decoded = decode_registration_response(&message.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.certificate.len(), 203);
    }

    #[test]
    fn test_registration_rejects_wrong_reserved_byte() {
        let mut bytes = sample_message().to_bytes().unwrap();
        bytes[0] = 0x04;
        let err = decode_registration_response(&bytes).unwrap_err();
        assert!(matches!(err, U2fError::MalformedMessage(ref m) if m.contains("reserved byte")));
    }

    #[test]
    fn test_registration_rejects_compressed_public_key() {
        let mut bytes = sample_message().to_bytes().unwrap();
        bytes[1] = 0x02;
        assert!(decode_registration_response(&bytes).is_err());
    }

    #[test]
    fn test_registration_every_truncation_is_an_error() {
        let bytes = sample_message().to_bytes().unwrap();
        // Cutting anywhere up to the minimal signature must fail cleanly
        let minimum = bytes.len() - 10 + MIN_SIGNATURE_LEN;
        for len in 0..minimum {
            assert!(
                decode_registration_response(&bytes[..len]).is_err(),
                "truncation to {len} bytes was accepted"
            );
        }
        assert!(decode_registration_response(&bytes[..minimum]).is_ok());
    }

    #[test]
    fn test_registration_rejects_oversized_certificate_length() {
        let mut message = sample_message();
        message.certificate = vec![0x30, 0x84, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];
        let err = decode_registration_response(&message.to_bytes().unwrap()).unwrap_err();
        assert!(matches!(err, U2fError::MalformedMessage(_)));
    }

    #[test]
    fn test_registration_rejects_indefinite_certificate_length() {
        let mut message = sample_message();
        message.certificate = vec![0x30, 0x80, 0x00, 0x00];
        assert!(decode_registration_response(&message.to_bytes().unwrap()).is_err());
    }

    #[test]
    fn test_registration_rejects_zero_length_key_handle() {
        let mut message = sample_message();
        message.key_handle.clear();
        assert!(decode_registration_response(&message.to_bytes().unwrap()).is_err());
    }

    #[test]
    fn test_registration_survives_arbitrary_bytes() {
        // Deterministic pseudo-random fuzzing with a registration prefix
        let mut state: u32 = 0x1234_5678;
        for round in 0..500 {
            let mut bytes = vec![REGISTRATION_RESERVED_BYTE, 0x04];
            for _ in 0..(round % 300) {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                bytes.push(state.to_le_bytes()[0]);
            }
            let _ = decode_registration_response(&bytes);
            let _ = decode_authentication_response(&bytes);
        }
    }

    #[test]
    fn test_authentication_message_decodes_fields() {
        let message = AuthenticationMessage {
            flags: 0x01,
            counter: 0x0102_0304,
            signature: vec![0x30; 70],
        };
        let bytes = message.to_bytes();
        assert_eq!(&bytes[..5], &[0x01, 0x01, 0x02, 0x03, 0x04]);

        let decoded = decode_authentication_response(&bytes).unwrap();
        assert_eq!(decoded, message);
        assert!(decoded.user_present());
    }

    #[test]
    fn test_authentication_rejects_short_data() {
        assert!(decode_authentication_response(&[0x01, 0, 0, 0, 1]).is_err());
        assert!(decode_authentication_response(&[]).is_err());
    }

    #[test]
    fn test_user_presence_flag() {
        let message = AuthenticationMessage {
            flags: 0x00,
            counter: 1,
            signature: vec![0; 8],
        };
        assert!(!message.user_present());
    }

    #[test]
    fn test_websafe_decode_accepts_padding() {
        assert_eq!(websafe_decode("YQ==").unwrap(), b"a");
        assert_eq!(websafe_decode("YQ").unwrap(), b"a");
        assert!(websafe_decode("Y+Q/").is_err());
    }

    #[test]
    fn test_decode_client_data() {
        let json = br#"{"typ":"navigator.id.finishEnrollment","challenge":"abc","origin":"https://example.com"}"#;
        let (raw, parsed) = decode_client_data(&websafe_encode(json)).unwrap();
        assert_eq!(raw, json.to_vec());
        assert_eq!(parsed.typ, "navigator.id.finishEnrollment");
        assert_eq!(parsed.origin, "https://example.com");
        assert!(parsed.cid_pubkey.is_none());
    }

    #[test]
    fn test_decode_client_data_errors() {
        assert!(matches!(
            decode_client_data("!!!"),
            Err(U2fError::MalformedMessage(_))
        ));
        assert!(matches!(
            decode_client_data(&websafe_encode(b"{not json")),
            Err(U2fError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_registration_signed_bytes_layout() {
        let public_key = [0x04; 65];
        let signed = registration_signed_bytes("https://example.com", b"cd", &[9, 9, 9], &public_key);

        assert_eq!(signed.len(), 1 + 32 + 32 + 3 + 65);
        assert_eq!(signed[0], 0x00);
        assert_eq!(&signed[1..33], &sha256(b"https://example.com"));
        assert_eq!(&signed[33..65], &sha256(b"cd"));
        assert_eq!(&signed[65..68], &[9, 9, 9]);
        assert_eq!(&signed[68..], &public_key);
    }

    #[test]
    fn test_authentication_signed_bytes_layout() {
        let signed = authentication_signed_bytes("https://example.com", 0x01, 258, b"cd");

        assert_eq!(signed.len(), 32 + 1 + 4 + 32);
        assert_eq!(&signed[..32], &sha256(b"https://example.com"));
        assert_eq!(signed[32], 0x01);
        assert_eq!(&signed[33..37], &[0, 0, 1, 2]);
        assert_eq!(&signed[37..], &sha256(b"cd"));
    }
}
