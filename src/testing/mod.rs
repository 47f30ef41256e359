//! Testing utilities for u2frs
//!
//! Available to unit tests and, behind the `testing` feature, to the
//! integration tests under `tests/`.
//!
//! ## Organization
//!
//! - [`fixtures`] - Software token, device keys and attestation CAs
//! - [`requests`] - HTTP request builders for exercising the handlers
//!
//! ## Usage
//!
//! ```rust
//! use u2frs::testing::fixtures::SoftToken;
//! use u2frs::u2f::{AttestationVerifier, MemoryChallengeStore, U2fService};
//!
//! let service = U2fService::new(MemoryChallengeStore::new(), AttestationVerifier::permissive());
//! let token = SoftToken::new();
//! let request = service.start_registration("alice", "https://example.com", &[]).unwrap();
//! let response = token.register("https://example.com", &request.challenge, "https://example.com");
//! assert!(service.finish_registration("alice", "https://example.com", &response).is_ok());
//! ```

pub mod fixtures;
pub mod requests;

pub use fixtures::{SoftToken, TestCa};
pub use requests::RequestBuilder;

/// Common test constants
pub mod constants {
    /// App id used by most tests
    pub const TEST_APP_ID: &str = "https://example.com";

    /// Default user name, matching the server default
    pub const TEST_USER: &str = "user";

    /// Host header sent by [`super::RequestBuilder`]
    pub const TEST_HOST: &str = "example.com";

    /// Origin the server derives for a plain-HTTP request to [`TEST_HOST`]
    pub const TEST_HTTP_ORIGIN: &str = "http://example.com";
}
