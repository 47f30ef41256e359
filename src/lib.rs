#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the u2frs application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod handlers;
pub mod settings;
pub mod u2f;
pub mod utils;

// Software token and fixtures for unit and integration tests
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use handlers::{bind, configure_services, enroll, health, sign, verify, U2fState};
pub use settings::ServerSettings;
pub use u2f::{U2fError, U2fService};
