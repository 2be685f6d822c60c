//! Testing utilities for passgate
//!
//! A deterministic software authenticator that produces real attestation
//! objects and assertions, so ceremony tests exercise the same parsing and
//! signature paths a hardware key would.

pub mod authenticator;

pub use authenticator::SoftAuthenticator;

/// Common test constants
pub mod constants {
    /// RP ID the fixture authenticator data is computed for.
    pub const TEST_RP_ID: &str = "example.localhost";

    /// Origin accepted by the fixture relying party.
    pub const TEST_ORIGIN: &str = "https://example.localhost:8443";

    /// Fixture registration challenge (base64url).
    pub const TEST_CHALLENGE: &str = "IBQnuY1Z0K1HqBoFWCp2xlJl8-oq_aFIXzyT_F0-0GU";
}
