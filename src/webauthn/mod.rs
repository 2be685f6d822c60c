//! `WebAuthn` relying-party operations
//!
//! This module implements the server side of the W3C `WebAuthn` Level 3
//! ceremonies independent of any transport: codecs, the authenticator-data
//! and attestation parsers, client data validation, signature verification,
//! and the ceremony verifier itself. It uses standard cryptography
//! libraries and never imports anything request/response-shaped.

pub mod attestation;
pub mod authenticator_data;
mod bytes;
pub mod client_data;
pub mod codec;
pub mod cose;
pub mod crypto;
mod error;
mod relying_party;
pub mod types;

// Re-exports for public use
pub use bytes::Bytes;
pub use error::WebAuthnError;
pub use relying_party::{AuthenticationRequest, RegistrationRequest, RelyingPartyOperations};
