//! Collected client data validation
//!
//! The client data JSON is produced by the browser, not the authenticator,
//! and binds the ceremony to the issued challenge and the calling origin.
//! The ceremony type, the decoded challenge, and the origin all have to
//! match what the relying party issued.

use serde::Deserialize;
use serde_json::Value;

use super::{Bytes, WebAuthnError};

pub const TYPE_CREATE: &str = "webauthn.create";
pub const TYPE_GET: &str = "webauthn.get";

/// The parsed `clientDataJSON` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub client_data_type: String,
    pub challenge: String,
    pub origin: String,
    #[serde(rename = "crossOrigin", default)]
    pub cross_origin: Option<bool>,
    /// Deprecated in Level 3; carried through unvalidated.
    #[serde(rename = "tokenBinding", default)]
    pub token_binding: Option<Value>,
}

impl CollectedClientData {
    /// Parse the raw JSON bytes.
    ///
    /// # Errors
    /// Returns `MalformedInput` when the payload is not a JSON object with
    /// the required `type`, `challenge`, and `origin` members.
    pub fn parse(client_data_json: &[u8]) -> Result<Self, WebAuthnError> {
        serde_json::from_slice(client_data_json)
            .map_err(|e| WebAuthnError::MalformedInput(format!("client data JSON: {e}")))
    }

    /// Check the parsed client data against what the relying party issued.
    ///
    /// # Errors
    /// - `InvalidClientDataType` when `type` is not `expected_type`
    /// - `ChallengeMismatch` when the decoded challenge differs
    /// - `OriginMismatch` when the origin is not allowed
    /// - `CrossOriginDisallowed` when `crossOrigin` is set against policy
    pub fn verify(
        &self,
        expected_type: &'static str,
        expected_challenge: &Bytes,
        allowed_origins: &[String],
        allow_cross_origin: bool,
    ) -> Result<(), WebAuthnError> {
        if self.client_data_type != expected_type {
            return Err(WebAuthnError::InvalidClientDataType {
                expected: expected_type,
                found: self.client_data_type.clone(),
            });
        }

        let challenge = Bytes::from_base64url(&self.challenge)?;
        if &challenge != expected_challenge {
            return Err(WebAuthnError::ChallengeMismatch);
        }

        if !allowed_origins.iter().any(|o| *o == self.origin) {
            return Err(WebAuthnError::OriginMismatch(self.origin.clone()));
        }

        if self.cross_origin == Some(true) && !allow_cross_origin {
            return Err(WebAuthnError::CrossOriginDisallowed);
        }

        Ok(())
    }
}
