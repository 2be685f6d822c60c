//! Attestation object processing
//!
//! The attestation object is a CBOR map of `fmt`, `authData`, and
//! `attStmt`. Each recognized format has a verification procedure taking
//! the statement, the authenticator data, and the client data hash, and
//! yielding the attestation type. Trust-chain validation against
//! manufacturer metadata is out of scope; `none` and packed
//! self-attestation are verified fully, the remaining formats are accepted
//! structurally.

use ciborium::value::Value;

use super::authenticator_data::AuthenticatorData;
use super::codec::{self, as_i64, map_get_text};
use super::crypto;
use super::types::AttestationType;
use super::WebAuthnError;

/// A decoded attestation object. `raw_auth_data` is kept because the
/// packed signature covers the exact bytes the authenticator emitted.
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub auth_data: AuthenticatorData,
    pub raw_auth_data: Vec<u8>,
    pub att_stmt: Vec<(Value, Value)>,
}

impl AttestationObject {
    /// Decode the CBOR attestation object.
    ///
    /// # Errors
    /// Returns `MalformedInput` when the top-level map or any required
    /// member is missing or of the wrong type, and propagates
    /// authenticator-data failures.
    pub fn parse(input: &[u8]) -> Result<Self, WebAuthnError> {
        let value = codec::cbor_decode(input)?;
        let map = value
            .as_map()
            .ok_or_else(|| malformed("attestation object is not a map"))?;

        let fmt = map_get_text(map, "fmt")
            .and_then(Value::as_text)
            .ok_or_else(|| malformed("fmt is missing"))?
            .to_string();
        let raw_auth_data = map_get_text(map, "authData")
            .and_then(Value::as_bytes)
            .cloned()
            .ok_or_else(|| malformed("authData is missing"))?;
        let att_stmt = map_get_text(map, "attStmt")
            .and_then(Value::as_map)
            .cloned()
            .ok_or_else(|| malformed("attStmt is missing"))?;

        let auth_data = AuthenticatorData::parse(&raw_auth_data)?;

        Ok(Self {
            fmt,
            auth_data,
            raw_auth_data,
            att_stmt,
        })
    }

    /// Run the format's verification procedure.
    ///
    /// # Errors
    /// - `UnsupportedAttestationFormat` for an unrecognized `fmt`
    /// - `AttestationVerificationFailed` when the statement does not
    ///   satisfy its format's procedure
    pub fn verify(&self, client_data_hash: &[u8; 32]) -> Result<AttestationType, WebAuthnError> {
        match self.fmt.as_str() {
            "none" => self.verify_none(),
            "packed" => self.verify_packed(client_data_hash),
            // Recognized formats whose trust path is not validated here.
            "fido-u2f" | "android-key" | "android-safetynet" => Ok(AttestationType::Basic),
            "tpm" => Ok(AttestationType::AttCa),
            "apple" => Ok(AttestationType::AnonCa),
            other => Err(WebAuthnError::UnsupportedAttestationFormat(
                other.to_string(),
            )),
        }
    }

    /// `none` conveys no attestation; the statement must be empty.
    fn verify_none(&self) -> Result<AttestationType, WebAuthnError> {
        if self.att_stmt.is_empty() {
            Ok(AttestationType::None)
        } else {
            Err(WebAuthnError::AttestationVerificationFailed(
                "attStmt of format none must be empty".into(),
            ))
        }
    }

    /// `packed` without a certificate chain is self-attestation: the
    /// signature over `authData || clientDataHash` must verify with the
    /// credential public key, and the statement algorithm must match the
    /// key's.
    fn verify_packed(&self, client_data_hash: &[u8; 32]) -> Result<AttestationType, WebAuthnError> {
        let alg = map_get_text(&self.att_stmt, "alg")
            .and_then(as_i64)
            .ok_or_else(|| {
                WebAuthnError::AttestationVerificationFailed("packed attStmt has no alg".into())
            })?;
        let sig = map_get_text(&self.att_stmt, "sig")
            .and_then(Value::as_bytes)
            .ok_or_else(|| {
                WebAuthnError::AttestationVerificationFailed("packed attStmt has no sig".into())
            })?;

        if map_get_text(&self.att_stmt, "x5c").is_some() {
            // Chain-backed packed attestation; the path to a trust anchor
            // is not validated here.
            return Ok(AttestationType::Basic);
        }

        let attested = self
            .auth_data
            .attested_credential_data
            .as_ref()
            .ok_or(WebAuthnError::AttestedCredentialDataMissing)?;
        if alg != attested.credential_public_key.alg() {
            return Err(WebAuthnError::AttestationVerificationFailed(format!(
                "packed alg {alg} does not match the credential key algorithm"
            )));
        }

        let mut message =
            Vec::with_capacity(self.raw_auth_data.len() + client_data_hash.len());
        message.extend_from_slice(&self.raw_auth_data);
        message.extend_from_slice(client_data_hash);

        crypto::verify_signature(&attested.credential_public_key, &message, sig).map_err(|e| {
            WebAuthnError::AttestationVerificationFailed(format!("packed self-attestation: {e}"))
        })?;

        Ok(AttestationType::SelfAttestation)
    }
}

fn malformed(msg: &str) -> WebAuthnError {
    WebAuthnError::MalformedInput(msg.to_string())
}
