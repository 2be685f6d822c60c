//! Verification failure taxonomy
//!
//! Every way a ceremony can fail is one variant of a single flat enum. No
//! variant is recovered inside the verifier; each one short-circuits and is
//! surfaced to the caller. The HTTP layer maps all of them to a generic
//! failure response and records the kind in the server log only.

use std::fmt;

/// Failure kinds produced by the relying-party operations engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebAuthnError {
    /// Input bytes that are not valid base64url, CBOR, JSON, or COSE.
    MalformedInput(String),

    /// Authenticator data that does not match the fixed+variable layout.
    MalformedAuthenticatorData(String),

    /// An attestation statement format this engine does not recognize.
    UnsupportedAttestationFormat(String),

    /// Client data `type` is not the expected ceremony type.
    InvalidClientDataType { expected: &'static str, found: String },

    /// Client data challenge does not decode to the challenge that was issued.
    ChallengeMismatch,

    /// Client data origin is not among the configured origins.
    OriginMismatch(String),

    /// Client data reports a cross-origin call the relying party disallows.
    CrossOriginDisallowed,

    /// `rpIdHash` in the authenticator data is not SHA-256 of the RP ID.
    RpIdHashMismatch,

    /// The user-presence flag is not set.
    UserPresenceMissing,

    /// User verification was required but the UV flag is not set.
    UserVerificationRequired,

    /// Backup-state set without backup-eligibility.
    InvalidFlagCombination,

    /// Registration authenticator data without attested credential data.
    AttestedCredentialDataMissing,

    /// The credential key algorithm was not in the requested parameter list.
    UnrequestedAlgorithm(i64),

    /// The credential ID is already registered.
    CredentialAlreadyRegistered,

    /// No credential record exists for the presented ID.
    UnknownCredential,

    /// The presented credential is not in the allow list.
    CredentialNotAllowed,

    /// The asserted user handle does not match the credential record.
    UserHandleMismatch,

    /// Signature verification failed, or the signature bytes are malformed.
    BadSignature,

    /// The reported signature counter did not advance.
    SignCountRegression { stored: u32, reported: u32 },

    /// A COSE algorithm identifier this engine does not verify.
    UnsupportedAlgorithm(i64),

    /// The attestation statement failed its format's verification procedure.
    AttestationVerificationFailed(String),

    /// Invalid relying-party configuration. Surfaced at startup, never
    /// during a ceremony.
    Configuration(String),
}

impl WebAuthnError {
    /// Stable kind label for structured server logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::MalformedAuthenticatorData(_) => "malformed_authenticator_data",
            Self::UnsupportedAttestationFormat(_) => "unsupported_attestation_format",
            Self::InvalidClientDataType { .. } => "invalid_client_data_type",
            Self::ChallengeMismatch => "challenge_mismatch",
            Self::OriginMismatch(_) => "origin_mismatch",
            Self::CrossOriginDisallowed => "cross_origin_disallowed",
            Self::RpIdHashMismatch => "rp_id_hash_mismatch",
            Self::UserPresenceMissing => "user_presence_missing",
            Self::UserVerificationRequired => "user_verification_required",
            Self::InvalidFlagCombination => "invalid_flag_combination",
            Self::AttestedCredentialDataMissing => "attested_credential_data_missing",
            Self::UnrequestedAlgorithm(_) => "unrequested_algorithm",
            Self::CredentialAlreadyRegistered => "credential_already_registered",
            Self::UnknownCredential => "unknown_credential",
            Self::CredentialNotAllowed => "credential_not_allowed",
            Self::UserHandleMismatch => "user_handle_mismatch",
            Self::BadSignature => "bad_signature",
            Self::SignCountRegression { .. } => "sign_count_regression",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::AttestationVerificationFailed(_) => "attestation_verification_failed",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl fmt::Display for WebAuthnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedInput(msg) => write!(f, "malformed input: {msg}"),
            Self::MalformedAuthenticatorData(msg) => {
                write!(f, "malformed authenticator data: {msg}")
            }
            Self::UnsupportedAttestationFormat(fmt_id) => {
                write!(f, "unsupported attestation format: {fmt_id}")
            }
            Self::InvalidClientDataType { expected, found } => {
                write!(f, "client data type is {found}, expected {expected}")
            }
            Self::ChallengeMismatch => {
                write!(f, "client data challenge does not match the issued challenge")
            }
            Self::OriginMismatch(origin) => write!(f, "origin {origin} is not allowed"),
            Self::CrossOriginDisallowed => write!(f, "cross-origin requests are not allowed"),
            Self::RpIdHashMismatch => {
                write!(f, "rpIdHash does not match the SHA-256 hash of the RP ID")
            }
            Self::UserPresenceMissing => write!(f, "user presence flag is not set"),
            Self::UserVerificationRequired => {
                write!(f, "user verification is required but the UV flag is not set")
            }
            Self::InvalidFlagCombination => {
                write!(f, "flag combination is invalid: backup state without eligibility")
            }
            Self::AttestedCredentialDataMissing => {
                write!(f, "attested credential data is missing")
            }
            Self::UnrequestedAlgorithm(alg) => {
                write!(f, "unrequested credential key algorithm {alg}")
            }
            Self::CredentialAlreadyRegistered => {
                write!(f, "credential ID is already registered")
            }
            Self::UnknownCredential => write!(f, "no credential registered under this ID"),
            Self::CredentialNotAllowed => {
                write!(f, "credential is not in the allowed credential list")
            }
            Self::UserHandleMismatch => {
                write!(f, "asserted user handle does not match the credential record")
            }
            Self::BadSignature => write!(f, "signature verification failed"),
            Self::SignCountRegression { stored, reported } => write!(
                f,
                "signature counter regressed: stored {stored}, reported {reported}"
            ),
            Self::UnsupportedAlgorithm(alg) => write!(f, "unsupported algorithm {alg}"),
            Self::AttestationVerificationFailed(msg) => {
                write!(f, "attestation verification failed: {msg}")
            }
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for WebAuthnError {}
