//! `WebAuthn` protocol types
//!
//! The wire DTOs for both ceremonies plus the persisted credential record.
//! Values are immutable once constructed; the constructors enforce the
//! protocol invariants (challenge length, user-handle length) so no
//! partially-valid value exists. Serde renames pin the exact JSON member
//! names the browser API produces and consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::cose::{alg, CoseKey};
use super::{Bytes, WebAuthnError};

/// Relying party identity: the effective domain and a display name.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RpEntity {
    pub id: String,
    pub name: String,
}

/// User account identity. The `id` is the user handle: opaque, stable,
/// at most 64 bytes, and never displayed.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserEntity {
    pub id: Bytes,
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl UserEntity {
    /// # Errors
    /// Returns `Configuration` when the handle is empty or longer than
    /// 64 bytes.
    pub fn new(id: Bytes, name: &str, display_name: &str) -> Result<Self, WebAuthnError> {
        if id.is_empty() || id.len() > 64 {
            return Err(WebAuthnError::Configuration(format!(
                "user handle must be 1..=64 bytes, got {}",
                id.len()
            )));
        }
        Ok(Self {
            id,
            name: name.to_string(),
            display_name: display_name.to_string(),
        })
    }
}

/// The only credential type Level 3 defines.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublicKeyCredentialType {
    #[serde(rename = "public-key")]
    PublicKey,
}

/// One acceptable credential algorithm, in preference order.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub credential_type: PublicKeyCredentialType,
    pub alg: i64,
}

impl PublicKeyCredentialParameters {
    pub const ES256: Self = Self::of(alg::ES256);
    pub const EDDSA: Self = Self::of(alg::EDDSA);
    pub const RS256: Self = Self::of(alg::RS256);
    pub const RS1: Self = Self::of(alg::RS1);

    const fn of(algorithm: i64) -> Self {
        Self {
            credential_type: PublicKeyCredentialType::PublicKey,
            alg: algorithm,
        }
    }

    /// The default parameter list: ES256, Ed25519, RS256.
    #[must_use]
    pub fn default_params() -> Vec<Self> {
        vec![Self::ES256, Self::EDDSA, Self::RS256]
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyancePreference {
    None,
    Indirect,
    Direct,
    Enterprise,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    Hybrid,
    Internal,
    SmartCard,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AuthenticatorSelectionCriteria {
    #[serde(
        rename = "authenticatorAttachment",
        skip_serializing_if = "Option::is_none"
    )]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    #[serde(rename = "residentKey", skip_serializing_if = "Option::is_none")]
    pub resident_key: Option<ResidentKeyRequirement>,
    #[serde(rename = "requireResidentKey", default)]
    pub require_resident_key: bool,
    #[serde(rename = "userVerification", skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<UserVerificationRequirement>,
}

/// Reference to an existing credential, used in exclude and allow lists.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub credential_type: PublicKeyCredentialType,
    pub id: Bytes,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub transports: Vec<AuthenticatorTransport>,
}

impl PublicKeyCredentialDescriptor {
    #[must_use]
    pub fn new(id: Bytes, transports: Vec<AuthenticatorTransport>) -> Self {
        Self {
            credential_type: PublicKeyCredentialType::PublicKey,
            id,
            transports,
        }
    }
}

/// Options for `navigator.credentials.create`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PublicKeyCredentialCreationOptions {
    pub rp: RpEntity,
    pub user: UserEntity,
    pub challenge: Bytes,
    #[serde(rename = "pubKeyCredParams")]
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(
        rename = "excludeCredentials",
        skip_serializing_if = "Vec::is_empty",
        default
    )]
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
    #[serde(
        rename = "authenticatorSelection",
        skip_serializing_if = "Option::is_none"
    )]
    pub authenticator_selection: Option<AuthenticatorSelectionCriteria>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<AttestationConveyancePreference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl PublicKeyCredentialCreationOptions {
    /// # Errors
    /// Returns `Configuration` when the challenge is shorter than 16 bytes.
    pub fn new(
        rp: RpEntity,
        user: UserEntity,
        challenge: Bytes,
        pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    ) -> Result<Self, WebAuthnError> {
        if challenge.len() < 16 {
            return Err(WebAuthnError::Configuration(format!(
                "challenge must be at least 16 bytes, got {}",
                challenge.len()
            )));
        }
        Ok(Self {
            rp,
            user,
            challenge,
            pub_key_cred_params,
            timeout: None,
            exclude_credentials: Vec::new(),
            authenticator_selection: None,
            attestation: None,
            extensions: None,
        })
    }

    /// The user-verification requirement carried in the options, defaulting
    /// to `preferred` like the browser API.
    #[must_use]
    pub fn user_verification(&self) -> UserVerificationRequirement {
        self.authenticator_selection
            .as_ref()
            .and_then(|s| s.user_verification)
            .unwrap_or(UserVerificationRequirement::Preferred)
    }
}

/// Options for `navigator.credentials.get`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PublicKeyCredentialRequestOptions {
    pub challenge: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(rename = "rpId", skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,
    #[serde(
        rename = "allowCredentials",
        skip_serializing_if = "Vec::is_empty",
        default
    )]
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    #[serde(rename = "userVerification", skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<UserVerificationRequirement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl PublicKeyCredentialRequestOptions {
    /// # Errors
    /// Returns `Configuration` when the challenge is shorter than 16 bytes.
    pub fn new(challenge: Bytes, rp_id: &str) -> Result<Self, WebAuthnError> {
        if challenge.len() < 16 {
            return Err(WebAuthnError::Configuration(format!(
                "challenge must be at least 16 bytes, got {}",
                challenge.len()
            )));
        }
        Ok(Self {
            challenge,
            timeout: None,
            rp_id: Some(rp_id.to_string()),
            allow_credentials: Vec::new(),
            user_verification: None,
            extensions: None,
        })
    }
}

/// The authenticator's response during registration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Bytes,
    #[serde(rename = "attestationObject")]
    pub attestation_object: Bytes,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub transports: Vec<AuthenticatorTransport>,
}

/// The authenticator's response during authentication.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Bytes,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: Bytes,
    pub signature: Bytes,
    #[serde(rename = "userHandle", skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<Bytes>,
}

/// A `PublicKeyCredential` as produced by `navigator.credentials.create`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegistrationCredential {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: Bytes,
    #[serde(rename = "type")]
    pub credential_type: PublicKeyCredentialType,
    pub response: AuthenticatorAttestationResponse,
    #[serde(rename = "clientExtensionResults", default)]
    pub client_extension_results: Option<Value>,
    #[serde(
        rename = "authenticatorAttachment",
        skip_serializing_if = "Option::is_none"
    )]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
}

/// A `PublicKeyCredential` as produced by `navigator.credentials.get`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AssertionCredential {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: Bytes,
    #[serde(rename = "type")]
    pub credential_type: PublicKeyCredentialType,
    pub response: AuthenticatorAssertionResponse,
    #[serde(rename = "clientExtensionResults", default)]
    pub client_extension_results: Option<Value>,
    #[serde(
        rename = "authenticatorAttachment",
        skip_serializing_if = "Option::is_none"
    )]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
}

/// How the attestation statement vouches for the credential.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AttestationType {
    None,
    SelfAttestation,
    Basic,
    AttCa,
    AnonCa,
}

/// The validated output of a registration ceremony, shaped for persistence.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CredentialRecord {
    pub credential_id: Bytes,
    pub credential_type: PublicKeyCredentialType,
    pub public_key: CoseKey,
    pub sign_count: u32,
    pub uv_initialized: bool,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub transports: Vec<AuthenticatorTransport>,
    pub attestation_object: Bytes,
    pub attestation_client_data_json: Bytes,
    pub user_handle: Bytes,
    pub label: String,
    pub created: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// The authenticated principal a successful assertion resolves to.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticatedCredential {
    pub credential_id: Bytes,
    pub user_handle: Bytes,
    pub sign_count: u32,
    pub authenticated_at: DateTime<Utc>,
}
