//! Relying party operations
//!
//! The ceremony verifier: issues creation and request options with fresh
//! challenges, then checks client responses step by step against the W3C
//! registration and authentication algorithms. Every check either passes
//! or short-circuits with one failure kind; nothing is recovered here.
//!
//! Registration follows
//! <https://www.w3.org/TR/webauthn-3/#sctn-registering-a-new-credential>,
//! authentication follows
//! <https://www.w3.org/TR/webauthn-3/#sctn-verifying-assertion>.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::storage::{CredentialStore, UserEntityStore};

use super::attestation::AttestationObject;
use super::authenticator_data::AuthenticatorData;
use super::client_data::{CollectedClientData, TYPE_CREATE, TYPE_GET};
use super::crypto::{self, Clock, EntropySource, SystemClock, SystemEntropy};
use super::types::{
    AssertionCredential, AttestationConveyancePreference, AuthenticatedCredential,
    AuthenticatorSelectionCriteria, CredentialRecord, PublicKeyCredentialCreationOptions,
    PublicKeyCredentialDescriptor, PublicKeyCredentialParameters,
    PublicKeyCredentialRequestOptions, PublicKeyCredentialType, RegistrationCredential, RpEntity,
    UserEntity, UserVerificationRequirement,
};
use super::{Bytes, WebAuthnError};

const CHALLENGE_LEN: usize = 32;
const USER_HANDLE_LEN: usize = 32;

/// A registration response paired with the options that prompted it.
#[derive(Clone, Debug)]
pub struct RegistrationRequest {
    pub options: PublicKeyCredentialCreationOptions,
    pub credential: RegistrationCredential,
    pub label: String,
}

/// An assertion paired with the options that prompted it.
#[derive(Clone, Debug)]
pub struct AuthenticationRequest {
    pub options: PublicKeyCredentialRequestOptions,
    pub credential: AssertionCredential,
}

/// The relying-party operations engine.
///
/// Holds the RP identity, origin policy, and the store collaborators.
/// Verification itself is purely computational: it reads its inputs, does
/// store lookups, and never suspends.
pub struct RelyingPartyOperations {
    rp: RpEntity,
    allowed_origins: Vec<String>,
    allow_cross_origin: bool,
    reject_unsolicited_extensions: bool,
    user_verification: UserVerificationRequirement,
    attestation: AttestationConveyancePreference,
    timeout_ms: u32,
    users: Arc<dyn UserEntityStore>,
    credentials: Arc<dyn CredentialStore>,
    entropy: Box<dyn EntropySource>,
    clock: Box<dyn Clock>,
}

impl RelyingPartyOperations {
    /// Create an engine with the system entropy source and clock.
    ///
    /// # Errors
    /// Returns `Configuration` for an empty RP ID, an empty origin list, or
    /// a failing entropy probe. All of these refuse startup; none can occur
    /// during a ceremony.
    pub fn new(
        rp: RpEntity,
        allowed_origins: Vec<String>,
        users: Arc<dyn UserEntityStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, WebAuthnError> {
        Self::with_collaborators(
            rp,
            allowed_origins,
            users,
            credentials,
            Box::new(SystemEntropy::new()),
            Box::new(SystemClock),
        )
    }

    /// Create an engine with explicit entropy and clock collaborators.
    ///
    /// # Errors
    /// Same conditions as [`Self::new`].
    pub fn with_collaborators(
        rp: RpEntity,
        allowed_origins: Vec<String>,
        users: Arc<dyn UserEntityStore>,
        credentials: Arc<dyn CredentialStore>,
        entropy: Box<dyn EntropySource>,
        clock: Box<dyn Clock>,
    ) -> Result<Self, WebAuthnError> {
        if rp.id.is_empty() {
            return Err(WebAuthnError::Configuration("RP ID is empty".into()));
        }
        if allowed_origins.is_empty() {
            return Err(WebAuthnError::Configuration(
                "no allowed origins configured".into(),
            ));
        }
        // Entropy probe: an unseeded CSPRNG must refuse startup, not fail
        // mid-ceremony.
        entropy.fill(&mut [0u8; 16])?;

        Ok(Self {
            rp,
            allowed_origins,
            allow_cross_origin: false,
            reject_unsolicited_extensions: false,
            user_verification: UserVerificationRequirement::Preferred,
            attestation: AttestationConveyancePreference::None,
            timeout_ms: 300_000,
            users,
            credentials,
            entropy,
            clock,
        })
    }

    #[must_use]
    pub fn allow_cross_origin(mut self, allow: bool) -> Self {
        self.allow_cross_origin = allow;
        self
    }

    #[must_use]
    pub fn reject_unsolicited_extensions(mut self, reject: bool) -> Self {
        self.reject_unsolicited_extensions = reject;
        self
    }

    #[must_use]
    pub fn user_verification(mut self, requirement: UserVerificationRequirement) -> Self {
        self.user_verification = requirement;
        self
    }

    #[must_use]
    pub fn attestation(mut self, preference: AttestationConveyancePreference) -> Self {
        self.attestation = preference;
        self
    }

    #[must_use]
    pub fn timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn rp(&self) -> &RpEntity {
        &self.rp
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    #[must_use]
    pub fn users(&self) -> &Arc<dyn UserEntityStore> {
        &self.users
    }

    /// Build creation options for a user, resolving or creating the user
    /// entity and excluding the user's existing credentials so the same
    /// authenticator cannot register twice.
    ///
    /// # Errors
    /// Propagates entropy failures.
    pub fn start_registration(
        &self,
        username: &str,
        display_name: &str,
    ) -> Result<PublicKeyCredentialCreationOptions, WebAuthnError> {
        let user = match self.users.find_by_username(username) {
            Some(user) => user,
            None => {
                let handle = self.entropy.generate(USER_HANDLE_LEN)?;
                let user = UserEntity::new(handle, username, display_name)?;
                self.users.save(username, user.clone());
                user
            }
        };

        let exclude_credentials = self
            .credentials
            .find_by_user(&user.id)
            .into_iter()
            .map(|r| PublicKeyCredentialDescriptor::new(r.credential_id, r.transports))
            .collect();

        let mut options = PublicKeyCredentialCreationOptions::new(
            self.rp.clone(),
            user,
            self.entropy.generate(CHALLENGE_LEN)?,
            PublicKeyCredentialParameters::default_params(),
        )?;
        options.timeout = Some(self.timeout_ms);
        options.exclude_credentials = exclude_credentials;
        options.attestation = Some(self.attestation);
        options.authenticator_selection = Some(AuthenticatorSelectionCriteria {
            user_verification: Some(self.user_verification),
            ..AuthenticatorSelectionCriteria::default()
        });
        Ok(options)
    }

    /// Build request options, listing the user's credentials when the user
    /// is known and leaving the allow list empty for the discoverable flow.
    ///
    /// # Errors
    /// Propagates entropy failures.
    pub fn start_authentication(
        &self,
        username: Option<&str>,
    ) -> Result<PublicKeyCredentialRequestOptions, WebAuthnError> {
        let mut options = PublicKeyCredentialRequestOptions::new(
            self.entropy.generate(CHALLENGE_LEN)?,
            &self.rp.id,
        )?;
        options.timeout = Some(self.timeout_ms);
        options.user_verification = Some(self.user_verification);

        if let Some(username) = username {
            if let Some(user) = self.users.find_by_username(username) {
                options.allow_credentials = self
                    .credentials
                    .find_by_user(&user.id)
                    .into_iter()
                    .map(|r| PublicKeyCredentialDescriptor::new(r.credential_id, r.transports))
                    .collect();
            }
        }
        Ok(options)
    }

    /// Verify a registration response and persist the resulting record.
    ///
    /// # Errors
    /// One failure kind per violated check; see the step comments.
    pub fn register_credential(
        &self,
        request: &RegistrationRequest,
    ) -> Result<CredentialRecord, WebAuthnError> {
        let options = &request.options;
        let response = &request.credential.response;

        // Steps 5-6: parse the client data and hash the exact bytes the
        // client produced.
        let client_data = CollectedClientData::parse(response.client_data_json.as_slice())?;
        let client_data_hash = crypto::sha256(response.client_data_json.as_slice());

        // Steps 7-9: type is webauthn.create, challenge matches, origin is
        // allowed, crossOrigin follows policy.
        client_data.verify(
            TYPE_CREATE,
            &options.challenge,
            &self.allowed_origins,
            self.allow_cross_origin,
        )?;

        // Steps 11-12: decode the attestation object.
        let attestation = AttestationObject::parse(response.attestation_object.as_slice())?;
        let auth_data = &attestation.auth_data;

        // Step 13: rpIdHash binds the credential to this RP.
        if auth_data.rp_id_hash != crypto::sha256(self.rp.id.as_bytes()) {
            return Err(WebAuthnError::RpIdHashMismatch);
        }

        // Step 14: user presence.
        if !auth_data.user_present() {
            return Err(WebAuthnError::UserPresenceMissing);
        }

        // Step 15: user verification when the options required it.
        if options.user_verification() == UserVerificationRequirement::Required
            && !auth_data.user_verified()
        {
            return Err(WebAuthnError::UserVerificationRequired);
        }

        // Step 16: a credential that is not backup-eligible cannot be in
        // the backed-up state.
        if auth_data.backed_up() && !auth_data.backup_eligible() {
            return Err(WebAuthnError::InvalidFlagCombination);
        }

        // Registration requires attested credential data.
        let attested = auth_data
            .attested_credential_data
            .as_ref()
            .ok_or(WebAuthnError::AttestedCredentialDataMissing)?;

        // Step 19: the credential key algorithm must have been requested.
        let alg = attested.credential_public_key.alg();
        if !options.pub_key_cred_params.iter().any(|p| p.alg == alg) {
            return Err(WebAuthnError::UnrequestedAlgorithm(alg));
        }

        // Step 20: client extension outputs against the requested inputs.
        self.check_extension_outputs(
            options.extensions.as_ref(),
            request.credential.client_extension_results.as_ref(),
        )?;

        // Steps 21-22: the format's attestation verification procedure.
        let attestation_type = attestation.verify(&client_data_hash)?;
        log::debug!(
            "attestation format {} verified as {attestation_type:?}",
            attestation.fmt
        );

        // The credential ID must not be registered to any user yet.
        if self.credentials.find_by_id(&attested.credential_id).is_some() {
            return Err(WebAuthnError::CredentialAlreadyRegistered);
        }

        let now = self.clock.now();
        let record = CredentialRecord {
            credential_id: attested.credential_id.clone(),
            credential_type: PublicKeyCredentialType::PublicKey,
            public_key: attested.credential_public_key.clone(),
            sign_count: auth_data.sign_count,
            uv_initialized: auth_data.user_verified(),
            backup_eligible: auth_data.backup_eligible(),
            backup_state: auth_data.backed_up(),
            transports: response.transports.clone(),
            attestation_object: response.attestation_object.clone(),
            attestation_client_data_json: response.client_data_json.clone(),
            user_handle: options.user.id.clone(),
            label: request.label.clone(),
            created: now,
            last_used: now,
        };

        // The store's unique index backs this up under races.
        self.credentials.save(record.clone())?;
        Ok(record)
    }

    /// Verify an assertion, enforce the counter rule, and update the
    /// record's usage fields.
    ///
    /// # Errors
    /// One failure kind per violated check; see the step comments.
    pub fn authenticate(
        &self,
        request: &AuthenticationRequest,
    ) -> Result<AuthenticatedCredential, WebAuthnError> {
        let options = &request.options;
        let credential = &request.credential;
        let response = &credential.response;

        // Step 5: when an allow list was issued, the presented credential
        // must be on it.
        if !options.allow_credentials.is_empty()
            && !options
                .allow_credentials
                .iter()
                .any(|d| d.id == credential.raw_id)
        {
            return Err(WebAuthnError::CredentialNotAllowed);
        }

        // Step 6: the credential must be registered.
        let record = self
            .credentials
            .find_by_id(&credential.raw_id)
            .ok_or(WebAuthnError::UnknownCredential)?;

        // Step 6 continued: an asserted user handle must belong to the
        // record; a discoverable credential resolves the user from it.
        if let Some(user_handle) = &response.user_handle {
            if user_handle != &record.user_handle {
                return Err(WebAuthnError::UserHandleMismatch);
            }
        }

        // Steps 8-10: decode the authenticator data and hash the client
        // data bytes.
        let auth_data = AuthenticatorData::parse(response.authenticator_data.as_slice())?;
        let client_data = CollectedClientData::parse(response.client_data_json.as_slice())?;
        let client_data_hash = crypto::sha256(response.client_data_json.as_slice());

        // Steps 11-13: type is webauthn.get, challenge matches, origin is
        // allowed, crossOrigin follows policy.
        client_data.verify(
            TYPE_GET,
            &options.challenge,
            &self.allowed_origins,
            self.allow_cross_origin,
        )?;

        // Step 15: rpIdHash.
        if auth_data.rp_id_hash != crypto::sha256(self.rp.id.as_bytes()) {
            return Err(WebAuthnError::RpIdHashMismatch);
        }

        // Step 16: user presence.
        if !auth_data.user_present() {
            return Err(WebAuthnError::UserPresenceMissing);
        }

        // Step 17: user verification when the options required it.
        if options.user_verification == Some(UserVerificationRequirement::Required)
            && !auth_data.user_verified()
        {
            return Err(WebAuthnError::UserVerificationRequired);
        }

        // Step 18: backed-up state requires backup eligibility.
        if auth_data.backed_up() && !auth_data.backup_eligible() {
            return Err(WebAuthnError::InvalidFlagCombination);
        }

        // Step 19: extension outputs against the requested inputs.
        self.check_extension_outputs(
            options.extensions.as_ref(),
            credential.client_extension_results.as_ref(),
        )?;

        // Steps 20-21: the signature covers authData || clientDataHash.
        let mut message =
            Vec::with_capacity(response.authenticator_data.len() + client_data_hash.len());
        message.extend_from_slice(response.authenticator_data.as_slice());
        message.extend_from_slice(&client_data_hash);
        crypto::verify_signature(&record.public_key, &message, response.signature.as_slice())?;

        // Step 22: the counter must advance. A pair of zeroes means the
        // authenticator does not implement a counter; anything else that
        // fails to advance points at a cloned key.
        let stored = record.sign_count;
        let reported = auth_data.sign_count;
        if reported <= stored && !(reported == 0 && stored == 0) {
            return Err(WebAuthnError::SignCountRegression { stored, reported });
        }
        let new_sign_count = if reported > stored { reported } else { stored };

        let now = self.clock.now();
        self.credentials.update_usage(
            &record.credential_id,
            stored,
            new_sign_count,
            auth_data.backed_up(),
            now,
        )?;

        Ok(AuthenticatedCredential {
            credential_id: record.credential_id,
            user_handle: record.user_handle,
            sign_count: new_sign_count,
            authenticated_at: now,
        })
    }

    /// Unknown client extension outputs are tolerated unless policy says
    /// otherwise.
    fn check_extension_outputs(
        &self,
        requested: Option<&Value>,
        outputs: Option<&Value>,
    ) -> Result<(), WebAuthnError> {
        if !self.reject_unsolicited_extensions {
            return Ok(());
        }
        let Some(Value::Object(outputs)) = outputs else {
            return Ok(());
        };
        let requested: HashSet<&String> = match requested {
            Some(Value::Object(map)) => map.keys().collect(),
            _ => HashSet::new(),
        };
        for key in outputs.keys() {
            if !requested.contains(key) {
                return Err(WebAuthnError::MalformedInput(format!(
                    "unsolicited client extension output {key}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryCredentialStore, InMemoryUserEntityStore};

    fn operations() -> RelyingPartyOperations {
        RelyingPartyOperations::new(
            RpEntity {
                id: "example.localhost".to_string(),
                name: "Example RP".to_string(),
            },
            vec!["https://example.localhost:8443".to_string()],
            Arc::new(InMemoryUserEntityStore::new()),
            Arc::new(InMemoryCredentialStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn refuses_bad_configuration() {
        let users: Arc<dyn UserEntityStore> = Arc::new(InMemoryUserEntityStore::new());
        let credentials: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());

        let no_origins = RelyingPartyOperations::new(
            RpEntity {
                id: "example.localhost".to_string(),
                name: "Example RP".to_string(),
            },
            vec![],
            users.clone(),
            credentials.clone(),
        );
        assert!(matches!(no_origins, Err(WebAuthnError::Configuration(_))));

        let empty_rp_id = RelyingPartyOperations::new(
            RpEntity {
                id: String::new(),
                name: "Example RP".to_string(),
            },
            vec!["https://example.localhost:8443".to_string()],
            users,
            credentials,
        );
        assert!(matches!(empty_rp_id, Err(WebAuthnError::Configuration(_))));
    }

    #[test]
    fn registration_options_carry_fresh_state() {
        let ops = operations();
        let first = ops.start_registration("alice", "Alice").unwrap();
        let second = ops.start_registration("alice", "Alice").unwrap();

        assert_eq!(first.challenge.len(), 32);
        assert_ne!(first.challenge, second.challenge);
        // Same username resolves to the same stable handle.
        assert_eq!(first.user.id, second.user.id);
        assert_eq!(first.rp.id, "example.localhost");
    }

    #[test]
    fn authentication_options_list_known_credentials() {
        let ops = operations();
        let options = ops.start_authentication(None).unwrap();
        assert!(options.allow_credentials.is_empty());
        assert_eq!(options.rp_id.as_deref(), Some("example.localhost"));
        assert_eq!(options.challenge.len(), 32);
    }

    #[test]
    fn unsolicited_extension_outputs_follow_policy() {
        let tolerant = operations();
        let outputs = serde_json::json!({"credProps": {"rk": true}});
        tolerant
            .check_extension_outputs(None, Some(&outputs))
            .unwrap();

        let strict = operations().reject_unsolicited_extensions(true);
        assert!(strict.check_extension_outputs(None, Some(&outputs)).is_err());

        let requested = serde_json::json!({"credProps": true});
        strict
            .check_extension_outputs(Some(&requested), Some(&outputs))
            .unwrap();
    }
}
