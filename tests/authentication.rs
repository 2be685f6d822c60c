//! Authentication ceremony scenarios
//!
//! A credential is registered through the real registration path, then
//! assertions are verified against it, each failure case mutating exactly
//! one thing.

use std::sync::Arc;

use passgate::storage::{
    CeremonyOptions, ChallengeStore, CredentialStore, InMemoryChallengeStore,
    InMemoryCredentialStore, InMemoryUserEntityStore, UserEntityStore,
};
use passgate::testing::authenticator::{ASSERTION_FLAGS, REGISTRATION_FLAGS};
use passgate::testing::constants::{TEST_ORIGIN, TEST_RP_ID};
use passgate::testing::SoftAuthenticator;
use passgate::webauthn::authenticator_data::flags;
use passgate::webauthn::types::{
    PublicKeyCredentialDescriptor, PublicKeyCredentialRequestOptions, RpEntity,
    UserVerificationRequirement,
};
use passgate::{
    AuthenticationRequest, Bytes, RegistrationRequest, RelyingPartyOperations, WebAuthnError,
};

struct Fixture {
    operations: RelyingPartyOperations,
    credentials: Arc<InMemoryCredentialStore>,
    authenticator: SoftAuthenticator,
    user_handle: Bytes,
}

/// Register the soft authenticator's credential and hand back everything an
/// assertion scenario needs.
fn registered_fixture() -> Fixture {
    let credentials = Arc::new(InMemoryCredentialStore::new());
    let users: Arc<dyn UserEntityStore> = Arc::new(InMemoryUserEntityStore::new());
    let operations = RelyingPartyOperations::new(
        RpEntity {
            id: TEST_RP_ID.to_string(),
            name: "Passgate Relying Party".to_string(),
        },
        vec![TEST_ORIGIN.to_string()],
        users,
        credentials.clone(),
    )
    .unwrap();

    let authenticator = SoftAuthenticator::new();
    let options = operations.start_registration("alice", "Alice").unwrap();
    let user_handle = options.user.id.clone();
    let credential = authenticator.attestation_response(
        TEST_RP_ID,
        TEST_ORIGIN,
        &options.challenge,
        REGISTRATION_FLAGS,
    );
    operations
        .register_credential(&RegistrationRequest {
            options,
            credential,
            label: "Phone".to_string(),
        })
        .unwrap();

    Fixture {
        operations,
        credentials,
        authenticator,
        user_handle,
    }
}

fn request_options(fixture: &Fixture) -> PublicKeyCredentialRequestOptions {
    fixture.operations.start_authentication(Some("alice")).unwrap()
}

fn assertion_request(
    fixture: &Fixture,
    options: PublicKeyCredentialRequestOptions,
    flag_bits: u8,
    sign_count: u32,
) -> AuthenticationRequest {
    let credential = fixture.authenticator.assertion_response(
        TEST_RP_ID,
        TEST_ORIGIN,
        &options.challenge,
        flag_bits,
        sign_count,
        None,
    );
    AuthenticationRequest {
        options,
        credential,
    }
}

#[test]
fn authenticates_a_valid_assertion() {
    let fixture = registered_fixture();
    let options = request_options(&fixture);
    assert_eq!(options.allow_credentials.len(), 1);

    let request = assertion_request(&fixture, options, ASSERTION_FLAGS, 1);
    let authenticated = fixture.operations.authenticate(&request).unwrap();

    assert_eq!(authenticated.user_handle, fixture.user_handle);
    assert_eq!(authenticated.sign_count, 1);

    let record = fixture
        .credentials
        .find_by_id(fixture.authenticator.credential_id())
        .unwrap();
    assert_eq!(record.sign_count, 1);
    assert_eq!(record.last_used, authenticated.authenticated_at);
}

#[test]
fn accepts_a_matching_user_handle() {
    let fixture = registered_fixture();
    let options = request_options(&fixture);
    let credential = fixture.authenticator.assertion_response(
        TEST_RP_ID,
        TEST_ORIGIN,
        &options.challenge,
        ASSERTION_FLAGS,
        1,
        Some(fixture.user_handle.clone()),
    );
    fixture
        .operations
        .authenticate(&AuthenticationRequest {
            options,
            credential,
        })
        .unwrap();
}

#[test]
fn rejects_a_foreign_user_handle() {
    let fixture = registered_fixture();
    let options = request_options(&fixture);
    let credential = fixture.authenticator.assertion_response(
        TEST_RP_ID,
        TEST_ORIGIN,
        &options.challenge,
        ASSERTION_FLAGS,
        1,
        Some(Bytes::from(&b"someone-else"[..])),
    );
    let err = fixture
        .operations
        .authenticate(&AuthenticationRequest {
            options,
            credential,
        })
        .unwrap_err();
    assert_eq!(err, WebAuthnError::UserHandleMismatch);
}

#[test]
fn rejects_a_credential_outside_the_allow_list() {
    let fixture = registered_fixture();
    let mut options = request_options(&fixture);
    options.allow_credentials = vec![PublicKeyCredentialDescriptor::new(
        Bytes::from(&b"some-other-credential"[..]),
        Vec::new(),
    )];

    let request = assertion_request(&fixture, options, ASSERTION_FLAGS, 1);
    let err = fixture.operations.authenticate(&request).unwrap_err();
    assert_eq!(err, WebAuthnError::CredentialNotAllowed);
}

#[test]
fn rejects_an_unknown_credential() {
    let fixture = registered_fixture();
    let mut options = request_options(&fixture);
    options.allow_credentials = Vec::new();

    let stranger = SoftAuthenticator::from_seed([0x77; 32], b"unregistered-credential-000000");
    let credential = stranger.assertion_response(
        TEST_RP_ID,
        TEST_ORIGIN,
        &options.challenge,
        ASSERTION_FLAGS,
        1,
        None,
    );
    let err = fixture
        .operations
        .authenticate(&AuthenticationRequest {
            options,
            credential,
        })
        .unwrap_err();
    assert_eq!(err, WebAuthnError::UnknownCredential);
}

#[test]
fn rejects_a_mismatched_challenge() {
    let fixture = registered_fixture();
    let options = request_options(&fixture);
    let credential = fixture.authenticator.assertion_response(
        TEST_RP_ID,
        TEST_ORIGIN,
        &Bytes::new(vec![0x99; 32]),
        ASSERTION_FLAGS,
        1,
        None,
    );
    let err = fixture
        .operations
        .authenticate(&AuthenticationRequest {
            options,
            credential,
        })
        .unwrap_err();
    assert_eq!(err, WebAuthnError::ChallengeMismatch);
}

#[test]
fn rejects_flag_faults() {
    let fixture = registered_fixture();

    let request = assertion_request(
        &fixture,
        request_options(&fixture),
        ASSERTION_FLAGS & !flags::UP,
        1,
    );
    assert_eq!(
        fixture.operations.authenticate(&request).unwrap_err(),
        WebAuthnError::UserPresenceMissing
    );

    let mut options = request_options(&fixture);
    options.user_verification = Some(UserVerificationRequirement::Required);
    let request = assertion_request(&fixture, options, ASSERTION_FLAGS & !flags::UV, 1);
    assert_eq!(
        fixture.operations.authenticate(&request).unwrap_err(),
        WebAuthnError::UserVerificationRequired
    );

    let request = assertion_request(
        &fixture,
        request_options(&fixture),
        ASSERTION_FLAGS | flags::BS,
        1,
    );
    assert_eq!(
        fixture.operations.authenticate(&request).unwrap_err(),
        WebAuthnError::InvalidFlagCombination
    );
}

#[test]
fn rejects_a_tampered_signature() {
    let fixture = registered_fixture();
    let options = request_options(&fixture);

    // Signed by a different key than the registered credential's.
    let imposter = SoftAuthenticator::from_seed([0x31; 32], b"soft-authenticator-credential-01");
    let credential = imposter.assertion_response(
        TEST_RP_ID,
        TEST_ORIGIN,
        &options.challenge,
        ASSERTION_FLAGS,
        1,
        None,
    );
    let err = fixture
        .operations
        .authenticate(&AuthenticationRequest {
            options,
            credential,
        })
        .unwrap_err();
    assert_eq!(err, WebAuthnError::BadSignature);
}

#[test]
fn rejects_a_counter_regression() {
    let fixture = registered_fixture();

    // Drive the stored counter to 5.
    let request = assertion_request(&fixture, request_options(&fixture), ASSERTION_FLAGS, 5);
    fixture.operations.authenticate(&request).unwrap();

    // A clone reporting 3 must be refused.
    let request = assertion_request(&fixture, request_options(&fixture), ASSERTION_FLAGS, 3);
    let err = fixture.operations.authenticate(&request).unwrap_err();
    assert_eq!(
        err,
        WebAuthnError::SignCountRegression {
            stored: 5,
            reported: 3
        }
    );

    // So must a replay of the current value.
    let request = assertion_request(&fixture, request_options(&fixture), ASSERTION_FLAGS, 5);
    assert!(matches!(
        fixture.operations.authenticate(&request).unwrap_err(),
        WebAuthnError::SignCountRegression { .. }
    ));
}

#[test]
fn counters_pinned_at_zero_are_accepted() {
    // An authenticator without a counter reports zero on both sides.
    let fixture = registered_fixture();

    let request = assertion_request(&fixture, request_options(&fixture), ASSERTION_FLAGS, 0);
    fixture.operations.authenticate(&request).unwrap();

    // Still zero on the next assertion; still accepted.
    let request = assertion_request(&fixture, request_options(&fixture), ASSERTION_FLAGS, 0);
    fixture.operations.authenticate(&request).unwrap();

    let record = fixture
        .credentials
        .find_by_id(fixture.authenticator.credential_id())
        .unwrap();
    assert_eq!(record.sign_count, 0);
}

#[test]
fn successive_authentications_never_decrease_the_counter() {
    let fixture = registered_fixture();
    let mut previous = 0;
    for count in [1u32, 2, 7, 100] {
        let request =
            assertion_request(&fixture, request_options(&fixture), ASSERTION_FLAGS, count);
        let authenticated = fixture.operations.authenticate(&request).unwrap();
        assert!(authenticated.sign_count >= previous);
        previous = authenticated.sign_count;
    }
}

#[test]
fn assertion_updates_backup_state() {
    let fixture = registered_fixture();
    let request = assertion_request(
        &fixture,
        request_options(&fixture),
        ASSERTION_FLAGS | flags::BE | flags::BS,
        1,
    );
    fixture.operations.authenticate(&request).unwrap();

    let record = fixture
        .credentials
        .find_by_id(fixture.authenticator.credential_id())
        .unwrap();
    assert!(record.backup_state);
}

#[test]
fn a_challenge_is_usable_at_most_once() {
    let fixture = registered_fixture();
    let store = InMemoryChallengeStore::new();
    let options = request_options(&fixture);
    store.save("session-1", CeremonyOptions::Request(options));

    // First assertion consumes the pending ceremony.
    let Some(CeremonyOptions::Request(options)) = store.load_and_consume("session-1") else {
        panic!("expected pending request options");
    };
    let request = assertion_request(&fixture, options, ASSERTION_FLAGS, 1);
    fixture.operations.authenticate(&request).unwrap();

    // A replay finds no challenge, whatever the verifier would have said.
    assert!(store.load_and_consume("session-1").is_none());
}
