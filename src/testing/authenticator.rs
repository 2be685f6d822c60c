//! Deterministic software authenticator
//!
//! Builds the binary artifacts a real authenticator would: COSE keys,
//! authenticator data, attestation objects, and signed assertions. Key
//! material derives from a fixed seed, so fixtures are reproducible and
//! tests can flip individual flag bits to provoke specific failures.

use ciborium::value::Value;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::SigningKey;
use sha2::{Digest, Sha256};

use crate::webauthn::authenticator_data::flags;
use crate::webauthn::types::{
    AssertionCredential, AuthenticatorAssertionResponse, AuthenticatorAttestationResponse,
    PublicKeyCredentialType, RegistrationCredential,
};
use crate::webauthn::Bytes;

/// Flag byte a well-behaved authenticator reports during registration.
pub const REGISTRATION_FLAGS: u8 = flags::UP | flags::UV | flags::AT;

/// Flag byte a well-behaved authenticator reports during assertions.
pub const ASSERTION_FLAGS: u8 = flags::UP | flags::UV;

/// A P-256 software authenticator with a fixed credential.
pub struct SoftAuthenticator {
    signing_key: SigningKey,
    credential_id: Bytes,
    aaguid: [u8; 16],
}

impl SoftAuthenticator {
    /// The default fixture authenticator.
    #[must_use]
    pub fn new() -> Self {
        Self::from_seed([0x5e; 32], b"soft-authenticator-credential-01")
    }

    /// An authenticator with its own key and credential ID, for tests that
    /// need several distinct credentials.
    #[must_use]
    pub fn from_seed(seed: [u8; 32], credential_id: &[u8]) -> Self {
        let signing_key = SigningKey::from_slice(&seed).expect("seed is a valid P-256 scalar");
        Self {
            signing_key,
            credential_id: Bytes::from(credential_id),
            aaguid: *b"PASSGATE-SOFTKEY",
        }
    }

    #[must_use]
    pub fn credential_id(&self) -> &Bytes {
        &self.credential_id
    }

    /// The credential public key as a COSE EC2 map, byte-for-byte what the
    /// attested credential data embeds.
    #[must_use]
    pub fn cose_public_key(&self) -> Bytes {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let map = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer((-7).into())),
            (Value::Integer((-1).into()), Value::Integer(1.into())),
            (
                Value::Integer((-2).into()),
                Value::Bytes(point.x().expect("uncompressed point").to_vec()),
            ),
            (
                Value::Integer((-3).into()),
                Value::Bytes(point.y().expect("uncompressed point").to_vec()),
            ),
        ]);
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&map, &mut buf).expect("COSE key encoding is infallible");
        Bytes::new(buf)
    }

    /// A registration response with the given flag byte and a `none`
    /// attestation statement.
    #[must_use]
    pub fn attestation_response(
        &self,
        rp_id: &str,
        origin: &str,
        challenge: &Bytes,
        flag_bits: u8,
    ) -> RegistrationCredential {
        let auth_data = self.registration_auth_data(rp_id, flag_bits);
        let attestation_object = encode_attestation_object("none", &auth_data, vec![]);
        self.registration_credential(origin, challenge, attestation_object)
    }

    /// A registration response carrying packed self-attestation: the
    /// statement signature covers `authData || SHA-256(clientDataJSON)`
    /// and verifies with the credential key itself.
    #[must_use]
    pub fn packed_attestation_response(
        &self,
        rp_id: &str,
        origin: &str,
        challenge: &Bytes,
    ) -> RegistrationCredential {
        let auth_data = self.registration_auth_data(rp_id, REGISTRATION_FLAGS);
        let client_data_json = client_data_json("webauthn.create", challenge, origin);
        let mut message = auth_data.clone();
        message.extend_from_slice(&Sha256::digest(&client_data_json));
        let signature: p256::ecdsa::Signature = self.signing_key.sign(&message);

        let att_stmt = vec![
            (Value::Text("alg".into()), Value::Integer((-7).into())),
            (
                Value::Text("sig".into()),
                Value::Bytes(signature.to_der().as_bytes().to_vec()),
            ),
        ];
        let attestation_object = encode_attestation_object("packed", &auth_data, att_stmt);

        RegistrationCredential {
            id: self.credential_id.to_base64url(),
            raw_id: self.credential_id.clone(),
            credential_type: PublicKeyCredentialType::PublicKey,
            response: AuthenticatorAttestationResponse {
                client_data_json: Bytes::new(client_data_json),
                attestation_object: Bytes::new(attestation_object),
                transports: Vec::new(),
            },
            client_extension_results: None,
            authenticator_attachment: None,
        }
    }

    /// A signed assertion with the given flag byte and counter value.
    #[must_use]
    pub fn assertion_response(
        &self,
        rp_id: &str,
        origin: &str,
        challenge: &Bytes,
        flag_bits: u8,
        sign_count: u32,
        user_handle: Option<Bytes>,
    ) -> AssertionCredential {
        let mut auth_data = Vec::with_capacity(37);
        auth_data.extend_from_slice(&rp_id_hash(rp_id));
        auth_data.push(flag_bits);
        auth_data.extend_from_slice(&sign_count.to_be_bytes());

        let client_data_json = client_data_json("webauthn.get", challenge, origin);
        let mut message = auth_data.clone();
        message.extend_from_slice(&Sha256::digest(&client_data_json));
        let signature: p256::ecdsa::Signature = self.signing_key.sign(&message);

        AssertionCredential {
            id: self.credential_id.to_base64url(),
            raw_id: self.credential_id.clone(),
            credential_type: PublicKeyCredentialType::PublicKey,
            response: AuthenticatorAssertionResponse {
                client_data_json: Bytes::new(client_data_json),
                authenticator_data: Bytes::new(auth_data),
                signature: Bytes::new(signature.to_der().as_bytes().to_vec()),
                user_handle,
            },
            client_extension_results: None,
            authenticator_attachment: None,
        }
    }

    fn registration_auth_data(&self, rp_id: &str, flag_bits: u8) -> Vec<u8> {
        let cose_key = self.cose_public_key();
        let id_len = u16::try_from(self.credential_id.len()).expect("credential ID fits u16");

        let mut data = Vec::new();
        data.extend_from_slice(&rp_id_hash(rp_id));
        data.push(flag_bits);
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&self.aaguid);
        data.extend_from_slice(&id_len.to_be_bytes());
        data.extend_from_slice(self.credential_id.as_slice());
        data.extend_from_slice(cose_key.as_slice());
        data
    }

    fn registration_credential(
        &self,
        origin: &str,
        challenge: &Bytes,
        attestation_object: Vec<u8>,
    ) -> RegistrationCredential {
        RegistrationCredential {
            id: self.credential_id.to_base64url(),
            raw_id: self.credential_id.clone(),
            credential_type: PublicKeyCredentialType::PublicKey,
            response: AuthenticatorAttestationResponse {
                client_data_json: Bytes::new(client_data_json(
                    "webauthn.create",
                    challenge,
                    origin,
                )),
                attestation_object: Bytes::new(attestation_object),
                transports: Vec::new(),
            },
            client_extension_results: None,
            authenticator_attachment: None,
        }
    }
}

impl Default for SoftAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

fn rp_id_hash(rp_id: &str) -> [u8; 32] {
    Sha256::digest(rp_id.as_bytes()).into()
}

fn client_data_json(ceremony_type: &str, challenge: &Bytes, origin: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "type": ceremony_type,
        "challenge": challenge.to_base64url(),
        "origin": origin,
        "crossOrigin": false,
    }))
    .expect("client data serializes")
}

fn encode_attestation_object(
    fmt: &str,
    auth_data: &[u8],
    att_stmt: Vec<(Value, Value)>,
) -> Vec<u8> {
    let map = Value::Map(vec![
        (Value::Text("fmt".into()), Value::Text(fmt.into())),
        (Value::Text("attStmt".into()), Value::Map(att_stmt)),
        (
            Value::Text("authData".into()),
            Value::Bytes(auth_data.to_vec()),
        ),
    ]);
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&map, &mut buf).expect("attestation object encoding is infallible");
    buf
}
