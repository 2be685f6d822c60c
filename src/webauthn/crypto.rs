//! Cryptographic operations
//!
//! Signature verification over `authData || SHA-256(clientDataJSON)` for
//! every COSE algorithm the engine accepts, plus the entropy and clock
//! collaborators the options generator depends on. Injecting both keeps
//! ceremonies deterministic under test.

use chrono::{DateTime, Utc};
use p256::ecdsa::signature::Verifier;
use ring::rand::SecureRandom;
use ring::signature::{UnparsedPublicKey, ED25519};
use rsa::sha2::{Sha256, Sha384, Sha512};
use rsa::{BigUint, RsaPublicKey};
use sha2::Digest;

use super::cose::{alg, crv, CoseKey, CoseKeyParams};
use super::{Bytes, WebAuthnError};

/// SHA-256 of arbitrary input, the hash that binds client data to the
/// signed message.
#[must_use]
pub fn sha256(input: &[u8]) -> [u8; 32] {
    sha2::Sha256::digest(input).into()
}

/// Verify `signature` over `message` with the credential public key,
/// dispatching on the key's COSE algorithm.
///
/// # Errors
/// - `UnsupportedAlgorithm` for algorithms outside the accepted set
///   (including RS1)
/// - `BadSignature` for malformed DER, wrong-size raw signatures, invalid
///   points, or a signature that does not verify
pub fn verify_signature(
    key: &CoseKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), WebAuthnError> {
    match key.alg() {
        alg::ES256 => {
            let point = ec2_point(key, crv::P256)?;
            let verifying_key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|_| WebAuthnError::BadSignature)?;
            let sig = p256::ecdsa::Signature::from_der(signature)
                .map_err(|_| WebAuthnError::BadSignature)?;
            let sig = sig.normalize_s().unwrap_or(sig);
            verifying_key
                .verify(message, &sig)
                .map_err(|_| WebAuthnError::BadSignature)
        }
        alg::ES384 => {
            let point = ec2_point(key, crv::P384)?;
            let verifying_key = p384::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|_| WebAuthnError::BadSignature)?;
            let sig = p384::ecdsa::Signature::from_der(signature)
                .map_err(|_| WebAuthnError::BadSignature)?;
            let sig = sig.normalize_s().unwrap_or(sig);
            verifying_key
                .verify(message, &sig)
                .map_err(|_| WebAuthnError::BadSignature)
        }
        alg::ES512 => {
            let point = ec2_point(key, crv::P521)?;
            let verifying_key = p521::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|_| WebAuthnError::BadSignature)?;
            let sig = p521::ecdsa::Signature::from_der(signature)
                .map_err(|_| WebAuthnError::BadSignature)?;
            let sig = sig.normalize_s().unwrap_or(sig);
            verifying_key
                .verify(message, &sig)
                .map_err(|_| WebAuthnError::BadSignature)
        }
        alg::EDDSA => {
            let CoseKeyParams::Okp { crv: curve, x } = key.params() else {
                return Err(WebAuthnError::BadSignature);
            };
            if *curve != crv::ED25519 || x.len() != 32 || signature.len() != 64 {
                return Err(WebAuthnError::BadSignature);
            }
            UnparsedPublicKey::new(&ED25519, x)
                .verify(message, signature)
                .map_err(|_| WebAuthnError::BadSignature)
        }
        alg::RS256 => {
            let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(rsa_key(key)?);
            let sig = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|_| WebAuthnError::BadSignature)?;
            verifying_key
                .verify(message, &sig)
                .map_err(|_| WebAuthnError::BadSignature)
        }
        alg::RS384 => {
            let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha384>::new(rsa_key(key)?);
            let sig = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|_| WebAuthnError::BadSignature)?;
            verifying_key
                .verify(message, &sig)
                .map_err(|_| WebAuthnError::BadSignature)
        }
        alg::RS512 => {
            let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha512>::new(rsa_key(key)?);
            let sig = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|_| WebAuthnError::BadSignature)?;
            verifying_key
                .verify(message, &sig)
                .map_err(|_| WebAuthnError::BadSignature)
        }
        alg::PS256 => {
            // RSA-PSS with MGF1-SHA-256 and a 32-byte salt.
            let verifying_key = rsa::pss::VerifyingKey::<Sha256>::new(rsa_key(key)?);
            let sig = rsa::pss::Signature::try_from(signature)
                .map_err(|_| WebAuthnError::BadSignature)?;
            verifying_key
                .verify(message, &sig)
                .map_err(|_| WebAuthnError::BadSignature)
        }
        other => Err(WebAuthnError::UnsupportedAlgorithm(other)),
    }
}

/// Uncompressed SEC1 point (`0x04 || x || y`) from an EC2 key on the
/// expected curve.
fn ec2_point(key: &CoseKey, expected_crv: i64) -> Result<Vec<u8>, WebAuthnError> {
    let CoseKeyParams::Ec2 { crv: curve, x, y } = key.params() else {
        return Err(WebAuthnError::BadSignature);
    };
    if *curve != expected_crv {
        return Err(WebAuthnError::BadSignature);
    }
    let mut point = Vec::with_capacity(1 + x.len() + y.len());
    point.push(0x04);
    point.extend_from_slice(x);
    point.extend_from_slice(y);
    Ok(point)
}

fn rsa_key(key: &CoseKey) -> Result<RsaPublicKey, WebAuthnError> {
    let CoseKeyParams::Rsa { n, e } = key.params() else {
        return Err(WebAuthnError::BadSignature);
    };
    RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
        .map_err(|_| WebAuthnError::BadSignature)
}

/// Source of cryptographically secure random bytes.
///
/// Injected so tests can pin challenges and user handles to fixed values.
pub trait EntropySource: Send + Sync {
    /// # Errors
    /// Returns `Configuration` when the underlying source cannot produce
    /// random bytes.
    fn fill(&self, dest: &mut [u8]) -> Result<(), WebAuthnError>;

    /// A fresh buffer of `len` random bytes.
    ///
    /// # Errors
    /// Propagates the `fill` failure.
    fn generate(&self, len: usize) -> Result<Bytes, WebAuthnError> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        Ok(Bytes::new(buf))
    }
}

/// The operating system CSPRNG.
pub struct SystemEntropy {
    rng: ring::rand::SystemRandom,
}

impl SystemEntropy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: ring::rand::SystemRandom::new(),
        }
    }
}

impl Default for SystemEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropySource for SystemEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), WebAuthnError> {
        self.rng
            .fill(dest)
            .map_err(|_| WebAuthnError::Configuration("system entropy source failed".into()))
    }
}

/// Time source for `created` and `lastUsed` stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::SigningKey;

    use super::*;
    use crate::webauthn::cose;

    fn es256_key_pair() -> (SigningKey, CoseKey) {
        let signing_key = SigningKey::from_slice(&[0x17; 32]).unwrap();
        let point = signing_key.verifying_key().to_encoded_point(false);
        let cose_key = cose_ec2(
            alg::ES256,
            crv::P256,
            point.x().unwrap().as_slice(),
            point.y().unwrap().as_slice(),
        );
        (signing_key, cose_key)
    }

    fn cose_ec2(algorithm: i64, curve: i64, x: &[u8], y: &[u8]) -> CoseKey {
        use ciborium::value::Value;
        let map = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer(algorithm.into())),
            (Value::Integer((-1).into()), Value::Integer(curve.into())),
            (Value::Integer((-2).into()), Value::Bytes(x.to_vec())),
            (Value::Integer((-3).into()), Value::Bytes(y.to_vec())),
        ]);
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&map, &mut buf).unwrap();
        CoseKey::parse(&buf).unwrap()
    }

    #[test]
    fn verifies_an_es256_signature() {
        let (signing_key, cose_key) = es256_key_pair();
        let message = b"authenticator data || client data hash";
        let signature: p256::ecdsa::Signature = signing_key.sign(message);

        verify_signature(&cose_key, message, signature.to_der().as_bytes()).unwrap();
    }

    #[test]
    fn rejects_a_tampered_message() {
        let (signing_key, cose_key) = es256_key_pair();
        let signature: p256::ecdsa::Signature = signing_key.sign(b"original");

        let err = verify_signature(&cose_key, b"tampered", signature.to_der().as_bytes());
        assert_eq!(err.unwrap_err(), WebAuthnError::BadSignature);
    }

    #[test]
    fn rejects_malformed_der() {
        let (_, cose_key) = es256_key_pair();
        let err = verify_signature(&cose_key, b"message", &[0x30, 0x01, 0x00]);
        assert_eq!(err.unwrap_err(), WebAuthnError::BadSignature);
    }

    #[test]
    fn verifies_an_ed25519_signature() {
        use ciborium::value::Value;
        let key_pair = ring::signature::Ed25519KeyPair::from_seed_unchecked(&[0x42; 32]).unwrap();
        let message = b"assertion message";
        let signature = key_pair.sign(message);
        let public_key = ring::signature::KeyPair::public_key(&key_pair);

        let map = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(1.into())),
            (Value::Integer(3.into()), Value::Integer((-8).into())),
            (Value::Integer((-1).into()), Value::Integer(6.into())),
            (
                Value::Integer((-2).into()),
                Value::Bytes(public_key.as_ref().to_vec()),
            ),
        ]);
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&map, &mut buf).unwrap();
        let cose_key = CoseKey::parse(&buf).unwrap();

        verify_signature(&cose_key, message, signature.as_ref()).unwrap();
        let err = verify_signature(&cose_key, b"other", signature.as_ref());
        assert_eq!(err.unwrap_err(), WebAuthnError::BadSignature);
    }

    #[test]
    fn unknown_algorithm_is_unsupported() {
        let (_, cose_key) = es256_key_pair();
        // Same key material, RS1 algorithm identifier.
        let CoseKeyParams::Ec2 { x, y, .. } = cose_key.params().clone() else {
            unreachable!()
        };
        let rs1_key = cose_ec2(cose::alg::RS1, crv::P256, &x, &y);
        let err = verify_signature(&rs1_key, b"message", &[0u8; 64]);
        assert_eq!(err.unwrap_err(), WebAuthnError::UnsupportedAlgorithm(-65535));
    }

    #[test]
    fn curve_mismatch_is_a_bad_signature() {
        let (signing_key, _) = es256_key_pair();
        let point = signing_key.verifying_key().to_encoded_point(false);
        let wrong_curve = cose_ec2(
            alg::ES256,
            crv::P384,
            point.x().unwrap().as_slice(),
            point.y().unwrap().as_slice(),
        );
        let err = verify_signature(&wrong_curve, b"message", &[0u8; 70]);
        assert_eq!(err.unwrap_err(), WebAuthnError::BadSignature);
    }

    #[test]
    fn entropy_source_fills_requested_length() {
        let entropy = SystemEntropy::new();
        let bytes = entropy.generate(32).unwrap();
        assert_eq!(bytes.len(), 32);
        // Two draws colliding would mean the source is not random at all.
        assert_ne!(bytes, entropy.generate(32).unwrap());
    }
}
