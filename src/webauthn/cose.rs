//! COSE public keys
//!
//! Credential public keys arrive as CBOR maps keyed by the integer labels of
//! RFC 9052 (1 = kty, 3 = alg, negative labels for the per-type
//! parameters). `CoseKey` is the canonical parsed shape; it keeps the raw
//! CBOR bytes so records round-trip the key exactly as the authenticator
//! produced it. Opaque to everything but the signature verifier.

use std::fmt;

use ciborium::value::Value;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::codec::{self, as_i64, map_get_int};
use super::{Bytes, WebAuthnError};

/// COSE algorithm identifiers this engine knows about.
pub mod alg {
    pub const ES256: i64 = -7;
    pub const EDDSA: i64 = -8;
    pub const ES384: i64 = -35;
    pub const ES512: i64 = -36;
    pub const PS256: i64 = -37;
    pub const RS256: i64 = -257;
    pub const RS384: i64 = -258;
    pub const RS512: i64 = -259;
    /// RSASSA-PKCS1-v1_5 with SHA-1. Rejected by default.
    pub const RS1: i64 = -65535;
}

/// COSE elliptic curve identifiers.
pub mod crv {
    pub const P256: i64 = 1;
    pub const P384: i64 = 2;
    pub const P521: i64 = 3;
    pub const ED25519: i64 = 6;
}

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

/// Key-type specific parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKeyParams {
    /// Double-coordinate elliptic curve key (kty 2).
    Ec2 { crv: i64, x: Vec<u8>, y: Vec<u8> },
    /// Octet key pair (kty 1), Ed25519 here.
    Okp { crv: i64, x: Vec<u8> },
    /// RSA public key (kty 3).
    Rsa { n: Vec<u8>, e: Vec<u8> },
}

/// A parsed COSE public key with its raw CBOR encoding retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoseKey {
    raw: Bytes,
    alg: i64,
    params: CoseKeyParams,
}

impl CoseKey {
    /// Parse a COSE key that must consume the whole input.
    ///
    /// # Errors
    /// Returns `MalformedInput` on invalid CBOR, trailing bytes, or a
    /// missing required label.
    pub fn parse(input: &[u8]) -> Result<Self, WebAuthnError> {
        let (key, consumed) = Self::parse_prefix(input)?;
        if consumed != input.len() {
            return Err(WebAuthnError::MalformedInput(
                "trailing bytes after COSE key".into(),
            ));
        }
        Ok(key)
    }

    /// Parse a COSE key from the front of `input`, returning the consumed
    /// length. Authenticator data embeds the key between the credential ID
    /// and the optional extensions map.
    ///
    /// # Errors
    /// Returns `MalformedInput` on invalid CBOR or a missing required label.
    pub fn parse_prefix(input: &[u8]) -> Result<(Self, usize), WebAuthnError> {
        let (value, consumed) = codec::cbor_decode_prefix(input)?;
        let map = value
            .as_map()
            .ok_or_else(|| WebAuthnError::MalformedInput("COSE key is not a map".into()))?;

        let kty = required_int(map, 1, "kty")?;
        let alg = required_int(map, 3, "alg")?;

        let params = match kty {
            KTY_EC2 => CoseKeyParams::Ec2 {
                crv: required_int(map, -1, "crv")?,
                x: required_bytes(map, -2, "x")?,
                y: required_bytes(map, -3, "y")?,
            },
            KTY_OKP => CoseKeyParams::Okp {
                crv: required_int(map, -1, "crv")?,
                x: required_bytes(map, -2, "x")?,
            },
            KTY_RSA => CoseKeyParams::Rsa {
                n: required_bytes(map, -1, "n")?,
                e: required_bytes(map, -2, "e")?,
            },
            other => {
                return Err(WebAuthnError::MalformedInput(format!(
                    "unsupported COSE key type {other}"
                )))
            }
        };

        let key = Self {
            raw: Bytes::from(&input[..consumed]),
            alg,
            params,
        };
        Ok((key, consumed))
    }

    /// The COSE algorithm identifier bound into the key.
    #[must_use]
    pub fn alg(&self) -> i64 {
        self.alg
    }

    #[must_use]
    pub fn params(&self) -> &CoseKeyParams {
        &self.params
    }

    /// The raw CBOR encoding exactly as the authenticator produced it.
    #[must_use]
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}

fn required_int(map: &[(Value, Value)], label: i64, name: &str) -> Result<i64, WebAuthnError> {
    map_get_int(map, label)
        .and_then(as_i64)
        .ok_or_else(|| WebAuthnError::MalformedInput(format!("COSE key label {name} is missing")))
}

fn required_bytes(map: &[(Value, Value)], label: i64, name: &str) -> Result<Vec<u8>, WebAuthnError> {
    map_get_int(map, label)
        .and_then(Value::as_bytes)
        .cloned()
        .ok_or_else(|| WebAuthnError::MalformedInput(format!("COSE key label {name} is missing")))
}

impl Serialize for CoseKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw.to_base64url())
    }
}

impl<'de> Deserialize<'de> for CoseKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CoseKeyVisitor;

        impl Visitor<'_> for CoseKeyVisitor {
            type Value = CoseKey;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a base64url-encoded COSE key")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<CoseKey, E> {
                let raw = Bytes::from_base64url(value).map_err(|e| E::custom(e.to_string()))?;
                CoseKey::parse(raw.as_slice()).map_err(|e| E::custom(e.to_string()))
            }
        }

        deserializer.deserialize_str(CoseKeyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use ciborium::value::Value;

    use super::*;

    fn encode(map: Vec<(Value, Value)>) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&Value::Map(map), &mut buf).unwrap();
        buf
    }

    fn es256_map() -> Vec<(Value, Value)> {
        vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer((-7).into())),
            (Value::Integer((-1).into()), Value::Integer(1.into())),
            (Value::Integer((-2).into()), Value::Bytes(vec![0x11; 32])),
            (Value::Integer((-3).into()), Value::Bytes(vec![0x22; 32])),
        ]
    }

    #[test]
    fn parses_an_ec2_key() {
        let encoded = encode(es256_map());
        let key = CoseKey::parse(&encoded).unwrap();
        assert_eq!(key.alg(), alg::ES256);
        match key.params() {
            CoseKeyParams::Ec2 { crv, x, y } => {
                assert_eq!(*crv, crv::P256);
                assert_eq!(x.len(), 32);
                assert_eq!(y.len(), 32);
            }
            other => panic!("unexpected params: {other:?}"),
        }
        assert_eq!(key.raw().as_slice(), encoded.as_slice());
    }

    #[test]
    fn parses_okp_and_rsa_keys() {
        let okp = encode(vec![
            (Value::Integer(1.into()), Value::Integer(1.into())),
            (Value::Integer(3.into()), Value::Integer((-8).into())),
            (Value::Integer((-1).into()), Value::Integer(6.into())),
            (Value::Integer((-2).into()), Value::Bytes(vec![0x33; 32])),
        ]);
        let key = CoseKey::parse(&okp).unwrap();
        assert_eq!(key.alg(), alg::EDDSA);
        assert!(matches!(key.params(), CoseKeyParams::Okp { crv: 6, .. }));

        let rsa = encode(vec![
            (Value::Integer(1.into()), Value::Integer(3.into())),
            (Value::Integer(3.into()), Value::Integer((-257).into())),
            (Value::Integer((-1).into()), Value::Bytes(vec![0xab; 256])),
            (Value::Integer((-2).into()), Value::Bytes(vec![0x01, 0x00, 0x01])),
        ]);
        let key = CoseKey::parse(&rsa).unwrap();
        assert_eq!(key.alg(), alg::RS256);
        assert!(matches!(key.params(), CoseKeyParams::Rsa { .. }));
    }

    #[test]
    fn missing_label_is_malformed() {
        let mut map = es256_map();
        map.retain(|(k, _)| *k != Value::Integer((-3).into()));
        let err = CoseKey::parse(&encode(map)).unwrap_err();
        assert!(matches!(err, WebAuthnError::MalformedInput(_)));
    }

    #[test]
    fn parse_prefix_leaves_following_bytes() {
        let mut encoded = encode(es256_map());
        let key_len = encoded.len();
        encoded.extend_from_slice(&[0xde, 0xad]);
        let (key, consumed) = CoseKey::parse_prefix(&encoded).unwrap();
        assert_eq!(consumed, key_len);
        assert_eq!(key.alg(), alg::ES256);
        assert!(CoseKey::parse(&encoded).is_err());
    }
}
