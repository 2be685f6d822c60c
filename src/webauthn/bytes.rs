//! Opaque byte buffers for `WebAuthn` protocol fields
//!
//! Challenges, credential IDs, user handles, signatures and every other
//! buffer-shaped field travel on the wire as URL-safe base64 without
//! padding. `Bytes` keeps the raw content and owns the single encode/decode
//! path so the wire form stays canonical.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::codec;

/// An opaque byte sequence with canonical base64url (no padding) encoding.
///
/// Equality and hashing are defined on the byte content, so `Bytes` can key
/// credential and user-handle maps directly.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    #[must_use]
    pub fn new(content: Vec<u8>) -> Self {
        Self(content)
    }

    /// Decode from the base64url wire form. Padding is tolerated.
    ///
    /// # Errors
    /// Returns `MalformedInput` when the input contains characters outside
    /// the URL-safe alphabet.
    pub fn from_base64url(encoded: &str) -> Result<Self, super::WebAuthnError> {
        codec::base64url_decode(encoded).map(Self)
    }

    /// The canonical wire encoding: base64url without padding.
    #[must_use]
    pub fn to_base64url(&self) -> String {
        codec::base64url_encode(&self.0)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(content: Vec<u8>) -> Self {
        Self(content)
    }
}

impl From<&[u8]> for Bytes {
    fn from(content: &[u8]) -> Self {
        Self(content.to_vec())
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes({})", self.to_base64url())
    }
}

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64url())
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BytesVisitor;

        impl Visitor<'_> for BytesVisitor {
            type Value = Bytes;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a base64url-encoded string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Bytes, E> {
                Bytes::from_base64url(value).map_err(|e| E::custom(e.to_string()))
            }
        }

        deserializer.deserialize_str(BytesVisitor)
    }
}
