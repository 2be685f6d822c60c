//! Wire codecs for `WebAuthn` payloads
//!
//! URL-safe base64 without padding for every buffer-shaped field, and CBOR
//! decoding for the attestation object and COSE keys. Decoding is strict:
//! base64 rejects characters outside the URL alphabet, and top-level CBOR
//! values must consume their input exactly.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, Engine, GeneralPurpose, GeneralPurposeConfig};
use ciborium::value::Value;

use super::WebAuthnError;

/// URL-safe alphabet, no padding on encode, padding tolerated on decode.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[must_use]
pub fn base64url_encode(content: &[u8]) -> String {
    BASE64URL.encode(content)
}

/// # Errors
/// Returns `MalformedInput` when the input contains characters outside the
/// URL-safe alphabet.
pub fn base64url_decode(encoded: &str) -> Result<Vec<u8>, WebAuthnError> {
    BASE64URL
        .decode(encoded)
        .map_err(|e| WebAuthnError::MalformedInput(format!("invalid base64url: {e}")))
}

/// Decode one CBOR value that must consume the whole input.
///
/// # Errors
/// Returns `MalformedInput` on invalid CBOR or trailing bytes.
pub fn cbor_decode(input: &[u8]) -> Result<Value, WebAuthnError> {
    let (value, consumed) = cbor_decode_prefix(input)?;
    if consumed != input.len() {
        return Err(WebAuthnError::MalformedInput(format!(
            "{} trailing bytes after CBOR value",
            input.len() - consumed
        )));
    }
    Ok(value)
}

/// Decode one CBOR value from the front of `input`, returning the value and
/// the number of bytes it consumed. Used where CBOR is embedded in a binary
/// layout, such as the COSE key inside authenticator data.
///
/// # Errors
/// Returns `MalformedInput` on invalid CBOR.
pub fn cbor_decode_prefix(input: &[u8]) -> Result<(Value, usize), WebAuthnError> {
    let mut reader = input;
    let value: Value = ciborium::de::from_reader(&mut reader)
        .map_err(|e| WebAuthnError::MalformedInput(format!("invalid CBOR: {e}")))?;
    Ok((value, input.len() - reader.len()))
}

/// Look up an integer label in a CBOR map, the COSE key convention.
#[must_use]
pub fn map_get_int<'a>(map: &'a [(Value, Value)], label: i64) -> Option<&'a Value> {
    let key = Value::Integer(label.into());
    map.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
}

/// Look up a text label in a CBOR map, the attestation object convention.
#[must_use]
pub fn map_get_text<'a>(map: &'a [(Value, Value)], label: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(label))
        .map(|(_, v)| v)
}

/// Extract an i64 from a CBOR integer value.
#[must_use]
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(int) => i64::try_from(i128::from(*int)).ok(),
        _ => None,
    }
}
