//! Authenticator data parsing
//!
//! The authenticator data layout is a fixed 37-byte prefix followed by two
//! optional sections gated on flag bits:
//!
//! ```text
//! rpIdHash(32) || flags(1) || signCount(4, big-endian)
//!   || [ aaguid(16) || credentialIdLength(2, big-endian) || credentialId || COSE key ]   (AT)
//!   || [ CBOR extensions map ]                                                          (ED)
//! ```
//!
//! Parsing is exact: every byte must belong to one of the sections above.

use ciborium::value::Value;

use super::codec;
use super::cose::CoseKey;
use super::{Bytes, WebAuthnError};

/// Flag bits in byte 32 of the authenticator data.
pub mod flags {
    /// User present.
    pub const UP: u8 = 0x01;
    /// User verified.
    pub const UV: u8 = 0x04;
    /// Backup eligible.
    pub const BE: u8 = 0x08;
    /// Backed up.
    pub const BS: u8 = 0x10;
    /// Attested credential data included.
    pub const AT: u8 = 0x40;
    /// Extension data included.
    pub const ED: u8 = 0x80;
}

/// Credential IDs longer than this are not valid per the CTAP2 bound.
const MAX_CREDENTIAL_ID_LEN: usize = 1023;

/// The attested credential data section, present iff the AT flag is set.
#[derive(Debug, Clone)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Bytes,
    pub credential_public_key: CoseKey,
}

/// Parsed authenticator data.
#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential_data: Option<AttestedCredentialData>,
    pub extensions: Option<Value>,
}

impl AuthenticatorData {
    /// Parse the binary authenticator data layout.
    ///
    /// # Errors
    /// Returns `MalformedAuthenticatorData` on a short buffer, a credential
    /// ID longer than 1023 bytes, or bytes not claimed by any section.
    pub fn parse(input: &[u8]) -> Result<Self, WebAuthnError> {
        if input.len() < 37 {
            return Err(malformed(format!(
                "{} bytes is shorter than the fixed prefix",
                input.len()
            )));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&input[..32]);
        let flag_bits = input[32];
        let sign_count = u32::from_be_bytes([input[33], input[34], input[35], input[36]]);
        let mut pos = 37;

        let attested_credential_data = if flag_bits & flags::AT != 0 {
            let (attested, consumed) = parse_attested_credential_data(&input[pos..])?;
            pos += consumed;
            Some(attested)
        } else {
            None
        };

        let extensions = if flag_bits & flags::ED != 0 {
            let (value, consumed) = codec::cbor_decode_prefix(&input[pos..])
                .map_err(|e| malformed(format!("extensions: {e}")))?;
            if !value.is_map() {
                return Err(malformed("extensions are not a CBOR map".into()));
            }
            pos += consumed;
            Some(value)
        } else {
            None
        };

        if pos != input.len() {
            return Err(malformed(format!(
                "{} trailing bytes after authenticator data",
                input.len() - pos
            )));
        }

        Ok(Self {
            rp_id_hash,
            flags: flag_bits,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }

    #[must_use]
    pub fn user_present(&self) -> bool {
        self.flags & flags::UP != 0
    }

    #[must_use]
    pub fn user_verified(&self) -> bool {
        self.flags & flags::UV != 0
    }

    #[must_use]
    pub fn backup_eligible(&self) -> bool {
        self.flags & flags::BE != 0
    }

    #[must_use]
    pub fn backed_up(&self) -> bool {
        self.flags & flags::BS != 0
    }
}

fn parse_attested_credential_data(
    input: &[u8],
) -> Result<(AttestedCredentialData, usize), WebAuthnError> {
    if input.len() < 18 {
        return Err(malformed("attested credential data is truncated".into()));
    }

    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&input[..16]);
    let id_len = usize::from(u16::from_be_bytes([input[16], input[17]]));
    if id_len > MAX_CREDENTIAL_ID_LEN {
        return Err(malformed(format!(
            "credential ID length {id_len} exceeds {MAX_CREDENTIAL_ID_LEN}"
        )));
    }
    if input.len() < 18 + id_len {
        return Err(malformed("credential ID is truncated".into()));
    }

    let credential_id = Bytes::from(&input[18..18 + id_len]);
    let (credential_public_key, key_len) = CoseKey::parse_prefix(&input[18 + id_len..])
        .map_err(|e| malformed(format!("credential public key: {e}")))?;

    let attested = AttestedCredentialData {
        aaguid,
        credential_id,
        credential_public_key,
    };
    Ok((attested, 18 + id_len + key_len))
}

fn malformed(msg: String) -> WebAuthnError {
    WebAuthnError::MalformedAuthenticatorData(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cose_key() -> Vec<u8> {
        let map = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer((-7).into())),
            (Value::Integer((-1).into()), Value::Integer(1.into())),
            (Value::Integer((-2).into()), Value::Bytes(vec![0x11; 32])),
            (Value::Integer((-3).into()), Value::Bytes(vec![0x22; 32])),
        ]);
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&map, &mut buf).unwrap();
        buf
    }

    fn auth_data_with_credential(credential_id: &[u8], flag_bits: u8) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&[0xcd; 32]);
        data.push(flag_bits);
        data.extend_from_slice(&7u32.to_be_bytes());
        data.extend_from_slice(&[0xaa; 16]);
        data.extend_from_slice(&u16::try_from(credential_id.len()).unwrap().to_be_bytes());
        data.extend_from_slice(credential_id);
        data.extend_from_slice(&sample_cose_key());
        data
    }

    #[test]
    fn parses_the_fixed_prefix() {
        let mut data = vec![0xab; 32];
        data.push(flags::UP | flags::UV);
        data.extend_from_slice(&42u32.to_be_bytes());

        let parsed = AuthenticatorData::parse(&data).unwrap();
        assert_eq!(parsed.rp_id_hash, [0xab; 32]);
        assert_eq!(parsed.sign_count, 42);
        assert!(parsed.user_present());
        assert!(parsed.user_verified());
        assert!(!parsed.backup_eligible());
        assert!(parsed.attested_credential_data.is_none());
        assert!(parsed.extensions.is_none());
    }

    #[test]
    fn rejects_short_input() {
        let err = AuthenticatorData::parse(&[0u8; 36]).unwrap_err();
        assert!(matches!(err, WebAuthnError::MalformedAuthenticatorData(_)));
    }

    #[test]
    fn parses_attested_credential_data() {
        let data = auth_data_with_credential(&[0x42; 20], flags::UP | flags::AT);
        let parsed = AuthenticatorData::parse(&data).unwrap();
        let attested = parsed.attested_credential_data.unwrap();
        assert_eq!(attested.aaguid, [0xaa; 16]);
        assert_eq!(attested.credential_id.as_slice(), &[0x42; 20]);
        assert_eq!(attested.credential_public_key.alg(), -7);
    }

    #[test]
    fn credential_id_boundary_is_1023_bytes() {
        let ok = auth_data_with_credential(&vec![0x01; 1023], flags::UP | flags::AT);
        assert!(AuthenticatorData::parse(&ok).is_ok());

        let too_long = auth_data_with_credential(&vec![0x01; 1024], flags::UP | flags::AT);
        let err = AuthenticatorData::parse(&too_long).unwrap_err();
        assert!(matches!(err, WebAuthnError::MalformedAuthenticatorData(_)));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut data = auth_data_with_credential(&[0x42; 8], flags::UP | flags::AT);
        data.push(0x00);
        let err = AuthenticatorData::parse(&data).unwrap_err();
        assert!(matches!(err, WebAuthnError::MalformedAuthenticatorData(_)));
    }

    #[test]
    fn parses_extensions_when_ed_is_set() {
        let mut data = vec![0xab; 32];
        data.push(flags::UP | flags::ED);
        data.extend_from_slice(&0u32.to_be_bytes());
        let map = Value::Map(vec![(
            Value::Text("credProtect".into()),
            Value::Integer(2.into()),
        )]);
        ciborium::ser::into_writer(&map, &mut data).unwrap();

        let parsed = AuthenticatorData::parse(&data).unwrap();
        assert!(parsed.extensions.unwrap().is_map());
    }
}
