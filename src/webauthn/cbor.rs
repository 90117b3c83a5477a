//! CBOR processing for `WebAuthn`
//!
//! This module handles the CBOR (Concise Binary Object Representation)
//! processing needed to pull the credential public key out of an
//! attestation object.

use super::crypto::decode_b64url;
use super::errors::WebAuthnError;
use super::types::AttestedCredential;
use ciborium::de::from_reader;
use ciborium::value::Value;

/// Attested credential data present (AT flag)
const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;

// COSE_Key labels and values (RFC 9053)
const COSE_KTY: i64 = 1;
const COSE_ALG: i64 = 3;
const COSE_EC2_CRV: i64 = -1;
const COSE_EC2_X: i64 = -2;
const COSE_EC2_Y: i64 = -3;
const COSE_KTY_EC2: i64 = 2;
const COSE_ALG_ES256: i64 = -7;
const COSE_CRV_P256: i64 = 1;

/// Extract the credential ID and P-256 public key from an attestation object
///
/// # Errors
///
/// Returns an error if the attestation object is not valid base64url/CBOR,
/// lacks `authData` or attested credential data, or carries a key that is
/// not an ES256 P-256 key.
pub fn extract_attested_credential(
    attestation_object_b64: &str,
) -> Result<AttestedCredential, WebAuthnError> {
    // 1. Decode the base64 attestation object
    let attestation_bytes = decode_b64url(attestation_object_b64)
        .map_err(|_| WebAuthnError::EncodingError("Invalid attestation encoding".to_string()))?;

    // 2. Parse CBOR
    let attestation: Value = from_reader(&attestation_bytes[..])
        .map_err(|_| WebAuthnError::EncodingError("Invalid CBOR attestation format".to_string()))?;

    // 3. Extract authData
    let Some(Some(auth_data)) = attestation.as_map().and_then(|map| {
        map.iter()
            .find(|(k, _)| k.as_text() == Some("authData"))
            .map(|(_, v)| v.as_bytes())
    }) else {
        return Err(WebAuthnError::EncodingError(
            "Missing authData in attestation".to_string(),
        ));
    };

    parse_auth_data(auth_data)
}

/// Parse binary authenticator data
///
/// The format is:
/// - 32 bytes: RP ID hash
/// - 1 byte: flags
/// - 4 bytes: signature counter
/// - attested credential data (AT flag):
///   - 16 bytes: AAGUID
///   - 2 bytes: credential ID length (L)
///   - L bytes: credential ID
///   - variable: COSE public key
fn parse_auth_data(auth_data: &[u8]) -> Result<AttestedCredential, WebAuthnError> {
    if auth_data.len() < 37 {
        return Err(WebAuthnError::EncodingError(
            "Auth data too short".to_string(),
        ));
    }

    let flags = auth_data[32];
    if (flags & FLAG_ATTESTED_CREDENTIAL_DATA) == 0 {
        return Err(WebAuthnError::EncodingError(
            "No attested credential data".to_string(),
        ));
    }

    // Skip RP ID hash, flags, counter and AAGUID
    let mut pos = 37 + 16;

    if auth_data.len() < pos + 2 {
        return Err(WebAuthnError::EncodingError(
            "Auth data too short for credential ID length".to_string(),
        ));
    }

    let id_len = (usize::from(auth_data[pos]) << 8) | usize::from(auth_data[pos + 1]);
    pos += 2;

    if id_len == 0 || auth_data.len() < pos + id_len {
        return Err(WebAuthnError::EncodingError(
            "Auth data too short for credential ID".to_string(),
        ));
    }

    let credential_id = auth_data[pos..pos + id_len].to_vec();
    pos += id_len;

    if auth_data.len() <= pos {
        return Err(WebAuthnError::EncodingError(
            "Auth data too short for public key".to_string(),
        ));
    }

    // Extension data may follow the key; the reader stops after one item.
    let cose_key: Value = from_reader(&auth_data[pos..])
        .map_err(|_| WebAuthnError::EncodingError("Invalid COSE key".to_string()))?;

    Ok(AttestedCredential {
        credential_id,
        public_key: cose_key_to_sec1(&cose_key)?,
    })
}

/// Convert an EC2 P-256 `COSE_Key` into an uncompressed SEC1 point
fn cose_key_to_sec1(cose_key: &Value) -> Result<Vec<u8>, WebAuthnError> {
    let Some(entries) = cose_key.as_map() else {
        return Err(WebAuthnError::EncodingError(
            "COSE key is not a map".to_string(),
        ));
    };

    if cose_int(entries, COSE_KTY) != Some(COSE_KTY_EC2) {
        return Err(WebAuthnError::UnsupportedKey(
            "Key type is not EC2".to_string(),
        ));
    }

    // alg is optional in COSE_Key, but when present it must be ES256
    if let Some(alg) = cose_int(entries, COSE_ALG) {
        if alg != COSE_ALG_ES256 {
            return Err(WebAuthnError::UnsupportedKey(format!(
                "Algorithm {alg} is not ES256"
            )));
        }
    }

    if cose_int(entries, COSE_EC2_CRV) != Some(COSE_CRV_P256) {
        return Err(WebAuthnError::UnsupportedKey(
            "Curve is not P-256".to_string(),
        ));
    }

    let x = cose_coordinate(entries, COSE_EC2_X, "x")?;
    let y = cose_coordinate(entries, COSE_EC2_Y, "y")?;

    let mut point = Vec::with_capacity(65);
    point.push(0x04);
    point.extend_from_slice(x);
    point.extend_from_slice(y);
    Ok(point)
}

fn cose_lookup(entries: &[(Value, Value)], label: i64) -> Option<&Value> {
    entries
        .iter()
        .find(|(k, _)| k.as_integer().map(i128::from) == Some(i128::from(label)))
        .map(|(_, v)| v)
}

fn cose_int(entries: &[(Value, Value)], label: i64) -> Option<i64> {
    cose_lookup(entries, label)
        .and_then(Value::as_integer)
        .and_then(|i| i64::try_from(i128::from(i)).ok())
}

fn cose_coordinate<'a>(
    entries: &'a [(Value, Value)],
    label: i64,
    name: &str,
) -> Result<&'a [u8], WebAuthnError> {
    match cose_lookup(entries, label).and_then(Value::as_bytes) {
        Some(bytes) if bytes.len() == 32 => Ok(bytes.as_slice()),
        Some(_) => Err(WebAuthnError::EncodingError(format!(
            "COSE {name} coordinate must be 32 bytes"
        ))),
        None => Err(WebAuthnError::EncodingError(format!(
            "Missing COSE {name} coordinate"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use ciborium::ser::into_writer;

    fn cose_key(kty: i64, crv: i64, x_len: usize) -> Vec<u8> {
        let key = Value::Map(vec![
            (Value::Integer(COSE_KTY.into()), Value::Integer(kty.into())),
            (Value::Integer(COSE_ALG.into()), Value::Integer(COSE_ALG_ES256.into())),
            (Value::Integer(COSE_EC2_CRV.into()), Value::Integer(crv.into())),
            (Value::Integer(COSE_EC2_X.into()), Value::Bytes(vec![0x11; x_len])),
            (Value::Integer(COSE_EC2_Y.into()), Value::Bytes(vec![0x22; 32])),
        ]);
        let mut out = Vec::new();
        into_writer(&key, &mut out).unwrap();
        out
    }

    fn auth_data(flags: u8, credential_id: &[u8], key: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; 32];
        data.push(flags);
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&u16::try_from(credential_id.len()).unwrap().to_be_bytes());
        data.extend_from_slice(credential_id);
        data.extend_from_slice(key);
        data
    }

    fn attestation(auth_data: Vec<u8>) -> String {
        let object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut out = Vec::new();
        into_writer(&object, &mut out).unwrap();
        URL_SAFE_NO_PAD.encode(out)
    }

    #[test]
    fn test_extracts_uncompressed_point_and_credential_id() {
        let encoded = attestation(auth_data(0x45, b"cred-1", &cose_key(2, 1, 32)));
        let credential = extract_attested_credential(&encoded).unwrap();

        assert_eq!(credential.credential_id, b"cred-1".to_vec());
        assert_eq!(credential.public_key.len(), 65);
        assert_eq!(credential.public_key[0], 0x04);
        assert_eq!(&credential.public_key[1..33], &[0x11; 32]);
        assert_eq!(&credential.public_key[33..], &[0x22; 32]);
    }

    #[test]
    fn test_rejects_missing_attested_data_flag() {
        let encoded = attestation(auth_data(0x01, b"cred-1", &cose_key(2, 1, 32)));
        assert!(matches!(
            extract_attested_credential(&encoded),
            Err(WebAuthnError::EncodingError(_))
        ));
    }

    #[test]
    fn test_rejects_non_p256_keys() {
        let okp = attestation(auth_data(0x45, b"cred-1", &cose_key(1, 6, 32)));
        assert!(matches!(
            extract_attested_credential(&okp),
            Err(WebAuthnError::UnsupportedKey(_))
        ));

        let short_x = attestation(auth_data(0x45, b"cred-1", &cose_key(2, 1, 31)));
        assert!(matches!(
            extract_attested_credential(&short_x),
            Err(WebAuthnError::EncodingError(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(extract_attested_credential("!!!").is_err());
        assert!(extract_attested_credential(&URL_SAFE_NO_PAD.encode(b"not cbor")).is_err());
    }
}
