//! Passkey public key derivation
//!
//! Turns a registration ceremony result into the key material the account
//! contract is deployed with: the uncompressed SEC1 P-256 point and a salt
//! that is stable for a given credential.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::PublicKey;

use crate::error::WalletError;
use crate::webauthn::{decode_b64url, extract_attested_credential, sha256, RegistrationResponse};

/// Key material derived from a registered passkey
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedIdentity {
    /// Base64URL credential ID, as the browser reports it
    pub credential_id: String,
    /// `0x04 || x || y`, 65 bytes
    pub public_key: Vec<u8>,
    /// SHA-256 of the raw credential ID
    pub contract_salt: [u8; 32],
}

/// Derive the ledger-native public key and contract salt
///
/// Deterministic and free of side effects: the same response always yields
/// the same identity.
///
/// # Errors
///
/// Returns `MalformedCredential` when the attestation object cannot be
/// decoded, lacks attested credential data, carries a key that is not a
/// valid P-256 point, or names a different credential than `rawId`.
pub fn derive(response: &RegistrationResponse) -> Result<DerivedIdentity, WalletError> {
    let attested = extract_attested_credential(&response.response.attestation_object)?;

    if attested.credential_id.is_empty() {
        return Err(WalletError::MalformedCredential(
            "credential id is empty".to_string(),
        ));
    }

    PublicKey::from_sec1_bytes(&attested.public_key).map_err(|_| {
        WalletError::MalformedCredential("public key is not a point on P-256".to_string())
    })?;

    let raw_id = decode_b64url(&response.raw_id)
        .map_err(|_| WalletError::MalformedCredential("rawId is not base64url".to_string()))?;
    if raw_id != attested.credential_id {
        return Err(WalletError::MalformedCredential(
            "rawId does not match the attested credential".to_string(),
        ));
    }

    Ok(DerivedIdentity {
        credential_id: URL_SAFE_NO_PAD.encode(&attested.credential_id),
        contract_salt: sha256(&attested.credential_id),
        public_key: attested.public_key,
    })
}
