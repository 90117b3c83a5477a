//! `WebAuthn` cryptography operations
//!
//! Challenge generation, base64url handling and conversion of assertion
//! signatures into the compact form the account contract verifies.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::ecdsa::Signature;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::errors::WebAuthnError;

/// Generate a secure random challenge
#[must_use]
pub fn generate_challenge() -> String {
    // 32 bytes of random data (256 bits)
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url, tolerating trailing padding some clients add
///
/// # Errors
///
/// Returns an error if the input is not valid base64url
pub fn decode_b64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value.trim_end_matches('='))
}

/// Convert a DER-encoded ES256 signature into 64-byte `r || s` with low S
///
/// Authenticators emit ASN.1 DER signatures and may produce either S value;
/// the on-ledger verifier only accepts the compact, low-S form.
///
/// # Errors
///
/// Returns an error if the signature is not valid DER
pub fn der_signature_to_compact(der: &[u8]) -> Result<[u8; 64], WebAuthnError> {
    let signature = Signature::from_der(der)
        .map_err(|_| WebAuthnError::EncodingError("Invalid DER signature".to_string()))?;
    let signature = signature.normalize_s().unwrap_or(signature);

    let mut compact = [0u8; 64];
    compact.copy_from_slice(&signature.to_bytes());
    Ok(compact)
}

/// Hash data using SHA-256
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}
