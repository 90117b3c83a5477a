//! `WebAuthn` client data verification
//!
//! This module decodes `clientDataJSON` and checks it against the ceremony
//! type, challenge and origin the relying party expects.

use super::crypto::decode_b64url;
use super::errors::WebAuthnError;
use super::types::ClientData;

/// Ceremony type for registration
pub const CEREMONY_CREATE: &str = "webauthn.create";

/// Ceremony type for authentication
pub const CEREMONY_GET: &str = "webauthn.get";

/// Decode and parse client data JSON
///
/// # Errors
///
/// Returns an error if the data is not base64url or not valid client data JSON
pub fn parse_client_data(client_data_json_b64: &str) -> Result<ClientData, WebAuthnError> {
    let client_data_bytes = decode_b64url(client_data_json_b64)
        .map_err(|_| WebAuthnError::EncodingError("Invalid client data encoding".to_string()))?;

    serde_json::from_slice(&client_data_bytes)
        .map_err(|_| WebAuthnError::EncodingError("Invalid client data JSON".to_string()))
}

/// Verify client data JSON
///
/// # Arguments
/// * `client_data_json_b64` - Base64URL-encoded client data JSON
/// * `expected_type` - Expected type ("webauthn.create" or "webauthn.get")
/// * `expected_challenge` - Expected challenge, `None` when the ceremony
///   options were issued elsewhere
/// * `expected_origin` - Expected origin
///
/// # Errors
///
/// Returns `ChallengeMismatch` when the challenge differs and
/// `VerificationFailed` for a wrong type or origin.
pub fn verify_client_data(
    client_data_json_b64: &str,
    expected_type: &str,
    expected_challenge: Option<&str>,
    expected_origin: &str,
) -> Result<ClientData, WebAuthnError> {
    let client_data = parse_client_data(client_data_json_b64)?;

    if client_data.ceremony_type != expected_type {
        return Err(WebAuthnError::VerificationFailed(format!(
            "Invalid type, expected {expected_type}"
        )));
    }

    if let Some(expected) = expected_challenge {
        // Some clients pad the challenge; compare the canonical form
        if client_data.challenge.trim_end_matches('=') != expected.trim_end_matches('=') {
            return Err(WebAuthnError::ChallengeMismatch);
        }
    }

    if client_data.origin != expected_origin {
        return Err(WebAuthnError::VerificationFailed(
            "Origin mismatch".to_string(),
        ));
    }

    Ok(client_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn client_data(ty: &str, challenge: &str, origin: &str) -> String {
        URL_SAFE_NO_PAD.encode(format!(
            r#"{{"type":"{ty}","challenge":"{challenge}","origin":"{origin}","crossOrigin":false}}"#
        ))
    }

    #[test]
    fn test_accepts_matching_client_data() {
        let data = client_data(CEREMONY_GET, "abc", "https://vote.example");
        let parsed =
            verify_client_data(&data, CEREMONY_GET, Some("abc"), "https://vote.example").unwrap();
        assert_eq!(parsed.challenge, "abc");
    }

    #[test]
    fn test_challenge_mismatch_is_distinguished() {
        let data = client_data(CEREMONY_GET, "abc", "https://vote.example");
        assert_eq!(
            verify_client_data(&data, CEREMONY_GET, Some("xyz"), "https://vote.example")
                .unwrap_err(),
            WebAuthnError::ChallengeMismatch
        );
    }

    #[test]
    fn test_wrong_type_or_origin_fails_verification() {
        let data = client_data(CEREMONY_CREATE, "abc", "https://vote.example");
        assert!(matches!(
            verify_client_data(&data, CEREMONY_GET, Some("abc"), "https://vote.example"),
            Err(WebAuthnError::VerificationFailed(_))
        ));

        let data = client_data(CEREMONY_GET, "abc", "https://evil.example");
        assert!(matches!(
            verify_client_data(&data, CEREMONY_GET, Some("abc"), "https://vote.example"),
            Err(WebAuthnError::VerificationFailed(_))
        ));
    }

    #[test]
    fn test_challenge_check_skipped_without_expectation() {
        let data = client_data(CEREMONY_CREATE, "anything", "https://vote.example");
        assert!(verify_client_data(&data, CEREMONY_CREATE, None, "https://vote.example").is_ok());
    }
}
