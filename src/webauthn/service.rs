//! `WebAuthn` service implementation
//!
//! This module builds the options for the browser ceremonies and verifies
//! the client data the ceremonies return.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use uuid::Uuid;

use super::attestation::{self, CEREMONY_CREATE, CEREMONY_GET};
use super::crypto;
use super::errors::WebAuthnError;
use super::settings::WebAuthnSettings;
use super::types::{
    AuthenticationOptions, AuthenticationResponse, AuthenticatorSelectionCriteria,
    PublicKeyCredentialDescriptor, PublicKeyCredentialParameters, RegistrationOptions,
    RegistrationResponse, RelyingParty, UserEntity,
};

/// ES256 (ECDSA P-256 with SHA-256)
const ALG_ES256: i32 = -7;

/// Generate a user handle using secure random data
#[must_use]
pub fn generate_user_handle() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}

/// Core `WebAuthn` service
#[derive(Debug, Clone)]
pub struct WebAuthnService {
    settings: WebAuthnSettings,
}

impl WebAuthnService {
    /// Create a new `WebAuthnService` with the given settings
    #[must_use]
    pub fn new(settings: WebAuthnSettings) -> Self {
        Self { settings }
    }

    fn timeout_millis(&self) -> u32 {
        u32::try_from(self.settings.timeout_seconds.saturating_mul(1000)).unwrap_or(60_000)
    }

    /// Create registration options for a new passkey
    ///
    /// Returns the options together with the challenge they carry, so the
    /// caller can check it when the registration result comes back.
    #[must_use]
    pub fn registration_options(&self, user_name: &str) -> (RegistrationOptions, String) {
        let challenge = crypto::generate_challenge();

        let options = RegistrationOptions {
            challenge: challenge.clone(),
            rp: RelyingParty {
                id: self.settings.rp_id.clone(),
                name: self.settings.rp_name.clone(),
            },
            user: UserEntity {
                id: generate_user_handle(),
                name: user_name.to_string(),
                display_name: user_name.to_string(),
            },
            public_key_params: vec![PublicKeyCredentialParameters {
                r#type: "public-key".to_string(),
                alg: ALG_ES256,
            }],
            timeout: self.timeout_millis(),
            attestation: "none".to_string(),
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: self.settings.authenticator_attachment.clone(),
                resident_key: "preferred".to_string(),
                require_resident_key: false,
                user_verification: self.settings.user_verification.clone(),
            },
        };

        (options, challenge)
    }

    /// Create authentication options whose challenge is a transaction hash
    #[must_use]
    pub fn authentication_options(
        &self,
        challenge: &str,
        credential_id: Option<&str>,
    ) -> AuthenticationOptions {
        let allow_credentials = credential_id
            .map(|id| {
                vec![PublicKeyCredentialDescriptor {
                    r#type: "public-key".to_string(),
                    id: id.to_string(),
                }]
            })
            .unwrap_or_default();

        AuthenticationOptions {
            challenge: challenge.to_string(),
            timeout: self.timeout_millis(),
            rp_id: self.settings.rp_id.clone(),
            allow_credentials,
            user_verification: self.settings.user_verification.clone(),
        }
    }

    /// Verify the client data of a registration result
    ///
    /// # Errors
    ///
    /// Returns an error if the client data is malformed, is not a
    /// `webauthn.create` ceremony, carries a different challenge or origin.
    pub fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected_challenge: Option<&str>,
    ) -> Result<(), WebAuthnError> {
        attestation::verify_client_data(
            &response.response.client_data_json,
            CEREMONY_CREATE,
            expected_challenge,
            &self.settings.rp_origin,
        )?;
        Ok(())
    }

    /// Verify the client data of an authentication (signing) result
    ///
    /// # Errors
    ///
    /// Returns `ChallengeMismatch` if the assertion signed a different
    /// challenge, otherwise an error for malformed data, type or origin.
    pub fn verify_assertion(
        &self,
        response: &AuthenticationResponse,
        expected_challenge: &str,
    ) -> Result<(), WebAuthnError> {
        attestation::verify_client_data(
            &response.response.client_data_json,
            CEREMONY_GET,
            Some(expected_challenge),
            &self.settings.rp_origin,
        )?;
        Ok(())
    }
}
