//! Test fixtures providing pre-built test objects
//!
//! [`TestPasskey`] plays the browser and authenticator: it produces
//! registration results with a real CBOR attestation object and assertions
//! with real DER ECDSA signatures.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ciborium::value::Value;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};

use super::constants::{TEST_ORIGIN, TEST_RP_ID};
use crate::keystore::KeyStore;
use crate::ledger::LedgerClient;
use crate::session::SessionOrchestrator;
use crate::webauthn::{
    sha256, AuthenticationResponse, AuthenticatorAssertionResponse,
    AuthenticatorAttestationResponse, RegistrationResponse, WebAuthnService, WebAuthnSettings,
    CEREMONY_CREATE, CEREMONY_GET,
};

/// User present + user verified
const FLAGS_ASSERTION: u8 = 0x05;
/// User present + user verified + attested credential data
const FLAGS_ATTESTATION: u8 = 0x45;

/// Central fixture provider for services
pub struct TestFixtures;

impl TestFixtures {
    /// Relying-party settings matching [`TestPasskey`]
    #[must_use]
    pub fn webauthn_settings() -> WebAuthnSettings {
        WebAuthnSettings {
            rp_id: TEST_RP_ID.to_string(),
            rp_origin: TEST_ORIGIN.to_string(),
            ..WebAuthnSettings::default()
        }
    }

    #[must_use]
    pub fn webauthn_service() -> WebAuthnService {
        WebAuthnService::new(Self::webauthn_settings())
    }

    /// Orchestrator over an in-memory key store
    #[must_use]
    pub fn orchestrator(ledger: Arc<dyn LedgerClient>) -> SessionOrchestrator {
        Self::orchestrator_with_store(Arc::new(KeyStore::in_memory()), ledger)
    }

    #[must_use]
    pub fn orchestrator_with_store(
        keystore: Arc<KeyStore>,
        ledger: Arc<dyn LedgerClient>,
    ) -> SessionOrchestrator {
        SessionOrchestrator::new(keystore, ledger, Self::webauthn_service())
    }
}

/// Deterministic platform authenticator holding one ES256 credential
#[derive(Debug, Clone)]
pub struct TestPasskey {
    credential_id: Vec<u8>,
    signing_key: SigningKey,
}

impl TestPasskey {
    /// Passkey whose key is derived from `credential_id`
    ///
    /// # Panics
    ///
    /// Panics if the derived scalar is not a valid P-256 secret, which does
    /// not happen for practical inputs.
    #[must_use]
    pub fn new(credential_id: &[u8]) -> Self {
        let mut seed = b"passvote-test-passkey:".to_vec();
        seed.extend_from_slice(credential_id);
        Self {
            credential_id: credential_id.to_vec(),
            signing_key: SigningKey::from_slice(&sha256(&seed)).unwrap(),
        }
    }

    /// Base64URL credential ID
    #[must_use]
    pub fn credential_id(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.credential_id)
    }

    /// Uncompressed SEC1 public key
    #[must_use]
    pub fn public_key_sec1(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// Registration result for `challenge` as the browser would post it
    #[must_use]
    pub fn registration_response(&self, challenge: &str, origin: &str) -> RegistrationResponse {
        let point = self.public_key_sec1();
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        x.copy_from_slice(&point[1..33]);
        y.copy_from_slice(&point[33..65]);
        self.registration_response_with_coordinates(challenge, origin, x, y)
    }

    /// Registration result carrying arbitrary key coordinates
    ///
    /// # Panics
    ///
    /// Panics if CBOR serialization fails.
    #[must_use]
    pub fn registration_response_with_coordinates(
        &self,
        challenge: &str,
        origin: &str,
        x: [u8; 32],
        y: [u8; 32],
    ) -> RegistrationResponse {
        let cose_key = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer((-7).into())),
            (Value::Integer((-1).into()), Value::Integer(1.into())),
            (Value::Integer((-2).into()), Value::Bytes(x.to_vec())),
            (Value::Integer((-3).into()), Value::Bytes(y.to_vec())),
        ]);
        let mut cose_bytes = Vec::new();
        ciborium::ser::into_writer(&cose_key, &mut cose_bytes).unwrap();

        let id_len = u16::try_from(self.credential_id.len()).unwrap();
        let mut auth_data = Self::authenticator_data(FLAGS_ATTESTATION, 0);
        auth_data.extend_from_slice(&[0u8; 16]);
        auth_data.extend_from_slice(&id_len.to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&cose_bytes);

        let attestation = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(Vec::new())),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut attestation_bytes = Vec::new();
        ciborium::ser::into_writer(&attestation, &mut attestation_bytes).unwrap();

        RegistrationResponse {
            id: self.credential_id(),
            raw_id: self.credential_id(),
            response: AuthenticatorAttestationResponse {
                client_data_json: URL_SAFE_NO_PAD
                    .encode(Self::client_data_json(CEREMONY_CREATE, challenge, origin)),
                attestation_object: URL_SAFE_NO_PAD.encode(attestation_bytes),
            },
            client_extension_results: None,
            r#type: "public-key".to_string(),
        }
    }

    /// Assertion over `challenge` with a DER signature
    #[must_use]
    pub fn sign_challenge(&self, challenge: &str, origin: &str) -> AuthenticationResponse {
        let client_data_json = Self::client_data_json(CEREMONY_GET, challenge, origin);
        let authenticator_data = Self::authenticator_data(FLAGS_ASSERTION, 1);

        let mut message = authenticator_data.clone();
        message.extend_from_slice(&sha256(client_data_json.as_bytes()));
        let signature: Signature = self.signing_key.sign(&message);

        AuthenticationResponse {
            id: self.credential_id(),
            raw_id: self.credential_id(),
            response: AuthenticatorAssertionResponse {
                client_data_json: URL_SAFE_NO_PAD.encode(client_data_json),
                authenticator_data: URL_SAFE_NO_PAD.encode(authenticator_data),
                signature: URL_SAFE_NO_PAD.encode(signature.to_der().as_bytes()),
                user_handle: None,
            },
            client_extension_results: None,
            r#type: "public-key".to_string(),
        }
    }

    fn authenticator_data(flags: u8, counter: u32) -> Vec<u8> {
        let mut data = sha256(TEST_RP_ID.as_bytes()).to_vec();
        data.push(flags);
        data.extend_from_slice(&counter.to_be_bytes());
        data
    }

    fn client_data_json(ceremony: &str, challenge: &str, origin: &str) -> String {
        serde_json::json!({
            "type": ceremony,
            "challenge": challenge,
            "origin": origin,
            "crossOrigin": false,
        })
        .to_string()
    }
}
