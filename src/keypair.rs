//! Bundler keypair
//!
//! The bundler is the locally held ed25519 identity that pays ledger fees and
//! funds deployments for the passkey account. Keys travel in the ledger's
//! strkey encoding: `G…` for public keys and `S…` for secret seeds.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use stellar_strkey::ed25519::{PrivateKey, PublicKey};

use crate::error::WalletError;

/// Relaying keypair that pays for and authorizes ledger operations
#[derive(Clone)]
pub struct BundlerKeypair {
    signing_key: SigningKey,
}

impl BundlerKeypair {
    /// Generate a new random keypair
    #[must_use]
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Build a keypair from a raw 32-byte seed
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Reconstruct a keypair from its `S…` secret
    ///
    /// # Errors
    ///
    /// Returns `InvalidKeyMaterial` if the secret is empty or not a valid
    /// ed25519 secret seed. The secret itself is never echoed in the error.
    pub fn from_secret(secret: &str) -> Result<Self, WalletError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(WalletError::InvalidKeyMaterial(
                "secret is empty".to_string(),
            ));
        }

        let private = PrivateKey::from_string(secret).map_err(|_| {
            WalletError::InvalidKeyMaterial("secret is not a valid ed25519 seed".to_string())
        })?;
        Ok(Self::from_seed(private.0))
    }

    /// `G…` encoded public key
    #[must_use]
    pub fn public_key(&self) -> String {
        PublicKey(self.signing_key.verifying_key().to_bytes()).to_string()
    }

    /// `S…` encoded secret seed
    #[must_use]
    pub fn secret_key(&self) -> String {
        PrivateKey(self.signing_key.to_bytes()).to_string()
    }

    /// Sign a payload with the bundler key
    #[must_use]
    pub fn sign(&self, payload: &[u8]) -> [u8; 64] {
        self.signing_key.sign(payload).to_bytes()
    }

    /// Sign a payload and return the signature as standard base64
    #[must_use]
    pub fn sign_base64(&self, payload: &[u8]) -> String {
        STANDARD.encode(self.sign(payload))
    }
}

impl fmt::Debug for BundlerKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundlerKeypair")
            .field("public_key", &self.public_key())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl PartialEq for BundlerKeypair {
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for BundlerKeypair {}

/// Verify a base64 ed25519 signature against a `G…` public key
#[must_use]
pub fn verify_signature(public_key: &str, payload: &[u8], signature_b64: &str) -> bool {
    let Ok(public) = PublicKey::from_string(public_key) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public.0) else {
        return false;
    };
    let Ok(raw) = STANDARD.decode(signature_b64) else {
        return false;
    };
    let Ok(bytes) = <[u8; 64]>::try_from(raw.as_slice()) else {
        return false;
    };

    verifying_key
        .verify(payload, &Signature::from_bytes(&bytes))
        .is_ok()
}
