//! Ledger network boundary
//!
//! The pipelines talk to the ledger only through [`LedgerClient`]. The
//! production implementation is [`HttpLedgerClient`], which reaches a relay
//! service for contract calls and the test-network faucet for funding.

mod http;

pub use http::HttpLedgerClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keypair::BundlerKeypair;
use crate::webauthn::sha256;

/// Ledger call failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger (or relay) evaluated the request and refused it
    #[error("rejected by ledger: {0}")]
    Rejected(String),

    /// The request never got an answer
    #[error("transport error: {0}")]
    Transport(String),

    /// The answer could not be understood
    #[error("invalid ledger response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LedgerError::InvalidResponse(err.to_string())
        } else {
            LedgerError::Transport(err.to_string())
        }
    }
}

/// The vote cast by a signed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Yes,
    No,
}

impl VoteChoice {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VoteChoice::Yes => "yes",
            VoteChoice::No => "no",
        }
    }
}

/// Snapshot of the vote contract's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub yes: u64,
    pub no: u64,
}

/// Authorization transaction as returned by the ledger, before signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltAuthTransaction {
    /// Opaque, base64 transaction envelope
    pub envelope: String,
    /// Hash of the authorization payload; this is the passkey challenge
    pub hash: Vec<u8>,
    /// Last ledger sequence at which the transaction is valid
    pub last_ledger: u32,
}

/// Opaque transaction envelope carried between build and finalize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTransaction {
    pub envelope: String,
}

/// Passkey assertion attached to an authorization transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasskeySignature {
    /// Base64URL credential ID that produced the assertion
    pub credential_id: String,
    /// Base64URL authenticator data
    pub authenticator_data: String,
    /// Base64URL client data JSON
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    /// Base64URL 64-byte `r || s` signature, low-S normalized
    pub signature: String,
}

/// Fully signed transaction ready for submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub envelope: String,
    /// `G…` public key of the bundler paying the fee
    pub source: String,
    /// Base64 ed25519 signature over [`SignedTransaction::signature_payload`]
    pub source_signature: String,
    pub passkey: PasskeySignature,
}

impl SignedTransaction {
    /// Digest the bundler signs: the envelope bound to the passkey assertion
    #[must_use]
    pub fn signature_payload(envelope: &str, passkey: &PasskeySignature) -> [u8; 32] {
        let mut payload = Vec::with_capacity(
            envelope.len()
                + passkey.authenticator_data.len()
                + passkey.client_data_json.len()
                + passkey.signature.len(),
        );
        payload.extend_from_slice(envelope.as_bytes());
        payload.extend_from_slice(passkey.authenticator_data.as_bytes());
        payload.extend_from_slice(passkey.client_data_json.as_bytes());
        payload.extend_from_slice(passkey.signature.as_bytes());
        sha256(&payload)
    }

    /// Sign `envelope` + `passkey` with the bundler key
    #[must_use]
    pub fn assemble(
        bundler: &BundlerKeypair,
        envelope: &AuthTransaction,
        passkey: PasskeySignature,
    ) -> Self {
        let digest = Self::signature_payload(&envelope.envelope, &passkey);
        Self {
            envelope: envelope.envelope.clone(),
            source: bundler.public_key(),
            source_signature: bundler.sign_base64(&digest),
            passkey,
        }
    }
}

/// Ledger answer to a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    /// Transaction hash
    pub hash: String,
    /// Final status reported by the ledger (e.g. "SUCCESS")
    pub status: String,
    /// Ledger the transaction was included in, when known
    #[serde(default)]
    pub ledger: Option<u32>,
}

/// Operations the wallet needs from the ledger network
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Ask the test-network faucet to create and fund `public_key`
    async fn create_funded_test_account(&self, public_key: &str) -> Result<(), LedgerError>;

    /// Deploy the passkey account contract, paid for by `funding`
    ///
    /// Idempotent per `salt`: an existing account's address is returned.
    async fn deploy_account_contract(
        &self,
        funding: &BundlerKeypair,
        salt: &[u8; 32],
        public_key: &[u8],
    ) -> Result<String, LedgerError>;

    /// Build the vote authorization transaction for `account`
    async fn build_auth_transaction(
        &self,
        source_public_key: &str,
        account: &str,
        vote: VoteChoice,
    ) -> Result<BuiltAuthTransaction, LedgerError>;

    /// Latest closed ledger sequence
    async fn latest_ledger(&self) -> Result<u32, LedgerError>;

    /// Submit a fully signed transaction
    async fn submit_signed_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<SubmitResult, LedgerError>;

    /// Read the vote tally
    async fn query_votes(
        &self,
        funding: &BundlerKeypair,
        account: &str,
    ) -> Result<VoteTally, LedgerError>;
}
