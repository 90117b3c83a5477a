//! Mock objects and fake implementations for testing
//!
//! [`MockLedger`] behaves like the relay plus the account contract: it checks
//! the bundler's ed25519 signature and the passkey's P-256 signature before
//! counting a vote, so tests exercise the real signing path end to end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};

use super::constants::{TEST_START_LEDGER, TEST_VALIDITY_WINDOW};
use crate::error::StorageError;
use crate::keypair::{verify_signature, BundlerKeypair};
use crate::keystore::{KeyValueStore, MemoryStore};
use crate::ledger::{
    BuiltAuthTransaction, LedgerClient, LedgerError, SignedTransaction, SubmitResult, VoteChoice,
    VoteTally,
};
use crate::webauthn::{decode_b64url, parse_client_data, sha256};

/// A recorded deployment request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub salt: [u8; 32],
    pub public_key: Vec<u8>,
    /// `G…` key of the bundler that paid for it
    pub funded_by: String,
}

#[derive(Debug, Clone)]
struct PendingTransaction {
    account: String,
    vote: VoteChoice,
    hash: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockLedgerState {
    latest_ledger: u32,
    nonce: u64,

    faucet_calls: usize,
    faucet_failure: Option<String>,

    deploy_attempts: usize,
    deployments: Vec<Deployment>,
    deploy_rejection: Option<String>,
    /// Account address -> passkey public key
    accounts: HashMap<String, Vec<u8>>,

    build_calls: usize,
    /// Envelope -> transaction awaiting signatures
    pending: HashMap<String, PendingTransaction>,

    submissions: Vec<SignedTransaction>,
    submit_rejection: Option<String>,
    submit_outage: Option<String>,

    tally: VoteTally,
    vote_queries: usize,
    vote_query_failure: Option<String>,
}

/// In-memory ledger
#[derive(Debug)]
pub struct MockLedger {
    state: Mutex<MockLedgerState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockLedgerState {
                latest_ledger: TEST_START_LEDGER,
                ..MockLedgerState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockLedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every faucet call fail with `reason`
    pub fn fail_faucet(&self, reason: &str) {
        self.lock().faucet_failure = Some(reason.to_string());
    }

    /// Make every deployment fail with a ledger rejection
    pub fn reject_deployments(&self, reason: &str) {
        self.lock().deploy_rejection = Some(reason.to_string());
    }

    /// Make every submission fail with a ledger rejection
    pub fn reject_submissions(&self, reason: &str) {
        self.lock().submit_rejection = Some(reason.to_string());
    }

    /// Make every submission fail as if the relay could not be reached
    pub fn drop_submissions(&self, reason: &str) {
        self.lock().submit_outage = Some(reason.to_string());
    }

    /// Make every tally read fail with a transport error
    pub fn fail_vote_queries(&self, reason: &str) {
        self.lock().vote_query_failure = Some(reason.to_string());
    }

    /// Pretend `address` is an account controlled by `public_key`
    pub fn register_account(&self, address: &str, public_key: Vec<u8>) {
        self.lock().accounts.insert(address.to_string(), public_key);
    }

    /// Move the latest closed ledger to `sequence`
    pub fn advance_ledger(&self, sequence: u32) {
        self.lock().latest_ledger = sequence;
    }

    pub fn set_tally(&self, tally: VoteTally) {
        self.lock().tally = tally;
    }

    #[must_use]
    pub fn tally(&self) -> VoteTally {
        self.lock().tally
    }

    #[must_use]
    pub fn faucet_calls(&self) -> usize {
        self.lock().faucet_calls
    }

    /// Deployment attempts, including rejected ones
    #[must_use]
    pub fn deploy_attempts(&self) -> usize {
        self.lock().deploy_attempts
    }

    /// Accepted deployments
    #[must_use]
    pub fn deployments(&self) -> Vec<Deployment> {
        self.lock().deployments.clone()
    }

    #[must_use]
    pub fn build_calls(&self) -> usize {
        self.lock().build_calls
    }

    /// Accepted submissions
    #[must_use]
    pub fn submissions(&self) -> Vec<SignedTransaction> {
        self.lock().submissions.clone()
    }

    #[must_use]
    pub fn vote_queries(&self) -> usize {
        self.lock().vote_queries
    }

    /// The account contract's `__check_auth`
    fn verify_passkey(
        public_key: &[u8],
        pending: &PendingTransaction,
        transaction: &SignedTransaction,
    ) -> Result<(), LedgerError> {
        let reject = |reason: &str| LedgerError::Rejected(reason.to_string());

        let client_data = parse_client_data(&transaction.passkey.client_data_json)
            .map_err(|_| reject("client data is unreadable"))?;
        if client_data.challenge != URL_SAFE_NO_PAD.encode(&pending.hash) {
            return Err(reject("client data signs a different payload"));
        }

        let authenticator_data = decode_b64url(&transaction.passkey.authenticator_data)
            .map_err(|_| reject("authenticator data is not base64url"))?;
        let client_data_json = decode_b64url(&transaction.passkey.client_data_json)
            .map_err(|_| reject("client data is not base64url"))?;
        let compact = decode_b64url(&transaction.passkey.signature)
            .map_err(|_| reject("signature is not base64url"))?;

        let signature = Signature::from_slice(&compact).map_err(|_| reject("signature is not r||s"))?;
        if signature.normalize_s().is_some() {
            return Err(reject("signature is not low-S"));
        }

        let key = VerifyingKey::from_sec1_bytes(public_key)
            .map_err(|_| reject("account key is invalid"))?;

        let mut message = authenticator_data;
        message.extend_from_slice(&sha256(&client_data_json));
        key.verify(&message, &signature)
            .map_err(|_| reject("passkey signature does not verify"))
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn create_funded_test_account(&self, _public_key: &str) -> Result<(), LedgerError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.faucet_calls += 1;
        match &state.faucet_failure {
            Some(reason) => Err(LedgerError::Transport(reason.clone())),
            None => Ok(()),
        }
    }

    async fn deploy_account_contract(
        &self,
        funding: &BundlerKeypair,
        salt: &[u8; 32],
        public_key: &[u8],
    ) -> Result<String, LedgerError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.deploy_attempts += 1;
        if let Some(reason) = &state.deploy_rejection {
            return Err(LedgerError::Rejected(reason.clone()));
        }

        let address = stellar_strkey::Contract(sha256(salt)).to_string();
        state.deployments.push(Deployment {
            salt: *salt,
            public_key: public_key.to_vec(),
            funded_by: funding.public_key(),
        });
        state
            .accounts
            .entry(address.clone())
            .or_insert_with(|| public_key.to_vec());
        Ok(address)
    }

    async fn build_auth_transaction(
        &self,
        source_public_key: &str,
        account: &str,
        vote: VoteChoice,
    ) -> Result<BuiltAuthTransaction, LedgerError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.build_calls += 1;
        if !state.accounts.contains_key(account) {
            return Err(LedgerError::Rejected(format!("account {account} not found")));
        }

        state.nonce += 1;
        let envelope = STANDARD.encode(format!(
            "{source_public_key}:{account}:{}:{}",
            vote.as_str(),
            state.nonce
        ));
        let hash = sha256(envelope.as_bytes()).to_vec();
        state.pending.insert(
            envelope.clone(),
            PendingTransaction {
                account: account.to_string(),
                vote,
                hash: hash.clone(),
            },
        );

        Ok(BuiltAuthTransaction {
            envelope,
            hash,
            last_ledger: state.latest_ledger + TEST_VALIDITY_WINDOW,
        })
    }

    async fn latest_ledger(&self) -> Result<u32, LedgerError> {
        tokio::task::yield_now().await;
        Ok(self.lock().latest_ledger)
    }

    async fn submit_signed_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<SubmitResult, LedgerError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if let Some(reason) = &state.submit_outage {
            return Err(LedgerError::Transport(reason.clone()));
        }
        if let Some(reason) = &state.submit_rejection {
            return Err(LedgerError::Rejected(reason.clone()));
        }

        let digest = SignedTransaction::signature_payload(&transaction.envelope, &transaction.passkey);
        if !verify_signature(&transaction.source, &digest, &transaction.source_signature) {
            return Err(LedgerError::Rejected("tx_bad_auth: source signature".to_string()));
        }

        let Some(pending) = state.pending.get(&transaction.envelope).cloned() else {
            return Err(LedgerError::Rejected("unknown or replayed envelope".to_string()));
        };
        let Some(public_key) = state.accounts.get(&pending.account) else {
            return Err(LedgerError::Rejected("account not found".to_string()));
        };
        Self::verify_passkey(public_key, &pending, transaction)?;

        state.pending.remove(&transaction.envelope);
        match pending.vote {
            VoteChoice::Yes => state.tally.yes += 1,
            VoteChoice::No => state.tally.no += 1,
        }
        state.submissions.push(transaction.clone());

        Ok(SubmitResult {
            hash: URL_SAFE_NO_PAD.encode(&pending.hash),
            status: "SUCCESS".to_string(),
            ledger: Some(state.latest_ledger),
        })
    }

    async fn query_votes(
        &self,
        _funding: &BundlerKeypair,
        _account: &str,
    ) -> Result<VoteTally, LedgerError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.vote_queries += 1;
        match &state.vote_query_failure {
            Some(reason) => Err(LedgerError::Transport(reason.clone())),
            None => Ok(state.tally),
        }
    }
}

/// Key-value store whose writes can be made to fail on demand
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FailingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose writes fail from the start
    #[must_use]
    pub fn failing_writes() -> Self {
        let store = Self::new();
        store.set_fail_writes(true);
        store
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("simulated write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.inner.remove(key)
    }
}
