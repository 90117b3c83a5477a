//! Vote transaction signing pipeline
//!
//! Signing is split around the browser ceremony:
//!
//! 1. [`TransactionSigningPipeline::build`] asks the ledger for the
//!    authorization transaction and returns [`PresignData`] whose challenge
//!    is the transaction hash.
//! 2. The browser signs that challenge with the passkey.
//! 3. [`TransactionSigningPipeline::finalize`] checks the assertion belongs to
//!    the outstanding attempt, attaches it, adds the bundler signature and
//!    submits.
//!
//! Only the most recently built attempt can be finalized, and only once.

use std::sync::{Arc, Mutex, PoisonError};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::WalletError;
use crate::keypair::BundlerKeypair;
use crate::keystore::DeployeeAddress;
use crate::ledger::{
    AuthTransaction, LedgerClient, LedgerError, PasskeySignature, SignedTransaction, SubmitResult,
    VoteChoice,
};
use crate::webauthn::{
    decode_b64url, der_signature_to_compact, AuthenticationResponse, WebAuthnService,
};

/// Output of the build phase, consumed by exactly one finalize
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignData {
    pub attempt_id: u64,
    pub auth_txn: AuthTransaction,
    /// Base64URL (unpadded) transaction hash the passkey must sign
    pub challenge: String,
    pub last_ledger: u32,
    pub vote: VoteChoice,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct AttemptTracker {
    last_issued: u64,
    outstanding: Option<u64>,
}

pub struct TransactionSigningPipeline {
    ledger: Arc<dyn LedgerClient>,
    webauthn: WebAuthnService,
    attempts: Mutex<AttemptTracker>,
}

impl TransactionSigningPipeline {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>, webauthn: WebAuthnService) -> Self {
        Self {
            ledger,
            webauthn,
            attempts: Mutex::new(AttemptTracker::default()),
        }
    }

    /// Build the authorization transaction for `vote`
    ///
    /// Any previously built attempt stops being finalizable.
    ///
    /// # Errors
    ///
    /// `NoActiveAccount` when no account is deployed, `Ledger` when the
    /// transaction cannot be built.
    pub async fn build(
        &self,
        bundler_public_key: &str,
        deployee: Option<&DeployeeAddress>,
        vote: VoteChoice,
    ) -> Result<PresignData, WalletError> {
        let deployee = deployee.ok_or(WalletError::NoActiveAccount)?;

        let built = self
            .ledger
            .build_auth_transaction(bundler_public_key, deployee.as_str(), vote)
            .await?;

        let attempt_id = {
            let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
            attempts.last_issued += 1;
            attempts.outstanding = Some(attempts.last_issued);
            attempts.last_issued
        };

        log::debug!(
            "Built vote transaction attempt {attempt_id} for {deployee}, valid until ledger {}",
            built.last_ledger
        );

        Ok(PresignData {
            attempt_id,
            auth_txn: AuthTransaction {
                envelope: built.envelope,
            },
            challenge: URL_SAFE_NO_PAD.encode(&built.hash),
            last_ledger: built.last_ledger,
            vote,
            created_at: Utc::now(),
        })
    }

    /// Attach the passkey assertion to `presign`, countersign and submit
    ///
    /// The attempt is consumed on entry: whatever the outcome, the same
    /// presign data cannot be finalized again.
    ///
    /// # Errors
    ///
    /// - `StaleChallenge` if `presign` is not the outstanding attempt or the
    ///   assertion signed a different challenge
    /// - `MalformedCredential` for undecodable assertions or a foreign origin
    /// - `TransactionExpired` if the ledger moved past `last_ledger`
    /// - `SubmissionRejected` if the ledger refuses the signed transaction
    /// - `Ledger` if the ledger cannot be reached. When this happens during
    ///   submission the outcome is unknown: the transaction may still land,
    ///   and the attempt is already consumed, so a retry starts from `build`.
    pub async fn finalize(
        &self,
        bundler: &BundlerKeypair,
        presign: &PresignData,
        result: &AuthenticationResponse,
    ) -> Result<SubmitResult, WalletError> {
        self.consume_attempt(presign.attempt_id)?;

        self.webauthn.verify_assertion(result, &presign.challenge)?;

        let current_ledger = self.ledger.latest_ledger().await?;
        if current_ledger > presign.last_ledger {
            log::warn!(
                "Attempt {} expired: ledger {current_ledger} is past {}",
                presign.attempt_id,
                presign.last_ledger
            );
            return Err(WalletError::TransactionExpired {
                last_ledger: presign.last_ledger,
                current_ledger,
            });
        }

        let der = decode_b64url(&result.response.signature).map_err(|_| {
            WalletError::MalformedCredential("assertion signature is not base64url".to_string())
        })?;
        let compact = der_signature_to_compact(&der)?;

        decode_b64url(&result.response.authenticator_data).map_err(|_| {
            WalletError::MalformedCredential("authenticator data is not base64url".to_string())
        })?;

        let passkey = PasskeySignature {
            credential_id: result.raw_id.clone(),
            authenticator_data: result.response.authenticator_data.clone(),
            client_data_json: result.response.client_data_json.clone(),
            signature: URL_SAFE_NO_PAD.encode(compact),
        };
        let transaction = SignedTransaction::assemble(bundler, &presign.auth_txn, passkey);

        let submitted = match self.ledger.submit_signed_transaction(&transaction).await {
            Ok(submitted) => submitted,
            Err(LedgerError::Rejected(reason)) => {
                log::warn!("Vote transaction rejected: {reason}");
                return Err(WalletError::SubmissionRejected(reason));
            }
            Err(e) => return Err(WalletError::Ledger(e)),
        };

        if matches!(submitted.status.to_ascii_uppercase().as_str(), "FAILED" | "ERROR") {
            log::warn!("Vote transaction {} finished with {}", submitted.hash, submitted.status);
            return Err(WalletError::SubmissionRejected(format!(
                "transaction {} finished with status {}",
                submitted.hash, submitted.status
            )));
        }

        log::info!(
            "Submitted vote transaction {} ({})",
            submitted.hash,
            submitted.status
        );
        Ok(submitted)
    }

    /// Forget the outstanding attempt
    pub fn invalidate(&self) {
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        attempts.outstanding = None;
    }

    fn consume_attempt(&self, attempt_id: u64) -> Result<(), WalletError> {
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        if attempts.outstanding == Some(attempt_id) {
            attempts.outstanding = None;
            Ok(())
        } else {
            Err(WalletError::StaleChallenge(format!(
                "attempt {attempt_id} is not the outstanding signing attempt"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{constants, MockLedger, TestPasskey};
    use crate::webauthn::WebAuthnSettings;

    struct Fixture {
        ledger: Arc<MockLedger>,
        pipeline: TransactionSigningPipeline,
        bundler: BundlerKeypair,
        deployee: DeployeeAddress,
        passkey: TestPasskey,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(MockLedger::new());
        let passkey = TestPasskey::new(b"signing-credential");
        ledger.register_account(constants::TEST_DEPLOYEE, passkey.public_key_sec1());

        let webauthn = WebAuthnService::new(WebAuthnSettings {
            rp_origin: constants::TEST_ORIGIN.to_string(),
            ..WebAuthnSettings::default()
        });

        Fixture {
            pipeline: TransactionSigningPipeline::new(ledger.clone(), webauthn),
            ledger,
            bundler: BundlerKeypair::from_seed([2u8; 32]),
            deployee: DeployeeAddress::new(constants::TEST_DEPLOYEE),
            passkey,
        }
    }

    #[tokio::test]
    async fn test_build_without_account_fails() {
        let f = fixture();
        let result = f
            .pipeline
            .build(&f.bundler.public_key(), None, VoteChoice::Yes)
            .await;
        assert!(matches!(result, Err(WalletError::NoActiveAccount)));
        assert_eq!(f.ledger.build_calls(), 0);
    }

    #[tokio::test]
    async fn test_build_then_finalize_submits_once() {
        let f = fixture();
        let presign = f
            .pipeline
            .build(&f.bundler.public_key(), Some(&f.deployee), VoteChoice::Yes)
            .await
            .unwrap();
        let assertion = f.passkey.sign_challenge(&presign.challenge, constants::TEST_ORIGIN);

        let submitted = f
            .pipeline
            .finalize(&f.bundler, &presign, &assertion)
            .await
            .unwrap();
        assert_eq!(submitted.status, "SUCCESS");
        assert_eq!(f.ledger.tally().yes, 1);

        // Same presign again
        let again = f.pipeline.finalize(&f.bundler, &presign, &assertion).await;
        assert!(matches!(again, Err(WalletError::StaleChallenge(_))));
        assert_eq!(f.ledger.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_newer_build_supersedes_older_attempt() {
        let f = fixture();
        let old = f
            .pipeline
            .build(&f.bundler.public_key(), Some(&f.deployee), VoteChoice::Yes)
            .await
            .unwrap();
        let new = f
            .pipeline
            .build(&f.bundler.public_key(), Some(&f.deployee), VoteChoice::No)
            .await
            .unwrap();
        assert!(new.attempt_id > old.attempt_id);

        let assertion = f.passkey.sign_challenge(&old.challenge, constants::TEST_ORIGIN);
        let result = f.pipeline.finalize(&f.bundler, &old, &assertion).await;
        assert!(matches!(result, Err(WalletError::StaleChallenge(_))));
    }

    #[tokio::test]
    async fn test_assertion_for_other_challenge_is_stale() {
        let f = fixture();
        let presign = f
            .pipeline
            .build(&f.bundler.public_key(), Some(&f.deployee), VoteChoice::Yes)
            .await
            .unwrap();
        let assertion = f.passkey.sign_challenge("b3RoZXI", constants::TEST_ORIGIN);

        let result = f.pipeline.finalize(&f.bundler, &presign, &assertion).await;
        assert!(matches!(result, Err(WalletError::StaleChallenge(_))));
        assert!(f.ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_origin_is_malformed() {
        let f = fixture();
        let presign = f
            .pipeline
            .build(&f.bundler.public_key(), Some(&f.deployee), VoteChoice::Yes)
            .await
            .unwrap();
        let assertion = f.passkey.sign_challenge(&presign.challenge, "https://evil.example");

        let result = f.pipeline.finalize(&f.bundler, &presign, &assertion).await;
        assert!(matches!(result, Err(WalletError::MalformedCredential(_))));
    }

    #[tokio::test]
    async fn test_expired_attempt_requires_rebuild() {
        let f = fixture();
        let presign = f
            .pipeline
            .build(&f.bundler.public_key(), Some(&f.deployee), VoteChoice::No)
            .await
            .unwrap();
        f.ledger.advance_ledger(presign.last_ledger + 1);
        let assertion = f.passkey.sign_challenge(&presign.challenge, constants::TEST_ORIGIN);

        let result = f.pipeline.finalize(&f.bundler, &presign, &assertion).await;
        assert!(matches!(result, Err(WalletError::TransactionExpired { .. })));

        let fresh = f
            .pipeline
            .build(&f.bundler.public_key(), Some(&f.deployee), VoteChoice::No)
            .await
            .unwrap();
        let assertion = f.passkey.sign_challenge(&fresh.challenge, constants::TEST_ORIGIN);
        f.pipeline
            .finalize(&f.bundler, &fresh, &assertion)
            .await
            .unwrap();
        assert_eq!(f.ledger.tally().no, 1);
    }

    #[tokio::test]
    async fn test_ledger_rejection_is_submission_rejected() {
        let f = fixture();
        f.ledger.reject_submissions("tx_bad_auth");
        let presign = f
            .pipeline
            .build(&f.bundler.public_key(), Some(&f.deployee), VoteChoice::Yes)
            .await
            .unwrap();
        let assertion = f.passkey.sign_challenge(&presign.challenge, constants::TEST_ORIGIN);

        let result = f.pipeline.finalize(&f.bundler, &presign, &assertion).await;
        assert!(matches!(result, Err(WalletError::SubmissionRejected(_))));
    }

    #[tokio::test]
    async fn test_unreachable_relay_consumes_the_attempt() {
        let f = fixture();
        f.ledger.drop_submissions("connection reset");
        let presign = f
            .pipeline
            .build(&f.bundler.public_key(), Some(&f.deployee), VoteChoice::Yes)
            .await
            .unwrap();
        let assertion = f.passkey.sign_challenge(&presign.challenge, constants::TEST_ORIGIN);

        let result = f.pipeline.finalize(&f.bundler, &presign, &assertion).await;
        assert!(matches!(
            result,
            Err(WalletError::Ledger(LedgerError::Transport(_)))
        ));

        let retry = f.pipeline.finalize(&f.bundler, &presign, &assertion).await;
        assert!(matches!(retry, Err(WalletError::StaleChallenge(_))));
    }

    #[tokio::test]
    async fn test_invalidate_drops_outstanding_attempt() {
        let f = fixture();
        let presign = f
            .pipeline
            .build(&f.bundler.public_key(), Some(&f.deployee), VoteChoice::Yes)
            .await
            .unwrap();
        f.pipeline.invalidate();

        let assertion = f.passkey.sign_challenge(&presign.challenge, constants::TEST_ORIGIN);
        let result = f.pipeline.finalize(&f.bundler, &presign, &assertion).await;
        assert!(matches!(result, Err(WalletError::StaleChallenge(_))));
    }
}
