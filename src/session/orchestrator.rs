//! Session façade over the wallet pipelines
//!
//! [`SessionOrchestrator`] owns the session state and runs one action at a
//! time. The state mutex is only held for short synchronous sections and
//! never across an `.await`; the in-flight slot is what serializes actions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::guard::{ActionGuard, ActionKind};
use super::state::{SessionPhase, SessionSnapshot, SessionState};
use crate::deploy::ContractDeploymentCoordinator;
use crate::derivation;
use crate::error::WalletError;
use crate::funding::{BundlerProvision, LedgerFundingService};
use crate::keypair::BundlerKeypair;
use crate::keystore::{DeployeeAddress, KeyStore};
use crate::ledger::{LedgerClient, SubmitResult, VoteChoice, VoteTally};
use crate::signing::{PresignData, TransactionSigningPipeline};
use crate::votes::VoteQueryService;
use crate::webauthn::{
    AuthenticationOptions, AuthenticationResponse, RegistrationOptions, RegistrationResponse,
    WebAuthnService,
};

/// Result of a successful signing ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub submit: SubmitResult,
    /// Tally read after submission; `None` if the read failed
    pub tally: Option<VoteTally>,
}

struct LoadedSession {
    provision: BundlerProvision,
    deployee: Option<DeployeeAddress>,
    credential_id: Option<String>,
}

pub struct SessionOrchestrator {
    keystore: Arc<KeyStore>,
    funding: LedgerFundingService,
    deployer: ContractDeploymentCoordinator,
    signing: TransactionSigningPipeline,
    votes: VoteQueryService,
    webauthn: WebAuthnService,
    state: Mutex<SessionState>,
}

impl SessionOrchestrator {
    #[must_use]
    pub fn new(
        keystore: Arc<KeyStore>,
        ledger: Arc<dyn LedgerClient>,
        webauthn: WebAuthnService,
    ) -> Self {
        Self {
            funding: LedgerFundingService::new(Arc::clone(&keystore), Arc::clone(&ledger)),
            deployer: ContractDeploymentCoordinator::new(Arc::clone(&ledger)),
            signing: TransactionSigningPipeline::new(Arc::clone(&ledger), webauthn.clone()),
            votes: VoteQueryService::new(ledger),
            keystore,
            webauthn,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current session view
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    /// Load (or create and fund) the bundler keypair and the stored account
    ///
    /// A no-op once the session is ready.
    ///
    /// # Errors
    ///
    /// `Busy` while another action runs, `InvalidKeyMaterial` for an
    /// undecodable stored secret, `Storage` for unreadable storage. The
    /// session stays uninitialized on error.
    pub async fn init(&self) -> Result<SessionSnapshot, WalletError> {
        if self.lock().phase == SessionPhase::Ready {
            return Ok(self.snapshot());
        }

        let guard = ActionGuard::acquire(&self.state, ActionKind::Initialize)?;
        {
            let mut state = self.lock();
            if state.phase == SessionPhase::Ready {
                drop(state);
                drop(guard);
                return Ok(self.snapshot());
            }
            state.phase = SessionPhase::Initializing;
        }

        let loaded = self.load_session().await;

        {
            let mut state = self.lock();
            match loaded {
                Ok(loaded) => {
                    state.bundler = Some(loaded.provision.keypair);
                    state.funding = Some(loaded.provision.funding);
                    state.deployee = loaded.deployee;
                    state.credential_id = loaded.credential_id;
                    state.phase = SessionPhase::Ready;
                    log::info!(
                        "Session ready (account provisioned: {})",
                        state.deployee.is_some()
                    );
                }
                Err(e) => {
                    state.phase = SessionPhase::Uninitialized;
                    log::error!("Session initialization failed: {e}");
                    return Err(e);
                }
            }
        }
        drop(guard);

        Ok(self.snapshot())
    }

    async fn load_session(&self) -> Result<LoadedSession, WalletError> {
        let provision = self.funding.ensure_bundler_keypair().await?;
        let deployee = self.keystore.get_deployee()?;
        let credential_id = self.keystore.get_credential_id()?;
        Ok(LoadedSession {
            provision,
            deployee,
            credential_id,
        })
    }

    /// Ceremony options for registering a new passkey
    ///
    /// The challenge is remembered and checked by the next
    /// [`SessionOrchestrator::on_register`].
    #[must_use]
    pub fn registration_options(&self, user_name: &str) -> RegistrationOptions {
        let (options, challenge) = self.webauthn.registration_options(user_name);
        self.lock().registration_challenge = Some(challenge);
        options
    }

    /// Ceremony options for signing the challenge of `presign`
    #[must_use]
    pub fn authentication_options(&self, presign: &PresignData) -> AuthenticationOptions {
        let credential_id = self.lock().credential_id.clone();
        self.webauthn
            .authentication_options(&presign.challenge, credential_id.as_deref())
    }

    /// Deploy the account for a freshly registered passkey
    ///
    /// Returns the existing address without touching the ledger when the
    /// session already has an account. The in-flight slot is claimed before
    /// the session is inspected, so two registrations never both deploy.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before [`SessionOrchestrator::init`]
    /// - `Busy` while another action runs
    /// - `MalformedCredential` / `StaleChallenge` for a bad ceremony result
    /// - `DeploymentRejected` / `Ledger` when deployment fails
    /// - `Storage` when the deployed address cannot be persisted; the
    ///   address is still kept for this session
    pub async fn on_register(
        &self,
        response: &RegistrationResponse,
    ) -> Result<DeployeeAddress, WalletError> {
        let _guard = ActionGuard::acquire(&self.state, ActionKind::Register)?;

        let (bundler, expected_challenge) = {
            let mut state = self.lock();
            if state.phase != SessionPhase::Ready {
                return Err(WalletError::NotInitialized);
            }
            if let Some(existing) = &state.deployee {
                log::debug!("Account already provisioned at {existing}; skipping registration");
                return Ok(existing.clone());
            }
            let bundler = state.bundler.clone().ok_or(WalletError::NotInitialized)?;
            (bundler, state.registration_challenge.take())
        };

        self.webauthn
            .verify_registration(response, expected_challenge.as_deref())?;
        let identity = derivation::derive(response)?;

        let address = self
            .deployer
            .deploy(&bundler, &identity.contract_salt, &identity.public_key)
            .await?;

        {
            let mut state = self.lock();
            state.deployee = Some(address.clone());
            state.credential_id = Some(identity.credential_id.clone());
        }

        if let Err(e) = self
            .keystore
            .set_deployee(&address)
            .and_then(|()| self.keystore.set_credential_id(&identity.credential_id))
        {
            log::error!("Account {address} was deployed but could not be persisted: {e}");
            return Err(e.into());
        }

        Ok(address)
    }

    /// Build the vote transaction and remember it for the next signature
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `NoActiveAccount` without a deployed account, `Busy`
    /// while another action runs, `Ledger` if the transaction cannot be built.
    pub async fn prepare_sign(&self, vote: VoteChoice) -> Result<PresignData, WalletError> {
        let _guard = ActionGuard::acquire(&self.state, ActionKind::PrepareSign)?;
        let (bundler, deployee) = self.ready_account()?;

        let presign = self
            .signing
            .build(&bundler.public_key(), Some(&deployee), vote)
            .await?;
        self.lock().presign = Some(presign.clone());
        Ok(presign)
    }

    /// Finalize the prepared vote with the passkey assertion and submit it
    ///
    /// The prepared vote is consumed whatever the outcome, so a second call
    /// fails with `StaleChallenge`.
    ///
    /// # Errors
    ///
    /// `StaleChallenge` without a prepared vote, plus every error of
    /// [`TransactionSigningPipeline::finalize`].
    pub async fn on_sign(
        &self,
        result: &AuthenticationResponse,
    ) -> Result<VoteOutcome, WalletError> {
        let _guard = ActionGuard::acquire(&self.state, ActionKind::Sign)?;
        let (bundler, deployee) = self.ready_account()?;

        let presign = self.lock().presign.take().ok_or_else(|| {
            WalletError::StaleChallenge("no vote is waiting for a signature".to_string())
        })?;

        let submit = self.signing.finalize(&bundler, &presign, result).await?;
        let tally = self.votes.read(Some(&bundler), Some(&deployee)).await;

        if tally.is_some() {
            self.lock().last_vote_tally = tally;
        }

        Ok(VoteOutcome { submit, tally })
    }

    /// Forget everything: stored keys, account and in-memory state
    ///
    /// # Errors
    ///
    /// `Busy` while another action runs, `Storage` if stored values cannot be
    /// removed. In-memory state is cleared either way.
    pub fn reset(&self) -> Result<(), WalletError> {
        let guard = ActionGuard::acquire(&self.state, ActionKind::Reset)?;

        self.signing.invalidate();
        let cleared = self.keystore.clear();

        {
            let mut state = self.lock();
            let in_flight = state.in_flight;
            *state = SessionState {
                in_flight,
                ..SessionState::default()
            };
        }
        drop(guard);

        log::info!("Session reset");
        cleared.map_err(WalletError::from)
    }

    fn ready_account(&self) -> Result<(BundlerKeypair, DeployeeAddress), WalletError> {
        let state = self.lock();
        if state.phase != SessionPhase::Ready {
            return Err(WalletError::NotInitialized);
        }
        let bundler = state.bundler.clone().ok_or(WalletError::NotInitialized)?;
        let deployee = state.deployee.clone().ok_or(WalletError::NoActiveAccount)?;
        Ok((bundler, deployee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funding::FundingStatus;
    use crate::testing::{constants, FailingStore, MockLedger, TestPasskey};
    use crate::webauthn::WebAuthnSettings;

    fn webauthn() -> WebAuthnService {
        WebAuthnService::new(WebAuthnSettings {
            rp_origin: constants::TEST_ORIGIN.to_string(),
            ..WebAuthnSettings::default()
        })
    }

    fn orchestrator(keystore: KeyStore, ledger: &Arc<MockLedger>) -> SessionOrchestrator {
        SessionOrchestrator::new(Arc::new(keystore), ledger.clone(), webauthn())
    }

    async fn registered(
        ledger: &Arc<MockLedger>,
        passkey: &TestPasskey,
    ) -> SessionOrchestrator {
        let session = orchestrator(KeyStore::in_memory(), ledger);
        session.init().await.unwrap();
        let options = session.registration_options("voter");
        session
            .on_register(&passkey.registration_response(&options.challenge, constants::TEST_ORIGIN))
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn test_actions_before_init_are_rejected() {
        let ledger = Arc::new(MockLedger::new());
        let session = orchestrator(KeyStore::in_memory(), &ledger);

        assert!(matches!(
            session.prepare_sign(VoteChoice::Yes).await,
            Err(WalletError::NotInitialized)
        ));
        let passkey = TestPasskey::new(b"cred");
        assert!(matches!(
            session
                .on_register(&passkey.registration_response("c", constants::TEST_ORIGIN))
                .await,
            Err(WalletError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let ledger = Arc::new(MockLedger::new());
        let session = orchestrator(KeyStore::in_memory(), &ledger);

        let first = session.init().await.unwrap();
        let second = session.init().await.unwrap();

        assert_eq!(first.bundler_public_key, second.bundler_public_key);
        assert_eq!(first.phase, SessionPhase::Ready);
        assert_eq!(first.funding, Some(FundingStatus::Funded));
        assert_eq!(ledger.faucet_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_init_leaves_session_uninitialized() {
        let ledger = Arc::new(MockLedger::new());
        let keystore = KeyStore::in_memory();
        keystore.set_bundler_secret("garbage").unwrap();
        let session = orchestrator(keystore, &ledger);

        assert!(matches!(
            session.init().await,
            Err(WalletError::InvalidKeyMaterial(_))
        ));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Uninitialized);
        assert!(!snapshot.loading_account);
    }

    #[tokio::test]
    async fn test_prepare_sign_without_account() {
        let ledger = Arc::new(MockLedger::new());
        let session = orchestrator(KeyStore::in_memory(), &ledger);
        session.init().await.unwrap();

        assert!(matches!(
            session.prepare_sign(VoteChoice::Yes).await,
            Err(WalletError::NoActiveAccount)
        ));
    }

    #[tokio::test]
    async fn test_register_then_register_again_is_noop() {
        let ledger = Arc::new(MockLedger::new());
        let passkey = TestPasskey::new(b"register-twice");
        let session = registered(&ledger, &passkey).await;

        let first = session.snapshot().deployee.unwrap();
        let again = session
            .on_register(&passkey.registration_response("ignored", constants::TEST_ORIGIN))
            .await
            .unwrap();

        assert_eq!(first, again);
        assert_eq!(ledger.deployments().len(), 1);
    }

    #[tokio::test]
    async fn test_registration_challenge_must_match_options() {
        let ledger = Arc::new(MockLedger::new());
        let session = orchestrator(KeyStore::in_memory(), &ledger);
        session.init().await.unwrap();
        let _options = session.registration_options("voter");

        let result = session
            .on_register(
                &TestPasskey::new(b"cred").registration_response("b3RoZXI", constants::TEST_ORIGIN),
            )
            .await;

        assert!(matches!(result, Err(WalletError::StaleChallenge(_))));
        assert!(session.snapshot().deployee.is_none());
        assert_eq!(ledger.deploy_attempts(), 0);
    }

    #[tokio::test]
    async fn test_deployment_rejection_persists_nothing() {
        let ledger = Arc::new(MockLedger::new());
        ledger.reject_deployments("insufficient balance");
        let keystore = Arc::new(KeyStore::in_memory());
        let session = SessionOrchestrator::new(Arc::clone(&keystore), ledger.clone(), webauthn());
        session.init().await.unwrap();

        let result = session
            .on_register(&TestPasskey::new(b"cred").registration_response("c", constants::TEST_ORIGIN))
            .await;

        assert!(matches!(result, Err(WalletError::DeploymentRejected(_))));
        assert!(session.snapshot().deployee.is_none());
        assert_eq!(keystore.get_deployee().unwrap(), None);
        assert_eq!(keystore.get_credential_id().unwrap(), None);
    }

    #[tokio::test]
    async fn test_persist_failure_after_deploy_keeps_address_in_memory() {
        let ledger = Arc::new(MockLedger::new());
        let store = Arc::new(FailingStore::new());
        let session = orchestrator(KeyStore::new(store.clone()), &ledger);
        session.init().await.unwrap();
        store.set_fail_writes(true);

        let passkey = TestPasskey::new(b"cred");
        let result = session
            .on_register(&passkey.registration_response("c", constants::TEST_ORIGIN))
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, WalletError::Storage(_)));
        assert_eq!(
            err.phase_in(ActionKind::Register),
            crate::error::ErrorPhase::Deployment
        );

        let kept = session.snapshot().deployee.unwrap();
        let again = session
            .on_register(&passkey.registration_response("c", constants::TEST_ORIGIN))
            .await
            .unwrap();
        assert_eq!(kept, again);
        assert_eq!(ledger.deployments().len(), 1);
    }

    #[tokio::test]
    async fn test_sign_flow_updates_tally_and_consumes_presign() {
        let ledger = Arc::new(MockLedger::new());
        let passkey = TestPasskey::new(b"voter");
        let session = registered(&ledger, &passkey).await;

        let presign = session.prepare_sign(VoteChoice::Yes).await.unwrap();
        assert_eq!(session.snapshot().pending_vote, Some(VoteChoice::Yes));

        let options = session.authentication_options(&presign);
        assert_eq!(options.challenge, presign.challenge);
        assert_eq!(options.allow_credentials[0].id, passkey.credential_id());

        let assertion = passkey.sign_challenge(&presign.challenge, constants::TEST_ORIGIN);
        let outcome = session.on_sign(&assertion).await.unwrap();

        assert_eq!(outcome.tally, Some(VoteTally { yes: 1, no: 0 }));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.contract_data, Some(VoteTally { yes: 1, no: 0 }));
        assert_eq!(snapshot.pending_vote, None);

        assert!(matches!(
            session.on_sign(&assertion).await,
            Err(WalletError::StaleChallenge(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_tally_read_leaves_contract_data_unset() {
        let ledger = Arc::new(MockLedger::new());
        let passkey = TestPasskey::new(b"voter");
        let session = registered(&ledger, &passkey).await;

        let presign = session.prepare_sign(VoteChoice::No).await.unwrap();
        ledger.fail_vote_queries("rpc down");
        let outcome = session
            .on_sign(&passkey.sign_challenge(&presign.challenge, constants::TEST_ORIGIN))
            .await
            .unwrap();

        assert_eq!(outcome.tally, None);
        assert_eq!(session.snapshot().contract_data, None);
    }

    #[tokio::test]
    async fn test_overlapping_actions_are_busy() {
        let ledger = Arc::new(MockLedger::new());
        let passkey = TestPasskey::new(b"voter");
        let session = registered(&ledger, &passkey).await;

        let (first, second) = tokio::join!(
            session.prepare_sign(VoteChoice::Yes),
            session.prepare_sign(VoteChoice::No)
        );

        assert!(first.is_ok());
        assert!(matches!(
            second,
            Err(WalletError::Busy {
                requested: ActionKind::PrepareSign,
                in_flight: ActionKind::PrepareSign
            })
        ));
        assert!(!session.snapshot().loading_sign);
    }

    #[tokio::test]
    async fn test_concurrent_registrations_deploy_once() {
        let ledger = Arc::new(MockLedger::new());
        let session = orchestrator(KeyStore::in_memory(), &ledger);
        session.init().await.unwrap();
        let first = TestPasskey::new(b"first");
        let second = TestPasskey::new(b"second");

        let first_result = first.registration_response("c", constants::TEST_ORIGIN);
        let second_result = second.registration_response("c", constants::TEST_ORIGIN);

        let (a, b) = tokio::join!(
            session.on_register(&first_result),
            session.on_register(&second_result)
        );

        let deployee = a.unwrap();
        assert!(matches!(
            b,
            Err(WalletError::Busy {
                requested: ActionKind::Register,
                in_flight: ActionKind::Register
            })
        ));
        assert_eq!(ledger.deploy_attempts(), 1);
        assert_eq!(session.snapshot().deployee, Some(deployee.clone()));

        // Once the first registration is done the account is fixed
        let again = session
            .on_register(&second.registration_response("c", constants::TEST_ORIGIN))
            .await
            .unwrap();
        assert_eq!(again, deployee);
        assert_eq!(ledger.deploy_attempts(), 1);
    }

    #[tokio::test]
    async fn test_prepare_during_registration_is_busy() {
        let ledger = Arc::new(MockLedger::new());
        let session = orchestrator(KeyStore::in_memory(), &ledger);
        session.init().await.unwrap();
        let passkey = TestPasskey::new(b"registering");

        let result = passkey.registration_response("c", constants::TEST_ORIGIN);

        let (registered, prepared) = tokio::join!(
            session.on_register(&result),
            session.prepare_sign(VoteChoice::Yes)
        );

        assert!(registered.is_ok());
        assert!(matches!(
            prepared,
            Err(WalletError::Busy {
                requested: ActionKind::PrepareSign,
                in_flight: ActionKind::Register
            })
        ));
        assert_eq!(ledger.build_calls(), 0);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let ledger = Arc::new(MockLedger::new());
        let passkey = TestPasskey::new(b"voter");
        let session = registered(&ledger, &passkey).await;
        let presign = session.prepare_sign(VoteChoice::Yes).await.unwrap();

        session.reset().unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Uninitialized);
        assert!(snapshot.deployee.is_none());
        assert!(snapshot.bundler_public_key.is_none());
        assert!(matches!(
            session
                .on_sign(&passkey.sign_challenge(&presign.challenge, constants::TEST_ORIGIN))
                .await,
            Err(WalletError::NotInitialized)
        ));

        // A fresh init generates and funds a new bundler
        session.init().await.unwrap();
        assert_eq!(ledger.faucet_calls(), 2);
        assert!(session.snapshot().deployee.is_none());
    }
}
