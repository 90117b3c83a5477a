use std::sync::Arc;

use passvote::funding::FundingStatus;
use passvote::testing::{constants, MockLedger, TestFixtures, TestPasskey};
use passvote::{FileStore, KeyStore, SessionOrchestrator, VoteChoice};
use tempfile::TempDir;

fn session_at(dir: &TempDir, ledger: &Arc<MockLedger>) -> SessionOrchestrator {
    let store = FileStore::open(dir.path().join("wallet.json")).expect("store should open");
    TestFixtures::orchestrator_with_store(Arc::new(KeyStore::new(Arc::new(store))), ledger.clone())
}

#[tokio::test]
async fn test_bundler_keypair_survives_restart() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(MockLedger::new());

    let first = session_at(&dir, &ledger).init().await.unwrap();
    assert_eq!(first.funding, Some(FundingStatus::Funded));
    assert_eq!(ledger.faucet_calls(), 1);

    let second = session_at(&dir, &ledger).init().await.unwrap();
    assert_eq!(second.bundler_public_key, first.bundler_public_key);
    assert_eq!(second.funding, Some(FundingStatus::Existing));
    assert_eq!(ledger.faucet_calls(), 1);
}

#[tokio::test]
async fn test_failed_funding_survives_restart() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(MockLedger::new());
    ledger.fail_faucet("friendbot unavailable");

    let first = session_at(&dir, &ledger).init().await.unwrap();
    assert!(matches!(first.funding, Some(FundingStatus::Unfunded { .. })));

    let reloaded = session_at(&dir, &ledger).init().await.unwrap();
    assert_eq!(reloaded.bundler_public_key, first.bundler_public_key);
    let funding = reloaded.funding.expect("reloaded session reports funding");
    assert!(matches!(funding, FundingStatus::Unfunded { .. }));
    assert!(!funding.is_funded());
    assert_eq!(ledger.faucet_calls(), 1);
}

#[tokio::test]
async fn test_deployed_account_survives_restart() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(MockLedger::new());
    let passkey = TestPasskey::new(b"persistent-credential");

    let session = session_at(&dir, &ledger);
    session.init().await.unwrap();
    let options = session.registration_options("voter");
    let deployee = session
        .on_register(&passkey.registration_response(&options.challenge, constants::TEST_ORIGIN))
        .await
        .unwrap();
    drop(session);

    let restarted = session_at(&dir, &ledger);
    let snapshot = restarted.init().await.unwrap();
    assert_eq!(snapshot.deployee, Some(deployee));

    // The reloaded session can vote without registering again
    let presign = restarted.prepare_sign(VoteChoice::Yes).await.unwrap();
    let options = restarted.authentication_options(&presign);
    assert_eq!(options.allow_credentials[0].id, passkey.credential_id());
    restarted
        .on_sign(&passkey.sign_challenge(&presign.challenge, constants::TEST_ORIGIN))
        .await
        .unwrap();

    assert_eq!(ledger.tally().yes, 1);
    assert_eq!(ledger.deployments().len(), 1);
}

#[tokio::test]
async fn test_reset_removes_persisted_keys() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(MockLedger::new());

    let session = session_at(&dir, &ledger);
    let before = session.init().await.unwrap();
    session.reset().unwrap();
    drop(session);

    let after = session_at(&dir, &ledger).init().await.unwrap();
    assert_ne!(after.bundler_public_key, before.bundler_public_key);
    assert_eq!(after.funding, Some(FundingStatus::Funded));
    assert_eq!(ledger.faucet_calls(), 2);
}

#[tokio::test]
async fn test_corrupt_secret_needs_reset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wallet.json");
    std::fs::write(&path, r#"{"passvote:bundler_secret": "not-a-secret"}"#).unwrap();
    let ledger = Arc::new(MockLedger::new());

    let session = session_at(&dir, &ledger);
    assert!(matches!(
        session.init().await,
        Err(passvote::WalletError::InvalidKeyMaterial(_))
    ));

    session.reset().unwrap();
    let snapshot = session.init().await.unwrap();
    assert!(snapshot.bundler_public_key.is_some());
    assert_eq!(ledger.faucet_calls(), 1);
}
