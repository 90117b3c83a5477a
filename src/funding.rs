//! Bundler keypair provisioning
//!
//! A session has exactly one bundler keypair. The first session generates it,
//! persists the secret, asks the faucet to fund it and records the outcome.
//! Later sessions decode the stored secret and report the recorded outcome
//! without touching the network.

use std::sync::Arc;

use serde::Serialize;

use crate::error::WalletError;
use crate::keypair::BundlerKeypair;
use crate::keystore::KeyStore;
use crate::ledger::LedgerClient;

/// Whether the bundler account is known to hold funds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FundingStatus {
    /// Loaded from storage; an earlier session saw the faucet fund it
    Existing,
    /// Freshly generated and funded by the faucet
    Funded,
    /// The faucet call failed, now or when the keypair was generated
    Unfunded { reason: String },
    /// Loaded from storage with no recorded faucet outcome
    Unknown,
}

impl FundingStatus {
    /// Whether the account is known to hold funds
    #[must_use]
    pub fn is_funded(&self) -> bool {
        matches!(self, FundingStatus::Existing | FundingStatus::Funded)
    }
}

/// Keypair handed to the session plus what is known about its funding
#[derive(Debug, Clone)]
pub struct BundlerProvision {
    pub keypair: BundlerKeypair,
    pub funding: FundingStatus,
}

pub struct LedgerFundingService {
    keystore: Arc<KeyStore>,
    ledger: Arc<dyn LedgerClient>,
}

impl LedgerFundingService {
    #[must_use]
    pub fn new(keystore: Arc<KeyStore>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { keystore, ledger }
    }

    /// Return the stored bundler keypair, creating and funding one if needed
    ///
    /// The secret is persisted before the faucet is called so a crash during
    /// funding never produces a second keypair on the next run.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyMaterial` if the stored secret cannot be decoded
    /// - `Storage` if the store cannot be read or the new secret not written
    ///
    /// Faucet failures are not errors; they surface as
    /// [`FundingStatus::Unfunded`].
    pub async fn ensure_bundler_keypair(&self) -> Result<BundlerProvision, WalletError> {
        if let Some(secret) = self.keystore.get_bundler_secret()? {
            let keypair = BundlerKeypair::from_secret(&secret)?;
            let funding = match self.keystore.get_bundler_funded()? {
                Some(true) => FundingStatus::Existing,
                Some(false) => FundingStatus::Unfunded {
                    reason: "faucet funding failed when the keypair was created".to_string(),
                },
                None => FundingStatus::Unknown,
            };
            log::debug!(
                "Loaded stored bundler keypair {} (funded: {})",
                keypair.public_key(),
                funding.is_funded()
            );
            return Ok(BundlerProvision { keypair, funding });
        }

        let keypair = BundlerKeypair::generate();
        self.keystore.set_bundler_secret(&keypair.secret_key())?;
        log::info!("Generated bundler keypair {}", keypair.public_key());

        let funding = match self
            .ledger
            .create_funded_test_account(&keypair.public_key())
            .await
        {
            Ok(()) => {
                log::info!("Faucet funded bundler {}", keypair.public_key());
                FundingStatus::Funded
            }
            Err(e) => {
                log::warn!(
                    "Faucet funding failed for bundler {}: {e}",
                    keypair.public_key()
                );
                FundingStatus::Unfunded {
                    reason: e.to_string(),
                }
            }
        };

        if let Err(e) = self.keystore.set_bundler_funded(funding.is_funded()) {
            log::warn!("Could not record the faucet outcome for the bundler: {e}");
        }

        Ok(BundlerProvision { keypair, funding })
    }
}
