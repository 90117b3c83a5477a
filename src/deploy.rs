use std::sync::Arc;

use crate::error::WalletError;
use crate::keypair::BundlerKeypair;
use crate::keystore::DeployeeAddress;
use crate::ledger::{LedgerClient, LedgerError};

/// Deploys the passkey account contract, paid for by the bundler
pub struct ContractDeploymentCoordinator {
    ledger: Arc<dyn LedgerClient>,
}

impl ContractDeploymentCoordinator {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Submit a single deployment for `public_key`
    ///
    /// There is no existence pre-check: the ledger resolves an already
    /// deployed salt to the existing address. Nothing is retried.
    ///
    /// # Errors
    ///
    /// `DeploymentRejected` when the ledger refuses the deployment, `Ledger`
    /// when it cannot be reached or answers with something other than a
    /// contract address.
    pub async fn deploy(
        &self,
        funding: &BundlerKeypair,
        contract_salt: &[u8; 32],
        public_key: &[u8],
    ) -> Result<DeployeeAddress, WalletError> {
        log::info!(
            "Deploying passkey account funded by {}",
            funding.public_key()
        );

        match self
            .ledger
            .deploy_account_contract(funding, contract_salt, public_key)
            .await
        {
            Ok(address) => {
                if stellar_strkey::Contract::from_string(&address).is_err() {
                    log::error!("Ledger returned a non-contract address {address}");
                    return Err(WalletError::Ledger(LedgerError::InvalidResponse(format!(
                        "deployment returned {address}, expected a contract address"
                    ))));
                }
                log::info!("Passkey account deployed at {address}");
                Ok(DeployeeAddress::new(address))
            }
            Err(LedgerError::Rejected(reason)) => {
                log::warn!("Deployment rejected: {reason}");
                Err(WalletError::DeploymentRejected(reason))
            }
            Err(e) => {
                log::error!("Deployment failed: {e}");
                Err(WalletError::Ledger(e))
            }
        }
    }
}
