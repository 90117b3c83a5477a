use std::sync::Arc;

use crate::keypair::BundlerKeypair;
use crate::keystore::DeployeeAddress;
use crate::ledger::{LedgerClient, VoteTally};

/// Best-effort reader of the vote tally
pub struct VoteQueryService {
    ledger: Arc<dyn LedgerClient>,
}

impl VoteQueryService {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Current tally, or `None` when inputs are missing or the read fails
    pub async fn read(
        &self,
        funding: Option<&BundlerKeypair>,
        deployee: Option<&DeployeeAddress>,
    ) -> Option<VoteTally> {
        let (funding, deployee) = (funding?, deployee?);

        match self.ledger.query_votes(funding, deployee.as_str()).await {
            Ok(tally) => {
                log::debug!("Vote tally: {} yes / {} no", tally.yes, tally.no);
                Some(tally)
            }
            Err(e) => {
                log::warn!("Failed to read vote tally for {deployee}: {e}");
                None
            }
        }
    }
}
