use serde::Serialize;

use super::guard::ActionKind;
use crate::funding::FundingStatus;
use crate::keypair::BundlerKeypair;
use crate::keystore::DeployeeAddress;
use crate::ledger::{VoteChoice, VoteTally};
use crate::signing::PresignData;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
}

/// Mutable session state, owned by the orchestrator
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) phase: SessionPhase,
    pub(crate) in_flight: Option<ActionKind>,
    pub(crate) bundler: Option<BundlerKeypair>,
    pub(crate) funding: Option<FundingStatus>,
    pub(crate) deployee: Option<DeployeeAddress>,
    pub(crate) credential_id: Option<String>,
    /// Challenge of the last registration options handed out
    pub(crate) registration_challenge: Option<String>,
    /// Presign data awaiting its ceremony result
    pub(crate) presign: Option<PresignData>,
    pub(crate) last_vote_tally: Option<VoteTally>,
}

impl SessionState {
    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        let loading = |kinds: &[ActionKind]| self.in_flight.is_some_and(|k| kinds.contains(&k));

        SessionSnapshot {
            phase: self.phase,
            bundler_public_key: self.bundler.as_ref().map(BundlerKeypair::public_key),
            funding: self.funding.clone(),
            deployee: self.deployee.clone(),
            loading_account: loading(&[ActionKind::Initialize]),
            loading_deployee: loading(&[ActionKind::Initialize, ActionKind::Register]),
            loading_registration: loading(&[ActionKind::Register]),
            loading_sign: loading(&[ActionKind::PrepareSign, ActionKind::Sign]),
            pending_vote: self.presign.as_ref().map(|p| p.vote),
            contract_data: self.last_vote_tally,
        }
    }
}

/// Read-only view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub bundler_public_key: Option<String>,
    pub funding: Option<FundingStatus>,
    pub deployee: Option<DeployeeAddress>,
    pub loading_account: bool,
    pub loading_deployee: bool,
    pub loading_registration: bool,
    pub loading_sign: bool,
    /// Vote built and waiting for the passkey signature
    pub pending_vote: Option<VoteChoice>,
    /// Last vote tally read after a successful submission
    pub contract_data: Option<VoteTally>,
}
