//! Error types for the wallet pipelines
//!
//! Every failure a caller can see is a [`WalletError`]. Together with the
//! action that raised it, an error maps to the phase that failed; on its own
//! it maps to a message that is safe to show to a user.

use serde::Serialize;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::session::ActionKind;
use crate::webauthn::WebAuthnError;

/// Errors raised by a key-value storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("refusing to store an empty value for {key}")]
    EmptyValue { key: String },

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("storage is unavailable: {0}")]
    Unavailable(String),
}

/// The phase of the user journey an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPhase {
    Initialization,
    Registration,
    Deployment,
    Signing,
    Submission,
}

/// Errors surfaced by the wallet pipelines and the session orchestrator
#[derive(Debug, Error)]
pub enum WalletError {
    /// The stored bundler secret cannot be decoded; requires a reset
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The ceremony output is missing fields or fails verification
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// The ledger refused the account deployment
    #[error("deployment rejected: {0}")]
    DeploymentRejected(String),

    /// Signing was attempted before an account exists
    #[error("no active account")]
    NoActiveAccount,

    /// The ledger advanced past the transaction's validity bound
    #[error("transaction expired: ledger {current_ledger} is past {last_ledger}")]
    TransactionExpired { last_ledger: u32, current_ledger: u32 },

    /// The ledger rejected the signed transaction
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// Presign data and ceremony result do not belong to the current attempt
    #[error("stale challenge: {0}")]
    StaleChallenge(String),

    /// Another action is already running for this session
    #[error("{requested} rejected while {in_flight} is in flight")]
    Busy {
        requested: ActionKind,
        in_flight: ActionKind,
    },

    #[error("session is not initialized")]
    NotInitialized,

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Ledger transport failure outside the tagged rejection cases
    #[error("ledger unavailable: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<WebAuthnError> for WalletError {
    fn from(err: WebAuthnError) -> Self {
        match err {
            WebAuthnError::ChallengeMismatch => WalletError::StaleChallenge(
                "ceremony result was produced for a different challenge".to_string(),
            ),
            other => WalletError::MalformedCredential(other.to_string()),
        }
    }
}

impl WalletError {
    /// Phase of the journey that failed while running `action`
    ///
    /// The same variant can come from different steps: a transport failure
    /// is a deployment problem during registration but a submission problem
    /// while signing.
    #[must_use]
    pub fn phase_in(&self, action: ActionKind) -> ErrorPhase {
        match action {
            ActionKind::Initialize | ActionKind::Reset => ErrorPhase::Initialization,
            ActionKind::Register => match self {
                WalletError::DeploymentRejected(_)
                | WalletError::Ledger(_)
                | WalletError::Storage(_) => ErrorPhase::Deployment,
                _ => ErrorPhase::Registration,
            },
            ActionKind::PrepareSign => ErrorPhase::Signing,
            ActionKind::Sign => match self {
                WalletError::SubmissionRejected(_) | WalletError::Ledger(_) => {
                    ErrorPhase::Submission
                }
                _ => ErrorPhase::Signing,
            },
        }
    }

    /// Short machine-readable code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::InvalidKeyMaterial(_) => "invalid_key_material",
            WalletError::MalformedCredential(_) => "malformed_credential",
            WalletError::DeploymentRejected(_) => "deployment_rejected",
            WalletError::NoActiveAccount => "no_active_account",
            WalletError::TransactionExpired { .. } => "transaction_expired",
            WalletError::SubmissionRejected(_) => "submission_rejected",
            WalletError::StaleChallenge(_) => "stale_challenge",
            WalletError::Busy { .. } => "busy",
            WalletError::NotInitialized => "not_initialized",
            WalletError::Storage(_) => "storage_error",
            WalletError::Ledger(_) => "ledger_unavailable",
        }
    }

    /// Message suitable for display; never contains key material
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            WalletError::InvalidKeyMaterial(_) => {
                "The stored signing key is unreadable. Reset the session to start over."
            }
            WalletError::MalformedCredential(_) => {
                "The passkey response could not be read. Please try the passkey prompt again."
            }
            WalletError::DeploymentRejected(_) => {
                "The network refused to create your account. Please try registering again later."
            }
            WalletError::NoActiveAccount => "Register a passkey before voting.",
            WalletError::TransactionExpired { .. } => {
                "The vote request expired before it was signed. Please start the vote again."
            }
            WalletError::SubmissionRejected(_) => "The network rejected the signed vote.",
            WalletError::StaleChallenge(_) => {
                "This signature belongs to an earlier vote request. Please start the vote again."
            }
            WalletError::Busy { .. } => "Another request is still in progress.",
            WalletError::NotInitialized => "The session is still starting up.",
            WalletError::Storage(_) => "Local storage failed. Check available space and retry.",
            WalletError::Ledger(_) => "The network could not be reached. Please retry shortly.",
        }
    }
}
