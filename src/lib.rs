/// Version of the passvote application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod deploy;
pub mod derivation;
pub mod error;
pub mod funding;
pub mod handlers;
pub mod keypair;
pub mod keystore;
pub mod ledger;
pub mod session;
pub mod settings;
pub mod signing;
pub mod votes;
pub mod webauthn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use error::{ErrorPhase, StorageError, WalletError};
pub use keypair::BundlerKeypair;
pub use keystore::{DeployeeAddress, FileStore, KeyStore};
pub use ledger::{HttpLedgerClient, LedgerClient, VoteChoice, VoteTally};
pub use session::{SessionOrchestrator, SessionSnapshot};
pub use settings::WalletSettings;
