//! Testing utilities for Passvote
//!
//! Shared by unit tests and, behind the `testing` feature, by the integration
//! tests under `tests/`.
//!
//! ## Organization
//!
//! - [`fixtures`] - a synthetic passkey producing real attestation objects and
//!   DER assertion signatures, plus ready-made services
//! - [`mock`] - in-memory ledger and storage fakes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use passvote::testing::{constants, MockLedger, TestFixtures, TestPasskey};
//!
//! # async fn example() {
//! let ledger = Arc::new(MockLedger::new());
//! let session = TestFixtures::orchestrator(ledger.clone());
//! session.init().await.unwrap();
//!
//! let passkey = TestPasskey::new(b"credential");
//! let options = session.registration_options("voter");
//! session
//!     .on_register(&passkey.registration_response(&options.challenge, constants::TEST_ORIGIN))
//!     .await
//!     .unwrap();
//! # }
//! ```

pub mod fixtures;
pub mod mock;

pub use fixtures::{TestFixtures, TestPasskey};
pub use mock::{Deployment, FailingStore, MockLedger};

/// Common test constants
pub mod constants {
    /// Relying party origin the fixtures sign for
    pub const TEST_ORIGIN: &str = "http://localhost:8080";

    /// Relying party ID the fixtures hash into authenticator data
    pub const TEST_RP_ID: &str = "localhost";

    /// Account address used when a test does not deploy one itself
    pub const TEST_DEPLOYEE: &str = "CDLZFC3SYJYDZT7K67VZ75HPJVIEUVNIXF47ZG2FB2RMQQVU2HHGCYSC";

    /// Ledgers an authorization transaction stays valid for in [`super::MockLedger`]
    pub const TEST_VALIDITY_WINDOW: u32 = 20;

    /// First ledger sequence reported by [`super::MockLedger`]
    pub const TEST_START_LEDGER: u32 = 1_000;
}
