//! `WebAuthn` implementation
//!
//! This module provides the passkey side of the crate independent of any
//! ledger logic: ceremony options, client data verification, attestation
//! parsing and assertion signature handling. The ceremonies themselves run
//! in the browser.

mod attestation;
mod cbor;
mod crypto;
mod errors;
mod service;
mod settings;
mod types;

// Re-exports for public use
pub use attestation::{parse_client_data, verify_client_data, CEREMONY_CREATE, CEREMONY_GET};
pub use cbor::extract_attested_credential;
pub use crypto::{decode_b64url, der_signature_to_compact, generate_challenge, sha256};
pub use errors::WebAuthnError;
pub use service::{generate_user_handle, WebAuthnService};
pub use settings::WebAuthnSettings;
pub use types::*;
