//! `WebAuthn` error types
//!
//! This module defines error types for parsing and verifying ceremony output.

use std::fmt;

/// `WebAuthn` errors that can occur while handling ceremony results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebAuthnError {
    /// Data encoding/parsing error (base64, JSON, CBOR)
    EncodingError(String),

    /// Verification failed (ceremony type or origin)
    VerificationFailed(String),

    /// The client data carries a different challenge than the one issued
    ChallengeMismatch,

    /// Credential public key is not an ES256 (P-256) key
    UnsupportedKey(String),
}

impl fmt::Display for WebAuthnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebAuthnError::EncodingError(msg) => write!(f, "Encoding error: {msg}"),
            WebAuthnError::VerificationFailed(msg) => write!(f, "Verification failed: {msg}"),
            WebAuthnError::ChallengeMismatch => write!(f, "Challenge mismatch"),
            WebAuthnError::UnsupportedKey(msg) => write!(f, "Unsupported key: {msg}"),
        }
    }
}

impl std::error::Error for WebAuthnError {}
