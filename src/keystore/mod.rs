//! Durable storage of the bundler secret and the provisioned account
//!
//! [`KeyStore`] is the only component that touches persistence. It wraps a
//! [`KeyValueStore`] backend so storage can be swapped (a JSON file for the
//! server, an in-memory map for tests).

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Storage key for the bundler secret seed
pub const BUNDLER_SECRET_KEY: &str = "passvote:bundler_secret";

/// Storage key for the faucet outcome of the stored bundler keypair
pub const BUNDLER_FUNDED_KEY: &str = "passvote:bundler_funded";

/// Storage key for the deployed account address
pub const DEPLOYEE_KEY: &str = "passvote:deployee";

/// Storage key for the passkey credential identifier
pub const CREDENTIAL_ID_KEY: &str = "passvote:credential_id";

/// Minimal durable key-value store
///
/// Writes overwrite the whole value; a failed write must leave the previous
/// value in place.
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value
    ///
    /// # Errors
    ///
    /// Returns an error if the write did not reach durable storage.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value; removing a missing key is not an error
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Ledger address of the smart-contract account deployed for a passkey
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeployeeAddress(String);

impl DeployeeAddress {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeployeeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed access to the session's persisted values
#[derive(Clone)]
pub struct KeyStore {
    backend: Arc<dyn KeyValueStore>,
}

impl KeyStore {
    /// Create a key store over the given backend
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// In-memory key store
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Stored bundler secret, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn get_bundler_secret(&self) -> Result<Option<String>, StorageError> {
        self.get_non_empty(BUNDLER_SECRET_KEY)
    }

    /// Persist the bundler secret
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is empty or the write fails.
    pub fn set_bundler_secret(&self, secret: &str) -> Result<(), StorageError> {
        self.set_non_empty(BUNDLER_SECRET_KEY, secret)
    }

    /// Recorded faucet outcome for the stored bundler keypair
    ///
    /// `None` when no outcome was ever recorded, e.g. the process stopped
    /// between persisting the secret and hearing back from the faucet.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or holds something
    /// other than `true`/`false`.
    pub fn get_bundler_funded(&self) -> Result<Option<bool>, StorageError> {
        match self.get_non_empty(BUNDLER_FUNDED_KEY)?.as_deref() {
            None => Ok(None),
            Some("true") => Ok(Some(true)),
            Some("false") => Ok(Some(false)),
            Some(other) => Err(StorageError::Corrupt(format!(
                "{BUNDLER_FUNDED_KEY} holds {other:?}"
            ))),
        }
    }

    /// Record whether the faucet funded the stored bundler keypair
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_bundler_funded(&self, funded: bool) -> Result<(), StorageError> {
        self.set_non_empty(BUNDLER_FUNDED_KEY, if funded { "true" } else { "false" })
    }

    /// Stored deployee address, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn get_deployee(&self) -> Result<Option<DeployeeAddress>, StorageError> {
        Ok(self.get_non_empty(DEPLOYEE_KEY)?.map(DeployeeAddress))
    }

    /// Persist the deployee address
    ///
    /// # Errors
    ///
    /// Returns an error if the address is empty or the write fails.
    pub fn set_deployee(&self, address: &DeployeeAddress) -> Result<(), StorageError> {
        self.set_non_empty(DEPLOYEE_KEY, address.as_str())
    }

    /// Cached passkey credential identifier, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn get_credential_id(&self) -> Result<Option<String>, StorageError> {
        self.get_non_empty(CREDENTIAL_ID_KEY)
    }

    /// Cache the passkey credential identifier
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is empty or the write fails.
    pub fn set_credential_id(&self, credential_id: &str) -> Result<(), StorageError> {
        self.set_non_empty(CREDENTIAL_ID_KEY, credential_id)
    }

    /// Remove every value this store manages
    ///
    /// # Errors
    ///
    /// Returns the first removal error; later keys are still attempted.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut first_error = None;
        for key in [
            BUNDLER_SECRET_KEY,
            BUNDLER_FUNDED_KEY,
            DEPLOYEE_KEY,
            CREDENTIAL_ID_KEY,
        ] {
            if let Err(e) = self.backend.remove(key) {
                log::error!("Failed to remove {key} from storage: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn get_non_empty(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.backend.get(key)?.filter(|value| !value.is_empty()))
    }

    fn set_non_empty(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if value.is_empty() {
            return Err(StorageError::EmptyValue {
                key: key.to_string(),
            });
        }
        self.backend.set(key, value)
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore").finish_non_exhaustive()
    }
}
