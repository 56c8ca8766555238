//! Custodial key persistence.
//!
//! At most one [`CustodialKeyRecord`] exists at a time. It is overwritten
//! only by explicit wallet creation and erased only by disconnecting a
//! custodial session. The store is pluggable so the same session logic can
//! target an OS keychain, an encrypted file, or browser storage; the bundled
//! [`FileSecretStore`] writes the record as plain JSON, which is acceptable
//! for testnets only — a production deployment must provide a store with
//! encryption at rest.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

/// The persisted key material of a custodial wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustodialKeyRecord {
    /// Account address derived from the key.
    pub address: Address,
    /// Raw 32-byte private key.
    pub private_key: B256,
    /// BIP-39 recovery phrase the key was derived from.
    pub mnemonic: String,
}

/// Errors from the secret store.
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("keystore i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored wallet record is corrupt: {0}")]
    Corrupt(String),
}

/// One-record secret store for custodial key material.
///
/// Writes must be atomic: after a failed `store` the previous record (or the
/// absence of one) must still be intact.
pub trait SecretStore: Send + Sync {
    /// Reads the record, or `None` if no wallet is stored.
    fn load(&self) -> Result<Option<CustodialKeyRecord>, KeystoreError>;
    /// Writes the record, replacing any prior one.
    fn store(&self, record: &CustodialKeyRecord) -> Result<(), KeystoreError>;
    /// Erases the record; succeeds if none exists.
    fn clear(&self) -> Result<(), KeystoreError>;
    /// Whether a record exists.
    fn exists(&self) -> bool;
}

/// File-backed secret store, one JSON record per file.
///
/// Stores via write-to-temporary-then-rename so a crash mid-write leaves
/// either the full old record or the full new one, never a torn file.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretStore for FileSecretStore {
    fn load(&self) -> Result<Option<CustodialKeyRecord>, KeystoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| KeystoreError::Corrupt(e.to_string()))
    }

    fn store(&self, record: &CustodialKeyRecord) -> Result<(), KeystoreError> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| KeystoreError::Corrupt(e.to_string()))?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), KeystoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// In-memory secret store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    record: Mutex<Option<CustodialKeyRecord>>,
}

impl SecretStore for MemorySecretStore {
    fn load(&self) -> Result<Option<CustodialKeyRecord>, KeystoreError> {
        Ok(self.record.lock().expect("keystore lock poisoned").clone())
    }

    fn store(&self, record: &CustodialKeyRecord) -> Result<(), KeystoreError> {
        *self.record.lock().expect("keystore lock poisoned") = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), KeystoreError> {
        *self.record.lock().expect("keystore lock poisoned") = None;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.record.lock().expect("keystore lock poisoned").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CustodialKeyRecord {
        CustodialKeyRecord {
            address: Address::repeat_byte(0xAA),
            private_key: B256::repeat_byte(0x42),
            mnemonic: "test test test test test test test test test test test junk".into(),
        }
    }

    #[test]
    fn file_store_round_trips_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("wallet.json"));
        assert!(!store.exists());
        assert_eq!(store.load().unwrap(), None);

        store.store(&record()).unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap(), Some(record()));
    }

    #[test]
    fn file_store_clear_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("wallet.json"));
        store.store(&record()).unwrap();
        store.clear().unwrap();
        assert!(!store.exists());
        assert_eq!(store.load().unwrap(), None);
        // clearing again is not an error
        store.clear().unwrap();
    }

    #[test]
    fn file_store_reports_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        fs::write(&path, b"not json").unwrap();
        let store = FileSecretStore::new(path);
        assert!(matches!(store.load(), Err(KeystoreError::Corrupt(_))));
    }

    #[test]
    fn store_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("wallet.json"));
        store.store(&record()).unwrap();
        let replacement = CustodialKeyRecord {
            address: Address::repeat_byte(0xBB),
            ..record()
        };
        store.store(&replacement).unwrap();
        assert_eq!(store.load().unwrap(), Some(replacement));
    }
}
