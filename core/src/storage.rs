//! Durable key/value state under the Vizor home directory.
//!
//! One file per key, written atomically, so sibling processes sharing the
//! same home directory observe last-write-wins without torn reads.
//!
//! ## Layout
//!
//! ```text
//! ~/.vizor/storage/
//!   authToken          raw bearer token string
//!   user               JSON-serialized UserProfile
//!   analysisData       JSON-serialized AnalysisResult (wire shape)
//!   analysisTimestamp  RFC 3339 fetch timestamp
//! ```

use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::path::PathBuf;

/// Storage key names. These are the persisted-state contract; renaming one
/// orphans existing state.
pub mod keys {
    pub const AUTH_TOKEN: &str = "authToken";
    pub const USER: &str = "user";
    pub const ANALYSIS_DATA: &str = "analysisData";
    pub const ANALYSIS_TIMESTAMP: &str = "analysisTimestamp";
}

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// File-backed key/value store.
#[derive(Debug, Clone)]
pub struct LocalStore {
    base_dir: PathBuf,
}

impl LocalStore {
    /// Create a store under `<home>/storage/`, creating the directory if
    /// needed.
    pub fn new(home: &Path) -> Result<Self, StorageError> {
        Self::with_base_dir(home.join("storage"))
    }

    /// Create a store at an explicit directory. Used by tests.
    pub fn with_base_dir(base_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute path of one key's backing file.
    pub fn path(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }

    /// Read a value. A missing key is `None`, not an error.
    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Write a value atomically via a `.tmp` sibling.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path(key);
        let tmp = path.with_extension("tmp");

        // Tokens land here, so keep the files private to the user.
        #[cfg(unix)]
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp)?;

        #[cfg(not(unix))]
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;

        file.write_all(value.as_bytes())?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Remove a key. Removing an absent key is a no-op.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
