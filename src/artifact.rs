//! Disk-backed artifact store for uploaded files.
//!
//! Keys combine a content-hash prefix with a random suffix, so every `put`
//! creates a fresh key and never overwrites an existing entry — re-uploading
//! the same bytes yields a new key. Writes go through a temp file in the
//! store directory followed by an atomic rename, and are fsynced before the
//! key is returned, so a returned key always refers to durable bytes.

use crate::error::EngineError;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Content store rooted at a single directory. Safe for concurrent reads;
/// writes never touch an existing key.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| EngineError::Storage(format!("create artifact dir: {e}")))?;
        Ok(Self { root })
    }

    /// Store `bytes` durably and return the new storage key.
    pub fn put(&self, bytes: &[u8]) -> Result<String, EngineError> {
        let key = Self::new_key(bytes);
        let path = self.path_for(&key);

        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)
            .map_err(|e| EngineError::Storage(format!("artifact temp file: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| EngineError::Storage(format!("artifact write: {e}")))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| EngineError::Storage(format!("artifact sync: {e}")))?;
        tmp.persist(&path)
            .map_err(|e| EngineError::Storage(format!("artifact persist: {e}")))?;

        debug!(key, size = bytes.len(), "artifact stored");
        Ok(key)
    }

    /// Read the bytes behind `key`. Unknown keys fail with `NotFound`.
    pub fn get(&self, key: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::NotFound { resource: "artifact" })
            }
            Err(e) => Err(EngineError::Storage(format!("artifact read: {e}"))),
        }
    }

    /// Remove the entry behind `key`. Removing an unknown key is a no-op.
    pub fn delete(&self, key: &str) -> Result<(), EngineError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Storage(format!("artifact delete: {e}"))),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are generated by `new_key` and contain no separators; reject
        // anything else rather than resolve outside the root.
        debug_assert!(!key.contains(['/', '\\']));
        self.root.join(key)
    }

    /// `<12 hex chars of sha256>-<uuid>`: hash prefix for at-a-glance content
    /// identity, random suffix so each upload is its own entry.
    fn new_key(bytes: &[u8]) -> String {
        let digest = Sha256::digest(bytes);
        let mut prefix = String::with_capacity(12);
        for byte in &digest[..6] {
            prefix.push_str(&format!("{byte:02x}"));
        }
        format!("{prefix}-{}", Uuid::new_v4())
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
