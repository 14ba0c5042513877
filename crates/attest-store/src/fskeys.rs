//! Filesystem keypair manager.
//!
//! Keys live under `<root>/private-keys-v0/<authority>/<key-id>`, one
//! armored key per file. The authority directory name is URL-escaped so
//! arbitrary authority ids stay safe as path components. Writes go to a
//! temporary file first and are renamed into place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::debug;

use attest_core::{KeyId, PrivateKey};

use crate::error::{Result, StoreError};
use crate::traits::KeypairManager;

const KEYS_DIR: &str = "private-keys-v0";

/// Keypair manager persisting keys under a root directory.
pub struct FsKeypairManager {
    root: PathBuf,
    // serializes the exists-check-then-rename in put
    write_lock: Mutex<()>,
}

impl FsKeypairManager {
    /// Create a manager rooted at the given directory, creating the key
    /// subdirectory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().join(KEYS_DIR);
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn key_path(&self, authority_id: &str, key_id: &KeyId) -> PathBuf {
        let escaped = utf8_percent_encode(authority_id, NON_ALPHANUMERIC).to_string();
        self.root.join(escaped).join(key_id.as_str())
    }
}

impl KeypairManager for FsKeypairManager {
    fn put(&self, authority_id: &str, key: &PrivateKey) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.key_path(authority_id, &key.key_id());
        if path.exists() {
            return Err(StoreError::KeyAlreadyExists);
        }
        let dir = path.parent().ok_or(StoreError::KeyNotFound)?;
        fs::create_dir_all(dir)?;

        let tmp = dir.join(format!(".{}.tmp", key.key_id()));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(key.to_armored().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(authority_id, key_id = %key.key_id(), "stored key pair");
        Ok(())
    }

    fn get(&self, authority_id: &str, key_id: &KeyId) -> Result<PrivateKey> {
        let path = self.key_path(authority_id, key_id);
        let armored = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::KeyNotFound)
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        PrivateKey::from_armored(armored.trim_end())
            .map_err(|e| StoreError::KeyDecode(e.to_string()))
    }
}
