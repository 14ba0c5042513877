//! In-memory storage backends.
//!
//! Used in tests and for ephemeral databases; semantics match the SQLite
//! backends exactly.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use attest_core::{Assertion, KeyId, PrivateKey};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::traits::{check_revision, matches_filters, Backstore, KeypairManager, PutOutcome};

/// In-memory backstore: a map per type, ordered by primary key.
#[derive(Default)]
pub struct MemoryBackstore {
    inner: RwLock<HashMap<String, BTreeMap<Vec<String>, Assertion>>>,
}

impl MemoryBackstore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backstore for MemoryBackstore {
    fn put(
        &self,
        assert_type: &str,
        primary_key: &[String],
        revision: u32,
        assertion: &Assertion,
    ) -> Result<PutOutcome> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let by_key = inner.entry(assert_type.to_string()).or_default();
        if let Some(current) = by_key.get(primary_key) {
            if let Some(outcome) = check_revision(current.revision(), revision)? {
                return Ok(outcome);
            }
            debug!(assert_type, revision, "superseding stored assertion");
        }
        by_key.insert(primary_key.to_vec(), assertion.clone());
        Ok(PutOutcome::Inserted)
    }

    fn get(&self, assert_type: &str, primary_key: &[String]) -> Result<Option<Assertion>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .get(assert_type)
            .and_then(|by_key| by_key.get(primary_key))
            .cloned())
    }

    fn search(&self, assert_type: &str, filters: &[(String, String)]) -> Result<Vec<Assertion>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let Some(by_key) = inner.get(assert_type) else {
            return Ok(Vec::new());
        };
        Ok(by_key
            .values()
            .filter(|a| matches_filters(a, filters))
            .cloned()
            .collect())
    }
}

/// In-memory keypair manager.
#[derive(Default)]
pub struct MemoryKeypairManager {
    keys: RwLock<HashMap<(String, String), PrivateKey>>,
}

impl MemoryKeypairManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeypairManager for MemoryKeypairManager {
    fn put(&self, authority_id: &str, key: &PrivateKey) -> Result<()> {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        let slot = (authority_id.to_string(), key.key_id().as_str().to_string());
        if keys.contains_key(&slot) {
            return Err(StoreError::KeyAlreadyExists);
        }
        keys.insert(slot, key.clone());
        Ok(())
    }

    fn get(&self, authority_id: &str, key_id: &KeyId) -> Result<PrivateKey> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        keys.get(&(authority_id.to_string(), key_id.as_str().to_string()))
            .cloned()
            .ok_or(StoreError::KeyNotFound)
    }
}
