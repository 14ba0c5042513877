//! SQLite implementation of the backstore trait.
//!
//! The primary persistent backend. Rows hold the full wire encoding of
//! each assertion; the primary key is serialized to a CBOR array so
//! composite keys stay a single indexed column.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use attest_core::{decode_assertion, Assertion, TypeRegistry};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{check_revision, matches_filters, Backstore, PutOutcome};

/// SQLite-backed assertion store.
///
/// Thread-safe via an internal mutex around the connection.
pub struct SqliteBackstore {
    conn: Mutex<Connection>,
    registry: Arc<TypeRegistry>,
}

impl SqliteBackstore {
    /// Open a database at the given path, creating the file and running
    /// migrations as needed.
    pub fn open(path: impl AsRef<Path>, registry: Arc<TypeRegistry>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            registry,
        })
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_memory(registry: Arc<TypeRegistry>) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            registry,
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                Some(format!("mutex poisoned: {}", e)),
            ))
        })?;
        f(&conn)
    }

    fn decode_row(&self, encoded: &[u8]) -> Result<Assertion> {
        decode_assertion(encoded, &self.registry)
            .map_err(|e| StoreError::InvalidData(e.to_string()))
    }
}

fn encode_primary_key(primary_key: &[String]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(primary_key, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

impl Backstore for SqliteBackstore {
    fn put(
        &self,
        assert_type: &str,
        primary_key: &[String],
        revision: u32,
        assertion: &Assertion,
    ) -> Result<PutOutcome> {
        let key_blob = encode_primary_key(primary_key)?;
        self.with_conn(|conn| {
            let current: Option<u32> = conn
                .query_row(
                    "SELECT revision FROM assertions WHERE assert_type = ?1 AND primary_key = ?2",
                    params![assert_type, key_blob.as_slice()],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(current) = current {
                if let Some(outcome) = check_revision(current, revision)? {
                    return Ok(outcome);
                }
                debug!(assert_type, revision, "superseding stored assertion");
            }

            conn.execute(
                "INSERT INTO assertions (assert_type, primary_key, revision, encoded, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(assert_type, primary_key) DO UPDATE SET
                     revision = excluded.revision,
                     encoded = excluded.encoded,
                     stored_at = excluded.stored_at",
                params![
                    assert_type,
                    key_blob.as_slice(),
                    revision,
                    assertion.encode(),
                    now_millis(),
                ],
            )?;
            Ok(PutOutcome::Inserted)
        })
    }

    fn get(&self, assert_type: &str, primary_key: &[String]) -> Result<Option<Assertion>> {
        let key_blob = encode_primary_key(primary_key)?;
        let encoded: Option<Vec<u8>> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT encoded FROM assertions WHERE assert_type = ?1 AND primary_key = ?2",
                params![assert_type, key_blob.as_slice()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })?;
        encoded.map(|bytes| self.decode_row(&bytes)).transpose()
    }

    fn search(&self, assert_type: &str, filters: &[(String, String)]) -> Result<Vec<Assertion>> {
        let rows: Vec<Vec<u8>> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT encoded FROM assertions WHERE assert_type = ?1 ORDER BY primary_key",
            )?;
            let rows = stmt
                .query_map(params![assert_type], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let mut found = Vec::new();
        for encoded in rows {
            let assertion = self.decode_row(&encoded)?;
            if matches_filters(&assertion, filters) {
                found.push(assertion);
            }
        }
        Ok(found)
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::{AssertionBuilder, PrivateKey};

    fn store() -> SqliteBackstore {
        SqliteBackstore::open_memory(Arc::new(TypeRegistry::builtin())).unwrap()
    }

    fn account(account_id: &str, revision: u32) -> Assertion {
        AssertionBuilder::new("account")
            .header("authority-id", "can0nical")
            .header("account-id", account_id)
            .header("display-name", "Developer")
            .revision(revision)
            .sign(&PrivateKey::from_seed(&[4; 32]))
            .unwrap()
    }

    fn pk(account_id: &str) -> Vec<String> {
        vec![account_id.to_string()]
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = store();
        let a = account("dev1", 0);
        assert_eq!(
            store.put("account", &pk("dev1"), 0, &a).unwrap(),
            PutOutcome::Inserted
        );

        let got = store.get("account", &pk("dev1")).unwrap().unwrap();
        assert_eq!(got, a);
        assert_eq!(got.encode(), a.encode());
        assert!(store.get("account", &pk("other")).unwrap().is_none());
    }

    #[test]
    fn test_revision_ordering() {
        let store = store();
        store
            .put("account", &pk("dev1"), 5, &account("dev1", 5))
            .unwrap();

        assert_eq!(
            store
                .put("account", &pk("dev1"), 5, &account("dev1", 5))
                .unwrap(),
            PutOutcome::Unchanged
        );

        let err = store
            .put("account", &pk("dev1"), 2, &account("dev1", 2))
            .unwrap_err();
        assert!(matches!(err, StoreError::Superseded { current: 5, new: 2 }));

        store
            .put("account", &pk("dev1"), 9, &account("dev1", 9))
            .unwrap();
        let got = store.get("account", &pk("dev1")).unwrap().unwrap();
        assert_eq!(got.revision(), 9);
    }

    #[test]
    fn test_search() {
        let store = store();
        for id in ["beta", "alpha"] {
            store.put("account", &pk(id), 0, &account(id, 0)).unwrap();
        }

        let all = store.search("account", &[]).unwrap();
        assert_eq!(all.len(), 2);

        let filtered = store
            .search(
                "account",
                &[("account-id".to_string(), "beta".to_string())],
            )
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].header("account-id"), Some("beta"));

        assert!(store.search("snap-revision", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assertions.db");
        let registry = Arc::new(TypeRegistry::builtin());

        let a = account("dev1", 1);
        {
            let store = SqliteBackstore::open(&path, registry.clone()).unwrap();
            store.put("account", &pk("dev1"), 1, &a).unwrap();
        }

        let store = SqliteBackstore::open(&path, registry).unwrap();
        let got = store.get("account", &pk("dev1")).unwrap().unwrap();
        assert_eq!(got, a);
    }
}
