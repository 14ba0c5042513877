//! Storage traits: assertion backstores and keypair managers.
//!
//! Both seams are synchronous; callers that live on an async runtime wrap
//! them in blocking tasks. Implementations must be internally synchronized
//! so that a shared reference can be used from multiple threads.

use attest_core::{Assertion, KeyId, PrivateKey};

use crate::error::Result;

/// Outcome of a backstore put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The assertion was stored, inserting or superseding.
    Inserted,
    /// Same revision already stored; nothing changed.
    Unchanged,
}

/// Persistent storage of assertions, keyed by type and primary key.
///
/// Revision ordering is enforced here: a higher revision replaces the
/// stored assertion, an equal revision is accepted without effect, and a
/// lower revision fails with [`crate::StoreError::Superseded`].
pub trait Backstore: Send + Sync {
    /// Store an assertion under its type and primary-key values.
    fn put(
        &self,
        assert_type: &str,
        primary_key: &[String],
        revision: u32,
        assertion: &Assertion,
    ) -> Result<PutOutcome>;

    /// Fetch the assertion stored under the exact primary key.
    fn get(&self, assert_type: &str, primary_key: &[String]) -> Result<Option<Assertion>>;

    /// All assertions of a type whose headers match every filter pair,
    /// in stable primary-key order.
    fn search(&self, assert_type: &str, filters: &[(String, String)]) -> Result<Vec<Assertion>>;
}

/// Persistent storage of private signing keys, indexed by authority and
/// key id.
pub trait KeypairManager: Send + Sync {
    /// Store a key for an authority. Fails with
    /// [`crate::StoreError::KeyAlreadyExists`] if the (authority, key id)
    /// pair is already present.
    fn put(&self, authority_id: &str, key: &PrivateKey) -> Result<()>;

    /// Fetch a key by authority and key id. Fails with
    /// [`crate::StoreError::KeyNotFound`] when absent.
    fn get(&self, authority_id: &str, key_id: &KeyId) -> Result<PrivateKey>;
}

/// Check a candidate revision against the stored one.
///
/// Shared by the backstore implementations.
pub(crate) fn check_revision(current: u32, new: u32) -> Result<Option<PutOutcome>> {
    use crate::error::StoreError;
    if new > current {
        Ok(None)
    } else if new == current {
        Ok(Some(PutOutcome::Unchanged))
    } else {
        Err(StoreError::Superseded { current, new })
    }
}

/// Whether an assertion matches every header filter exactly.
pub(crate) fn matches_filters(assertion: &Assertion, filters: &[(String, String)]) -> bool {
    filters
        .iter()
        .all(|(name, value)| assertion.header(name) == Some(value.as_str()))
}
