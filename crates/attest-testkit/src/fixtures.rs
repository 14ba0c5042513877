//! Ready-made trust fixtures for tests.

use std::sync::Arc;

use attest_core::{Assertion, AssertionBuilder, PrivateKey, TypeRegistry};
use attest_db::{Database, TrustedKey};
use attest_store::{MemoryBackstore, MemoryKeypairManager};

/// The root authority used throughout the fixtures.
pub const ROOT_AUTHORITY: &str = "can0nical";
/// A developer account delegated by the fixtures.
pub const DEVELOPER: &str = "developer1";

/// A database over in-memory stores, with one trusted root key and one
/// delegated developer key.
pub struct TrustFixture {
    pub root_key: PrivateKey,
    pub developer_key: PrivateKey,
    pub db: Arc<Database>,
}

impl TrustFixture {
    /// Build the fixture. The developer's account-key delegation is
    /// already added, valid from 2016 to 2036.
    pub fn new() -> Self {
        let root_key = PrivateKey::from_seed(&[1; 32]);
        let developer_key = PrivateKey::from_seed(&[2; 32]);

        let db = Database::builder()
            .backstore(Arc::new(MemoryBackstore::new()))
            .keypair_manager(Arc::new(MemoryKeypairManager::new()))
            .registry(Arc::new(TypeRegistry::builtin()))
            .trusted(TrustedKey::new(ROOT_AUTHORITY, root_key.public_key()))
            .build()
            .expect("fixture database");

        let fixture = Self {
            root_key,
            developer_key,
            db: Arc::new(db),
        };
        fixture
            .db
            .add(&fixture.account_key())
            .expect("fixture delegation");
        fixture
    }

    /// The account-key assertion delegating the developer key.
    pub fn account_key(&self) -> Assertion {
        AssertionBuilder::new("account-key")
            .header("authority-id", ROOT_AUTHORITY)
            .header("account-id", DEVELOPER)
            .header("public-key-id", self.developer_key.key_id().as_str())
            .header(
                "public-key-fingerprint",
                self.developer_key.public_key().fingerprint(),
            )
            .header("since", "2016-01-14T15:00:00Z")
            .header("until", "2036-01-14T15:00:00Z")
            .body(self.developer_key.public_key().to_armored().into_bytes())
            .sign(&self.root_key)
            .expect("fixture account-key")
    }

    /// An account assertion signed by the root.
    pub fn account(&self, account_id: &str) -> Assertion {
        AssertionBuilder::new("account")
            .header("authority-id", ROOT_AUTHORITY)
            .header("account-id", account_id)
            .header("display-name", "Fixture Developer")
            .sign(&self.root_key)
            .expect("fixture account")
    }

    /// A snap-revision assertion signed by the delegated developer key.
    pub fn snap_revision(&self, snap_id: &str, revision: u32) -> Assertion {
        AssertionBuilder::new("snap-revision")
            .header("authority-id", DEVELOPER)
            .header("snap-id", snap_id)
            .header("snap-revision", "12")
            .header("snap-digest", format!("digest-{revision}"))
            .header("developer-id", DEVELOPER)
            .revision(revision)
            .sign(&self.developer_key)
            .expect("fixture snap-revision")
    }
}

impl Default for TrustFixture {
    fn default() -> Self {
        Self::new()
    }
}
