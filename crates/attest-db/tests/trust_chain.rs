//! End-to-end trust chain tests against the database façade.

use std::sync::Arc;

use attest_core::{
    registry::parse_time, Assertion, AssertionBuilder, PrivateKey, TypeRegistry, VerifyError,
};
use attest_db::{Database, DbError, TrustedKey};
use attest_store::{MemoryBackstore, MemoryKeypairManager, PutOutcome, StoreError};

const ROOT_AUTHORITY: &str = "can0nical";
const DEVELOPER: &str = "developer1";

struct Fixture {
    root_key: PrivateKey,
    db: Database,
}

fn fixture() -> Fixture {
    let root_key = PrivateKey::from_seed(&[1; 32]);
    let db = Database::builder()
        .backstore(Arc::new(MemoryBackstore::new()))
        .keypair_manager(Arc::new(MemoryKeypairManager::new()))
        .registry(Arc::new(TypeRegistry::builtin()))
        .trusted(TrustedKey::new(ROOT_AUTHORITY, root_key.public_key()))
        .build()
        .unwrap();
    Fixture { root_key, db }
}

fn delegated_key() -> PrivateKey {
    PrivateKey::from_seed(&[2; 32])
}

fn account_key_assertion(fx: &Fixture, since: &str, until: &str) -> Assertion {
    let key = delegated_key();
    AssertionBuilder::new("account-key")
        .header("authority-id", ROOT_AUTHORITY)
        .header("account-id", DEVELOPER)
        .header("public-key-id", key.key_id().as_str())
        .header("public-key-fingerprint", key.public_key().fingerprint())
        .header("since", since)
        .header("until", until)
        .body(key.public_key().to_armored().into_bytes())
        .sign(&fx.root_key)
        .unwrap()
}

fn snap_revision(revision: u32, digest: &str) -> Assertion {
    AssertionBuilder::new("snap-revision")
        .header("authority-id", DEVELOPER)
        .header("snap-id", "snap-one")
        .header("snap-revision", "12")
        .header("snap-digest", digest)
        .header("developer-id", DEVELOPER)
        .revision(revision)
        .sign(&delegated_key())
        .unwrap()
}

fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}

#[test]
fn account_signed_by_root_is_accepted() {
    let fx = fixture();
    let account = AssertionBuilder::new("account")
        .header("authority-id", ROOT_AUTHORITY)
        .header("account-id", DEVELOPER)
        .header("display-name", "Developer One")
        .sign(&fx.root_key)
        .unwrap();

    assert_eq!(fx.db.add(&account).unwrap(), PutOutcome::Inserted);
    let found = fx
        .db
        .find("account", &query(&[("account-id", DEVELOPER)]))
        .unwrap();
    assert_eq!(found, account);
}

#[test]
fn delegated_chain_verifies_depth_one() {
    let fx = fixture();
    fx.db
        .add(&account_key_assertion(
            &fx,
            "2016-01-14T15:00:00Z",
            "2036-01-14T15:00:00Z",
        ))
        .unwrap();

    // signed by the delegated developer key, not the root
    fx.db.add(&snap_revision(0, "digest0")).unwrap();

    let found = fx
        .db
        .find(
            "snap-revision",
            &query(&[("snap-id", "snap-one"), ("snap-revision", "12")]),
        )
        .unwrap();
    assert_eq!(found.header("snap-digest"), Some("digest0"));
}

#[test]
fn unknown_signing_key_is_rejected() {
    let fx = fixture();
    // no account-key stored for the developer key
    let err = fx.db.add(&snap_revision(0, "digest0")).unwrap_err();
    assert!(matches!(
        err,
        DbError::Verify(VerifyError::UnknownKey { .. })
    ));

    // and nothing was stored
    let err = fx
        .db
        .find(
            "snap-revision",
            &query(&[("snap-id", "snap-one"), ("snap-revision", "12")]),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound));
}

#[test]
fn tampered_assertion_is_rejected_and_state_unchanged() {
    let fx = fixture();
    fx.db
        .add(&account_key_assertion(
            &fx,
            "2016-01-14T15:00:00Z",
            "2036-01-14T15:00:00Z",
        ))
        .unwrap();
    fx.db.add(&snap_revision(1, "digest1")).unwrap();

    // re-sign headers with a key nobody delegated
    let intruder = PrivateKey::from_seed(&[9; 32]);
    let mut forged = AssertionBuilder::new("snap-revision")
        .header("authority-id", DEVELOPER)
        .header("snap-id", "snap-one")
        .header("snap-revision", "12")
        .header("snap-digest", "evil-digest")
        .header("developer-id", DEVELOPER)
        .revision(2)
        .sign(&intruder)
        .unwrap();
    // claim the delegated key id so resolution finds the legitimate key
    forged = attest_core::decode_assertion(
        &String::from_utf8(forged.encode())
            .unwrap()
            .replace(
                &format!("sign-key-id: {}", intruder.key_id()),
                &format!("sign-key-id: {}", delegated_key().key_id()),
            )
            .into_bytes(),
        fx.db.registry(),
    )
    .unwrap();

    let err = fx.db.add(&forged).unwrap_err();
    assert!(matches!(
        err,
        DbError::Verify(VerifyError::InvalidSignature)
    ));

    // stored assertion is untouched
    let found = fx
        .db
        .find(
            "snap-revision",
            &query(&[("snap-id", "snap-one"), ("snap-revision", "12")]),
        )
        .unwrap();
    assert_eq!(found.header("snap-digest"), Some("digest1"));
    assert_eq!(found.revision(), 1);
}

#[test]
fn revision_ordering_is_enforced() {
    let fx = fixture();
    fx.db
        .add(&account_key_assertion(
            &fx,
            "2016-01-14T15:00:00Z",
            "2036-01-14T15:00:00Z",
        ))
        .unwrap();

    fx.db.add(&snap_revision(3, "digest3")).unwrap();

    // same revision: idempotent
    assert_eq!(
        fx.db.add(&snap_revision(3, "digest3")).unwrap(),
        PutOutcome::Unchanged
    );

    // older revision: rejected
    let err = fx.db.add(&snap_revision(1, "digest1")).unwrap_err();
    assert!(matches!(err, DbError::Superseded { current: 3, new: 1 }));

    // newer revision: supersedes
    fx.db.add(&snap_revision(5, "digest5")).unwrap();
    let found = fx
        .db
        .find(
            "snap-revision",
            &query(&[("snap-id", "snap-one"), ("snap-revision", "12")]),
        )
        .unwrap();
    assert_eq!(found.revision(), 5);
    assert_eq!(found.header("snap-digest"), Some("digest5"));
}

#[test]
fn expired_delegation_is_rejected() {
    let fx = fixture();
    fx.db
        .add_at(
            &account_key_assertion(&fx, "2016-01-14T15:00:00Z", "2017-01-14T15:00:00Z"),
            parse_time("2016-06-01T00:00:00Z").unwrap(),
        )
        .unwrap();

    // inside the window
    fx.db
        .add_at(
            &snap_revision(0, "digest0"),
            parse_time("2016-06-01T00:00:00Z").unwrap(),
        )
        .unwrap();

    // after the window expired
    let err = fx
        .db
        .add_at(
            &snap_revision(1, "digest1"),
            parse_time("2020-01-01T00:00:00Z").unwrap(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Verify(VerifyError::KeyNotValid { .. })
    ));
}

#[test]
fn unknown_type_is_rejected() {
    let fx = fixture();
    let a = AssertionBuilder::new("widget")
        .header("authority-id", ROOT_AUTHORITY)
        .sign(&fx.root_key)
        .unwrap();
    let err = fx.db.add(&a).unwrap_err();
    assert!(matches!(err, DbError::UnknownType(name) if name == "widget"));

    let err = fx.db.find("widget", &[]).unwrap_err();
    assert!(matches!(err, DbError::UnknownType(_)));
}

#[test]
fn find_requires_full_primary_key() {
    let fx = fixture();
    let err = fx
        .db
        .find("snap-revision", &query(&[("snap-id", "snap-one")]))
        .unwrap_err();
    assert!(matches!(err, DbError::BadQuery(_)));
}

#[test]
fn malformed_filters_are_a_bad_query() {
    let fx = fixture();
    let err = fx
        .db
        .find_many("account", &query(&[("Account-ID", "developer1")]))
        .unwrap_err();
    assert!(matches!(err, DbError::BadQuery(_)));

    let err = fx
        .db
        .find_many("account", &query(&[("account-id", "a\nb")]))
        .unwrap_err();
    assert!(matches!(err, DbError::BadQuery(_)));
}

#[test]
fn find_checks_non_key_headers() {
    let fx = fixture();
    fx.db
        .add(&account_key_assertion(
            &fx,
            "2016-01-14T15:00:00Z",
            "2036-01-14T15:00:00Z",
        ))
        .unwrap();
    fx.db.add(&snap_revision(0, "digest0")).unwrap();

    let err = fx
        .db
        .find(
            "snap-revision",
            &query(&[
                ("snap-id", "snap-one"),
                ("snap-revision", "12"),
                ("snap-digest", "other-digest"),
            ]),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound));
}

#[test]
fn find_many_filters_and_returns_empty_for_no_matches() {
    let fx = fixture();

    // an untouched database answers with an empty sequence
    let found = fx.db.find_many("account", &[]).unwrap();
    assert!(found.is_empty());

    fx.db
        .add(&account_key_assertion(
            &fx,
            "2016-01-14T15:00:00Z",
            "2036-01-14T15:00:00Z",
        ))
        .unwrap();
    fx.db.add(&snap_revision(0, "digest0")).unwrap();

    let found = fx
        .db
        .find_many("snap-revision", &query(&[("snap-id", "snap-one")]))
        .unwrap();
    assert_eq!(found.len(), 1);

    let found = fx
        .db
        .find_many("snap-revision", &query(&[("snap-id", "no-such-snap")]))
        .unwrap();
    assert!(found.is_empty());
}

#[test]
fn inconsistent_assertion_is_rejected() {
    let fx = fixture();
    fx.db
        .add(&account_key_assertion(
            &fx,
            "2016-01-14T15:00:00Z",
            "2036-01-14T15:00:00Z",
        ))
        .unwrap();

    // snap-revision header is not a number
    let bad = AssertionBuilder::new("snap-revision")
        .header("authority-id", DEVELOPER)
        .header("snap-id", "snap-one")
        .header("snap-revision", "not-a-number")
        .header("snap-digest", "digest")
        .header("developer-id", DEVELOPER)
        .sign(&delegated_key())
        .unwrap();
    let err = fx.db.add(&bad).unwrap_err();
    assert!(matches!(err, DbError::Inconsistent { .. }));
}

#[test]
fn key_management_roundtrip() {
    let fx = fixture();
    let key = PrivateKey::from_seed(&[7; 32]);

    fx.db.import_key(DEVELOPER, &key).unwrap();
    let err = fx.db.import_key(DEVELOPER, &key).unwrap_err();
    assert!(matches!(
        err,
        DbError::Storage(StoreError::KeyAlreadyExists)
    ));

    let public = fx.db.public_key(DEVELOPER, &key.key_id()).unwrap();
    assert_eq!(public, key.public_key());

    let generated = fx.db.generate_key(DEVELOPER).unwrap();
    assert_ne!(generated, key.key_id());

    // sign through the database with the stored key
    let signed = fx
        .db
        .sign(
            AssertionBuilder::new("account")
                .header("authority-id", DEVELOPER)
                .header("account-id", DEVELOPER)
                .header("display-name", "Developer One"),
            DEVELOPER,
            &key.key_id(),
        )
        .unwrap();
    assert_eq!(signed.sign_key_id(), key.key_id());
}
