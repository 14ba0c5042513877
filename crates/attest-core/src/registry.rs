//! The assertion type registry.
//!
//! An immutable table of the known assertion types, built once at startup
//! and passed by reference into the codec, the verifier and the backstores.
//! Each type declares its primary-key headers, its mandatory headers and a
//! consistency check run at add time.
//!
//! Unknown types are not an error for the decoder; they only fail at
//! `Database::add`, which needs the primary key to index them.

use chrono::{DateTime, Utc};

use crate::assertion::{valid_header_name, Assertion};
use crate::crypto::PublicKey;

/// Consistency check run against an assertion at add time.
///
/// Returns the violated rule as a message on failure.
pub type CheckFn = fn(&Assertion) -> Result<(), String>;

/// Static description of one assertion type.
#[derive(Clone)]
pub struct AssertionType {
    /// The type name, as it appears in the `type` header.
    pub name: &'static str,
    /// Ordered header names forming the primary key.
    pub primary_key: &'static [&'static str],
    /// Headers that must be present (primary key included).
    pub mandatory: &'static [&'static str],
    check: CheckFn,
}

impl AssertionType {
    /// Run the type-specific consistency check.
    pub fn check(&self, assertion: &Assertion) -> Result<(), String> {
        (self.check)(assertion)
    }

    /// Extract the primary-key values of an assertion of this type.
    pub fn primary_key_of(&self, assertion: &Assertion) -> Result<Vec<String>, String> {
        self.primary_key
            .iter()
            .map(|name| {
                assertion
                    .header(name)
                    .map(str::to_string)
                    .ok_or_else(|| format!("missing primary key header {name:?}"))
            })
            .collect()
    }

    /// The first mandatory header missing from the assertion, if any.
    pub fn missing_mandatory(&self, assertion: &Assertion) -> Option<&'static str> {
        self.mandatory
            .iter()
            .find(|name| assertion.header(name).is_none())
            .copied()
    }
}

impl std::fmt::Debug for AssertionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AssertionType({})", self.name)
    }
}

/// The immutable table of known assertion types.
pub struct TypeRegistry {
    types: Vec<AssertionType>,
}

impl TypeRegistry {
    /// Build the registry of built-in types.
    pub fn builtin() -> Self {
        Self {
            types: vec![
                AssertionType {
                    name: "account",
                    primary_key: &["account-id"],
                    mandatory: &["account-id", "display-name"],
                    check: check_account,
                },
                AssertionType {
                    name: "account-key",
                    primary_key: &["account-id", "public-key-id"],
                    mandatory: &[
                        "account-id",
                        "public-key-id",
                        "public-key-fingerprint",
                        "since",
                        "until",
                    ],
                    check: check_account_key,
                },
                AssertionType {
                    name: "snap-revision",
                    primary_key: &["snap-id", "snap-revision"],
                    mandatory: &["snap-id", "snap-revision", "snap-digest", "developer-id"],
                    check: check_snap_revision,
                },
            ],
        }
    }

    /// Look up a type by name.
    pub fn find(&self, name: &str) -> Option<&AssertionType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Iterate over the registered type names.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.iter().map(|t| t.name)
    }
}

/// Parse an RFC 3339 timestamp header value.
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("cannot parse timestamp {value:?}: {e}"))
}

fn check_account(assertion: &Assertion) -> Result<(), String> {
    // Mandatory presence is checked generically; enforce non-emptiness.
    if assertion.header("account-id").unwrap_or_default().is_empty() {
        return Err("account-id header must not be empty".into());
    }
    if assertion
        .header("display-name")
        .unwrap_or_default()
        .is_empty()
    {
        return Err("display-name header must not be empty".into());
    }
    Ok(())
}

fn check_account_key(assertion: &Assertion) -> Result<(), String> {
    let since = parse_time(assertion.header("since").unwrap_or_default())?;
    let until = parse_time(assertion.header("until").unwrap_or_default())?;
    if until <= since {
        return Err("until timestamp must be after since timestamp".into());
    }

    let body = std::str::from_utf8(assertion.body())
        .map_err(|_| "public key body is not valid UTF-8".to_string())?;
    let public_key =
        PublicKey::from_armored(body).map_err(|e| format!("cannot decode public key body: {e}"))?;

    let key_id = assertion.header("public-key-id").unwrap_or_default();
    if public_key.key_id().as_str() != key_id {
        return Err(format!(
            "public-key-id header {key_id:?} does not match the key in the body"
        ));
    }
    let fingerprint = assertion.header("public-key-fingerprint").unwrap_or_default();
    if public_key.fingerprint() != fingerprint {
        return Err(format!(
            "public-key-fingerprint header {fingerprint:?} does not match the key in the body"
        ));
    }
    Ok(())
}

fn check_snap_revision(assertion: &Assertion) -> Result<(), String> {
    let snap_id = assertion.header("snap-id").unwrap_or_default();
    if !valid_header_name(snap_id) {
        return Err(format!("snap-id header {snap_id:?} is not valid"));
    }
    let revision = assertion.header("snap-revision").unwrap_or_default();
    revision
        .parse::<u64>()
        .map_err(|_| format!("snap-revision header {revision:?} is not a non-negative integer"))?;
    if assertion.header("snap-digest").unwrap_or_default().is_empty() {
        return Err("snap-digest header must not be empty".into());
    }
    Ok(())
}
