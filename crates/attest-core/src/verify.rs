//! Signature-chain verification primitives.
//!
//! Key resolution is a policy decision that lives with the database; this
//! module only defines the resolver seam and the check applied to a single
//! assertion once a candidate key has been found.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::assertion::Assertion;
use crate::crypto::{KeyId, PublicKey, Signature};
use crate::registry::parse_time;

/// Validity window of a delegated signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl KeyWindow {
    /// Whether the instant falls inside the window. `since` is inclusive,
    /// `until` exclusive.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.since <= at && at < self.until
    }

    /// Read the window from `since`/`until` headers of an account-key
    /// assertion.
    pub fn from_headers(assertion: &Assertion) -> Result<Self, String> {
        let since = parse_time(assertion.header("since").unwrap_or_default())?;
        let until = parse_time(assertion.header("until").unwrap_or_default())?;
        Ok(Self { since, until })
    }
}

/// A signing key resolved for verification, with its validity window when
/// the key is delegated rather than a trusted root.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub public_key: PublicKey,
    pub window: Option<KeyWindow>,
}

impl ResolvedKey {
    /// A trusted root key, valid at any time.
    pub fn root(public_key: PublicKey) -> Self {
        Self {
            public_key,
            window: None,
        }
    }

    /// A delegated key restricted to a validity window.
    pub fn delegated(public_key: PublicKey, window: KeyWindow) -> Self {
        Self {
            public_key,
            window: Some(window),
        }
    }
}

/// Source of signing keys during verification.
///
/// Resolution is scoped by authority: a key id only counts when the
/// matching record was issued for the claiming authority.
pub trait KeyResolver {
    fn resolve(&self, authority_id: &str, key_id: &KeyId) -> Option<ResolvedKey>;
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("no matching public key {key_id} for signature by {authority_id:?}")]
    UnknownKey { authority_id: String, key_id: String },

    #[error("failed signature verification")]
    InvalidSignature,

    #[error("cannot decode signature: {0}")]
    Signature(String),

    #[error("assertion timestamp {at} outside of signing key validity ({since} to {until})")]
    KeyNotValid {
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}

/// Check one assertion against an already resolved key: the signature must
/// cover the content bytes, and for delegated keys the check time must fall
/// inside the validity window.
pub fn verify_with_key(
    assertion: &Assertion,
    key: &ResolvedKey,
    at: DateTime<Utc>,
) -> Result<(), VerifyError> {
    let signature = Signature::from_armored(assertion.signature())
        .map_err(|e| VerifyError::Signature(e.to_string()))?;
    key.public_key
        .verify(&assertion.content(), &signature)
        .map_err(|_| VerifyError::InvalidSignature)?;
    if let Some(window) = key.window {
        if !window.contains(at) {
            return Err(VerifyError::KeyNotValid {
                since: window.since,
                until: window.until,
                at,
            });
        }
    }
    Ok(())
}

/// Resolve the signing key via the resolver and verify the assertion.
pub fn verify(
    assertion: &Assertion,
    resolver: &dyn KeyResolver,
    at: DateTime<Utc>,
) -> Result<(), VerifyError> {
    let key_id = assertion.sign_key_id();
    let key = resolver
        .resolve(assertion.authority_id(), &key_id)
        .ok_or_else(|| VerifyError::UnknownKey {
            authority_id: assertion.authority_id().to_string(),
            key_id: key_id.as_str().to_string(),
        })?;
    verify_with_key(assertion, &key, at)
}
