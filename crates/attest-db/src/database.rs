//! The assertion database façade.
//!
//! Composes a backstore, a keypair manager, the type registry and a set of
//! trusted root keys into the public Add/Find surface. All trust decisions
//! are made here: signing keys resolve either to a trusted root or, one
//! level deep, to a stored `account-key` assertion for the claiming
//! authority.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use attest_core::{
    verify_with_key, Assertion, AssertionBuilder, AssertionType, KeyId, KeyWindow, PrivateKey,
    PublicKey, ResolvedKey, TypeRegistry, VerifyError,
};
use attest_store::{Backstore, KeypairManager, PutOutcome};

use crate::error::{DbError, Result};

/// A trusted root key: assertions by this authority signed with this key
/// verify without any stored delegation.
#[derive(Debug, Clone)]
pub struct TrustedKey {
    pub authority_id: String,
    pub public_key: PublicKey,
}

impl TrustedKey {
    pub fn new(authority_id: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            authority_id: authority_id.into(),
            public_key,
        }
    }
}

/// Builder assembling a [`Database`] from its parts.
pub struct DatabaseBuilder {
    backstore: Option<Arc<dyn Backstore>>,
    keypairs: Option<Arc<dyn KeypairManager>>,
    registry: Option<Arc<TypeRegistry>>,
    trusted: Vec<TrustedKey>,
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self {
            backstore: None,
            keypairs: None,
            registry: None,
            trusted: Vec::new(),
        }
    }

    pub fn backstore(mut self, backstore: Arc<dyn Backstore>) -> Self {
        self.backstore = Some(backstore);
        self
    }

    pub fn keypair_manager(mut self, keypairs: Arc<dyn KeypairManager>) -> Self {
        self.keypairs = Some(keypairs);
        self
    }

    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add a trusted root key.
    pub fn trusted(mut self, key: TrustedKey) -> Self {
        self.trusted.push(key);
        self
    }

    pub fn build(self) -> Result<Database> {
        let backstore = self
            .backstore
            .ok_or_else(|| DbError::BadQuery("database requires a backstore".into()))?;
        let keypairs = self
            .keypairs
            .ok_or_else(|| DbError::BadQuery("database requires a keypair manager".into()))?;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(TypeRegistry::builtin()));

        let mut trusted = HashMap::new();
        for key in self.trusted {
            let key_id = key.public_key.key_id();
            trusted.insert((key.authority_id, key_id.as_str().to_string()), key.public_key);
        }

        Ok(Database {
            backstore,
            keypairs,
            registry,
            trusted,
        })
    }
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assertion database.
pub struct Database {
    backstore: Arc<dyn Backstore>,
    keypairs: Arc<dyn KeypairManager>,
    registry: Arc<TypeRegistry>,
    trusted: HashMap<(String, String), PublicKey>,
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Verify and store an assertion, checking it at the current time.
    pub fn add(&self, assertion: &Assertion) -> Result<PutOutcome> {
        self.add_at(assertion, Utc::now())
    }

    /// Verify and store an assertion, checking validity windows at the
    /// given instant.
    pub fn add_at(&self, assertion: &Assertion, at: DateTime<Utc>) -> Result<PutOutcome> {
        let typ = self.known_type(assertion.type_name())?;
        let primary_key = self.check_against_type(assertion, typ, at)?;

        let outcome = self
            .backstore
            .put(typ.name, &primary_key, assertion.revision(), assertion)?;
        debug!(
            assert_type = typ.name,
            revision = assertion.revision(),
            ?outcome,
            "added assertion"
        );
        Ok(outcome)
    }

    /// Check an assertion against the trust chain and type rules without
    /// storing it.
    pub fn check_at(&self, assertion: &Assertion, at: DateTime<Utc>) -> Result<()> {
        let typ = self.known_type(assertion.type_name())?;
        self.check_against_type(assertion, typ, at)?;
        Ok(())
    }

    /// Full check of one assertion; returns its primary-key values.
    fn check_against_type(
        &self,
        assertion: &Assertion,
        typ: &AssertionType,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        if let Some(header) = typ.missing_mandatory(assertion) {
            return Err(DbError::Inconsistent {
                assert_type: typ.name.to_string(),
                rule: format!("missing mandatory header {header:?}"),
            });
        }
        let primary_key = typ.primary_key_of(assertion).map_err(|rule| {
            DbError::Inconsistent {
                assert_type: typ.name.to_string(),
                rule,
            }
        })?;

        let key_id = assertion.sign_key_id();
        let key = self
            .resolve_key(assertion.authority_id(), &key_id)?
            .ok_or_else(|| {
                warn!(
                    authority_id = assertion.authority_id(),
                    key_id = %key_id,
                    "no key found for assertion"
                );
                VerifyError::UnknownKey {
                    authority_id: assertion.authority_id().to_string(),
                    key_id: key_id.as_str().to_string(),
                }
            })?;
        verify_with_key(assertion, &key, at)?;

        typ.check(assertion).map_err(|rule| DbError::Inconsistent {
            assert_type: typ.name.to_string(),
            rule,
        })?;
        Ok(primary_key)
    }

    /// Find the single assertion matching the query headers, which must
    /// cover the type's full primary key.
    pub fn find(&self, assert_type: &str, headers: &[(String, String)]) -> Result<Assertion> {
        let typ = self.known_type(assert_type)?;
        check_filters(headers)?;
        let primary_key: Vec<String> = typ
            .primary_key
            .iter()
            .map(|name| {
                headers
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        DbError::BadQuery(format!("find requires the {name:?} header"))
                    })
            })
            .collect::<Result<_>>()?;

        let assertion = self
            .backstore
            .get(typ.name, &primary_key)?
            .ok_or(DbError::NotFound)?;

        // Non-key headers in the query must match too.
        for (name, value) in headers {
            if assertion.header(name) != Some(value.as_str()) {
                return Err(DbError::NotFound);
            }
        }
        Ok(assertion)
    }

    /// Find all assertions of a type matching the query headers. No
    /// matches is an empty sequence, not an error.
    pub fn find_many(
        &self,
        assert_type: &str,
        headers: &[(String, String)],
    ) -> Result<Vec<Assertion>> {
        let typ = self.known_type(assert_type)?;
        check_filters(headers)?;
        Ok(self.backstore.search(typ.name, headers)?)
    }

    /// Import an existing private key for an authority.
    pub fn import_key(&self, authority_id: &str, key: &PrivateKey) -> Result<()> {
        self.keypairs.put(authority_id, key)?;
        Ok(())
    }

    /// Generate and store a fresh signing key, returning its id.
    pub fn generate_key(&self, authority_id: &str) -> Result<KeyId> {
        let key = PrivateKey::generate();
        let key_id = key.key_id();
        self.keypairs.put(authority_id, &key)?;
        debug!(authority_id, key_id = %key_id, "generated key pair");
        Ok(key_id)
    }

    /// The public half of a stored key.
    pub fn public_key(&self, authority_id: &str, key_id: &KeyId) -> Result<PublicKey> {
        let key = self.keypairs.get(authority_id, key_id)?;
        Ok(key.public_key())
    }

    /// Sign a built assertion with a stored key of the authority.
    pub fn sign(
        &self,
        builder: AssertionBuilder,
        authority_id: &str,
        key_id: &KeyId,
    ) -> Result<Assertion> {
        let key = self.keypairs.get(authority_id, key_id)?;
        Ok(builder.sign(&key)?)
    }

    fn known_type(&self, name: &str) -> Result<&AssertionType> {
        self.registry
            .find(name)
            .ok_or_else(|| DbError::UnknownType(name.to_string()))
    }

    /// Resolve a signing key: trusted roots first, then stored
    /// account-key assertions issued for the claiming authority.
    fn resolve_key(&self, authority_id: &str, key_id: &KeyId) -> Result<Option<ResolvedKey>> {
        if let Some(public_key) = self
            .trusted
            .get(&(authority_id.to_string(), key_id.as_str().to_string()))
        {
            return Ok(Some(ResolvedKey::root(*public_key)));
        }

        let primary_key = vec![authority_id.to_string(), key_id.as_str().to_string()];
        let Some(account_key) = self.backstore.get("account-key", &primary_key)? else {
            return Ok(None);
        };

        let body = std::str::from_utf8(account_key.body()).map_err(|_| {
            DbError::Storage(attest_store::StoreError::InvalidData(
                "account-key body is not valid UTF-8".into(),
            ))
        })?;
        let public_key = PublicKey::from_armored(body).map_err(|e| {
            DbError::Storage(attest_store::StoreError::InvalidData(format!(
                "cannot decode stored account-key body: {e}"
            )))
        })?;
        let window = KeyWindow::from_headers(&account_key).map_err(|rule| {
            DbError::Storage(attest_store::StoreError::InvalidData(rule))
        })?;
        Ok(Some(ResolvedKey::delegated(public_key, window)))
    }
}

/// Reject query filters that could never match a decoded assertion.
fn check_filters(headers: &[(String, String)]) -> Result<()> {
    for (name, value) in headers {
        if !attest_core::assertion::valid_header_name(name) {
            return Err(DbError::BadQuery(format!("invalid header name {name:?}")));
        }
        if value.contains('\n') {
            return Err(DbError::BadQuery(format!(
                "header {name:?} filter value contains a newline"
            )));
        }
    }
    Ok(())
}
