//! Assertion: an immutable, signed statement of headers plus optional body.
//!
//! Once decoded or signed, an assertion is never edited; a newer statement
//! about the same subject is a new assertion with a higher revision.

use bytes::Bytes;
use std::fmt;

use crate::crypto::{KeyId, PrivateKey};
use crate::error::WireError;

/// Header naming the assertion type; always the first line on the wire.
pub const TYPE_HEADER: &str = "type";
/// Header naming the accountable signing authority.
pub const AUTHORITY_ID_HEADER: &str = "authority-id";
/// Header carrying the id of the key that produced the signature.
pub const SIGN_KEY_ID_HEADER: &str = "sign-key-id";
/// Header giving the body length in bytes.
pub const BODY_LENGTH_HEADER: &str = "body-length";
/// Header ordering assertions sharing a primary key.
pub const REVISION_HEADER: &str = "revision";

/// Check that a header (or type) name is well formed: lowercase
/// alphanumeric words separated by single dashes.
pub fn valid_header_name(name: &str) -> bool {
    if name.is_empty() || !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return false;
    }
    if name.ends_with('-') || name.contains("--") {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// An ordered mapping of header name to value.
///
/// Insertion order is preserved for re-encoding; lookup is by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a header value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a header, replacing an existing value in place or appending.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Headers {
    fn from(pairs: [(&str, &str); N]) -> Self {
        let mut headers = Headers::new();
        for (n, v) in pairs {
            headers.set(n, v);
        }
        headers
    }
}

/// An immutable, signed statement: type, ordered headers, optional body
/// and an armored signature over the content bytes.
///
/// Instances come from [`crate::wire::Decoder`] or [`AssertionBuilder`];
/// both guarantee the `type`, `authority-id` and `sign-key-id` headers
/// are present and the revision parses.
#[derive(Clone, PartialEq, Eq)]
pub struct Assertion {
    pub(crate) type_name: String,
    pub(crate) headers: Headers,
    pub(crate) body: Bytes,
    pub(crate) revision: u32,
    pub(crate) signature: String,
}

impl Assertion {
    /// The assertion type name, e.g. `account-key`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Look up a single header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The authority accountable for this assertion.
    pub fn authority_id(&self) -> &str {
        self.headers.get(AUTHORITY_ID_HEADER).unwrap_or_default()
    }

    /// The id of the key that signed this assertion.
    pub fn sign_key_id(&self) -> KeyId {
        KeyId::new(self.headers.get(SIGN_KEY_ID_HEADER).unwrap_or_default())
    }

    /// Revision ordering assertions with the same type and primary key.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The armored signature block, verbatim as decoded.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The signed content bytes: the header block, then the body after a
    /// blank-line separator when non-empty.
    pub fn content(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut first = true;
        for (name, value) in self.headers.iter() {
            if !first {
                out.push(b'\n');
            }
            first = false;
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
        }
        if !self.body.is_empty() {
            out.extend_from_slice(b"\n\n");
            out.extend_from_slice(&self.body);
        }
        out
    }

    /// Encode to the full wire form, ending with a newline after the
    /// signature block. The exact inverse of decoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.content();
        out.extend_from_slice(b"\n\n");
        out.extend_from_slice(self.signature.as_bytes());
        out.push(b'\n');
        out
    }
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Assertion({} authority={} rev={})",
            self.type_name,
            self.authority_id(),
            self.revision
        )
    }
}

/// Builder producing signed assertions.
pub struct AssertionBuilder {
    type_name: String,
    headers: Headers,
    body: Bytes,
    revision: u32,
}

impl AssertionBuilder {
    /// Start building an assertion of the given type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            headers: Headers::new(),
            body: Bytes::new(),
            revision: 0,
        }
    }

    /// Set a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Set the revision. Revision 0 is the default and is omitted from
    /// the encoded headers.
    pub fn revision(mut self, revision: u32) -> Self {
        self.revision = revision;
        self
    }

    /// Set the body payload.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Validate, assemble the canonical header block and sign the content.
    ///
    /// The `type`, `sign-key-id` and `body-length` headers are filled in
    /// here; `authority-id` must have been provided by the caller.
    pub fn sign(self, key: &PrivateKey) -> Result<Assertion, WireError> {
        if !valid_header_name(&self.type_name) {
            return Err(WireError::InvalidType(self.type_name));
        }
        for (name, value) in self.headers.iter() {
            if !valid_header_name(name) {
                return Err(WireError::HeaderName(name.to_string()));
            }
            if value.contains('\n') {
                return Err(WireError::HeaderValue(name.to_string()));
            }
        }
        if !self.headers.contains(AUTHORITY_ID_HEADER) {
            return Err(WireError::MissingHeader(AUTHORITY_ID_HEADER));
        }

        let mut headers = Headers::new();
        headers.set(TYPE_HEADER, self.type_name.clone());
        for (name, value) in self.headers.iter() {
            if name != TYPE_HEADER {
                headers.set(name, value);
            }
        }
        if self.revision > 0 {
            headers.set(REVISION_HEADER, self.revision.to_string());
        }
        headers.set(SIGN_KEY_ID_HEADER, key.key_id().as_str());
        headers.set(BODY_LENGTH_HEADER, self.body.len().to_string());

        let mut assertion = Assertion {
            type_name: self.type_name,
            headers,
            body: self.body,
            revision: self.revision,
            signature: String::new(),
        };
        let signature = key.sign(&assertion.content());
        assertion.signature = signature.to_armored();
        Ok(assertion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_header_names() {
        for name in ["type", "account-id", "snap-revision", "a1", "body-length"] {
            assert!(valid_header_name(name), "{name} should be valid");
        }
        for name in ["", "Type", "1abc", "-id", "id-", "a--b", "a b", "a:b"] {
            assert!(!valid_header_name(name), "{name} should be invalid");
        }
    }

    #[test]
    fn test_headers_preserve_order() {
        let mut headers = Headers::new();
        headers.set("zeta", "1");
        headers.set("alpha", "2");
        headers.set("zeta", "3");

        let order: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(order, vec!["zeta", "alpha"]);
        assert_eq!(headers.get("zeta"), Some("3"));
    }

    #[test]
    fn test_builder_signs_and_fills_headers() {
        let key = PrivateKey::from_seed(&[1; 32]);
        let assertion = AssertionBuilder::new("account")
            .header("authority-id", "can0nical")
            .header("account-id", "developer1")
            .header("display-name", "Developer One")
            .sign(&key)
            .unwrap();

        assert_eq!(assertion.type_name(), "account");
        assert_eq!(assertion.authority_id(), "can0nical");
        assert_eq!(assertion.sign_key_id(), key.key_id());
        assert_eq!(assertion.header("body-length"), Some("0"));
        assert_eq!(assertion.revision(), 0);
        assert!(assertion.header("revision").is_none());

        // type must be the first encoded header
        let first = assertion.headers().iter().next().unwrap();
        assert_eq!(first.0, "type");
    }

    #[test]
    fn test_builder_requires_authority() {
        let key = PrivateKey::from_seed(&[1; 32]);
        let err = AssertionBuilder::new("account")
            .header("account-id", "developer1")
            .sign(&key)
            .unwrap_err();
        assert!(matches!(err, WireError::MissingHeader("authority-id")));
    }

    #[test]
    fn test_builder_rejects_bad_headers() {
        let key = PrivateKey::from_seed(&[1; 32]);
        let err = AssertionBuilder::new("account")
            .header("authority-id", "dev1")
            .header("Bad-Name", "x")
            .sign(&key)
            .unwrap_err();
        assert!(matches!(err, WireError::HeaderName(_)));

        let err = AssertionBuilder::new("account")
            .header("authority-id", "dev1")
            .header("note", "line1\nline2")
            .sign(&key)
            .unwrap_err();
        assert!(matches!(err, WireError::HeaderValue(_)));
    }

    #[test]
    fn test_content_includes_body_after_separator() {
        let key = PrivateKey::from_seed(&[1; 32]);
        let assertion = AssertionBuilder::new("account")
            .header("authority-id", "dev1")
            .body(&b"payload"[..])
            .sign(&key)
            .unwrap();

        let content = assertion.content();
        let text = String::from_utf8(content).unwrap();
        assert!(text.starts_with("type: account\n"));
        assert!(text.ends_with("\n\npayload"));
        assert!(text.contains("body-length: 7"));
    }

    #[test]
    fn test_signature_covers_content() {
        let key = PrivateKey::from_seed(&[1; 32]);
        let assertion = AssertionBuilder::new("account")
            .header("authority-id", "dev1")
            .body(&b"payload"[..])
            .sign(&key)
            .unwrap();

        let sig = crate::crypto::Signature::from_armored(assertion.signature()).unwrap();
        key.public_key().verify(&assertion.content(), &sig).unwrap();
    }
}
