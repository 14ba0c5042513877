//! Key material and signatures for the assertion trust engine.
//!
//! Wraps Ed25519 signing with strong types. Keys are identified by a
//! blake3 fingerprint of the public key bytes; the key id is the last
//! 16 hex characters of that fingerprint.
//!
//! Armored form is `"ed25519 " + base64(raw bytes)`, used both in
//! assertion signature blocks and in persisted key files.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;

use crate::error::CryptoError;

/// Prefix identifying the signing algorithm in armored material.
pub const ARMOR_PREFIX: &str = "ed25519 ";

fn armor(bytes: &[u8]) -> String {
    format!("{}{}", ARMOR_PREFIX, BASE64.encode(bytes))
}

fn unarmor(s: &str, expected_len: usize) -> Result<Vec<u8>, CryptoError> {
    let encoded = s
        .strip_prefix(ARMOR_PREFIX)
        .ok_or_else(|| CryptoError::Armor("unsupported armor prefix".into()))?;
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| CryptoError::Armor(e.to_string()))?;
    if bytes.len() != expected_len {
        return Err(CryptoError::Armor(format!(
            "expected {} bytes, got {}",
            expected_len,
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// The identifier of a signing key, derived from the public key material.
///
/// Last 16 hex characters of the blake3 fingerprint.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.0)
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full blake3 fingerprint of the key material, as lowercase hex.
    pub fn fingerprint(&self) -> String {
        hex::encode(blake3::hash(&self.0).as_bytes())
    }

    /// The key id: the last 16 hex characters of the fingerprint.
    pub fn key_id(&self) -> KeyId {
        let fp = self.fingerprint();
        KeyId(fp[fp.len() - 16..].to_string())
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Encode to the armored text form.
    pub fn to_armored(&self) -> String {
        armor(&self.0)
    }

    /// Parse from the armored text form.
    pub fn from_armored(s: &str) -> Result<Self, CryptoError> {
        let bytes = unarmor(s, 32)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        // Reject points that are not valid curve keys up front.
        VerifyingKey::from_bytes(&arr).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.key_id())
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_armored(&self) -> String {
        armor(&self.0)
    }

    pub fn from_armored(s: &str) -> Result<Self, CryptoError> {
        let bytes = unarmor(s, 64)?;
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &hex::encode(&self.0[..8]))
    }
}

/// A private signing key.
///
/// Raw key material stays inside this type; callers sign through it
/// and persist it only via the armored encoding.
#[derive(Clone)]
pub struct PrivateKey {
    signing_key: SigningKey,
}

impl PrivateKey {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// The id of the corresponding public key.
    pub fn key_id(&self) -> KeyId {
        self.public_key().key_id()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }

    /// Encode to the armored text form used by the keypair managers.
    pub fn to_armored(&self) -> String {
        armor(&self.signing_key.to_bytes())
    }

    /// Parse from the armored text form.
    pub fn from_armored(s: &str) -> Result<Self, CryptoError> {
        let bytes = unarmor(s, 32)?;
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);
        Ok(Self::from_seed(&seed))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.key_id())
    }
}
