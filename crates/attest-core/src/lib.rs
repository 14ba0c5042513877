//! Core primitives of the attest trust engine.
//!
//! Defines the signed [`Assertion`] model, the streaming wire codec, the
//! built-in [`TypeRegistry`] and the signature verification seam. Storage
//! and policy live in the companion crates; everything here is pure data
//! and crypto with no I/O beyond the codec's reader and writer.

pub mod assertion;
pub mod crypto;
pub mod error;
pub mod registry;
pub mod verify;
pub mod wire;

pub use assertion::{Assertion, AssertionBuilder, Headers};
pub use crypto::{KeyId, PrivateKey, PublicKey, Signature};
pub use error::{CryptoError, WireError};
pub use registry::{AssertionType, TypeRegistry};
pub use verify::{verify, verify_with_key, KeyResolver, KeyWindow, ResolvedKey, VerifyError};
pub use wire::{decode_assertion, encode_bundle, Decoder, Encoder};
