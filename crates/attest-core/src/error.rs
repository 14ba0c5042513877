//! Error types for the attest core.

use thiserror::Error;

/// Errors raised while encoding or decoding the assertion wire format.
///
/// All of these are terminal for the input that produced them; the decoder
/// never retries or resynchronizes past a malformed assertion.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("cannot decode an assertion from an empty input")]
    Empty,

    #[error("cannot parse assertion header line: {0:?}")]
    HeaderLine(String),

    #[error("invalid assertion header name: {0:?}")]
    HeaderName(String),

    #[error("duplicate assertion header: {0:?}")]
    DuplicateHeader(String),

    #[error("header {0:?} value contains a newline")]
    HeaderValue(String),

    #[error("assertion has no {0} header")]
    MissingHeader(&'static str),

    #[error("cannot parse assertion type: {0:?}")]
    InvalidType(String),

    #[error("cannot parse body-length header: {0}")]
    BodyLength(String),

    #[error("cannot parse revision header: {0}")]
    Revision(String),

    #[error("assertion body is shorter than declared body-length {declared}")]
    BodyTruncated { declared: usize },

    #[error("missing blank-line separator after assertion body")]
    MissingSeparator,

    #[error("assertion has empty signature")]
    EmptySignature,

    #[error("{type_name} assertion is missing mandatory header {header:?}")]
    MandatoryHeader { type_name: String, header: String },

    #[error("I/O error while decoding assertion: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from key material handling and raw signature checks.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("failed signature verification")]
    InvalidSignature,

    #[error("cannot decode armored key material: {0}")]
    Armor(String),
}
