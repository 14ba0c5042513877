//! Error types for the assertion database.

use attest_core::{VerifyError, WireError};
use attest_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("unknown assertion type {0:?}")]
    UnknownType(String),

    #[error("{assert_type} assertion violates consistency: {rule}")]
    Inconsistent { assert_type: String, rule: String },

    #[error("revision {new} is older than current revision {current}")]
    Superseded { current: u32, new: u32 },

    #[error("assertion not found")]
    NotFound,

    #[error("invalid query: {0}")]
    BadQuery(String),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for DbError {
    fn from(e: StoreError) -> Self {
        // Revision conflicts are part of the database contract, not a
        // storage failure.
        match e {
            StoreError::Superseded { current, new } => DbError::Superseded { current, new },
            other => DbError::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
