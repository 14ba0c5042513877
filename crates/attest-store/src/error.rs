//! Error types for the storage layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("revision {new} is older than current revision {current}")]
    Superseded { current: u32, new: u32 },

    #[error("key pair with given key id already exists")]
    KeyAlreadyExists,

    #[error("no matching key pair found")]
    KeyNotFound,

    #[error("cannot decode stored key pair: {0}")]
    KeyDecode(String),

    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("migration error: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
