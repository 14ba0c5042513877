//! Assertion database for the attest trust engine.
//!
//! [`Database`] is the single entry point callers use: it verifies
//! incoming assertions against the trusted roots and stored delegations,
//! enforces revision ordering through its backstore, and answers find
//! queries. Construction goes through [`DatabaseBuilder`].

pub mod database;
pub mod error;

pub use database::{Database, DatabaseBuilder, TrustedKey};
pub use error::{DbError, Result};
