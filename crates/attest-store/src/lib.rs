//! Storage backends for the attest trust engine.
//!
//! Two seams: [`Backstore`] for assertions and [`KeypairManager`] for
//! private signing keys, each with an in-memory and a persistent
//! implementation. The database crate composes them behind its façade.

pub mod error;
pub mod fskeys;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use fskeys::FsKeypairManager;
pub use memory::{MemoryBackstore, MemoryKeypairManager};
pub use sqlite::SqliteBackstore;
pub use traits::{Backstore, KeypairManager, PutOutcome};
