//! Test fixtures shared across the attest crates.

pub mod fixtures;

pub use fixtures::{TrustFixture, DEVELOPER, ROOT_AUTHORITY};
