//! HTTP surface for the attest trust engine.
//!
//! [`server`] exposes the `/assertions` routes over a shared database;
//! [`client::AssertClient`] is the matching consumer.

pub mod client;
pub mod error;
pub mod server;

pub use client::AssertClient;
pub use error::{HttpError, Result};
pub use server::{router, serve, ASSERTIONS_COUNT_HEADER, BUNDLE_CONTENT_TYPE};
