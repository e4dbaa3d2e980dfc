//! Keyfactor Command API access.
//!
//! ## Architectural role:
//! - `api` defines the `KeyfactorApi` trait every other layer talks to
//! - `client` implements it over HTTP with reqwest
//! - `models` holds the wire types
//! - `fake` is an in-memory implementation used by the test suites
//!
//! The client is built once from the provider configuration and handed to
//! each lifecycle call as `&dyn KeyfactorApi`; nothing here is global.

pub mod api;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod models;

// Re-export key types and traits for convenience
pub use api::KeyfactorApi;
pub use client::HttpKeyfactorClient;
pub use error::KeyfactorError;
