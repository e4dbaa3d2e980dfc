//! keyfactor-provider - Keyfactor Command resource provider library
//!
//! This crate maps declarative resource documents (certificates, certificate
//! deployments, certificate stores, security identities and roles) onto the
//! Keyfactor Command REST API.
//!
//! ## Architecture
//!
//! The crate follows a layered architecture with the following dependencies:
//!
//! - `resources` module - Lifecycle adapters (create/read/update/delete)
//! - `reconcile` module - Set reconciliation for membership relationships
//! - `codec` module - Conversion between resource state and API payloads
//! - `keyfactor` module - REST client, wire models and the `KeyfactorApi` trait
//! - `config` module - Provider configuration and environment fallback
//! - `cli` module - Command-line interface (drives `resources`)
//!
//! Resources depend on reconcile and codec; both of those only reach the
//! server through `&dyn KeyfactorApi`, so every layer above `keyfactor` can
//! be exercised against the in-memory fake.

pub mod cli;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod keyfactor;
pub mod reconcile;
pub mod resources;

// Re-export public types for convenience
pub use config::{ConnectionSettings, ProviderConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use keyfactor::{HttpKeyfactorClient, KeyfactorApi, KeyfactorError};
pub use resources::Resource;

/// Initialize logging for the application. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Logging for tests: output is captured per test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
