//! gpstat-core - shared library for the gpstat metrics agent.
//!
//! Provides:
//! - `collector` - scraper contract, the database size scraper, connection
//!   abstraction, metric descriptors and error aggregation
//! - `config` - scraper configuration injected at construction time

pub mod collector;
pub mod config;

pub use config::ScraperConfig;

/// Crate version with the short git SHA it was built from.
pub const BUILD_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_SHA"), ")");
