//! Scripted connections for testing scrapers without a live cluster.
//!
//! `MockConnection` answers queries by name from a script, and
//! `MockConnector` hands out per-database copies while recording every
//! open and close so tests can check that no connection leaks.

mod connection;
mod scenarios;

pub use connection::{MockConnection, MockConnector, MockStats, row, text_row};
pub use scenarios::MockCluster;
