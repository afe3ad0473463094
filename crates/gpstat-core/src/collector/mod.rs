//! Metric scrapers for a Greenplum cluster.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                   Scheduler (gpstatd)                         │
//! │   primary PgConnection ──┐          ┌── Sender<Measurement>   │
//! └──────────────────────────┼──────────┼─────────────────────────┘
//!                            │          │
//!                     ┌──────▼──────────▼──────┐
//!                     │   dyn Scraper          │
//!                     │   DatabaseSizeScraper  │
//!                     └──────┬─────────────────┘
//!                            │ per-database connections
//!                     ┌──────▼──────┐
//!                     │  Connector  │ (trait)
//!                     └──────┬──────┘
//!              ┌─────────────┴─────────────┐
//!       ┌──────▼──────┐             ┌──────▼──────┐
//!       │ PgConnector │             │ MockConnector│
//!       │ (postgres)  │             │ (Testing)   │
//!       └─────────────┘             └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use gpstat_core::collector::{DatabaseSizeScraper, Measurement, MockCluster, Scraper};
//!
//! let (mut primary, connector) = MockCluster::typical();
//! let scraper = DatabaseSizeScraper::new(MockCluster::config(), connector);
//!
//! let mut sink: Vec<Measurement> = Vec::new();
//! scraper.scrape(&mut primary, &mut sink, 90424).unwrap();
//! assert_eq!(sink.len(), 7);
//! ```

pub mod conn;
pub mod database_size;
pub mod error;
pub mod metrics;
pub mod mock;

pub use conn::{Connection, Connector, PgConnection, PgConnector, Query, Row, TlsMode};
pub use database_size::{DatabaseSizeScraper, TargetDatabase};
pub use error::{AggregateError, ScrapeError, combine_errors, combine_results};
pub use metrics::{BloatSeverity, Measurement, MetricDesc, MetricSink};
pub use mock::{MockCluster, MockConnection, MockConnector};

/// A unit of collection the scheduler invokes once per cycle.
///
/// Implementations push measurements to `sink` as they are produced and
/// return every partial failure combined into one error.
pub trait Scraper: Send + Sync {
    /// Stable identifier used by the caller for logging and labeling.
    fn name(&self) -> &str;

    /// Runs one full collection cycle.
    ///
    /// `primary` is borrowed and never closed. `server_version` is the
    /// server's `server_version_num`, reserved for version-specific queries.
    fn scrape(
        &self,
        primary: &mut dyn Connection,
        sink: &mut dyn MetricSink,
        server_version: i32,
    ) -> Result<(), ScrapeError>;
}
