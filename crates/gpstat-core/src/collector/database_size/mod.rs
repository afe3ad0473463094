//! Database size scraper.
//!
//! One cycle runs three stages, strictly in sequence:
//!
//! 1. **Enumeration** on the primary connection, bounded by
//!    `primary_deadline`: emits one size measurement per database and
//!    records the database names. If this query fails the cycle stops here.
//! 2. **Per-database**: for each name, opens a dedicated connection, reads
//!    the table count and bloat diagnostics, then closes the connection.
//! 3. **Cluster aggregates** on the primary connection: cache hit rate and
//!    commit rate, independently of each other.
//!
//! Failures from stages 2 and 3 (and unscannable rows from stage 1) never
//! stop other work; they are combined into the returned error.

pub mod queries;

use tracing::{debug, info, warn};

use super::conn::{Connection, Connector, Query, Row};
use super::error::{ScrapeError, combine_errors};
use super::metrics::{self, BloatSeverity, Measurement, MetricDesc, MetricSink};
use super::Scraper;
use crate::config::ScraperConfig;
use queries::{BLOAT_TABLES, DATABASE_SIZE, HIT_CACHE_RATE, TABLE_COUNT, TX_COMMIT_RATE};

/// A database discovered during enumeration. Lives for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDatabase {
    pub name: String,
    pub size_mb: f64,
}

/// Collects database sizes, per-database table stats and cluster ratios.
pub struct DatabaseSizeScraper<C> {
    config: ScraperConfig,
    connector: C,
}

impl<C: Connector> DatabaseSizeScraper<C> {
    /// `connector` opens the per-database connections.
    pub fn new(config: ScraperConfig, connector: C) -> Self {
        Self { config, connector }
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Enumerates databases and emits their sizes.
    ///
    /// Rows that fail to scan are pushed to `errors` and skipped. A failed
    /// query is returned as the only error.
    fn collect_sizes(
        &self,
        primary: &mut dyn Connection,
        sink: &mut dyn MetricSink,
        errors: &mut Vec<ScrapeError>,
    ) -> Result<Vec<TargetDatabase>, ScrapeError> {
        let rows = primary.query(&DATABASE_SIZE, Some(self.config.primary_deadline))?;

        let mut targets = Vec::with_capacity(rows.len());
        for row in &rows {
            let target = match parse_size_row(row) {
                Ok(t) => t,
                Err(e) => {
                    debug!(error = %e, "skipping database size row");
                    errors.push(e);
                    continue;
                }
            };
            sink.emit(Measurement::new(
                &metrics::DATABASE_SIZE,
                target.size_mb,
                vec![target.name.clone()],
            ));
            targets.push(target);
        }

        Ok(targets)
    }

    /// Collects table count and bloat list for one database over its own
    /// connection. The connection is closed before returning.
    fn collect_database(
        &self,
        target: &TargetDatabase,
        sink: &mut dyn MetricSink,
        errors: &mut Vec<ScrapeError>,
    ) {
        let dsn = self.config.dsn_for(&target.name);
        let mut conn = match self.connector.connect(&dsn) {
            Ok(conn) => conn,
            Err(e) => {
                warn!(database = %target.name, error = %e, "failed to connect for per-database metrics");
                errors.push(e.for_database(&target.name));
                return;
            }
        };
        debug!(database = %target.name, "per-database connection established");

        let count = match self.query_table_count(&mut conn) {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(database = %target.name, error = %e, "table count failed");
                errors.push(e.for_database(&target.name));
                None
            }
        };

        if let Err(e) = self.query_bloat_tables(&mut conn, sink) {
            warn!(database = %target.name, error = %e, "bloat diagnostics failed");
            errors.push(e.for_database(&target.name));
        }

        if let Some(count) = count {
            sink.emit(Measurement::new(
                &metrics::TABLE_COUNT,
                count,
                vec![target.name.clone()],
            ));
        }

        if let Err(e) = conn.close() {
            debug!(database = %target.name, error = %e, "error while closing connection");
        }
    }

    fn query_table_count(&self, conn: &mut C::Conn) -> Result<f64, ScrapeError> {
        let rows = conn.query(&TABLE_COUNT, self.config.target_deadline)?;
        let row = rows.first().ok_or(ScrapeError::NoRows {
            query: TABLE_COUNT.name,
        })?;
        row.get_f64(0)
    }

    /// Streams one measurement per bloat row. Unscannable rows are skipped
    /// and reported together.
    fn query_bloat_tables(
        &self,
        conn: &mut C::Conn,
        sink: &mut dyn MetricSink,
    ) -> Result<(), ScrapeError> {
        let rows = conn.query(&BLOAT_TABLES, self.config.target_deadline)?;

        let mut errors = Vec::new();
        for row in &rows {
            match parse_bloat_row(row) {
                Ok((severity, labels)) => {
                    sink.emit(Measurement::new(&metrics::BLOAT_TABLE, severity.tier(), labels))
                }
                Err(e) => errors.push(e),
            }
        }
        combine_errors(errors)
    }

    /// Reads a single-value ratio from the primary connection.
    ///
    /// Only the first row is read. A NULL ratio means the cluster had no
    /// activity to divide by; nothing is emitted and it is not a failure.
    fn collect_ratio(
        &self,
        primary: &mut dyn Connection,
        sink: &mut dyn MetricSink,
        query: &Query,
        desc: &'static MetricDesc,
    ) -> Result<(), ScrapeError> {
        let rows = primary.query(query, self.config.target_deadline)?;
        let row = rows.first().ok_or(ScrapeError::NoRows { query: query.name })?;

        match row.get_opt_f64(0)? {
            Some(rate) => sink.emit(Measurement::new(desc, rate, Vec::new())),
            None => debug!(query = query.name, "ratio is NULL, no activity recorded"),
        }
        Ok(())
    }
}

impl<C: Connector> Scraper for DatabaseSizeScraper<C> {
    fn name(&self) -> &str {
        "database_size_scraper"
    }

    fn scrape(
        &self,
        primary: &mut dyn Connection,
        sink: &mut dyn MetricSink,
        _server_version: i32,
    ) -> Result<(), ScrapeError> {
        let mut errors = Vec::new();

        let targets = self.collect_sizes(primary, sink, &mut errors)?;
        debug!(databases = targets.len(), "databases discovered");

        for target in &targets {
            self.collect_database(target, sink, &mut errors);
        }

        for (query, desc) in [
            (&HIT_CACHE_RATE, &metrics::HIT_CACHE_RATE),
            (&TX_COMMIT_RATE, &metrics::TX_COMMIT_RATE),
        ] {
            if let Err(e) = self.collect_ratio(primary, sink, query, desc) {
                warn!(query = query.name, error = %e, "cluster ratio failed");
                errors.push(e);
            }
        }

        if !errors.is_empty() {
            info!(
                scraper = self.name(),
                failures = errors.len(),
                "scrape finished with failures"
            );
        }
        combine_errors(errors)
    }
}

fn parse_size_row(row: &Row) -> Result<TargetDatabase, ScrapeError> {
    Ok(TargetDatabase {
        name: row.get_str(0)?.to_string(),
        size_mb: row.get_f64(1)?,
    })
}

fn parse_bloat_row(row: &Row) -> Result<(BloatSeverity, Vec<String>), ScrapeError> {
    let labels = (0..5)
        .map(|idx| row.get_str(idx).map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;
    // A malformed or missing message classifies as no bloat.
    let severity = BloatSeverity::from_diagnostic(row.get_opt_str(5).ok().flatten());
    Ok((severity, labels))
}

#[cfg(test)]
mod tests;
