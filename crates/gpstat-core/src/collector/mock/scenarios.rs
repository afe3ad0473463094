//! Pre-built mock cluster scenarios for testing.

use super::connection::{MockConnection, MockConnector, text_row};
use crate::collector::database_size::queries::{
    BLOAT_TABLES, DATABASE_SIZE, HIT_CACHE_RATE, TABLE_COUNT, TX_COMMIT_RATE,
};
use crate::config::ScraperConfig;

/// Base descriptor used by the scenarios.
pub const MOCK_BASE_DSN: &str = "postgres://gpadmin@mdw:5432/postgres";

/// Entry point for ready-made clusters.
pub struct MockCluster;

impl MockCluster {
    /// Scraper configuration pointing at the mock coordinator.
    pub fn config() -> ScraperConfig {
        ScraperConfig::unchecked(MOCK_BASE_DSN)
    }

    /// A small healthy cluster with two databases.
    ///
    /// - `app`: 100.5 MB, 10 tables, no bloat
    /// - `sales`: 42.0 MB, 3 tables, one significantly bloated table
    /// - cache hit rate 97.2, commit rate 99.9
    pub fn typical() -> (MockConnection, MockConnector) {
        let primary = MockConnection::new("postgres")
            .with_rows(
                &DATABASE_SIZE,
                vec![text_row(&["app", "100.5"]), text_row(&["sales", "42.0"])],
            )
            .with_rows(&HIT_CACHE_RATE, vec![text_row(&["97.2"])])
            .with_rows(&TX_COMMIT_RATE, vec![text_row(&["99.9"])]);

        let connector = MockConnector::new()
            .with_database(
                MockConnection::new("app")
                    .with_rows(&TABLE_COUNT, vec![text_row(&["10"])])
                    .with_rows(&BLOAT_TABLES, Vec::new()),
            )
            .with_database(
                MockConnection::new("sales")
                    .with_rows(&TABLE_COUNT, vec![text_row(&["3"])])
                    .with_rows(
                        &BLOAT_TABLES,
                        vec![text_row(&[
                            "sales",
                            "public",
                            "orders",
                            "1200",
                            "100",
                            "significant amount of bloat suspected",
                        ])],
                    ),
            );

        (primary, connector)
    }

    /// Three databases, each with a table count and one bloat row of
    /// differing severity. Useful as a base for failure injection.
    pub fn three_databases() -> (MockConnection, MockConnector) {
        let names = ["app", "hr", "sales"];
        let diags = [
            "no bloat detected",
            "moderate amount of bloat suspected",
            "significant amount of bloat suspected",
        ];

        let primary = MockConnection::new("postgres")
            .with_rows(
                &DATABASE_SIZE,
                names
                    .iter()
                    .zip(["10", "20", "30"])
                    .map(|(name, size)| text_row(&[*name, size]))
                    .collect(),
            )
            .with_rows(&HIT_CACHE_RATE, vec![text_row(&["90"])])
            .with_rows(&TX_COMMIT_RATE, vec![text_row(&["95"])]);

        let mut connector = MockConnector::new();
        for (i, (name, diag)) in names.iter().zip(diags).enumerate() {
            let count = (i + 1).to_string();
            connector = connector.with_database(
                MockConnection::new(*name)
                    .with_rows(&TABLE_COUNT, vec![text_row(&[count.as_str()])])
                    .with_rows(
                        &BLOAT_TABLES,
                        vec![text_row(&[*name, "public", "t", "100", "10", diag])],
                    ),
            );
        }

        (primary, connector)
    }
}
