//! Scraper configuration.

use std::time::Duration;

use crate::collector::ScrapeError;
use crate::collector::conn::replace_dbname;

/// Default deadline for the database enumeration query.
pub const DEFAULT_PRIMARY_DEADLINE: Duration = Duration::from_secs(2);

/// Configuration injected into scrapers at construction time.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Base descriptor; per-database descriptors are derived from it.
    base_dsn: String,
    /// Deadline for the enumeration query on the primary connection.
    pub primary_deadline: Duration,
    /// Deadline for per-database and aggregate queries. `None` disables it.
    pub target_deadline: Option<Duration>,
}

impl ScraperConfig {
    pub fn new(base_dsn: impl Into<String>) -> Result<Self, ScrapeError> {
        let base_dsn = base_dsn.into();
        if base_dsn.trim().is_empty() {
            return Err(ScrapeError::Config(
                "base connection string is empty".to_string(),
            ));
        }
        Ok(Self {
            base_dsn,
            primary_deadline: DEFAULT_PRIMARY_DEADLINE,
            target_deadline: None,
        })
    }

    /// Builds a config without validating the descriptor.
    pub(crate) fn unchecked(base_dsn: &str) -> Self {
        Self {
            base_dsn: base_dsn.to_string(),
            primary_deadline: DEFAULT_PRIMARY_DEADLINE,
            target_deadline: None,
        }
    }

    pub fn with_primary_deadline(mut self, deadline: Duration) -> Self {
        self.primary_deadline = deadline;
        self
    }

    pub fn with_target_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.target_deadline = deadline;
        self
    }

    pub fn base_dsn(&self) -> &str {
        &self.base_dsn
    }

    /// Descriptor for a connection scoped to `database`.
    pub fn dsn_for(&self, database: &str) -> String {
        replace_dbname(&self.base_dsn, database)
    }
}
