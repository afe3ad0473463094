//! In-memory connections for testing scrapers without a live cluster.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::collector::conn::{Connection, Connector, Query, Row};
use crate::collector::error::ScrapeError;

/// Builds a row from nullable text cells.
pub fn row(cells: &[Option<&str>]) -> Row {
    cells.iter().copied().collect()
}

/// Builds a row with no NULL cells.
pub fn text_row(cells: &[&str]) -> Row {
    cells.iter().map(|c| Some(*c)).collect()
}

#[derive(Debug, Clone)]
enum Scripted {
    Rows(Vec<Row>),
    Fail(String),
    /// Takes `delay` to answer; fails with a timeout when the deadline is shorter.
    Slow { delay: Duration, rows: Vec<Row> },
}

/// Shared accounting of everything the mocks did.
#[derive(Debug, Clone, Default)]
pub struct MockStats {
    /// Descriptors passed to `MockConnector::connect`, in call order.
    pub connect_attempts: Vec<String>,
    /// Databases of successfully opened connections.
    pub opened: Vec<String>,
    /// Databases of connections closed through `Connection::close`.
    pub closed: Vec<String>,
    /// Databases of connector-issued connections dropped without `close`.
    pub leaked: Vec<String>,
    /// `(database, query name, deadline)` for every executed query.
    pub executed: Vec<(String, &'static str, Option<Duration>)>,
}

type SharedStats = Arc<Mutex<MockStats>>;

fn lock(stats: &SharedStats) -> MutexGuard<'_, MockStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A connection that answers queries by name from a script.
///
/// Queries without a scripted answer fail with a query error.
#[derive(Debug, Clone)]
pub struct MockConnection {
    database: String,
    responses: HashMap<&'static str, Scripted>,
    stats: SharedStats,
    /// Issued by a connector; only these are checked for leaks.
    tracked: bool,
    closed: bool,
}

impl MockConnection {
    /// Creates a connection to `database` with an empty script.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            responses: HashMap::new(),
            stats: SharedStats::default(),
            tracked: false,
            closed: false,
        }
    }

    /// Answers `query` with `rows`.
    pub fn with_rows(mut self, query: &Query, rows: Vec<Row>) -> Self {
        self.responses.insert(query.name, Scripted::Rows(rows));
        self
    }

    /// Fails `query` with `message`.
    pub fn with_error(mut self, query: &Query, message: impl Into<String>) -> Self {
        self.responses
            .insert(query.name, Scripted::Fail(message.into()));
        self
    }

    /// Answers `query` with `rows` after `delay`. No real time passes; a
    /// deadline shorter than `delay` yields a timeout.
    pub fn with_delay(mut self, query: &Query, delay: Duration, rows: Vec<Row>) -> Self {
        self.responses
            .insert(query.name, Scripted::Slow { delay, rows });
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Snapshot of the accounting shared with the connector (if any).
    pub fn stats(&self) -> MockStats {
        lock(&self.stats).clone()
    }
}

impl Connection for MockConnection {
    fn query(
        &mut self,
        query: &Query,
        deadline: Option<Duration>,
    ) -> Result<Vec<Row>, ScrapeError> {
        lock(&self.stats)
            .executed
            .push((self.database.clone(), query.name, deadline));

        match self.responses.get(query.name) {
            Some(Scripted::Rows(rows)) => Ok(rows.clone()),
            Some(Scripted::Fail(message)) => Err(ScrapeError::Query {
                query: query.name,
                message: message.clone(),
            }),
            Some(Scripted::Slow { delay, rows }) => match deadline {
                Some(after) if *delay > after => Err(ScrapeError::Timeout {
                    query: query.name,
                    after,
                }),
                _ => Ok(rows.clone()),
            },
            None => Err(ScrapeError::Query {
                query: query.name,
                message: format!("no scripted response on {}", self.database),
            }),
        }
    }

    fn close(mut self) -> Result<(), ScrapeError> {
        self.closed = true;
        lock(&self.stats).closed.push(self.database.clone());
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if self.tracked && !self.closed {
            lock(&self.stats).leaked.push(self.database.clone());
        }
    }
}

/// Hands out scripted connections per database.
#[derive(Debug, Default)]
pub struct MockConnector {
    databases: HashMap<String, MockConnection>,
    refused: HashMap<String, String>,
    stats: SharedStats,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the script used for connections to `conn.database()`.
    pub fn with_database(mut self, mut conn: MockConnection) -> Self {
        conn.stats = Arc::clone(&self.stats);
        self.databases.insert(conn.database.clone(), conn);
        self
    }

    /// Makes connections to `database` fail with `message`.
    pub fn refuse(mut self, database: impl Into<String>, message: impl Into<String>) -> Self {
        self.refused.insert(database.into(), message.into());
        self
    }

    pub fn stats(&self) -> MockStats {
        lock(&self.stats).clone()
    }
}

impl Connector for MockConnector {
    type Conn = MockConnection;

    fn connect(&self, dsn: &str) -> Result<MockConnection, ScrapeError> {
        lock(&self.stats).connect_attempts.push(dsn.to_string());

        let database = database_of(dsn);
        if let Some(message) = self.refused.get(&database) {
            return Err(ScrapeError::Connect(message.clone()));
        }
        let Some(template) = self.databases.get(&database) else {
            return Err(ScrapeError::Connect(format!(
                "database \"{}\" does not exist",
                database
            )));
        };

        let mut conn = template.clone();
        conn.tracked = true;
        lock(&self.stats).opened.push(database);
        Ok(conn)
    }
}

/// Extracts the database name from a URL or `key=value` descriptor.
fn database_of(dsn: &str) -> String {
    if let Some(name) = dsn
        .split_whitespace()
        .find_map(|token| token.strip_prefix("dbname="))
    {
        return name.trim_matches('\'').to_string();
    }
    let last = dsn.rsplit('/').next().unwrap_or(dsn);
    last.split('?').next().unwrap_or(last).to_string()
}
