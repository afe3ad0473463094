//! Error types for scrape cycles.
//!
//! A scrape cycle keeps going after most failures. Individual failures are
//! collected and folded into a single [`ScrapeError`] with [`combine_errors`].

use std::time::Duration;

/// Error type for a scrape cycle or one of its stages.
#[derive(Debug)]
pub enum ScrapeError {
    /// Required configuration is missing or invalid.
    Config(String),
    /// Opening a connection failed.
    Connect(String),
    /// Query execution failed.
    Query { query: &'static str, message: String },
    /// Query was cancelled because its deadline expired.
    Timeout {
        query: &'static str,
        after: Duration,
    },
    /// A single cell of a result row could not be read.
    Scan { column: usize, reason: String },
    /// A query expected to return one row returned none.
    NoRows { query: &'static str },
    /// Failure attributed to one target database.
    Target {
        database: String,
        source: Box<ScrapeError>,
    },
    /// Several independent failures from one cycle.
    Aggregate(AggregateError),
}

impl ScrapeError {
    /// Attaches the target database name to an error.
    pub fn for_database(self, database: &str) -> Self {
        ScrapeError::Target {
            database: database.to_string(),
            source: Box::new(self),
        }
    }

    /// Returns true if this error (or the error it wraps) is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        match self {
            ScrapeError::Timeout { .. } => true,
            ScrapeError::Target { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// Number of underlying failures this error stands for.
    pub fn failure_count(&self) -> usize {
        match self {
            ScrapeError::Aggregate(agg) => agg.len(),
            _ => 1,
        }
    }
}

impl std::fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrapeError::Config(msg) => write!(f, "configuration error: {}", msg),
            ScrapeError::Connect(msg) => write!(f, "connection failed: {}", msg),
            ScrapeError::Query { query, message } => {
                write!(f, "query {} failed: {}", query, message)
            }
            ScrapeError::Timeout { query, after } => {
                write!(f, "query {} timed out after {:?}", query, after)
            }
            ScrapeError::Scan { column, reason } => {
                write!(f, "scan of column {} failed: {}", column, reason)
            }
            ScrapeError::NoRows { query } => write!(f, "query {} returned no rows", query),
            ScrapeError::Target { database, source } => {
                write!(f, "database \"{}\": {}", database, source)
            }
            ScrapeError::Aggregate(agg) => write!(f, "{}", agg),
        }
    }
}

impl std::error::Error for ScrapeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScrapeError::Target { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Ordered list of independent failures.
///
/// Its text form lists every cause, so an operator sees all of them and not
/// only the first.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<ScrapeError>,
}

impl AggregateError {
    pub fn errors(&self) -> &[ScrapeError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<ScrapeError> {
        self.errors
    }
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} errors occurred:", self.errors.len())?;
        for (i, e) in self.errors.iter().enumerate() {
            write!(f, " [{}] {}", i + 1, e)?;
            if i + 1 < self.errors.len() {
                write!(f, ";")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Reduces independent failures to one outcome.
///
/// - no failures: `Ok(())`
/// - one failure: that error, unchanged
/// - several: [`ScrapeError::Aggregate`] in the order given
///
/// Nested aggregates are flattened.
pub fn combine_errors<I>(errors: I) -> Result<(), ScrapeError>
where
    I: IntoIterator<Item = ScrapeError>,
{
    let mut flat = Vec::new();
    for e in errors {
        match e {
            ScrapeError::Aggregate(agg) => flat.extend(agg.errors),
            other => flat.push(other),
        }
    }

    match flat.len() {
        0 => Ok(()),
        1 => Err(flat.remove(0)),
        _ => Err(ScrapeError::Aggregate(AggregateError { errors: flat })),
    }
}

/// Same as [`combine_errors`] but takes the results of independent operations.
pub fn combine_results<I>(results: I) -> Result<(), ScrapeError>
where
    I: IntoIterator<Item = Result<(), ScrapeError>>,
{
    combine_errors(results.into_iter().filter_map(Result::err))
}
