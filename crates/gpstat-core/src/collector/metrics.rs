//! Metric descriptors, measurements and the sink they are pushed to.

use std::sync::mpsc::Sender;

use tracing::trace;

/// Namespace shared by every metric this agent exports.
pub const NAMESPACE: &str = "greenplum";

const SUBSYSTEM_NODE: &str = "node";
const SUBSYSTEM_SERVER: &str = "server";

/// Static description of one metric: identity, help text and label schema.
#[derive(Debug, PartialEq, Eq)]
pub struct MetricDesc {
    pub namespace: &'static str,
    pub subsystem: &'static str,
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

impl MetricDesc {
    /// Fully qualified name: `namespace_subsystem_name`, empty parts skipped.
    pub fn fq_name(&self) -> String {
        [self.namespace, self.subsystem, self.name]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("_")
    }
}

pub static DATABASE_SIZE: MetricDesc = MetricDesc {
    namespace: NAMESPACE,
    subsystem: SUBSYSTEM_NODE,
    name: "database_name_mb_size",
    help: "Total MB size of each database name in the file system",
    labels: &["dbname"],
};

pub static TABLE_COUNT: MetricDesc = MetricDesc {
    namespace: NAMESPACE,
    subsystem: SUBSYSTEM_NODE,
    name: "database_table_total_count",
    help: "Total table count of each database name in the file system",
    labels: &["dbname"],
};

pub static BLOAT_TABLE: MetricDesc = MetricDesc {
    namespace: NAMESPACE,
    subsystem: SUBSYSTEM_SERVER,
    name: "database_table_bloat_list",
    help: "Bloat table list of each database name in greenplum cluster",
    labels: &["dbname", "schema", "table", "relpages", "exppages"],
};

pub static HIT_CACHE_RATE: MetricDesc = MetricDesc {
    namespace: NAMESPACE,
    subsystem: SUBSYSTEM_SERVER,
    name: "database_hit_cache_percent_rate",
    help: "Cache hit percent rate for all databases in the greenplum cluster",
    labels: &[],
};

pub static TX_COMMIT_RATE: MetricDesc = MetricDesc {
    namespace: NAMESPACE,
    subsystem: SUBSYSTEM_SERVER,
    name: "database_transition_commit_percent_rate",
    help: "Transaction commit percent rate for all databases in the greenplum cluster",
    labels: &[],
};

/// One value pushed to a [`MetricSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub desc: &'static MetricDesc,
    pub value: f64,
    /// Label values, in the order of `desc.labels`.
    pub labels: Vec<String>,
}

impl Measurement {
    pub fn new(desc: &'static MetricDesc, value: f64, labels: Vec<String>) -> Self {
        debug_assert_eq!(
            desc.labels.len(),
            labels.len(),
            "label arity mismatch for {}",
            desc.name
        );
        Self {
            desc,
            value,
            labels,
        }
    }

    /// Label (name, value) pairs in schema order.
    pub fn label_pairs(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.desc
            .labels
            .iter()
            .copied()
            .zip(self.labels.iter().map(String::as_str))
    }

    /// Returns the value of the label with the given name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.label_pairs()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }
}

/// Write-only destination for measurements.
///
/// Scrapers push every measurement as soon as its source row is parsed and
/// never read it back.
pub trait MetricSink {
    fn emit(&mut self, measurement: Measurement);
}

impl MetricSink for Vec<Measurement> {
    fn emit(&mut self, measurement: Measurement) {
        self.push(measurement);
    }
}

impl MetricSink for Sender<Measurement> {
    fn emit(&mut self, measurement: Measurement) {
        // Receiver gone means the consumer is shutting down.
        if let Err(e) = self.send(measurement) {
            trace!(metric = e.0.desc.name, "metric receiver dropped");
        }
    }
}

/// Bloat severity of one table, as classified by `gp_toolkit.gp_bloat_diag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BloatSeverity {
    None = 0,
    Moderate = 1,
    Significant = 2,
}

impl BloatSeverity {
    /// Classifies a diagnostic message by substring.
    ///
    /// "significant" wins over "moderate"; anything else, including a
    /// missing message, is `None`.
    pub fn from_diagnostic(diag: Option<&str>) -> Self {
        match diag {
            Some(d) if d.contains("significant") => BloatSeverity::Significant,
            Some(d) if d.contains("moderate") => BloatSeverity::Moderate,
            _ => BloatSeverity::None,
        }
    }

    pub fn tier(self) -> f64 {
        self as u8 as f64
    }
}
