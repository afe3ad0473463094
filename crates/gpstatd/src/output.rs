//! Line encoders for the measurement stream.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::mpsc::Receiver;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use gpstat_core::collector::Measurement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `name{label="value"} value`
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: String,
    metric: String,
    help: &'a str,
    labels: BTreeMap<&'a str, &'a str>,
    value: f64,
}

/// Formats a measurement in the text exposition style.
pub fn format_text(m: &Measurement) -> String {
    let name = m.desc.fq_name();
    if m.labels.is_empty() {
        return format!("{} {}", name, m.value);
    }
    let labels = m
        .label_pairs()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",");
    format!("{}{{{}}} {}", name, labels, m.value)
}

/// Formats a measurement as a JSON object.
pub fn format_json(m: &Measurement, now: DateTime<Utc>) -> serde_json::Result<String> {
    serde_json::to_string(&JsonLine {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        metric: m.desc.fq_name(),
        help: m.desc.help,
        labels: m.label_pairs().collect(),
        value: m.value,
    })
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Writes every measurement from `rx` until all senders are dropped.
///
/// Returns the number of lines written.
pub fn write_all<W: Write>(
    rx: Receiver<Measurement>,
    format: OutputFormat,
    mut out: W,
) -> io::Result<u64> {
    let mut written = 0;
    for m in rx {
        let line = match format {
            OutputFormat::Text => format_text(&m),
            OutputFormat::Json => format_json(&m, Utc::now()).map_err(io::Error::other)?,
        };
        writeln!(out, "{}", line)?;
        out.flush()?;
        written += 1;
    }
    Ok(written)
}
