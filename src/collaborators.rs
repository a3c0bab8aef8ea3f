//! Narrow interfaces for everything the core treats as an external
//! collaborator: dataset ingestion, query sources, and metrics sinks.
//! None of these are implemented here — CSV/Parquet loaders, CLI
//! front-ends, and observability exporters live outside the core and
//! are wired up by whoever embeds it.

use crate::manager::CheckResult;
use crate::metrics::MetricsSnapshot;
use crate::types::Timestamp;

/// One row of ingested ground truth: an address, whether it's labeled
/// malicious, and when the label was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledAddress {
    pub ip: String,
    pub malicious: bool,
    pub observed_at: Timestamp,
}

/// A source of labeled addresses to feed into `report_malicious` — a
/// CSV/Parquet reader, a threat-intel feed, a replayed capture. The
/// core only consumes the stream; it never opens a file or a socket.
pub trait DatasetSource {
    fn next_labeled_address(&mut self) -> Option<LabeledAddress>;
}

/// A source of addresses to run through `fast_check` — a live packet
/// capture, a query log replay, a benchmark driver.
pub trait QuerySource {
    fn next_query(&mut self) -> Option<String>;
}

/// Receives the outcome of each query alongside a metrics snapshot, for
/// whatever downstream reporting (dashboards, logs, alerts) the
/// embedder wants. The core calls into this; it never calls out to a
/// metrics backend itself.
pub trait MetricsSink {
    fn record_check(&mut self, ip: &str, result: CheckResult, metrics: &MetricsSnapshot);
}
