//! Process-local metrics for a game server: a fixed catalog of counters,
//! gauges and summaries, registered once and scraped over HTTP.
//!
//! ```no_run
//! use nano_metrics::{catalog, Labels, Report};
//!
//! let reporter = nano_metrics::acquire(9090, "mygame", "frontend", [("region", "us")])?;
//! reporter.report_gauge(catalog::CONNECTED_CLIENTS, &Labels::new(), 42.0)?;
//! # Ok::<(), nano_metrics::Error>(())
//! ```
//!
//! Every series of a metric carries the same label keys: the constant labels
//! (`game`, `serverType` and whatever the host adds), the metric's own
//! variable labels, and the process-wide additional labels, whose defaults
//! fill in whatever an observation leaves out.

pub mod catalog;
mod config;
mod error;
pub mod exposition;
mod labels;
pub mod metrics;
mod registry;
mod reporter;
pub mod runtime;
pub mod server;
mod utils;

pub use config::{ReporterConfig, DEFAULT_PORT};
pub use error::{Error, Result};
pub use labels::{AdditionalLabels, Labels};
pub use metrics::{
    Collector, Counter, CounterDef, CounterVec, Gauge, GaugeDef, GaugeVec, MetricDef, MetricFamily,
    MetricKind, MetricValue, Opts, Summary, SummaryDef, SummaryOpts, SummaryVec,
};
pub use registry::{Registry, DEFAULT_REGISTRY};
pub use reporter::{
    acquire, acquire_with, Report, Reporter, ReporterBuilder, GAME_LABEL, SERVER_TYPE_LABEL,
};
