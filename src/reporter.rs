use std::{
    collections::{BTreeMap, HashMap},
    net::{SocketAddr, TcpListener},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
};

use parking_lot::Mutex;

use crate::{
    catalog,
    config::ReporterConfig,
    error::Result,
    labels::{AdditionalLabels, Labels},
    metrics::{Collector, CounterVec, GaugeVec, SummaryVec},
    registry::{Registry, DEFAULT_REGISTRY},
    server,
};

pub const GAME_LABEL: &str = "game";
pub const SERVER_TYPE_LABEL: &str = "serverType";

/// The reporting side of a metrics backend. Each call looks the metric up by
/// name; names the backend doesn't know are accepted and dropped.
pub trait Report: Send + Sync {
    /// Record one sample of a summary.
    fn report_summary(&self, metric: &str, labels: &Labels, value: f64) -> Result<()>;
    /// Increase a counter by `count`.
    fn report_count(&self, metric: &str, labels: &Labels, count: f64) -> Result<()>;
    /// Set a gauge to `value`.
    fn report_gauge(&self, metric: &str, labels: &Labels, value: f64) -> Result<()>;
}

/// Owns one live collector per catalog entry and forwards observations to
/// them after completing their labels.
pub struct Reporter {
    game: String,
    server_type: String,
    const_labels: BTreeMap<String, String>,
    additional_labels: AdditionalLabels,
    counters: HashMap<&'static str, CounterVec>,
    gauges: HashMap<&'static str, GaugeVec>,
    summaries: HashMap<&'static str, SummaryVec>,
    unknown_reports: AtomicU64,
    local_addr: Option<SocketAddr>,
}

impl Reporter {
    pub fn builder() -> ReporterBuilder {
        ReporterBuilder::default()
    }

    /// Build every catalog metric and register it with `registry`. Nothing is
    /// served; see [`Reporter::start`] for that.
    pub fn new(config: &ReporterConfig, registry: &Registry) -> Result<Self> {
        let mut const_labels = config.const_labels.clone();
        const_labels.insert(GAME_LABEL.to_string(), config.game.clone());
        const_labels.insert(SERVER_TYPE_LABEL.to_string(), config.server_type.clone());
        let additional_labels = AdditionalLabels::new(config.additional_labels.clone());

        let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();
        let mut summaries = HashMap::with_capacity(catalog::SUMMARIES.len());
        for def in catalog::SUMMARIES {
            let summary = def.build(catalog::NAMESPACE, &const_labels, &additional_labels)?;
            collectors.push(Arc::new(summary.clone()));
            summaries.insert(def.name(), summary);
        }
        let mut gauges = HashMap::with_capacity(catalog::GAUGES.len());
        for def in catalog::GAUGES {
            let gauge = def.build(catalog::NAMESPACE, &const_labels, &additional_labels)?;
            collectors.push(Arc::new(gauge.clone()));
            gauges.insert(def.name(), gauge);
        }
        let mut counters = HashMap::with_capacity(catalog::COUNTERS.len());
        for def in catalog::COUNTERS {
            let counter = def.build(catalog::NAMESPACE, &const_labels, &additional_labels)?;
            collectors.push(Arc::new(counter.clone()));
            counters.insert(def.name(), counter);
        }
        registry.register_all(collectors)?;

        Ok(Self {
            game: config.game.clone(),
            server_type: config.server_type.clone(),
            const_labels,
            additional_labels,
            counters,
            gauges,
            summaries,
            unknown_reports: AtomicU64::new(0),
            local_addr: None,
        })
    }

    /// Bind the scrape port, register the catalog with `registry` and serve
    /// it in the background. The port is bound first so that a busy port
    /// leaves the registry untouched.
    pub fn start(config: ReporterConfig, registry: Arc<Registry>) -> Result<Self> {
        Self::start_with(config, registry, server::spawn)
    }

    /// If serving fails the catalog is unregistered again, so a failed start
    /// can be retried against the same registry.
    fn start_with<F>(config: ReporterConfig, registry: Arc<Registry>, spawn: F) -> Result<Self>
    where
        F: FnOnce(TcpListener, Arc<Registry>) -> Result<SocketAddr>,
    {
        let listener = server::bind(config.port)?;
        let mut reporter = Self::new(&config, &registry)?;
        match spawn(listener, Arc::clone(&registry)) {
            Ok(addr) => reporter.local_addr = Some(addr),
            Err(e) => {
                reporter.unregister(&registry);
                return Err(e);
            }
        }
        Ok(reporter)
    }

    /// Remove every catalog metric this reporter registered from `registry`.
    pub fn unregister(&self, registry: &Registry) {
        let names = self
            .summaries
            .values()
            .map(|summary| summary.desc())
            .chain(self.gauges.values().map(|gauge| gauge.desc()))
            .chain(self.counters.values().map(|counter| counter.desc()))
            .map(|desc| desc.fq_name.as_str());
        for name in names {
            registry.unregister(name);
        }
    }

    pub fn game(&self) -> &str {
        &self.game
    }

    pub fn server_type(&self) -> &str {
        &self.server_type
    }

    /// Constant labels as registered, including `game` and `serverType`.
    pub fn const_labels(&self) -> &BTreeMap<String, String> {
        &self.const_labels
    }

    pub fn additional_labels(&self) -> &AdditionalLabels {
        &self.additional_labels
    }

    /// Address of the scrape endpoint, if this reporter is serving one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// How many reports named a metric outside the catalog.
    pub fn unknown_reports(&self) -> u64 {
        self.unknown_reports.load(Ordering::Relaxed)
    }

    pub fn summary(&self, metric: &str) -> Option<&SummaryVec> {
        self.summaries.get(metric)
    }

    pub fn counter(&self, metric: &str) -> Option<&CounterVec> {
        self.counters.get(metric)
    }

    pub fn gauge(&self, metric: &str) -> Option<&GaugeVec> {
        self.gauges.get(metric)
    }

    fn unknown(&self, kind: &'static str, metric: &str) {
        self.unknown_reports.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(message = "report for unknown metric ignored", kind = kind, metric = metric);
    }
}

impl Report for Reporter {
    fn report_summary(&self, metric: &str, labels: &Labels, value: f64) -> Result<()> {
        let Some(summary) = self.summaries.get(metric) else {
            self.unknown("summary", metric);
            return Ok(());
        };
        let labels = self.additional_labels.reconcile(labels);
        summary.with(&labels)?.observe(value);
        Ok(())
    }

    fn report_count(&self, metric: &str, labels: &Labels, count: f64) -> Result<()> {
        let Some(counter) = self.counters.get(metric) else {
            self.unknown("counter", metric);
            return Ok(());
        };
        let labels = self.additional_labels.reconcile(labels);
        counter.with(&labels)?.add(count)
    }

    fn report_gauge(&self, metric: &str, labels: &Labels, value: f64) -> Result<()> {
        let Some(gauge) = self.gauges.get(metric) else {
            self.unknown("gauge", metric);
            return Ok(());
        };
        let labels = self.additional_labels.reconcile(labels);
        gauge.with(&labels)?.set(value);
        Ok(())
    }
}

/// Fluent construction of a [`ReporterConfig`].
#[derive(Debug, Clone, Default)]
pub struct ReporterBuilder {
    config: ReporterConfig,
}

impl ReporterBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn game(mut self, game: impl Into<String>) -> Self {
        self.config.game = game.into();
        self
    }

    pub fn server_type(mut self, server_type: impl Into<String>) -> Self {
        self.config.server_type = server_type.into();
        self
    }

    pub fn const_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.const_labels.insert(key.into(), value.into());
        self
    }

    pub fn additional_label(mut self, key: impl Into<String>, default: impl Into<String>) -> Self {
        self.config
            .additional_labels
            .insert(key.into(), default.into());
        self
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    /// See [`Reporter::new`].
    pub fn build(self, registry: &Registry) -> Result<Reporter> {
        Reporter::new(&self.config, registry)
    }

    /// See [`Reporter::start`].
    pub fn start(self, registry: Arc<Registry>) -> Result<Reporter> {
        Reporter::start(self.config, registry)
    }
}

static REPORTER: OnceLock<Reporter> = OnceLock::new();
static INIT: Mutex<()> = parking_lot::const_mutex(());

/// Get the process-wide reporter, creating it on first use.
///
/// The first successful call registers the catalog with [`DEFAULT_REGISTRY`]
/// and starts serving it on `port`; every later call returns that same
/// reporter and ignores its arguments. Concurrent first calls initialize
/// exactly once and all wait for it. If initialization fails nothing is
/// stored and the error is returned, so the caller decides whether that is
/// fatal.
pub fn acquire<I, K, V>(
    port: u16,
    game: &str,
    server_type: &str,
    const_labels: I,
) -> Result<&'static Reporter>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    if let Some(reporter) = REPORTER.get() {
        return Ok(reporter);
    }
    acquire_with(ReporterConfig::new(port, game, server_type, const_labels))
}

/// [`acquire`] taking a full [`ReporterConfig`], additional labels included.
pub fn acquire_with(config: ReporterConfig) -> Result<&'static Reporter> {
    if let Some(reporter) = REPORTER.get() {
        return Ok(reporter);
    }
    let _guard = INIT.lock();
    if let Some(reporter) = REPORTER.get() {
        return Ok(reporter);
    }
    let reporter = Reporter::start(config, Arc::clone(&DEFAULT_REGISTRY))?;
    Ok(REPORTER.get_or_init(|| reporter))
}
