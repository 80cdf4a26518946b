use std::{collections::BTreeMap, marker::PhantomData, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use smallvec::SmallVec;

use crate::{
    error::{Error, Result},
    labels::{self, AdditionalLabels, Labels},
    utils::{label_hash, BuildNoopHasher},
};

pub(crate) mod counter;
pub(crate) mod gauge;
pub(crate) mod summary;

pub use counter::{Counter, CounterVec};
pub use gauge::{Gauge, GaugeVec};
pub use summary::{Summary, SummaryOpts, SummaryVec, DEFAULT_OBJECTIVES};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Summary,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Summary => "summary",
        }
    }
}

/// A point-in-time reading of a single child metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(f64),
    Gauge(f64),
    Summary {
        sum: f64,
        count: u64,
        /// `(quantile, estimate)` pairs in ascending quantile order.
        quantiles: Vec<(f64, f64)>,
    },
}

/// Naming and constant labels for a metric family. The fully-qualified name
/// is `namespace_subsystem_name`, skipping empty parts.
#[derive(Debug, Clone, Default)]
pub struct Opts {
    pub namespace: String,
    pub subsystem: String,
    pub name: String,
    pub help: String,
    pub const_labels: BTreeMap<String, String>,
}

impl Opts {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            ..Default::default()
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = subsystem.into();
        self
    }

    pub fn const_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.const_labels = labels;
        self
    }

    pub fn fq_name(&self) -> String {
        [&self.namespace, &self.subsystem, &self.name]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// The validated, immutable shape of a registered metric family.
#[derive(Debug, Clone)]
pub struct Desc {
    pub fq_name: String,
    pub help: String,
    pub kind: MetricKind,
    pub const_labels: BTreeMap<String, String>,
    pub variable_labels: Vec<String>,
}

impl Desc {
    pub fn new(opts: Opts, kind: MetricKind, variable_labels: Vec<String>) -> Result<Self> {
        let fq_name = opts.fq_name();
        if !labels::is_valid_metric_name(&fq_name) {
            return Err(Error::InvalidMetricName(fq_name));
        }
        labels::validate_label_names(
            &fq_name,
            opts.const_labels.keys().map(String::as_str),
            &variable_labels,
        )?;
        if kind == MetricKind::Summary {
            let quantile = opts
                .const_labels
                .keys()
                .chain(variable_labels.iter())
                .find(|l| *l == labels::QUANTILE_LABEL);
            if let Some(label) = quantile {
                return Err(Error::InvalidLabelName {
                    metric: fq_name,
                    label: label.clone(),
                });
            }
        }
        Ok(Self {
            fq_name,
            help: opts.help,
            kind,
            const_labels: opts.const_labels,
            variable_labels,
        })
    }

    fn inconsistent(&self, got: impl Iterator<Item = String>) -> Error {
        let mut got: Vec<String> = got.collect();
        got.sort_unstable();
        Error::InconsistentLabels {
            metric: self.fq_name.clone(),
            expected: self.variable_labels.clone(),
            got,
        }
    }
}

/// A trait representing the public metric interface. This is common across all metric kinds, and slots into
/// [`MetricVec`] to provide the backing implementation of each labeled child.
pub trait Metric: Clone + Send + Sync + 'static {
    const KIND: MetricKind;
    type Config: Send + Sync + 'static;

    fn new(config: &Self::Config) -> Self;
}

/// A trait representing the internal chunk of the metric interface. We use this to collect observations of the
/// underlying metric value when the registry is gathered.
pub trait Recordable: Send + Sync + 'static {
    fn value(&self) -> MetricValue;
}

/// One labeled series of a gathered family. Labels are sorted by name and
/// include the constant labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub labels: Vec<(String, String)>,
    pub value: MetricValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub series: Vec<Series>,
}

/// Anything the [`crate::Registry`] can hold and gather.
pub trait Collector: Send + Sync + 'static {
    fn desc(&self) -> &Desc;
    fn collect(&self) -> MetricFamily;
}

struct Child<M> {
    values: SmallVec<[String; 8]>,
    metric: M,
}

impl<M> Child<M> {
    fn matches(&self, values: &[&str]) -> bool {
        self.values.iter().map(String::as_str).eq(values.iter().copied())
    }
}

struct VecInner<M: Metric> {
    desc: Desc,
    config: M::Config,
    children: DashMap<u64, Child<M>, BuildNoopHasher>,
}

/// A metric family partitioned by variable labels. Children are created
/// lazily on first use and live as long as the family. Cloning is cheap and
/// clones share the same children.
pub struct MetricVec<M: Metric> {
    inner: Arc<VecInner<M>>,
}

impl<M: Metric> Clone for MetricVec<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: Metric> MetricVec<M> {
    pub(crate) fn create(desc: Desc, config: M::Config) -> Self {
        Self {
            inner: Arc::new(VecInner {
                desc,
                config,
                children: DashMap::with_hasher(BuildNoopHasher),
            }),
        }
    }

    pub fn desc(&self) -> &Desc {
        &self.inner.desc
    }

    /// Return the child for `labels`, creating it if needed. The keys of
    /// `labels` must be exactly the variable labels of this family.
    pub fn with(&self, labels: &Labels) -> Result<M> {
        let desc = &self.inner.desc;
        if labels.len() != desc.variable_labels.len() {
            return Err(desc.inconsistent(labels.keys().cloned()));
        }
        let mut values: SmallVec<[&str; 8]> = SmallVec::new();
        for name in &desc.variable_labels {
            match labels.get(name) {
                Some(value) => values.push(value.as_str()),
                None => return Err(desc.inconsistent(labels.keys().cloned())),
            }
        }
        Ok(self.lookup(&values))
    }

    /// Like [`MetricVec::with`], but with values given positionally in
    /// declaration order.
    pub fn with_label_values(&self, values: &[&str]) -> Result<M> {
        let desc = &self.inner.desc;
        if values.len() != desc.variable_labels.len() {
            return Err(Error::InconsistentLabels {
                metric: desc.fq_name.clone(),
                expected: desc.variable_labels.clone(),
                got: values.iter().map(|v| v.to_string()).collect(),
            });
        }
        Ok(self.lookup(values))
    }

    fn lookup(&self, values: &[&str]) -> M {
        self.lookup_from(label_hash(values), values)
    }

    /// A child lives in the first slot from its hash onward, so label sets
    /// whose hashes collide still get separate children. Children are never
    /// removed, which keeps the probe sequence stable.
    fn lookup_from(&self, mut key: u64, values: &[&str]) -> M {
        let children = &self.inner.children;
        loop {
            match children.get(&key) {
                Some(child) if child.matches(values) => return child.metric.clone(),
                Some(_) => {
                    key = key.wrapping_add(1);
                    continue;
                }
                None => {}
            }
            match children.entry(key) {
                Entry::Occupied(entry) if entry.get().matches(values) => {
                    return entry.get().metric.clone()
                }
                Entry::Occupied(_) => key = key.wrapping_add(1),
                Entry::Vacant(entry) => {
                    let metric = M::new(&self.inner.config);
                    entry.insert(Child {
                        values: values.iter().map(|v| v.to_string()).collect(),
                        metric: metric.clone(),
                    });
                    return metric;
                }
            }
        }
    }

    /// Number of label combinations seen so far.
    pub fn len(&self) -> usize {
        self.inner.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.children.is_empty()
    }
}

impl<M: Metric + Recordable> Collector for MetricVec<M> {
    fn desc(&self) -> &Desc {
        &self.inner.desc
    }

    fn collect(&self) -> MetricFamily {
        let desc = &self.inner.desc;
        let mut series: Vec<Series> = self
            .inner
            .children
            .iter()
            .map(|child| {
                let mut labels: Vec<(String, String)> = desc
                    .const_labels
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .chain(
                        desc.variable_labels
                            .iter()
                            .cloned()
                            .zip(child.values.iter().cloned()),
                    )
                    .collect();
                labels.sort_unstable();
                Series {
                    labels,
                    value: child.metric.value(),
                }
            })
            .collect();
        series.sort_unstable_by(|a, b| a.labels.cmp(&b.labels));
        MetricFamily {
            name: desc.fq_name.clone(),
            help: desc.help.clone(),
            kind: desc.kind,
            series,
        }
    }
}

/// A constant definition of a metric. Provides a single spot for defining the schema of a metric at compile time.
/// The namespace and constant labels are only known at runtime, so [`MetricDef::build`] combines the two.
pub struct MetricDef<M> {
    subsystem: &'static str,
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    objectives: &'static [(f64, f64)],
    _kind: PhantomData<M>,
}

pub type CounterDef = MetricDef<Counter>;
pub type GaugeDef = MetricDef<Gauge>;
pub type SummaryDef = MetricDef<Summary>;

impl<M> MetricDef<M> {
    pub const fn new(subsystem: &'static str, name: &'static str, help: &'static str) -> Self {
        Self {
            subsystem,
            name,
            help,
            labels: &[],
            objectives: DEFAULT_OBJECTIVES,
            _kind: PhantomData,
        }
    }

    /// Variable labels that come before the additional labels.
    pub const fn with_labels(self, labels: &'static [&'static str]) -> Self {
        Self { labels, ..self }
    }

    /// Quantile objectives, only meaningful for summaries.
    pub const fn with_objectives(self, objectives: &'static [(f64, f64)]) -> Self {
        Self { objectives, ..self }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn subsystem(&self) -> &'static str {
        self.subsystem
    }

    fn opts(&self, namespace: &str, const_labels: &BTreeMap<String, String>) -> Opts {
        Opts::new(self.name, self.help)
            .namespace(namespace)
            .subsystem(self.subsystem)
            .const_labels(const_labels.clone())
    }

    fn variable_labels(&self, additional: &AdditionalLabels) -> Vec<String> {
        self.labels
            .iter()
            .copied()
            .chain(additional.keys())
            .map(String::from)
            .collect()
    }
}

impl MetricDef<Counter> {
    pub fn build(
        &self,
        namespace: &str,
        const_labels: &BTreeMap<String, String>,
        additional: &AdditionalLabels,
    ) -> Result<CounterVec> {
        CounterVec::new(
            self.opts(namespace, const_labels),
            self.variable_labels(additional),
        )
    }
}

impl MetricDef<Gauge> {
    pub fn build(
        &self,
        namespace: &str,
        const_labels: &BTreeMap<String, String>,
        additional: &AdditionalLabels,
    ) -> Result<GaugeVec> {
        GaugeVec::new(
            self.opts(namespace, const_labels),
            self.variable_labels(additional),
        )
    }
}

impl MetricDef<Summary> {
    pub fn build(
        &self,
        namespace: &str,
        const_labels: &BTreeMap<String, String>,
        additional: &AdditionalLabels,
    ) -> Result<SummaryVec> {
        SummaryVec::new(
            self.opts(namespace, const_labels),
            self.variable_labels(additional),
            SummaryOpts::new(self.objectives),
        )
    }
}
