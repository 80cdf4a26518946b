use std::sync::{
    atomic::{self, AtomicU64},
    Arc,
};

use super::{Desc, Metric, MetricKind, MetricValue, MetricVec, Opts};
use crate::error::Result;

#[derive(Clone, Debug)]
pub struct Gauge {
    inner: Arc<AtomicU64>,
}

impl Default for Gauge {
    fn default() -> Self {
        Self {
            inner: Arc::new(AtomicU64::new(0f64.to_bits())),
        }
    }
}

impl Gauge {
    pub fn set(&self, value: f64) {
        self.inner.store(value.to_bits(), atomic::Ordering::Relaxed)
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.inner.load(atomic::Ordering::Relaxed))
    }
}

impl super::Metric for Gauge {
    const KIND: MetricKind = MetricKind::Gauge;
    type Config = ();

    fn new(_config: &()) -> Self {
        Self::default()
    }
}

impl super::Recordable for Gauge {
    fn value(&self) -> MetricValue {
        MetricValue::Gauge(self.get())
    }
}

pub type GaugeVec = MetricVec<Gauge>;

impl MetricVec<Gauge> {
    pub fn new(opts: Opts, variable_labels: Vec<String>) -> Result<Self> {
        let desc = Desc::new(opts, Gauge::KIND, variable_labels)?;
        Ok(Self::create(desc, ()))
    }
}
