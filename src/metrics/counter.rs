use std::sync::{
    atomic::{self, AtomicU64},
    Arc,
};

use super::{Desc, Metric, MetricKind, MetricValue, MetricVec, Opts};
use crate::{
    error::{Error, Result},
    utils::atomic_add_f64,
};

/// A monotonically increasing floating point counter. The value is
/// cumulative for the life of the process.
#[derive(Clone, Debug)]
pub struct Counter {
    inner: Arc<AtomicU64>,
}

impl Default for Counter {
    fn default() -> Self {
        Self {
            inner: Arc::new(AtomicU64::new(0f64.to_bits())),
        }
    }
}

impl Counter {
    /// Increase the counter by `value`. Counters can't go down, so negative
    /// increments are rejected and leave the counter untouched.
    pub fn add(&self, value: f64) -> Result<()> {
        if value < 0.0 {
            return Err(Error::NegativeCounterIncrement(value));
        }
        atomic_add_f64(&self.inner, value);
        Ok(())
    }

    pub fn inc(&self) {
        atomic_add_f64(&self.inner, 1.0);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.inner.load(atomic::Ordering::Relaxed))
    }
}

impl super::Metric for Counter {
    const KIND: MetricKind = MetricKind::Counter;
    type Config = ();

    fn new(_config: &()) -> Self {
        Self::default()
    }
}

impl super::Recordable for Counter {
    fn value(&self) -> MetricValue {
        MetricValue::Counter(self.get())
    }
}

pub type CounterVec = MetricVec<Counter>;

impl MetricVec<Counter> {
    pub fn new(opts: Opts, variable_labels: Vec<String>) -> Result<Self> {
        let desc = Desc::new(opts, Counter::KIND, variable_labels)?;
        Ok(Self::create(desc, ()))
    }
}
