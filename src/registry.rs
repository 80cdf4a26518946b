use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, LazyLock},
};

use crate::{
    error::{Error, Result},
    metrics::{Collector, MetricFamily},
};

/// The process-wide registry. [`crate::acquire`] registers the catalog here
/// and the exposition endpoint it starts serves from it.
pub static DEFAULT_REGISTRY: LazyLock<Arc<Registry>> = LazyLock::new(|| Arc::new(Registry::new()));

/// A set of collectors keyed by fully-qualified metric name.
#[derive(Default)]
pub struct Registry {
    collectors: RwLock<BTreeMap<String, Arc<dyn Collector>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            collectors: Default::default(),
        }
    }

    pub fn register(&self, collector: Arc<dyn Collector>) -> Result<()> {
        self.register_all(vec![collector])
    }

    /// Register a batch of collectors. Either every collector is registered
    /// or, if any name is already taken (or repeated within the batch),
    /// none are.
    pub fn register_all(&self, collectors: Vec<Arc<dyn Collector>>) -> Result<()> {
        let mut registered = self.collectors.write();
        let mut batch = HashSet::with_capacity(collectors.len());
        for collector in &collectors {
            let name = collector.desc().fq_name.as_str();
            if registered.contains_key(name) || !batch.insert(name) {
                return Err(Error::AlreadyRegistered(name.to_string()));
            }
        }
        for collector in collectors {
            let name = collector.desc().fq_name.clone();
            tracing::debug!(message = "registered metric", name = %name, kind = collector.desc().kind.as_str());
            registered.insert(name, collector);
        }
        Ok(())
    }

    /// Remove a collector, returning whether it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.collectors.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collectors.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.collectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.read().is_empty()
    }

    /// Snapshot every registered collector, in name order. Families that
    /// haven't seen a single label combination yet are skipped since there
    /// is nothing to expose for them.
    pub fn gather(&self) -> Vec<MetricFamily> {
        let collectors = self.collectors.read();
        let families: Vec<MetricFamily> = collectors
            .values()
            .map(|collector| collector.collect())
            .filter(|family| !family.series.is_empty())
            .collect();
        tracing::debug!(message = "gathered metrics", collectors = collectors.len(), families = families.len());
        families
    }
}
