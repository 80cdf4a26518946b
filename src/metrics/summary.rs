use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use super::{Desc, Metric, MetricKind, MetricValue, MetricVec, Opts};
use crate::error::{Error, Result};

/// Quantile objectives used when a definition doesn't provide its own:
/// p70 within 2%, p95 within 0.5% and p99 within 0.1%.
pub const DEFAULT_OBJECTIVES: &[(f64, f64)] = &[(0.7, 0.02), (0.95, 0.005), (0.99, 0.001)];
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_AGE_BUCKETS: u32 = 5;
pub const DEFAULT_BUF_CAP: usize = 500;

/// Shape of a summary: what to estimate and over which sliding window.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOpts {
    /// `(quantile, allowed error)` pairs, kept sorted by quantile.
    pub objectives: Vec<(f64, f64)>,
    /// How long an observation influences the quantile estimates.
    pub max_age: Duration,
    /// Number of streams the window is split into. The oldest one is dropped
    /// every `max_age / age_buckets`.
    pub age_buckets: u32,
    pub buf_cap: usize,
}

impl Default for SummaryOpts {
    fn default() -> Self {
        Self::new(DEFAULT_OBJECTIVES)
    }
}

impl SummaryOpts {
    pub fn new(objectives: &[(f64, f64)]) -> Self {
        let mut objectives = objectives.to_vec();
        objectives.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            objectives,
            max_age: DEFAULT_MAX_AGE,
            age_buckets: DEFAULT_AGE_BUCKETS,
            buf_cap: DEFAULT_BUF_CAP,
        }
    }

    pub fn max_age(mut self, max_age: Duration, age_buckets: u32) -> Self {
        self.max_age = max_age;
        self.age_buckets = age_buckets;
        self
    }

    fn validate(&self, metric: &str) -> Result<()> {
        for &(quantile, error) in &self.objectives {
            if !(quantile > 0.0 && quantile < 1.0) || !(0.0..1.0).contains(&error) {
                return Err(Error::InvalidObjective {
                    metric: metric.to_string(),
                    quantile,
                    error,
                });
            }
        }
        Ok(())
    }

    /// Zero values fall back to the defaults.
    fn normalized(mut self) -> Self {
        if self.max_age.is_zero() {
            self.max_age = DEFAULT_MAX_AGE;
        }
        if self.age_buckets == 0 {
            self.age_buckets = DEFAULT_AGE_BUCKETS;
        }
        if self.buf_cap == 0 {
            self.buf_cap = DEFAULT_BUF_CAP;
        }
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    value: f64,
    width: f64,
    delta: f64,
}

/// The allowed rank error at rank `r` of a stream of `n` observations. This
/// is the targeted-quantiles invariant from Cormode, Korn, Muthukrishnan and
/// Srivastava: ranks near a target quantile get tight bounds, everything else
/// can be compressed aggressively.
fn invariant(targets: &[(f64, f64)], n: f64, r: f64) -> f64 {
    let mut min = f64::MAX;
    for &(quantile, epsilon) in targets {
        let f = if quantile * n <= r {
            (2.0 * epsilon * r) / quantile
        } else {
            (2.0 * epsilon * (n - r)) / (1.0 - quantile)
        };
        if f < min {
            min = f;
        }
    }
    min
}

/// A CKMS stream estimating a fixed set of target quantiles in bounded
/// memory. Inserts are buffered and merged into the compressed sample list
/// in sorted batches.
#[derive(Debug)]
struct QuantileStream {
    targets: Vec<(f64, f64)>,
    n: f64,
    samples: Vec<Sample>,
    buffer: Vec<Sample>,
    buf_cap: usize,
    sorted: bool,
}

impl QuantileStream {
    fn new(targets: Vec<(f64, f64)>, buf_cap: usize) -> Self {
        Self {
            targets,
            n: 0.0,
            samples: Vec::new(),
            buffer: Vec::with_capacity(buf_cap),
            buf_cap,
            sorted: true,
        }
    }

    fn insert(&mut self, value: f64) {
        self.buffer.push(Sample {
            value,
            width: 1.0,
            delta: 0.0,
        });
        self.sorted = false;
        if self.buffer.len() >= self.buf_cap {
            self.flush();
        }
    }

    fn count(&self) -> usize {
        self.buffer.len() + self.n as usize
    }

    fn reset(&mut self) {
        self.n = 0.0;
        self.samples.clear();
        self.buffer.clear();
        self.sorted = true;
    }

    fn query(&mut self, quantile: f64) -> f64 {
        if self.samples.is_empty() {
            // Nothing merged yet, so the buffer holds every observation and
            // we can answer exactly.
            let len = self.buffer.len();
            if len == 0 {
                return 0.0;
            }
            let mut index = (len as f64 * quantile).ceil() as usize;
            if index > 0 {
                index -= 1;
            }
            self.maybe_sort();
            return self.buffer[index.min(len - 1)].value;
        }
        self.flush();
        self.query_merged(quantile)
    }

    fn maybe_sort(&mut self) {
        if !self.sorted {
            self.buffer
                .sort_unstable_by(|a, b| a.value.total_cmp(&b.value));
            self.sorted = true;
        }
    }

    fn flush(&mut self) {
        self.maybe_sort();
        let buffer = std::mem::take(&mut self.buffer);
        self.merge(&buffer);
        self.buffer = buffer;
        self.buffer.clear();
    }

    /// Merge a sorted batch into the sample list, then compress.
    fn merge(&mut self, batch: &[Sample]) {
        let mut r = 0.0;
        let mut i = 0;
        for sample in batch {
            let mut inserted = false;
            while i < self.samples.len() {
                let current = self.samples[i];
                if current.value > sample.value {
                    let delta = sample
                        .delta
                        .max(invariant(&self.targets, self.n, r).floor() - 1.0);
                    self.samples.insert(
                        i,
                        Sample {
                            value: sample.value,
                            width: sample.width,
                            delta,
                        },
                    );
                    i += 1;
                    inserted = true;
                    break;
                }
                r += current.width;
                i += 1;
            }
            if !inserted {
                self.samples.push(Sample {
                    value: sample.value,
                    width: sample.width,
                    delta: 0.0,
                });
                i += 1;
            }
            self.n += sample.width;
            r += sample.width;
        }
        self.compress();
    }

    fn compress(&mut self) {
        if self.samples.len() < 2 {
            return;
        }
        let mut xi = self.samples.len() - 1;
        let mut x = self.samples[xi];
        let mut r = self.n - 1.0 - x.width;
        for i in (0..self.samples.len() - 1).rev() {
            let current = self.samples[i];
            if current.width + x.width + x.delta <= invariant(&self.targets, self.n, r) {
                x.width += current.width;
                self.samples[xi] = x;
                self.samples.remove(i);
                xi -= 1;
            } else {
                x = current;
                xi = i;
            }
            r -= current.width;
        }
    }

    fn query_merged(&self, quantile: f64) -> f64 {
        let mut t = (quantile * self.n).ceil();
        t += (invariant(&self.targets, self.n, t) / 2.0).ceil();
        let mut prev = self.samples[0];
        let mut r = 0.0;
        for current in &self.samples[1..] {
            r += prev.width;
            if r + current.width + current.delta > t {
                return prev.value;
            }
            prev = *current;
        }
        prev.value
    }
}

/// Summary state guarded by one lock. Quantiles are answered from a ring of
/// age streams: every observation goes into all of them, and the head stream
/// (the oldest) is reset and retired every `stream_duration`, so estimates
/// only ever cover the last `max_age`. Sum and count are never aged out.
#[derive(Debug)]
struct SummaryInner {
    objectives: Vec<(f64, f64)>,
    buffer: Vec<f64>,
    buf_cap: usize,
    buf_exp: Instant,
    streams: Vec<QuantileStream>,
    head: usize,
    head_exp: Instant,
    stream_duration: Duration,
    sum: f64,
    count: u64,
}

impl SummaryInner {
    fn new(opts: &SummaryOpts, now: Instant) -> Self {
        let stream_duration = opts.max_age / opts.age_buckets;
        let streams = (0..opts.age_buckets)
            .map(|_| QuantileStream::new(opts.objectives.clone(), opts.buf_cap))
            .collect();
        Self {
            objectives: opts.objectives.clone(),
            buffer: Vec::with_capacity(opts.buf_cap),
            buf_cap: opts.buf_cap,
            buf_exp: now + stream_duration,
            streams,
            head: 0,
            head_exp: now + stream_duration,
            stream_duration,
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64, now: Instant) {
        if now > self.buf_exp {
            self.flush(now);
        }
        self.buffer.push(value);
        if self.buffer.len() >= self.buf_cap {
            self.flush(now);
        }
    }

    fn flush(&mut self, now: Instant) {
        for value in self.buffer.drain(..) {
            for stream in &mut self.streams {
                stream.insert(value);
            }
            self.count += 1;
            self.sum += value;
        }
        while now > self.buf_exp {
            self.buf_exp += self.stream_duration;
        }
        self.maybe_rotate();
    }

    fn maybe_rotate(&mut self) {
        while self.head_exp < self.buf_exp {
            self.streams[self.head].reset();
            self.head = (self.head + 1) % self.streams.len();
            self.head_exp += self.stream_duration;
        }
    }

    fn snapshot(&mut self, now: Instant) -> MetricValue {
        self.flush(now);
        let head = &mut self.streams[self.head];
        let quantiles = self
            .objectives
            .iter()
            .map(|&(quantile, _)| {
                let estimate = if head.count() == 0 {
                    f64::NAN
                } else {
                    head.query(quantile)
                };
                (quantile, estimate)
            })
            .collect();
        MetricValue::Summary {
            sum: self.sum,
            count: self.count,
            quantiles,
        }
    }
}

/// A threadsafe summary tracking the sum, count and configured quantiles of
/// the observed values.
#[derive(Clone, Debug)]
pub struct Summary {
    inner: Arc<Mutex<SummaryInner>>,
}

impl Summary {
    pub fn new(opts: SummaryOpts) -> Self {
        let opts = opts.normalized();
        Self {
            inner: Arc::new(Mutex::new(SummaryInner::new(&opts, Instant::now()))),
        }
    }

    pub fn observe(&self, value: f64) {
        self.inner.lock().observe(value, Instant::now());
    }
}

impl Default for Summary {
    fn default() -> Self {
        Self::new(SummaryOpts::default())
    }
}

impl super::Metric for Summary {
    const KIND: MetricKind = MetricKind::Summary;
    type Config = SummaryOpts;

    fn new(config: &SummaryOpts) -> Self {
        Summary::new(config.clone())
    }
}

impl super::Recordable for Summary {
    fn value(&self) -> MetricValue {
        let value = self.inner.lock().snapshot(Instant::now());
        if let MetricValue::Summary { sum, count, .. } = &value {
            tracing::trace!(message = "summary.value", sum = *sum, count = *count);
        }
        value
    }
}

pub type SummaryVec = MetricVec<Summary>;

impl MetricVec<Summary> {
    pub fn new(opts: Opts, variable_labels: Vec<String>, summary: SummaryOpts) -> Result<Self> {
        let desc = Desc::new(opts, Summary::KIND, variable_labels)?;
        summary.validate(&desc.fq_name)?;
        Ok(Self::create(desc, summary.normalized()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metrics::Recordable;

    fn quantiles(value: MetricValue) -> Vec<(f64, f64)> {
        match value {
            MetricValue::Summary { quantiles, .. } => quantiles,
            other => panic!("expected a summary, got {other:?}"),
        }
    }

    #[test]
    fn empty_summary_reports_nan() {
        let summary = Summary::default();
        let value = summary.value();
        assert!(matches!(value, MetricValue::Summary { count: 0, .. }));
        assert!(quantiles(value).iter().all(|(_, v)| v.is_nan()));
    }

    #[test]
    fn small_sets_are_exact() {
        let summary = Summary::default();
        for i in (1..=100).rev() {
            summary.observe(i as f64);
        }
        let value = summary.value();
        assert!(matches!(value, MetricValue::Summary { count: 100, sum, .. } if sum == 5050.0));
        assert_eq!(quantiles(value), [(0.7, 70.0), (0.95, 95.0), (0.99, 99.0)]);
    }

    #[test]
    fn large_sets_stay_within_error() {
        let summary = Summary::default();
        let n = 20_000;
        // interleave ascending and descending runs so merges hit both ends
        for i in 0..n / 2 {
            summary.observe(i as f64 + 1.0);
            summary.observe((n - i) as f64);
        }
        for (quantile, estimate) in quantiles(summary.value()) {
            let error = DEFAULT_OBJECTIVES
                .iter()
                .find(|(q, _)| *q == quantile)
                .map(|(_, e)| *e)
                .unwrap();
            let expected = quantile * n as f64;
            let allowed = error * n as f64 + 1.0;
            assert!(
                (estimate - expected).abs() <= allowed,
                "q{quantile}: estimate {estimate}, expected {expected} +/- {allowed}"
            );
        }
    }

    #[test]
    fn observations_age_out() {
        let opts = SummaryOpts::default()
            .max_age(Duration::from_secs(10), 5)
            .normalized();
        let start = Instant::now();
        let mut inner = SummaryInner::new(&opts, start);
        inner.observe(42.0, start);

        let fresh = quantiles(inner.snapshot(start + Duration::from_secs(3)));
        assert!(fresh.iter().all(|(_, v)| *v == 42.0));

        let value = inner.snapshot(start + Duration::from_secs(11));
        assert!(matches!(value, MetricValue::Summary { count: 1, sum, .. } if sum == 42.0));
        assert!(quantiles(value).iter().all(|(_, v)| v.is_nan()));
    }

    #[test]
    fn objectives_are_validated() {
        let opts = Opts::new("latency", "");
        let bad = SummaryOpts::new(&[(1.0, 0.01)]);
        assert!(matches!(
            SummaryVec::new(opts.clone(), vec![], bad),
            Err(Error::InvalidObjective { .. })
        ));
        let bad = SummaryOpts::new(&[(0.5, 1.5)]);
        assert!(SummaryVec::new(opts.clone(), vec![], bad).is_err());
        assert!(SummaryVec::new(opts, vec![], SummaryOpts::default()).is_ok());
    }

    #[test]
    fn objectives_are_sorted() {
        let opts = SummaryOpts::new(&[(0.99, 0.001), (0.5, 0.05)]);
        assert_eq!(opts.objectives, [(0.5, 0.05), (0.99, 0.001)]);
    }
}
