use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nano_metrics::{catalog, Labels, Registry, Report, Reporter};

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn benchmark_reconcile(c: &mut Criterion) {
    let registry = Registry::new();
    let reporter = Reporter::builder()
        .game("bench")
        .additional_label("shard", "0")
        .additional_label("zone", "a")
        .build(&registry)
        .unwrap();
    let complete = labels(&[("shard", "1"), ("zone", "b")]);
    let empty = Labels::new();
    c.bench_function("reconcile-complete", |b| {
        b.iter(|| black_box(reporter.additional_labels().reconcile(&complete)))
    });
    c.bench_function("reconcile-missing", |b| {
        b.iter(|| black_box(reporter.additional_labels().reconcile(&empty)))
    });
}

pub fn benchmark_report(c: &mut Criterion) {
    let registry = Registry::new();
    let reporter = Reporter::builder().game("bench").build(&registry).unwrap();
    let empty = Labels::new();
    let route = labels(&[("route", "room.join")]);
    c.bench_function("report-gauge", |b| {
        let mut value = 0.0;
        b.iter(|| {
            value += 1.0;
            reporter.report_gauge(catalog::CONNECTED_CLIENTS, &empty, value)
        })
    });
    c.bench_function("report-count", |b| {
        b.iter(|| reporter.report_count(catalog::EXCEEDED_RATE_LIMIT, &empty, 1.0))
    });
    c.bench_function("report-summary", |b| {
        let mut value = 0.0;
        b.iter(|| {
            value += 1.0;
            reporter.report_summary(catalog::RESPONSE_TIME, &route, value)
        })
    });
    c.bench_function("report-unknown", |b| {
        b.iter(|| reporter.report_gauge("does-not-exist", &empty, 1.0))
    });
}

pub fn benchmark_gather(c: &mut Criterion) {
    let registry = Registry::new();
    let reporter = Reporter::builder().game("bench").build(&registry).unwrap();
    for i in 0..100 {
        let name = format!("route.{i}");
        let route = labels(&[("route", name.as_str())]);
        for v in 0..1000 {
            reporter
                .report_summary(catalog::RESPONSE_TIME, &route, v as f64)
                .unwrap();
        }
    }
    c.bench_function("gather-encode-100-routes", |b| {
        b.iter(|| nano_metrics::exposition::encode(&registry.gather()))
    });
}

criterion_group!(
    benches,
    benchmark_reconcile,
    benchmark_report,
    benchmark_gather
);
criterion_main!(benches);
