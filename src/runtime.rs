//! Provide simple tokio runtime metrics. The live task count is the closest
//! thing a tokio process has to a goroutine count, so it is reported under
//! [`catalog::GOROUTINES`].

use std::time::Duration;

use crate::{catalog, error::Result, labels::Labels, reporter::Report};

/// Report the current runtime's live task count once.
///
/// Must be called from within a tokio runtime.
pub fn sample<R: Report + ?Sized>(reporter: &R) -> Result<()> {
    let metrics = tokio::runtime::Handle::current().metrics();
    reporter.report_gauge(
        catalog::GOROUTINES,
        &Labels::new(),
        metrics.num_alive_tasks() as f64,
    )
}

/// Export runtime metrics every `interval`, forever.
pub async fn export_task<R: Report + ?Sized>(reporter: &R, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(e) = sample(reporter) {
            tracing::warn!(message = "failed to report runtime metrics", error = %e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{registry::Registry, Reporter};

    #[tokio::test]
    async fn reports_alive_tasks() {
        let registry = Registry::new();
        let reporter = Reporter::builder().game("g").build(&registry).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let parked = tokio::spawn(async move {
            let _ = rx.await;
        });

        sample(&reporter).unwrap();
        let gauge = reporter.gauge(catalog::GOROUTINES).unwrap();
        assert!(gauge.with_label_values(&[]).unwrap().get() >= 1.0);

        tx.send(()).unwrap();
        parked.await.unwrap();
    }
}
