use std::time::{Duration, Instant};

use nano_metrics::{catalog, Labels, Report};

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let reporter = nano_metrics::acquire(9090, "mygame", "frontend", [("region", "us")])?;
    tokio::spawn(nano_metrics::runtime::export_task(
        reporter,
        Duration::from_secs(10),
    ));

    let route: Labels = [("route".to_string(), "room.join".to_string())].into();
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut clients = 0.0;
    loop {
        let started = Instant::now();
        ticker.tick().await;
        clients += 1.0;
        reporter.report_gauge(catalog::CONNECTED_CLIENTS, &Labels::new(), clients)?;
        reporter.report_summary(
            catalog::RESPONSE_TIME,
            &route,
            started.elapsed().as_nanos() as f64,
        )?;
    }
}
