use std::{
    io::{Read, Write},
    net::TcpStream,
};

use nano_metrics::{catalog, Labels, Report, Reporter};

fn reporter() -> &'static Reporter {
    nano_metrics::acquire(0, "mygame", "frontend", [("region", "us")]).unwrap()
}

fn scrape(reporter: &Reporter, path: &str) -> String {
    let addr = reporter.local_addr().unwrap();
    let mut stream = TcpStream::connect(("127.0.0.1", addr.port())).unwrap();
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
    )
    .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

#[test]
fn gauge_is_scraped_with_constant_labels() {
    let reporter = reporter();
    reporter
        .report_gauge(catalog::CONNECTED_CLIENTS, &Labels::new(), 42.0)
        .unwrap();

    let response = scrape(reporter, "/metrics");
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("# TYPE nano_acceptor_connected_clients gauge"));
    assert!(response.contains(
        "nano_acceptor_connected_clients{game=\"mygame\",region=\"us\",serverType=\"frontend\"} 42\n"
    ));
}

#[test]
fn summaries_and_counters_are_scraped() {
    let reporter = reporter();
    let route: Labels = [("route".to_string(), "room.join".to_string())].into();
    for value in [100.0, 200.0, 300.0] {
        reporter
            .report_summary(catalog::RESPONSE_TIME, &route, value)
            .unwrap();
    }
    reporter
        .report_count(catalog::EXCEEDED_RATE_LIMIT, &Labels::new(), 2.0)
        .unwrap();

    let response = scrape(reporter, "/metrics");
    let labels = "game=\"mygame\",region=\"us\",route=\"room.join\",serverType=\"frontend\"";
    assert!(response.contains("# TYPE nano_handler_response_time_ns summary"));
    assert!(response.contains(&format!(
        "nano_handler_response_time_ns{{{labels},quantile=\"0.99\"}} 300\n"
    )));
    assert!(response.contains(&format!("nano_handler_response_time_ns_sum{{{labels}}} 600\n")));
    assert!(response.contains(&format!("nano_handler_response_time_ns_count{{{labels}}} 3\n")));
    assert!(response.contains("# TYPE nano_acceptor_exceeded_rate_limiting counter"));
}

#[test]
fn unknown_paths_are_not_found() {
    let response = scrape(reporter(), "/nope");
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
}

#[test]
fn later_arguments_are_ignored() {
    let first = reporter();
    let second = nano_metrics::acquire(1, "othergame", "backend", Vec::<(String, String)>::new())
        .unwrap();
    assert!(std::ptr::eq(first, second));
    assert_eq!(second.game(), "mygame");
    assert_eq!(second.const_labels()["region"], "us");
}
