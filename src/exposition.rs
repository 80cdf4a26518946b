//! Prometheus text exposition format (version 0.0.4).
//!
//! ```text
//! # HELP nano_acceptor_connected_clients the number of clients connected right now
//! # TYPE nano_acceptor_connected_clients gauge
//! nano_acceptor_connected_clients{game="mygame",serverType="frontend"} 42
//! ```

use std::fmt::Write;

use crate::metrics::{MetricFamily, MetricValue};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Encode gathered families, in the order given.
pub fn encode(families: &[MetricFamily]) -> String {
    let mut output = String::with_capacity(4096);
    for family in families {
        encode_family(&mut output, family);
    }
    output
}

fn encode_family(output: &mut String, family: &MetricFamily) {
    let name = &family.name;
    if !family.help.is_empty() {
        // Writing into a String can't fail.
        let _ = writeln!(output, "# HELP {name} {}", escape_help(&family.help));
    }
    let _ = writeln!(output, "# TYPE {name} {}", family.kind.as_str());

    for series in &family.series {
        match &series.value {
            MetricValue::Counter(v) | MetricValue::Gauge(v) => {
                write_sample(output, name, "", &series.labels, None, *v);
            }
            MetricValue::Summary {
                sum,
                count,
                quantiles,
            } => {
                for (quantile, estimate) in quantiles {
                    let quantile = format_float(*quantile);
                    write_sample(
                        output,
                        name,
                        "",
                        &series.labels,
                        Some(("quantile", quantile.as_str())),
                        *estimate,
                    );
                }
                write_sample(output, name, "_sum", &series.labels, None, *sum);
                write_sample(output, name, "_count", &series.labels, None, *count as f64);
            }
        }
    }
}

fn write_sample(
    output: &mut String,
    name: &str,
    suffix: &str,
    labels: &[(String, String)],
    extra: Option<(&str, &str)>,
    value: f64,
) {
    output.push_str(name);
    output.push_str(suffix);
    let pairs = labels
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(extra);
    let mut first = true;
    for (key, label) in pairs {
        output.push(if first { '{' } else { ',' });
        first = false;
        let _ = write!(output, "{key}=\"{}\"", escape_label_value(label));
    }
    if !first {
        output.push('}');
    }
    let _ = writeln!(output, " {}", format_float(value));
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
