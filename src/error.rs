use thiserror::Error;

/// Everything that can go wrong while defining, registering or recording
/// metrics.
#[derive(Debug, Error)]
pub enum Error {
    /// A collector with the same fully-qualified name is already registered.
    #[error("duplicate metric registration: {0}")]
    AlreadyRegistered(String),

    #[error("invalid metric name: {0:?}")]
    InvalidMetricName(String),

    #[error("invalid label name {label:?} on metric {metric}")]
    InvalidLabelName { metric: String, label: String },

    #[error("label {label:?} declared twice on metric {metric}")]
    DuplicateLabel { metric: String, label: String },

    #[error("invalid objective {quantile}:{error} on metric {metric}")]
    InvalidObjective {
        metric: String,
        quantile: f64,
        error: f64,
    },

    /// The label keys of an observation don't match the keys the metric was
    /// registered with.
    #[error("inconsistent labels for {metric}: expected {expected:?}, got {got:?}")]
    InconsistentLabels {
        metric: String,
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("counter cannot decrease in value (increment {0})")]
    NegativeCounterIncrement(f64),

    /// Binding the exposition listener or spawning its thread failed.
    #[error("exposition endpoint: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
