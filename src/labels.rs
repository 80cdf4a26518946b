//! Label handling: the caller-facing label map, the process-wide additional
//! labels and the reconciliation step that keeps every series of a metric on
//! the same label set.

use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
};

use crate::error::{Error, Result};

/// Labels supplied with an observation, keyed by label name.
pub type Labels = HashMap<String, String>;

/// Label names reserved by the exposition format.
pub(crate) const RESERVED_PREFIX: &str = "__";
pub(crate) const QUANTILE_LABEL: &str = "quantile";

/// Process-wide variable labels with default values. Every metric gets these
/// keys appended to its variable labels at registration time, and every
/// observation is completed with the defaults before it reaches a collector.
#[derive(Debug, Clone, Default)]
pub struct AdditionalLabels {
    defaults: BTreeMap<String, String>,
}

impl AdditionalLabels {
    pub fn new<I, K, V>(defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            defaults: defaults
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The additional keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.defaults.get(key).map(String::as_str)
    }

    /// Fill in the default for every additional key missing from `labels`.
    /// Keys the caller already set are left alone, and keys that aren't
    /// additional labels are passed through untouched. Only allocates when
    /// something is actually missing.
    pub fn reconcile<'a>(&self, labels: &'a Labels) -> Cow<'a, Labels> {
        let complete = self.defaults.keys().all(|k| labels.contains_key(k));
        if complete {
            return Cow::Borrowed(labels);
        }
        let mut labels = labels.clone();
        for (key, default) in &self.defaults {
            labels
                .entry(key.clone())
                .or_insert_with(|| default.clone());
        }
        Cow::Owned(labels)
    }
}

pub(crate) fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

pub(crate) fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with(RESERVED_PREFIX) {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check that a metric's constant and variable label names are well formed
/// and don't collide with each other.
pub(crate) fn validate_label_names<'a>(
    metric: &str,
    const_labels: impl IntoIterator<Item = &'a str>,
    variable_labels: &'a [String],
) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for label in const_labels
        .into_iter()
        .chain(variable_labels.iter().map(String::as_str))
    {
        if !is_valid_label_name(label) {
            return Err(Error::InvalidLabelName {
                metric: metric.to_string(),
                label: label.to_string(),
            });
        }
        if !seen.insert(label) {
            return Err(Error::DuplicateLabel {
                metric: metric.to_string(),
                label: label.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reconcile_fills_defaults() {
        let additional = AdditionalLabels::new([("region", "us"), ("shard", "0")]);
        let empty = Labels::new();
        let out = additional.reconcile(&empty);
        assert_eq!(out.get("region").map(String::as_str), Some("us"));
        assert_eq!(out.get("shard").map(String::as_str), Some("0"));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn reconcile_keeps_caller_values() {
        let additional = AdditionalLabels::new([("region", "us"), ("shard", "0")]);
        let input = labels(&[("region", "eu"), ("route", "room.join")]);
        let out = additional.reconcile(&input);
        assert_eq!(out["region"], "eu");
        assert_eq!(out["shard"], "0");
        assert_eq!(out["route"], "room.join");
    }

    #[test]
    fn reconcile_borrows_when_complete() {
        let additional = AdditionalLabels::new([("region", "us")]);
        let input = labels(&[("region", "eu")]);
        assert!(matches!(additional.reconcile(&input), Cow::Borrowed(_)));

        let none = AdditionalLabels::default();
        assert!(matches!(none.reconcile(&Labels::new()), Cow::Borrowed(_)));
    }

    #[test]
    fn keys_are_sorted() {
        let additional = AdditionalLabels::new([("zone", "a"), ("app", "b"), ("mid", "c")]);
        assert_eq!(additional.keys().collect::<Vec<_>>(), ["app", "mid", "zone"]);
    }

    #[test]
    fn metric_names() {
        assert!(is_valid_metric_name("nano_handler_response_time_ns"));
        assert!(is_valid_metric_name(":recorded:rule"));
        assert!(!is_valid_metric_name(""));
        assert!(!is_valid_metric_name("9lives"));
        assert!(!is_valid_metric_name("with-dash"));
    }

    #[test]
    fn label_names() {
        assert!(is_valid_label_name("serverType"));
        assert!(is_valid_label_name("_private"));
        assert!(!is_valid_label_name("__reserved"));
        assert!(!is_valid_label_name("has:colon"));
        assert!(!is_valid_label_name(""));
    }

    #[test]
    fn const_and_variable_labels_must_not_collide() {
        let err = validate_label_names("m", ["game"], &["game".to_string()]).unwrap_err();
        assert!(matches!(err, Error::DuplicateLabel { .. }));
        assert!(validate_label_names("m", ["game"], &["route".to_string()]).is_ok());
    }
}
