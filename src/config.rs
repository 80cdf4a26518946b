use std::collections::BTreeMap;

use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 9090;

/// Everything needed to build a [`crate::Reporter`] and serve its metrics.
///
/// Deserializes from camelCase keys so it can be embedded in a host
/// application's own configuration:
///
/// ```json
/// { "port": 9090, "game": "mygame", "serverType": "frontend",
///   "constLabels": { "region": "us" }, "additionalLabels": { "shard": "0" } }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReporterConfig {
    pub port: u16,
    pub game: String,
    pub server_type: String,
    /// Labels with one fixed value on every series.
    pub const_labels: BTreeMap<String, String>,
    /// Variable labels added to every metric, with the value used when an
    /// observation doesn't set them.
    pub additional_labels: BTreeMap<String, String>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            game: String::new(),
            server_type: String::new(),
            const_labels: BTreeMap::new(),
            additional_labels: BTreeMap::new(),
        }
    }
}

impl ReporterConfig {
    pub fn new<I, K, V>(port: u16, game: &str, server_type: &str, const_labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            port,
            game: game.to_string(),
            server_type: server_type.to_string(),
            const_labels: const_labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            additional_labels: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case() {
        let config: ReporterConfig = serde_json::from_str(
            r#"{
                "port": 9191,
                "game": "mygame",
                "serverType": "frontend",
                "constLabels": {"region": "us"},
                "additionalLabels": {"shard": "0"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.port, 9191);
        assert_eq!(config.server_type, "frontend");
        assert_eq!(config.const_labels["region"], "us");
        assert_eq!(config.additional_labels["shard"], "0");
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: ReporterConfig = serde_json::from_str(r#"{"game": "mygame"}"#).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.const_labels.is_empty());
        assert_eq!(config, ReporterConfig {
            game: "mygame".into(),
            ..Default::default()
        });
    }
}
