//! Process configuration.
//!
//! A [`SeaConfig`] is built once when a process starts and handed to each
//! component. Every field has a default, and a JSON file may override any
//! subset of them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridConfig {
    pub hex_size: f64,
    pub row_labels: Vec<String>,
    pub cols: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            hex_size: 80.0,
            row_labels: ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect(),
            cols: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MovementConfig {
    /// Plane units per second.
    pub ship_speed: f64,
    pub session_ttl_seconds: u64,
    pub pending_move_ttl_seconds: u64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            ship_speed: 220.0,
            session_ttl_seconds: 300,
            pending_move_ttl_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistenceConfig {
    /// Key of the serialized snapshot blob.
    pub state_key: String,
    /// Pub/sub channel that carries fleet and sector events.
    pub event_channel: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_key: "ship_state_v2".to_string(),
            event_channel: "ship_updates".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueConfig {
    pub topic: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            topic: "movement-intents".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BroadcastConfig {
    pub fleet_interval_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            fleet_interval_ms: 150,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeaConfig {
    pub grid: GridConfig,
    pub movement: MovementConfig,
    pub persistence: PersistenceConfig,
    pub queue: QueueConfig,
    pub broadcast: BroadcastConfig,
}

impl SeaConfig {
    /// Parses a JSON document; absent sections and fields keep their defaults.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: SeaConfig = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&document)
    }

    /// Defaults when `path` is `None`, otherwise the file at `path`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.grid.hex_size > 0.0) {
            return Err(ConfigError::Invalid("grid.hexSize must be positive".into()));
        }
        if self.grid.row_labels.is_empty() {
            return Err(ConfigError::Invalid("grid.rowLabels must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for label in &self.grid.row_labels {
            if !seen.insert(label.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "grid.rowLabels contains duplicate label {:?}",
                    label
                )));
            }
        }
        if self.grid.cols == 0 {
            return Err(ConfigError::Invalid("grid.cols must be at least 1".into()));
        }
        if !(self.movement.ship_speed > 0.0) {
            return Err(ConfigError::Invalid("movement.shipSpeed must be positive".into()));
        }
        if self.movement.session_ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "movement.sessionTtlSeconds must be at least 1".into(),
            ));
        }
        if self.movement.pending_move_ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "movement.pendingMoveTtlSeconds must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.movement.session_ttl_seconds)
    }

    pub fn pending_move_ttl(&self) -> Duration {
        Duration::from_secs(self.movement.pending_move_ttl_seconds)
    }

    pub fn fleet_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast.fleet_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SeaConfig::default();
        assert_eq!(config.grid.hex_size, 80.0);
        assert_eq!(config.grid.row_labels, vec!["A", "B", "C", "D"]);
        assert_eq!(config.grid.cols, 6);
        assert_eq!(config.persistence.state_key, "ship_state_v2");
        assert_eq!(config.persistence.event_channel, "ship_updates");
        assert_eq!(config.queue.topic, "movement-intents");
        assert_eq!(config.movement.ship_speed, 220.0);
        assert_eq!(config.broadcast.fleet_interval_ms, 150);
        assert_eq!(config.pending_move_ttl(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        let config = SeaConfig::load(None).unwrap();
        assert_eq!(config, SeaConfig::default());
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let config =
            SeaConfig::from_json(r#"{"grid": {"cols": 8}, "movement": {"shipSpeed": 100.0}}"#)
                .unwrap();
        assert_eq!(config.grid.cols, 8);
        assert_eq!(config.grid.hex_size, 80.0);
        assert_eq!(config.grid.row_labels.len(), 4);
        assert_eq!(config.movement.ship_speed, 100.0);
        assert_eq!(config.movement.session_ttl_seconds, 300);
        assert_eq!(config.queue.topic, "movement-intents");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = SeaConfig::from_file("/nonexistent/sea-config.json");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            SeaConfig::from_json(r#"{"grid": {"cols": 0}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SeaConfig::from_json(r#"{"grid": {"rowLabels": ["A", "A"]}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SeaConfig::from_json(r#"{"movement": {"shipSpeed": -1.0}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SeaConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
