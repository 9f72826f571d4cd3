mod env;

pub use env::apply_overrides;

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub use crate::bus::BusConfig;
pub use crate::simulation::SimulationConfig;
pub use crate::storage::StorageConfig;

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "GPSNO_CONFIG";

/// Complete simulator configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        message: String,
    },
    /// An environment override could not be parsed
    InvalidValue {
        key: String,
        value: String,
    },
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config file {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "failed to parse config file {}: {}", path.display(), message)
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value '{}' for {}", value, key)
            }
            ConfigError::Invalid(reason) => write!(f, "invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl Config {
    /// Load the file named by `GPSNO_CONFIG` (if any), apply environment
    /// overrides and validate
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => load_config(&path)?,
            _ => Config::default(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from process environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        apply_overrides(self, |key| std::env::var(key).ok())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;

        if sim.size_x == 0 || sim.size_y == 0 {
            return Err(ConfigError::Invalid(format!(
                "plane size must be positive, got {}x{}",
                sim.size_x, sim.size_y
            )));
        }
        if !sim.update_interval_secs.is_finite() || sim.update_interval_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "update interval must be positive, got {}",
                sim.update_interval_secs
            )));
        }
        if !sim.movement_speed.is_finite() || sim.movement_speed < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "movement speed must not be negative, got {}",
                sim.movement_speed
            )));
        }
        if !sim.target_proximity.is_finite() || sim.target_proximity < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "target proximity must not be negative, got {}",
                sim.target_proximity
            )));
        }
        if !sim.distance_scaling_factor.is_finite() {
            return Err(ConfigError::Invalid(
                "distance scaling factor must be finite".to_string(),
            ));
        }
        if self.bus.base_topic.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid("base topic must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageBackend;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bus.url, "nats://localhost:4222");
        assert_eq!(config.bus.base_topic, "gpsno/simulation");
        assert_eq!(config.simulation.num_anchors, 4);
        assert_eq!(config.simulation.num_tags, 1);
        assert_eq!(config.simulation.size_x, 1000);
        assert_eq!(config.simulation.movement_speed, 10.0);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [bus]
            url = "nats://example.com:4222"
            base_topic = "lab/sim"
            retain_messages = false

            [simulation]
            update_interval_secs = 0.5
            num_anchors = 6
            size_x = 500
            realistic_movement = true
            default_cluster = "lab"

            [storage]
            backend = "json"
            json_path = "/tmp/stations.json"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.bus.url, "nats://example.com:4222");
        assert!(!config.bus.retain_messages);
        assert_eq!(config.simulation.update_interval_secs, 0.5);
        assert_eq!(config.simulation.num_anchors, 6);
        assert_eq!(config.simulation.size_x, 500);
        assert_eq!(config.simulation.size_y, 1000);
        assert_eq!(config.simulation.default_cluster.as_deref(), Some("lab"));
        assert_eq!(config.storage.backend, StorageBackend::Json);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [simulation]
            num_tags = 3
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.simulation.num_tags, 3);
        assert_eq!(config.simulation.num_anchors, 4);
        assert!(config.bus.retain_messages);
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[simulation]\nmovement_speed = 2.5").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.simulation.movement_speed, 2.5);

        assert!(matches!(
            load_config("/nonexistent/gpsno.toml"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_load_config_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\nbackend = \"postgres\"").unwrap();

        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.simulation.size_x = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.simulation.update_interval_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.simulation.movement_speed = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bus.base_topic = "/".to_string();
        assert!(config.validate().is_err());
    }
}
