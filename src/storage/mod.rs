//! Station persistence.
//!
//! The simulation only needs load and upsert-by-address. SQLite is the one
//! implemented backend; the flat JSON file backend is recognised but refused.

mod sqlite;

pub use sqlite::SqliteStationStore;

use crate::station::{DeviceType, Station};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

/// Keyed store of stations, addressed by MAC address
pub trait StationStore: Send {
    /// All stored stations, ordered by address
    fn load_all(&self) -> Result<Vec<Station>>;

    /// Stations of one role ordered by address, at most `limit` of them
    fn load_by_type(&self, device_type: DeviceType, limit: Option<usize>) -> Result<Vec<Station>>;

    /// Create or replace one station
    fn upsert(&self, station: &Station) -> Result<()>;

    /// Create or replace many stations atomically
    fn upsert_all(&self, stations: &[Station]) -> Result<()>;
}

/// Storage backend selector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Json,
}

impl FromStr for StorageBackend {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "json" => Ok(StorageBackend::Json),
            other => Err(StorageError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Sqlite => write!(f, "sqlite"),
            StorageBackend::Json => write!(f, "json"),
        }
    }
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_json_path")]
    pub json_path: PathBuf,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_db_path() -> PathBuf {
    PathBuf::from("simulation.db")
}

fn default_json_path() -> PathBuf {
    PathBuf::from("simulation.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            db_path: default_db_path(),
            json_path: default_json_path(),
        }
    }
}

/// Storage setup errors
#[derive(Debug)]
pub enum StorageError {
    UnknownBackend(String),
    UnsupportedBackend(StorageBackend),
    Open(anyhow::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::UnknownBackend(name) => write!(
                f,
                "unknown storage type '{}', supported types are 'sqlite' and 'json'",
                name
            ),
            StorageError::UnsupportedBackend(backend) => {
                write!(f, "unsupported storage backend '{}'", backend)
            }
            StorageError::Open(e) => write!(f, "failed to open station store: {:#}", e),
        }
    }
}

impl std::error::Error for StorageError {}

/// Open the configured backend
pub fn open_store(config: &StorageConfig) -> Result<Box<dyn StationStore>, StorageError> {
    match config.backend {
        StorageBackend::Sqlite => {
            let store = SqliteStationStore::open(&config.db_path).map_err(StorageError::Open)?;
            info!(path = %config.db_path.display(), "Opened SQLite station store");
            Ok(Box::new(store))
        }
        StorageBackend::Json => Err(StorageError::UnsupportedBackend(StorageBackend::Json)),
    }
}
