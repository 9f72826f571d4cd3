//! Station persistence using SQLite.
//!
//! Cluster membership and ranging tables are derived at runtime and not
//! persisted.

use super::StationStore;
use crate::station::{DeviceType, Point, Station, StationRecord};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const UPSERT_SQL: &str = "
    INSERT INTO stations (
        mac_address, name, type, cluster_name, randomizer,
        updated_at, created_at, position_x, position_y, target_x, target_y
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(mac_address) DO UPDATE SET
        name = excluded.name,
        type = excluded.type,
        cluster_name = excluded.cluster_name,
        randomizer = excluded.randomizer,
        updated_at = excluded.updated_at,
        created_at = excluded.created_at,
        position_x = excluded.position_x,
        position_y = excluded.position_y,
        target_x = excluded.target_x,
        target_y = excluded.target_y";

const SELECT_COLUMNS: &str = "SELECT mac_address, name, type, cluster_name, randomizer,
        updated_at, created_at, position_x, position_y, target_x, target_y
    FROM stations";

/// Persists stations in a single SQLite table keyed by MAC address.
///
/// # Schema
/// ```sql
/// CREATE TABLE stations (
///     mac_address  TEXT PRIMARY KEY,
///     name         TEXT NOT NULL,
///     type         TEXT NOT NULL,   -- ANCHOR | TAG | NONE
///     cluster_name TEXT,
///     randomizer   REAL NOT NULL,
///     updated_at   TEXT,            -- RFC 3339
///     created_at   TEXT NOT NULL,   -- RFC 3339
///     position_x   REAL,
///     position_y   REAL,
///     target_x     REAL,
///     target_y     REAL
/// );
/// ```
pub struct SqliteStationStore {
    conn: Mutex<Connection>,
}

/// One row as stored, before validation
struct StationRow {
    mac_address: String,
    name: String,
    device_type: String,
    cluster_name: Option<String>,
    randomizer: f64,
    updated_at: Option<String>,
    created_at: String,
    position: Point,
    target_point: Point,
}

impl SqliteStationStore {
    /// Opens (or creates) the database file, creating parent directories
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open station DB at {}", db_path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory station DB")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_table()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("station store connection lock poisoned"))
    }

    fn create_table(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS stations (
                mac_address  TEXT PRIMARY KEY,
                name         TEXT NOT NULL,
                type         TEXT NOT NULL,
                cluster_name TEXT,
                randomizer   REAL NOT NULL,
                updated_at   TEXT,
                created_at   TEXT NOT NULL,
                position_x   REAL,
                position_y   REAL,
                target_x     REAL,
                target_y     REAL
            );",
        )
        .context("Failed to create stations table")?;
        Ok(())
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<StationRow> {
        Ok(StationRow {
            mac_address: row.get(0)?,
            name: row.get(1)?,
            device_type: row.get(2)?,
            cluster_name: row.get(3)?,
            randomizer: row.get(4)?,
            updated_at: row.get(5)?,
            created_at: row.get(6)?,
            position: Point::new(
                row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
                row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
            ),
            target_point: Point::new(
                row.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
                row.get::<_, Option<f64>>(10)?.unwrap_or(0.0),
            ),
        })
    }

    fn hydrate(row: StationRow) -> Result<Station> {
        let device_type: DeviceType = row
            .device_type
            .parse()
            .with_context(|| format!("Invalid type for station {}", row.mac_address))?;
        let created_at: DateTime<Utc> = row
            .created_at
            .parse()
            .with_context(|| {
                format!("Failed to parse created_at for station {}", row.mac_address)
            })?;
        let updated_at: Option<DateTime<Utc>> = row
            .updated_at
            .map(|s| s.parse())
            .transpose()
            .with_context(|| {
                format!("Failed to parse updated_at for station {}", row.mac_address)
            })?;

        let record = StationRecord {
            mac_address: Some(row.mac_address.clone()),
            name: Some(row.name),
            device_type,
            position: Some(row.position),
            target_point: Some(row.target_point),
            randomizer: Some(row.randomizer),
            cluster_name: row.cluster_name,
            cluster_stations: Vec::new(),
            created_at: Some(created_at),
            updated_at,
        };

        Station::from_record(record)
            .with_context(|| format!("Invalid stored station {}", row.mac_address))
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Station>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).context("Failed to prepare station query")?;
        let rows = stmt
            .query_map(params, Self::read_row)
            .context("Failed to query stations")?;

        let mut stations = Vec::new();
        for row in rows {
            let row = row.context("Failed to read station row")?;
            stations.push(Self::hydrate(row)?);
        }
        Ok(stations)
    }

    fn write(conn: &Connection, station: &Station) -> rusqlite::Result<usize> {
        let position = station.position();
        let target = station.target_point();
        conn.execute(
            UPSERT_SQL,
            params![
                station.mac_address(),
                station.name(),
                station.device_type().as_str(),
                station.cluster_name(),
                station.randomizer(),
                station.updated_at().map(|t| t.to_rfc3339()),
                station.created_at().to_rfc3339(),
                position.x,
                position.y,
                target.x,
                target.y,
            ],
        )
    }
}

impl StationStore for SqliteStationStore {
    fn load_all(&self) -> Result<Vec<Station>> {
        let sql = format!("{} ORDER BY mac_address", SELECT_COLUMNS);
        let stations = self.query(&sql, [])?;
        debug!(count = stations.len(), "Loaded stations");
        Ok(stations)
    }

    fn load_by_type(&self, device_type: DeviceType, limit: Option<usize>) -> Result<Vec<Station>> {
        let sql = format!(
            "{} WHERE type = ?1 ORDER BY mac_address LIMIT ?2",
            SELECT_COLUMNS
        );
        // LIMIT -1 means no limit in SQLite
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let stations = self.query(&sql, params![device_type.as_str(), limit])?;
        debug!(count = stations.len(), device_type = %device_type, "Loaded stations by type");
        Ok(stations)
    }

    fn upsert(&self, station: &Station) -> Result<()> {
        let conn = self.lock()?;
        Self::write(&conn, station)
            .with_context(|| format!("Failed to upsert station {}", station.name()))?;
        debug!(station = %station.name(), "Updated station in database");
        Ok(())
    }

    fn upsert_all(&self, stations: &[Station]) -> Result<()> {
        let mut conn = self.lock()?;
        // dropping the transaction without commit rolls it back
        let tx = conn
            .transaction()
            .context("Failed to begin station transaction")?;
        for station in stations {
            Self::write(&tx, station)
                .with_context(|| format!("Failed to upsert station {}", station.name()))?;
        }
        tx.commit().context("Failed to commit station transaction")?;
        debug!(count = stations.len(), "Updated stations in database");
        Ok(())
    }
}
