use super::dirty::{DirtyFields, Field};
use super::types::{DeviceType, DistanceRecord, Point, RangingEntry, StationError};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Vendor prefix of every generated station address
pub const MAC_PREFIX: &str = "ab:cd:ef";

/// Prefix of every generated station name
pub const NAME_PREFIX: &str = "GPS:No Station-";

/// Values for building a station. Anything left `None` is generated.
///
/// Used both for hydrating stations from storage and for creating new ones.
#[derive(Clone, Debug)]
pub struct StationRecord {
    pub mac_address: Option<String>,
    pub name: Option<String>,
    pub device_type: DeviceType,
    pub position: Option<Point>,
    pub target_point: Option<Point>,
    pub randomizer: Option<f64>,
    pub cluster_name: Option<String>,
    pub cluster_stations: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StationRecord {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            mac_address: None,
            name: None,
            device_type,
            position: None,
            target_point: None,
            randomizer: None,
            cluster_name: None,
            cluster_stations: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// A simulated anchor or tag.
///
/// Every setter records the touched field in the station's dirty set before
/// writing; the publisher clears a field once it has been persisted and
/// published.
#[derive(Clone, Debug)]
pub struct Station {
    mac_address: String,
    name: String,
    device_type: DeviceType,
    position: Point,
    target_point: Point,
    randomizer: f64,
    cluster_name: Option<String>,
    /// Addresses of the other stations this one currently knows about
    cluster_stations: Vec<String>,
    ranging_data: Vec<RangingEntry>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    /// Monotonic construction instant backing `uptime`
    started: Instant,
    dirty: DirtyFields,
}

impl Station {
    /// Create a fresh station with generated address, name and randomizer
    pub fn new(device_type: DeviceType) -> Self {
        Self::generate(device_type, &mut rand::thread_rng())
    }

    /// Like [`Station::new`] with an explicit random source
    pub fn generate<R: Rng + ?Sized>(device_type: DeviceType, rng: &mut R) -> Self {
        Self::assemble(StationRecord::new(device_type), rng)
    }

    /// Build a station from supplied values, generating whatever is missing
    pub fn from_record(record: StationRecord) -> Result<Self, StationError> {
        Self::from_record_with_rng(record, &mut rand::thread_rng())
    }

    pub fn from_record_with_rng<R: Rng + ?Sized>(
        record: StationRecord,
        rng: &mut R,
    ) -> Result<Self, StationError> {
        if let Some(randomizer) = record.randomizer {
            validate_randomizer(randomizer)?;
        }
        Ok(Self::assemble(record, rng))
    }

    fn assemble<R: Rng + ?Sized>(record: StationRecord, rng: &mut R) -> Self {
        let now = Utc::now();
        let mut station = Self {
            mac_address: String::new(),
            name: String::new(),
            device_type: record.device_type,
            position: Point::ORIGIN,
            target_point: Point::ORIGIN,
            randomizer: 0.5,
            cluster_name: None,
            cluster_stations: Vec::new(),
            ranging_data: Vec::new(),
            created_at: now,
            updated_at: None,
            started_at: now,
            started: Instant::now(),
            dirty: DirtyFields::new(),
        };

        let mac_address = record
            .mac_address
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| generate_mac(rng));
        station.set_mac_address(mac_address);

        let name = record
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| generate_name(&station.mac_address, rng));
        station.set_name(name);

        if let Some(position) = record.position {
            station.set_position(position);
        }

        // validated by the caller
        station.mark_dirty(Field::Randomizer);
        station.randomizer = record
            .randomizer
            .unwrap_or_else(|| rng.gen_range(0.1..=0.9));

        if let Some(cluster_name) = record.cluster_name {
            station.set_cluster_name(Some(cluster_name));
        }
        if let Some(target_point) = record.target_point {
            station.set_target_point(target_point);
        }
        if !record.cluster_stations.is_empty() {
            station.set_cluster_stations(record.cluster_stations);
        }
        if let Some(created_at) = record.created_at {
            station.set_created_at(created_at);
        }
        if let Some(updated_at) = record.updated_at {
            station.set_updated_at(updated_at);
        }

        station
    }

    // --- dirty tracking ---

    /// Record a field as pending external observation
    pub fn mark_dirty(&mut self, field: Field) {
        self.dirty.mark(field);
    }

    /// Remove a field from the pending set. Absent fields are ignored.
    pub fn clear_dirty(&mut self, field: Field) {
        self.dirty.clear(field);
    }

    /// Alias of [`Station::clear_dirty`] used by the flush path
    pub fn remove_from_updated_fields(&mut self, field: Field) {
        self.clear_dirty(field);
    }

    /// Pending fields in the order they were first touched
    pub fn dirty_fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.dirty.iter()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn is_field_dirty(&self, field: Field) -> bool {
        self.dirty.contains(field)
    }

    // --- role ---

    pub fn is_anchor(&self) -> bool {
        self.device_type == DeviceType::Anchor
    }

    pub fn is_tag(&self) -> bool {
        self.device_type == DeviceType::Tag
    }

    // --- accessors ---

    pub fn mac_address(&self) -> &str {
        &self.mac_address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn target_point(&self) -> Point {
        self.target_point
    }

    pub fn randomizer(&self) -> f64 {
        self.randomizer
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    pub fn cluster_stations(&self) -> &[String] {
        &self.cluster_stations
    }

    pub fn ranging_data(&self) -> &[RangingEntry] {
        &self.ranging_data
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whole seconds since this station was constructed
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    // --- mutators ---

    pub fn set_mac_address(&mut self, mac_address: String) {
        self.mark_dirty(Field::MacAddress);
        self.mac_address = mac_address;
    }

    pub fn set_name(&mut self, name: String) {
        self.mark_dirty(Field::Name);
        self.name = name;
    }

    pub fn set_device_type(&mut self, device_type: DeviceType) {
        self.mark_dirty(Field::DeviceType);
        self.device_type = device_type;
    }

    pub fn set_position(&mut self, position: Point) {
        self.mark_dirty(Field::Position);
        self.position = position;
    }

    pub fn set_target_point(&mut self, target_point: Point) {
        self.mark_dirty(Field::TargetPoint);
        self.target_point = target_point;
    }

    /// Fails without touching the station if `randomizer` is outside [0, 1]
    pub fn set_randomizer(&mut self, randomizer: f64) -> Result<(), StationError> {
        validate_randomizer(randomizer)?;
        self.mark_dirty(Field::Randomizer);
        self.randomizer = randomizer;
        Ok(())
    }

    pub fn set_cluster_name(&mut self, cluster_name: Option<String>) {
        self.mark_dirty(Field::ClusterName);
        self.cluster_name = cluster_name;
    }

    pub fn set_cluster_stations(&mut self, cluster_stations: Vec<String>) {
        self.mark_dirty(Field::ClusterStations);
        self.cluster_stations = cluster_stations;
    }

    pub fn set_created_at(&mut self, created_at: DateTime<Utc>) {
        self.mark_dirty(Field::CreatedAt);
        self.created_at = created_at;
    }

    pub fn set_updated_at(&mut self, updated_at: DateTime<Utc>) {
        self.mark_dirty(Field::UpdatedAt);
        self.updated_at = Some(updated_at);
    }

    pub fn set_started_at(&mut self, started_at: DateTime<Utc>) {
        self.mark_dirty(Field::StartedAt);
        self.started_at = started_at;
    }

    /// Stamp `updated_at` with the current time
    pub fn touch(&mut self) {
        self.set_updated_at(Utc::now());
    }

    /// Upsert the distance to an anchor into the ranging table.
    ///
    /// Only tags keep a ranging table; for any other role this is a no-op.
    pub fn add_distance_to_anchor(&mut self, anchor_mac: &str, distance: DistanceRecord) {
        if !self.is_tag() {
            return;
        }

        match self
            .ranging_data
            .iter_mut()
            .find(|entry| entry.mac_address == anchor_mac)
        {
            Some(entry) => entry.distance = distance,
            None => self.ranging_data.push(RangingEntry {
                mac_address: anchor_mac.to_string(),
                distance,
            }),
        }

        self.mark_dirty(Field::RangingData);
    }

    /// Full-state projection used for the JSON state topic
    pub fn snapshot(&self) -> StationSnapshot {
        StationSnapshot {
            mac_address: self.mac_address.clone(),
            name: self.name.clone(),
            device_type: self.device_type,
            cluster: ClusterSnapshot {
                name: self.cluster_name.clone(),
                devices: self.cluster_stations.clone(),
            },
            dev: DevSnapshot {
                position: self.position,
                target_point: self.target_point,
                randomizer: self.randomizer,
                updated_at: self.updated_at,
                created_at: self.created_at,
                started_at: self.started_at,
                uptime: self.uptime_secs(),
            },
            uwb: UwbSnapshot {
                ranging: self.ranging_data.clone(),
            },
        }
    }
}

/// Serializable full state of a station
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub mac_address: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub cluster: ClusterSnapshot,
    pub dev: DevSnapshot,
    pub uwb: UwbSnapshot,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub name: Option<String>,
    pub devices: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DevSnapshot {
    pub position: Point,
    pub target_point: Point,
    pub randomizer: f64,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    /// Seconds since construction
    pub uptime: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UwbSnapshot {
    pub ranging: Vec<RangingEntry>,
}

fn validate_randomizer(randomizer: f64) -> Result<(), StationError> {
    if (0.0..=1.0).contains(&randomizer) {
        Ok(())
    } else {
        Err(StationError::RandomizerOutOfRange(randomizer))
    }
}

/// Generate `ab:cd:ef:xx:xx:xx` with a random 3-byte suffix
fn generate_mac<R: Rng + ?Sized>(rng: &mut R) -> String {
    let suffix: [u8; 3] = rng.gen();
    format!(
        "{}:{:02x}:{:02x}:{:02x}",
        MAC_PREFIX, suffix[0], suffix[1], suffix[2]
    )
}

/// Derive a name from the last three bytes of the address, or make one up
fn generate_name<R: Rng + ?Sized>(mac_address: &str, rng: &mut R) -> String {
    let parts: Vec<&str> = mac_address.split(':').collect();
    if parts.len() >= 6 {
        let last = parts[3..].concat().to_lowercase();
        return format!("{}{}", NAME_PREFIX, last);
    }

    let suffix: [u8; 3] = rng.gen();
    format!(
        "{}{:02x}{:02x}{:02x}",
        NAME_PREFIX, suffix[0], suffix[1], suffix[2]
    )
}
