use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a station in the positioning system
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    /// Stationary reference point
    Anchor,
    /// Mobile device heading for a target point
    Tag,
    None,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Anchor => "ANCHOR",
            DeviceType::Tag => "TAG",
            DeviceType::None => "NONE",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = StationError;

    /// Case-insensitive: "tag", "Tag" and "TAG" all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ANCHOR" => Ok(DeviceType::Anchor),
            "TAG" => Ok(DeviceType::Tag),
            "NONE" => Ok(DeviceType::None),
            _ => Err(StationError::InvalidDeviceType(s.to_string())),
        }
    }
}

/// A point on the simulation plane
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Clamp both axes into `[0, size_x] x [0, size_y]`
    pub fn clamped(&self, size_x: f64, size_y: f64) -> Point {
        Point {
            x: self.x.clamp(0.0, size_x),
            y: self.y.clamp(0.0, size_y),
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Raw and scaled distance between a tag and one anchor
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistanceRecord {
    pub raw_distance: f64,
    pub scaled_distance: f64,
}

/// One row of a tag's ranging table, keyed by the anchor's address
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangingEntry {
    pub mac_address: String,
    pub distance: DistanceRecord,
}

/// Station validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum StationError {
    InvalidDeviceType(String),
    RandomizerOutOfRange(f64),
    UnknownField(String),
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationError::InvalidDeviceType(s) => write!(f, "invalid device type: {}", s),
            StationError::RandomizerOutOfRange(v) => {
                write!(f, "randomizer must be between 0 and 1, got {}", v)
            }
            StationError::UnknownField(s) => write!(f, "unknown station field '{}'", s),
        }
    }
}

impl std::error::Error for StationError {}
