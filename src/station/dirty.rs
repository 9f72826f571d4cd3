use super::StationError;
use std::fmt;
use std::str::FromStr;

/// Externally observable station attributes tracked for change propagation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    MacAddress,
    Name,
    DeviceType,
    Position,
    TargetPoint,
    Randomizer,
    ClusterName,
    ClusterStations,
    RangingData,
    CreatedAt,
    UpdatedAt,
    StartedAt,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::MacAddress,
        Field::Name,
        Field::DeviceType,
        Field::Position,
        Field::TargetPoint,
        Field::Randomizer,
        Field::ClusterName,
        Field::ClusterStations,
        Field::RangingData,
        Field::CreatedAt,
        Field::UpdatedAt,
        Field::StartedAt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::MacAddress => "mac_address",
            Field::Name => "name",
            Field::DeviceType => "device_type",
            Field::Position => "position",
            Field::TargetPoint => "target_point",
            Field::Randomizer => "randomizer",
            Field::ClusterName => "cluster_name",
            Field::ClusterStations => "cluster_stations",
            Field::RangingData => "ranging_data",
            Field::CreatedAt => "created_at",
            Field::UpdatedAt => "updated_at",
            Field::StartedAt => "started_at",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| StationError::UnknownField(s.to_string()))
    }
}

/// Insertion-ordered set of fields awaiting persistence and publication.
///
/// A field appears at most once no matter how often it is marked.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DirtyFields {
    fields: Vec<Field>,
}

impl DirtyFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the field was not already pending
    pub fn mark(&mut self, field: Field) -> bool {
        if self.fields.contains(&field) {
            return false;
        }
        self.fields.push(field);
        true
    }

    /// Returns true if the field was pending
    pub fn clear(&mut self, field: Field) -> bool {
        match self.fields.iter().position(|f| *f == field) {
            Some(idx) => {
                self.fields.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
