// Station model: identity, kinematics and dirty-field tracking

mod dirty;
mod entity;
mod movement;
mod types;

pub use dirty::{DirtyFields, Field};
pub use entity::{
    ClusterSnapshot, DevSnapshot, Station, StationRecord, StationSnapshot, UwbSnapshot,
    MAC_PREFIX, NAME_PREFIX,
};
pub use movement::{random_point, MovementParams};
pub use types::{DeviceType, DistanceRecord, Point, RangingEntry, StationError};
