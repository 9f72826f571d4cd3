use super::{Config, ConfigError};
use crate::storage::StorageBackend;
use std::path::PathBuf;
use std::str::FromStr;

/// Apply environment-style overrides to `config`.
///
/// `lookup` returns the raw value of a variable, if set. A value that does
/// not parse for its field is an error rather than being ignored.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let bus = &mut config.bus;
    if let Some(v) = lookup("BUS_URL") {
        bus.url = v;
    }
    if let Some(v) = lookup("BUS_USERNAME") {
        bus.username = non_empty(v);
    }
    if let Some(v) = lookup("BUS_PASSWORD") {
        bus.password = non_empty(v);
    }
    if let Some(v) = lookup("BASE_TOPIC") {
        bus.base_topic = v;
    }
    if let Some(v) = lookup("BUS_CLIENT_ID") {
        if !v.is_empty() {
            bus.client_id = v;
        }
    }
    if let Some(v) = lookup("BUS_CONNECT_TIMEOUT") {
        bus.connect_timeout_secs = parse("BUS_CONNECT_TIMEOUT", &v)?;
    }
    if let Some(v) = lookup("RETAIN_MESSAGES") {
        bus.retain_messages = parse_bool(&v);
    }
    if let Some(v) = lookup("CLEAR_RETAINED_ON_START") {
        bus.clear_retained_on_start = parse_bool(&v);
    }
    if let Some(v) = lookup("CLEAR_RETAINED_ON_EXIT") {
        bus.clear_retained_on_exit = parse_bool(&v);
    }
    if let Some(v) = lookup("RETAINED_STREAM") {
        bus.retained_stream = v;
    }

    let sim = &mut config.simulation;
    if let Some(v) = lookup("UPDATE_INTERVAL") {
        sim.update_interval_secs = parse("UPDATE_INTERVAL", &v)?;
    }
    if let Some(v) = lookup("NUM_ANCHORS") {
        sim.num_anchors = parse("NUM_ANCHORS", &v)?;
    }
    if let Some(v) = lookup("NUM_TAGS") {
        sim.num_tags = parse("NUM_TAGS", &v)?;
    }
    if let Some(v) = lookup("SIZE_X") {
        sim.size_x = parse("SIZE_X", &v)?;
    }
    if let Some(v) = lookup("SIZE_Y") {
        sim.size_y = parse("SIZE_Y", &v)?;
    }
    if let Some(v) = lookup("REALISTIC_MOVEMENT") {
        sim.realistic_movement = parse_bool(&v);
    }
    if let Some(v) = lookup("DISTANCE_SCALING_FACTOR") {
        sim.distance_scaling_factor = parse("DISTANCE_SCALING_FACTOR", &v)?;
    }
    if let Some(v) = lookup("REGENERATE_POSITIONS") {
        sim.regenerate_positions = parse_bool(&v);
    }
    if let Some(v) = lookup("MOVEMENT_SPEED") {
        sim.movement_speed = parse("MOVEMENT_SPEED", &v)?;
    }
    if let Some(v) = lookup("TARGET_POINT_OFFSET_RADIUS") {
        sim.target_point_offset_radius = parse("TARGET_POINT_OFFSET_RADIUS", &v)?;
    }
    if let Some(v) = lookup("TARGET_PROXIMITY") {
        sim.target_proximity = parse("TARGET_PROXIMITY", &v)?;
    }
    if let Some(v) = lookup("DEFAULT_CLUSTER") {
        sim.default_cluster = non_empty(v);
    }

    let storage = &mut config.storage;
    if let Some(v) = lookup("STORAGE_TYPE") {
        storage.backend = v
            .parse::<StorageBackend>()
            .map_err(|_| invalid("STORAGE_TYPE", &v))?;
    }
    if let Some(v) = lookup("DB_PATH") {
        storage.db_path = PathBuf::from(v);
    }
    if let Some(v) = lookup("JSON_PATH") {
        storage.json_path = PathBuf::from(v);
    }

    Ok(())
}

/// `true`, `1` and `t` (any case) are true, anything else is false
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "t"
    )
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
