use crate::station::MovementParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(1);

/// Simulation parameters: fleet size, plane and kinematics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seconds between ticks
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: f64,

    #[serde(default = "default_num_anchors")]
    pub num_anchors: usize,

    #[serde(default = "default_num_tags")]
    pub num_tags: usize,

    #[serde(default = "default_size")]
    pub size_x: u32,

    #[serde(default = "default_size")]
    pub size_y: u32,

    /// Gate each tag's movement on its randomizer
    #[serde(default)]
    pub realistic_movement: bool,

    #[serde(default = "default_distance_scaling_factor")]
    pub distance_scaling_factor: f64,

    /// Move stored anchors to fresh random positions at startup
    #[serde(default)]
    pub regenerate_positions: bool,

    #[serde(default = "default_movement_speed")]
    pub movement_speed: f64,

    /// Max per-axis offset of a tag's initial target from its position
    #[serde(default = "default_target_point_offset_radius")]
    pub target_point_offset_radius: u32,

    #[serde(default = "default_target_proximity")]
    pub target_proximity: f64,

    /// Cluster label given to newly created stations
    #[serde(default)]
    pub default_cluster: Option<String>,
}

fn default_update_interval() -> f64 {
    1.0
}

fn default_num_anchors() -> usize {
    4
}

fn default_num_tags() -> usize {
    1
}

fn default_size() -> u32 {
    1000
}

fn default_distance_scaling_factor() -> f64 {
    1.0
}

fn default_movement_speed() -> f64 {
    10.0
}

fn default_target_point_offset_radius() -> u32 {
    200
}

fn default_target_proximity() -> f64 {
    25.0
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval(),
            num_anchors: default_num_anchors(),
            num_tags: default_num_tags(),
            size_x: default_size(),
            size_y: default_size(),
            realistic_movement: false,
            distance_scaling_factor: default_distance_scaling_factor(),
            regenerate_positions: false,
            movement_speed: default_movement_speed(),
            target_point_offset_radius: default_target_point_offset_radius(),
            target_proximity: default_target_proximity(),
            default_cluster: None,
        }
    }
}

impl SimulationConfig {
    pub fn movement(&self) -> MovementParams {
        MovementParams {
            speed: self.movement_speed,
            realistic_movement: self.realistic_movement,
            target_proximity: self.target_proximity,
            size_x: self.size_x,
            size_y: self.size_y,
        }
    }

    /// Tick period, never shorter than one millisecond
    pub fn update_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.update_interval_secs)
            .unwrap_or(Duration::from_secs(1))
            .max(MIN_UPDATE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_params_from_config() {
        let config = SimulationConfig {
            movement_speed: 4.0,
            realistic_movement: true,
            size_x: 300,
            ..Default::default()
        };

        let params = config.movement();
        assert_eq!(params.speed, 4.0);
        assert!(params.realistic_movement);
        assert_eq!(params.target_proximity, 25.0);
        assert_eq!(params.size_x, 300);
        assert_eq!(params.size_y, 1000);
    }

    #[test]
    fn test_update_interval() {
        let mut config = SimulationConfig::default();
        assert_eq!(config.update_interval(), Duration::from_secs(1));

        config.update_interval_secs = 0.25;
        assert_eq!(config.update_interval(), Duration::from_millis(250));

        config.update_interval_secs = 0.0;
        assert_eq!(config.update_interval(), MIN_UPDATE_INTERVAL);

        config.update_interval_secs = f64::NAN;
        assert_eq!(config.update_interval(), Duration::from_secs(1));
    }
}
