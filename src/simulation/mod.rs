// Simulation coordinator: owns the fleet and fans out ranging updates

pub mod config;
mod ranging;

pub use config::SimulationConfig;
pub use ranging::{calculate_distance, distance_between, update_tag_distances, AnchorFix};

use crate::station::{MovementParams, Station};
use rand::Rng;
use std::fmt;
use tracing::debug;

#[cfg(test)]
mod tests;

/// Coordinator errors
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// A station with this address is already part of the fleet
    DuplicateStation(String),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::DuplicateStation(mac) => {
                write!(f, "station {} is already part of the simulation", mac)
            }
        }
    }
}

impl std::error::Error for SimulationError {}

/// Owns the authoritative station collection.
///
/// Role views (`anchors`, `tags`) are computed from the collection on every
/// call and never cached.
pub struct SimulationService {
    stations: Vec<Station>,
    size_x: u32,
    size_y: u32,
    distance_scaling_factor: f64,
}

impl SimulationService {
    pub fn new(size_x: u32, size_y: u32, distance_scaling_factor: f64) -> Self {
        Self {
            stations: Vec::new(),
            size_x,
            size_y,
            distance_scaling_factor,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.size_x, config.size_y, config.distance_scaling_factor)
    }

    /// Add a station to the fleet. Addresses must be unique.
    pub fn add_station(&mut self, station: Station) -> Result<(), SimulationError> {
        if self.station_by_mac(station.mac_address()).is_some() {
            return Err(SimulationError::DuplicateStation(
                station.mac_address().to_string(),
            ));
        }
        self.stations.push(station);
        Ok(())
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn stations_mut(&mut self) -> &mut [Station] {
        &mut self.stations
    }

    pub fn anchors(&self) -> impl Iterator<Item = &Station> + '_ {
        self.stations.iter().filter(|s| s.is_anchor())
    }

    pub fn tags(&self) -> impl Iterator<Item = &Station> + '_ {
        self.stations.iter().filter(|s| s.is_tag())
    }

    pub fn tags_mut(&mut self) -> impl Iterator<Item = &mut Station> + '_ {
        self.stations.iter_mut().filter(|s| s.is_tag())
    }

    pub fn anchors_mut(&mut self) -> impl Iterator<Item = &mut Station> + '_ {
        self.stations.iter_mut().filter(|s| s.is_anchor())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.size_x, self.size_y)
    }

    pub fn distance_scaling_factor(&self) -> f64 {
        self.distance_scaling_factor
    }

    /// Give every station the full list of its peers.
    ///
    /// Full mesh, O(n^2) in the fleet size: call after the fleet changes, not
    /// every tick.
    pub fn update_device_knowledge(&mut self) {
        let macs: Vec<String> = self
            .stations
            .iter()
            .map(|s| s.mac_address().to_string())
            .collect();

        for station in &mut self.stations {
            let others: Vec<String> = macs
                .iter()
                .filter(|mac| mac.as_str() != station.mac_address())
                .cloned()
                .collect();
            station.set_cluster_stations(others);
        }

        debug!(stations = macs.len(), "Rebuilt device knowledge");
    }

    fn anchor_fixes(&self) -> Vec<AnchorFix> {
        self.anchors().map(AnchorFix::of).collect()
    }

    /// Refresh the ranging table of the tag with this address.
    ///
    /// Returns false if no such station exists.
    pub fn update_tag_distances(&mut self, mac_address: &str) -> bool {
        let anchors = self.anchor_fixes();
        let factor = self.distance_scaling_factor;

        match self.station_by_mac_mut(mac_address) {
            Some(tag) => {
                update_tag_distances(tag, &anchors, factor);
                true
            }
            None => false,
        }
    }

    /// Refresh every tag's ranging table
    pub fn update_all_tag_distances(&mut self) {
        let macs: Vec<String> = self
            .tags()
            .map(|tag| tag.mac_address().to_string())
            .collect();

        for mac in &macs {
            self.update_tag_distances(mac);
        }
    }

    /// Move every tag one tick, recomputing distances for those that moved.
    ///
    /// Returns the number of tags that moved.
    pub fn advance<R: Rng + ?Sized>(&mut self, params: &MovementParams, rng: &mut R) -> usize {
        // anchors never move, so their fixes stay valid for the whole pass
        let anchors = self.anchor_fixes();
        let factor = self.distance_scaling_factor;
        let mut moved = 0;

        for tag in self.tags_mut() {
            if tag.step(params, rng) {
                update_tag_distances(tag, &anchors, factor);
                moved += 1;
            }
        }

        moved
    }

    pub fn station_by_mac(&self, mac_address: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.mac_address() == mac_address)
    }

    pub fn station_by_mac_mut(&mut self, mac_address: &str) -> Option<&mut Station> {
        self.stations
            .iter_mut()
            .find(|s| s.mac_address() == mac_address)
    }

    pub fn station_by_name(&self, name: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.name() == name)
    }
}
