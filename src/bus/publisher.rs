use super::Bus;
use crate::station::{Field, Station};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Topic segment for a station name: spaces become `_`, colons are dropped
pub fn station_topic_segment(name: &str) -> String {
    name.replace(' ', "_").replace(':', "")
}

/// Result of one station publication
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PublishOutcome {
    /// Fields published and removed from the dirty set
    pub flushed: Vec<Field>,
    /// Fields whose publication failed; they stay dirty
    pub failed: Vec<Field>,
}

impl PublishOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Publishes station state field by field under `<base_topic>/devices/<name>`
#[derive(Clone)]
pub struct StationPublisher {
    bus: Arc<dyn Bus>,
    base_topic: String,
    retain: bool,
}

impl StationPublisher {
    pub fn new(bus: Arc<dyn Bus>, base_topic: impl Into<String>, retain: bool) -> Self {
        Self {
            bus,
            base_topic: base_topic.into().trim_end_matches('/').to_string(),
            retain,
        }
    }

    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    /// Root topic of one station
    pub fn station_topic(&self, station: &Station) -> String {
        format!(
            "{}/devices/{}",
            self.base_topic,
            station_topic_segment(station.name())
        )
    }

    /// Publish every dirty field of `station`, then its full state.
    ///
    /// A field leaves the dirty set only once all of its topics were
    /// published; a failed field is logged and stays dirty. `dev/json`,
    /// `dev/updated_at` and `dev/uptime` go out on every call regardless of
    /// the dirty set. Failing to publish `dev/json` is an error.
    pub async fn publish_station(&self, station: &mut Station) -> Result<PublishOutcome> {
        let root = self.station_topic(station);
        let mut outcome = PublishOutcome::default();

        let fields: Vec<Field> = station.dirty_fields().collect();
        for field in fields {
            let messages = field_messages(station, field)?;

            let mut published = true;
            for (suffix, payload) in messages {
                let topic = format!("{}/{}", root, suffix);
                if let Err(e) = self.bus.publish(&topic, payload, self.retain).await {
                    warn!(
                        station = %station.name(),
                        field = %field,
                        topic = %topic,
                        error = %e,
                        "Failed to publish station field"
                    );
                    published = false;
                    break;
                }
            }

            if published {
                station.remove_from_updated_fields(field);
                outcome.flushed.push(field);
            } else {
                outcome.failed.push(field);
            }
        }

        let snapshot = serde_json::to_string(&station.snapshot())
            .context("Failed to serialize station state")?;
        let state_topic = format!("{}/dev/json", root);
        self.bus
            .publish(&state_topic, snapshot, self.retain)
            .await
            .with_context(|| format!("Failed to publish station state to '{}'", state_topic))?;

        let status = [
            ("dev/updated_at", format_updated_at(station)),
            ("dev/uptime", station.uptime_secs().to_string()),
        ];
        for (suffix, payload) in status {
            let topic = format!("{}/{}", root, suffix);
            if let Err(e) = self.bus.publish(&topic, payload, self.retain).await {
                warn!(
                    station = %station.name(),
                    topic = %topic,
                    error = %e,
                    "Failed to publish station status"
                );
            }
        }

        debug!(
            station = %station.name(),
            flushed = outcome.flushed.len(),
            failed = outcome.failed.len(),
            "Published station"
        );

        Ok(outcome)
    }
}

fn format_updated_at(station: &Station) -> String {
    station
        .updated_at()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "None".to_string())
}

/// Topic suffixes and payloads carrying one field.
///
/// An empty list means the field has nothing to publish (a target point on
/// anything but a tag) and can be cleared as is.
pub(crate) fn field_messages(
    station: &Station,
    field: Field,
) -> Result<Vec<(&'static str, String)>> {
    let messages = match field {
        Field::MacAddress => vec![("mac_address", station.mac_address().to_string())],
        Field::Name => vec![("name", station.name().to_string())],
        Field::DeviceType => vec![("uwb/type", station.device_type().to_string())],
        Field::ClusterName => vec![(
            "uwb/cluster/name",
            station.cluster_name().unwrap_or("None").to_string(),
        )],
        Field::ClusterStations => vec![(
            "uwb/cluster/stations",
            serde_json::to_string(station.cluster_stations())
                .context("Failed to serialize cluster stations")?,
        )],
        Field::Randomizer => vec![("dev/randomizer", station.randomizer().to_string())],
        Field::Position => {
            let position = station.position();
            vec![
                ("dev/position/x", position.x.to_string()),
                ("dev/position/y", position.y.to_string()),
            ]
        }
        Field::TargetPoint if station.is_tag() => {
            let target = station.target_point();
            vec![
                ("dev/target_point/x", target.x.to_string()),
                ("dev/target_point/y", target.y.to_string()),
            ]
        }
        Field::TargetPoint => Vec::new(),
        Field::RangingData => vec![(
            "uwb/ranging",
            serde_json::to_string(station.ranging_data())
                .context("Failed to serialize ranging data")?,
        )],
        Field::CreatedAt => vec![("dev/created_at", station.created_at().to_rfc3339())],
        Field::UpdatedAt => vec![("dev/updated_at", format_updated_at(station))],
        Field::StartedAt => vec![("dev/started_at", station.started_at().to_rfc3339())],
    };

    Ok(messages)
}
