use super::memory::MemoryBus;
use super::*;
use crate::station::{DeviceType, DistanceRecord, Field, Point, Station, StationRecord};
use std::sync::Arc;

const ROOT: &str = "gpsno/simulation/devices/GPSNo_Station-000001";

fn station(device_type: DeviceType) -> Station {
    let mut record = StationRecord::new(device_type);
    record.mac_address = Some("ab:cd:ef:00:00:01".to_string());
    record.position = Some(Point::new(3.0, 4.0));
    Station::from_record(record).unwrap()
}

fn publisher() -> (Arc<MemoryBus>, StationPublisher) {
    let bus = Arc::new(MemoryBus::new());
    let publisher = StationPublisher::new(bus.clone(), "gpsno/simulation/", true);
    (bus, publisher)
}

fn topic(suffix: &str) -> String {
    format!("{}/{}", ROOT, suffix)
}

#[test]
fn test_station_topic_segment() {
    assert_eq!(
        station_topic_segment("GPS:No Station-abcdef"),
        "GPSNo_Station-abcdef"
    );
    assert_eq!(station_topic_segment("plain"), "plain");
}

#[tokio::test]
async fn test_publish_station_flushes_dirty_fields() {
    let (bus, publisher) = publisher();
    let mut s = station(DeviceType::Anchor);
    assert!(s.is_dirty());

    let outcome = publisher.publish_station(&mut s).await.unwrap();

    assert!(outcome.is_complete());
    assert!(outcome.flushed.contains(&Field::MacAddress));
    assert!(outcome.flushed.contains(&Field::Position));
    assert!(!s.is_dirty());

    assert_eq!(
        bus.last_payload(&topic("mac_address")).as_deref(),
        Some("ab:cd:ef:00:00:01")
    );
    assert_eq!(
        bus.last_payload(&topic("name")).as_deref(),
        Some("GPS:No Station-000001")
    );
    assert_eq!(bus.last_payload(&topic("dev/position/x")).as_deref(), Some("3"));
    assert_eq!(bus.last_payload(&topic("dev/position/y")).as_deref(), Some("4"));
    assert!(bus.publications().iter().all(|p| p.retain));
}

#[tokio::test]
async fn test_state_topics_published_every_call() {
    let (bus, publisher) = publisher();
    let mut s = station(DeviceType::Anchor);
    publisher.publish_station(&mut s).await.unwrap();
    bus.reset();

    let outcome = publisher.publish_station(&mut s).await.unwrap();

    assert!(outcome.flushed.is_empty());
    assert_eq!(
        bus.topics(),
        vec![
            topic("dev/json"),
            topic("dev/updated_at"),
            topic("dev/uptime")
        ]
    );

    let json: serde_json::Value =
        serde_json::from_str(&bus.last_payload(&topic("dev/json")).unwrap()).unwrap();
    assert_eq!(json["mac_address"], "ab:cd:ef:00:00:01");
    assert_eq!(json["type"], "ANCHOR");
    assert_eq!(bus.last_payload(&topic("dev/uptime")).as_deref(), Some("0"));
}

#[tokio::test]
async fn test_failed_field_stays_dirty() {
    let (bus, publisher) = publisher();
    let mut s = station(DeviceType::Tag);
    bus.fail_topic(&topic("dev/position/y"));

    let outcome = publisher.publish_station(&mut s).await.unwrap();

    assert_eq!(outcome.failed, vec![Field::Position]);
    assert!(!outcome.is_complete());
    assert!(s.is_field_dirty(Field::Position));
    assert!(!s.is_field_dirty(Field::MacAddress));
    assert!(bus.last_payload(&topic("dev/json")).is_some());

    bus.heal_topic(&topic("dev/position/y"));
    let retry = publisher.publish_station(&mut s).await.unwrap();

    assert_eq!(retry.flushed, vec![Field::Position]);
    assert!(!s.is_dirty());
}

#[tokio::test]
async fn test_target_point_only_published_for_tags() {
    let (bus, publisher) = publisher();

    let mut anchor = station(DeviceType::Anchor);
    anchor.set_target_point(Point::new(10.0, 20.0));
    publisher.publish_station(&mut anchor).await.unwrap();

    assert!(!anchor.is_field_dirty(Field::TargetPoint));
    assert!(bus.last_payload(&topic("dev/target_point/x")).is_none());

    let mut tag = station(DeviceType::Tag);
    tag.set_target_point(Point::new(10.0, 20.0));
    publisher.publish_station(&mut tag).await.unwrap();

    assert_eq!(
        bus.last_payload(&topic("dev/target_point/x")).as_deref(),
        Some("10")
    );
    assert_eq!(
        bus.last_payload(&topic("dev/target_point/y")).as_deref(),
        Some("20")
    );
}

#[tokio::test]
async fn test_field_payload_formats() {
    let (bus, publisher) = publisher();
    let mut s = station(DeviceType::Tag);
    s.set_device_type(DeviceType::Tag);
    s.set_cluster_name(None);
    s.set_cluster_stations(vec!["ab:cd:ef:00:00:02".to_string()]);
    s.add_distance_to_anchor(
        "ab:cd:ef:00:00:02",
        DistanceRecord {
            raw_distance: 5.0,
            scaled_distance: 10.0,
        },
    );

    publisher.publish_station(&mut s).await.unwrap();

    assert_eq!(bus.last_payload(&topic("uwb/type")).as_deref(), Some("TAG"));
    assert_eq!(
        bus.last_payload(&topic("uwb/cluster/name")).as_deref(),
        Some("None")
    );
    assert_eq!(
        bus.last_payload(&topic("uwb/cluster/stations")).as_deref(),
        Some(r#"["ab:cd:ef:00:00:02"]"#)
    );

    let ranging: serde_json::Value =
        serde_json::from_str(&bus.last_payload(&topic("uwb/ranging")).unwrap()).unwrap();
    assert_eq!(ranging[0]["mac_address"], "ab:cd:ef:00:00:02");
    assert_eq!(ranging[0]["distance"]["raw_distance"], 5.0);
    assert_eq!(ranging[0]["distance"]["scaled_distance"], 10.0);
}

#[tokio::test]
async fn test_state_topic_failure_is_an_error() {
    let (bus, publisher) = publisher();
    let mut s = station(DeviceType::Anchor);
    bus.fail_topic(&topic("dev/json"));

    let result = publisher.publish_station(&mut s).await;

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("dev/json"));
    // field topics went out before the state dump
    assert!(!s.is_field_dirty(Field::MacAddress));
    assert!(bus.last_payload(&topic("dev/uptime")).is_none());
}

#[tokio::test]
async fn test_retained_tracking_and_namespace_clear() {
    let bus = MemoryBus::new();
    bus.publish("gpsno/simulation/devices/a/name", "a".to_string(), true)
        .await
        .unwrap();
    bus.publish("gpsno/other/b", "b".to_string(), true)
        .await
        .unwrap();
    bus.publish("gpsno/simulation/devices/a/dev/uptime", "1".to_string(), false)
        .await
        .unwrap();

    assert_eq!(bus.retained().len(), 2);
    assert_eq!(bus.clear_namespace("gpsno/simulation").await.unwrap(), 1);
    assert_eq!(
        bus.retained().keys().collect::<Vec<_>>(),
        vec!["gpsno/other/b"]
    );

    bus.disconnect(true).await;
    assert!(bus.retained().is_empty());
    assert!(bus.is_disconnected());
}
