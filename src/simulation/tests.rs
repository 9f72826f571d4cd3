use super::*;
use crate::station::{DeviceType, Field, Point, StationRecord};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn station(device_type: DeviceType, mac: &str, position: Point) -> Station {
    let mut record = StationRecord::new(device_type);
    record.mac_address = Some(mac.to_string());
    record.position = Some(position);
    Station::from_record(record).unwrap()
}

fn tag(mac: &str, position: Point, target: Point) -> Station {
    let mut record = StationRecord::new(DeviceType::Tag);
    record.mac_address = Some(mac.to_string());
    record.position = Some(position);
    record.target_point = Some(target);
    Station::from_record(record).unwrap()
}

fn movement(speed: f64) -> MovementParams {
    MovementParams {
        speed,
        realistic_movement: false,
        target_proximity: 25.0,
        size_x: 1000,
        size_y: 1000,
    }
}

#[test]
fn test_calculate_distance_scaling() {
    let t = station(DeviceType::Tag, "ab:cd:ef:00:00:01", Point::new(3.0, 4.0));
    let a = station(DeviceType::Anchor, "ab:cd:ef:00:00:02", Point::ORIGIN);

    let unscaled = calculate_distance(&t, &a, 1.0);
    assert_eq!(unscaled.raw_distance, 5.0);
    assert_eq!(unscaled.scaled_distance, unscaled.raw_distance);

    let scaled = calculate_distance(&t, &a, 2.5);
    assert_eq!(scaled.raw_distance, 5.0);
    assert_eq!(scaled.scaled_distance, 12.5);
}

#[test]
fn test_calculate_distance_same_position() {
    let t = station(DeviceType::Tag, "ab:cd:ef:00:00:01", Point::new(42.0, 7.0));
    let a = station(DeviceType::Anchor, "ab:cd:ef:00:00:02", Point::new(42.0, 7.0));

    let distance = calculate_distance(&t, &a, 3.0);
    assert_eq!(distance.raw_distance, 0.0);
    assert_eq!(distance.scaled_distance, 0.0);
}

#[test]
fn test_add_station_rejects_duplicate_mac() {
    let mut sim = SimulationService::new(1000, 1000, 1.0);
    sim.add_station(station(DeviceType::Anchor, "ab:cd:ef:00:00:01", Point::ORIGIN))
        .unwrap();

    let result = sim.add_station(station(DeviceType::Tag, "ab:cd:ef:00:00:01", Point::ORIGIN));

    assert_eq!(
        result,
        Err(SimulationError::DuplicateStation("ab:cd:ef:00:00:01".to_string()))
    );
    assert_eq!(sim.stations().len(), 1);
}

#[test]
fn test_role_views_reflect_collection() {
    let mut sim = SimulationService::new(1000, 1000, 1.0);
    assert_eq!(sim.anchors().count(), 0);

    sim.add_station(station(DeviceType::Anchor, "ab:cd:ef:00:00:01", Point::ORIGIN))
        .unwrap();
    sim.add_station(station(DeviceType::Tag, "ab:cd:ef:00:00:02", Point::ORIGIN))
        .unwrap();
    sim.add_station(station(DeviceType::None, "ab:cd:ef:00:00:03", Point::ORIGIN))
        .unwrap();
    assert_eq!(sim.anchors().count(), 1);
    assert_eq!(sim.tags().count(), 1);

    sim.add_station(station(DeviceType::Anchor, "ab:cd:ef:00:00:04", Point::ORIGIN))
        .unwrap();
    assert_eq!(sim.anchors().count(), 2);
}

#[test]
fn test_update_device_knowledge_full_mesh() {
    let mut sim = SimulationService::new(1000, 1000, 1.0);
    for mac in ["ab:cd:ef:00:00:01", "ab:cd:ef:00:00:02", "ab:cd:ef:00:00:03"] {
        sim.add_station(station(DeviceType::Anchor, mac, Point::ORIGIN))
            .unwrap();
    }

    sim.update_device_knowledge();

    for s in sim.stations() {
        assert_eq!(s.cluster_stations().len(), 2);
        assert!(!s.cluster_stations().iter().any(|m| m == s.mac_address()));
        assert!(s.is_field_dirty(Field::ClusterStations));
    }
    assert_eq!(
        sim.station_by_mac("ab:cd:ef:00:00:02").unwrap().cluster_stations(),
        &["ab:cd:ef:00:00:01".to_string(), "ab:cd:ef:00:00:03".to_string()]
    );
}

#[test]
fn test_update_tag_distances_upserts() {
    let mut sim = SimulationService::new(1000, 1000, 1.0);
    sim.add_station(station(DeviceType::Anchor, "ab:cd:ef:00:00:01", Point::ORIGIN))
        .unwrap();
    sim.add_station(station(DeviceType::Anchor, "ab:cd:ef:00:00:02", Point::new(0.0, 30.0)))
        .unwrap();
    sim.add_station(tag("ab:cd:ef:00:00:03", Point::new(40.0, 0.0), Point::ORIGIN))
        .unwrap();

    assert!(sim.update_tag_distances("ab:cd:ef:00:00:03"));
    let first = sim.station_by_mac("ab:cd:ef:00:00:03").unwrap();
    assert_eq!(first.ranging_data().len(), 2);
    assert_eq!(first.ranging_data()[0].distance.raw_distance, 40.0);
    assert_eq!(first.ranging_data()[1].distance.raw_distance, 50.0);

    sim.station_by_mac_mut("ab:cd:ef:00:00:03")
        .unwrap()
        .set_position(Point::new(0.0, 0.0));
    sim.update_tag_distances("ab:cd:ef:00:00:03");

    let second = sim.station_by_mac("ab:cd:ef:00:00:03").unwrap();
    assert_eq!(second.ranging_data().len(), 2);
    assert_eq!(second.ranging_data()[0].distance.raw_distance, 0.0);
    assert_eq!(second.ranging_data()[1].distance.raw_distance, 30.0);
}

#[test]
fn test_update_tag_distances_ignores_anchor_and_unknown() {
    let mut sim = SimulationService::new(1000, 1000, 1.0);
    sim.add_station(station(DeviceType::Anchor, "ab:cd:ef:00:00:01", Point::ORIGIN))
        .unwrap();
    sim.add_station(station(DeviceType::Anchor, "ab:cd:ef:00:00:02", Point::new(5.0, 5.0)))
        .unwrap();

    assert!(sim.update_tag_distances("ab:cd:ef:00:00:01"));
    assert!(sim
        .station_by_mac("ab:cd:ef:00:00:01")
        .unwrap()
        .ranging_data()
        .is_empty());

    assert!(!sim.update_tag_distances("ab:cd:ef:ff:ff:ff"));
}

#[test]
fn test_update_all_tag_distances_ranges_every_tag() {
    let mut sim = SimulationService::new(1000, 1000, 2.0);
    sim.add_station(station(DeviceType::Anchor, "ab:cd:ef:00:00:01", Point::ORIGIN))
        .unwrap();
    sim.add_station(tag("ab:cd:ef:00:00:02", Point::new(3.0, 4.0), Point::ORIGIN))
        .unwrap();
    sim.add_station(tag("ab:cd:ef:00:00:03", Point::new(6.0, 8.0), Point::ORIGIN))
        .unwrap();

    sim.update_all_tag_distances();

    let near = sim.station_by_mac("ab:cd:ef:00:00:02").unwrap();
    assert_eq!(near.ranging_data().len(), 1);
    assert_eq!(near.ranging_data()[0].distance.scaled_distance, 10.0);
    let far = sim.station_by_mac("ab:cd:ef:00:00:03").unwrap();
    assert_eq!(far.ranging_data()[0].distance.raw_distance, 10.0);
    assert!(sim
        .station_by_mac("ab:cd:ef:00:00:01")
        .unwrap()
        .ranging_data()
        .is_empty());
}

#[test]
fn test_lookup_by_name_and_mac() {
    let mut sim = SimulationService::new(1000, 1000, 1.0);
    sim.add_station(station(DeviceType::Anchor, "ab:cd:ef:00:00:01", Point::ORIGIN))
        .unwrap();

    let found = sim.station_by_name("GPS:No Station-000001").unwrap();
    assert_eq!(found.mac_address(), "ab:cd:ef:00:00:01");

    assert!(sim.station_by_name("GPS:No Station-ffffff").is_none());
    assert!(sim.station_by_mac("ab:cd:ef:ff:ff:ff").is_none());
}

#[test]
fn test_advance_moves_tags_and_ranges() {
    let mut sim = SimulationService::new(1000, 1000, 1.5);
    sim.add_station(station(DeviceType::Anchor, "ab:cd:ef:00:00:01", Point::ORIGIN))
        .unwrap();
    sim.add_station(tag("ab:cd:ef:00:00:02", Point::ORIGIN, Point::new(100.0, 0.0)))
        .unwrap();
    let mut rng = StdRng::seed_from_u64(1);

    let moved = sim.advance(&movement(10.0), &mut rng);

    assert_eq!(moved, 1);
    let t = sim.station_by_mac("ab:cd:ef:00:00:02").unwrap();
    assert_eq!(t.position(), Point::new(10.0, 0.0));
    assert_eq!(t.ranging_data().len(), 1);
    assert_eq!(t.ranging_data()[0].mac_address, "ab:cd:ef:00:00:01");
    assert_eq!(t.ranging_data()[0].distance.raw_distance, 10.0);
    assert_eq!(t.ranging_data()[0].distance.scaled_distance, 15.0);

    let anchor = sim.station_by_mac("ab:cd:ef:00:00:01").unwrap();
    assert_eq!(anchor.position(), Point::ORIGIN);
}

#[test]
fn test_advance_skips_gated_tags() {
    let mut sim = SimulationService::new(1000, 1000, 1.0);
    sim.add_station(station(DeviceType::Anchor, "ab:cd:ef:00:00:01", Point::ORIGIN))
        .unwrap();
    let mut frozen = tag("ab:cd:ef:00:00:02", Point::ORIGIN, Point::new(100.0, 0.0));
    frozen.set_randomizer(0.0).unwrap();
    sim.add_station(frozen).unwrap();

    let mut params = movement(10.0);
    params.realistic_movement = true;
    let moved = sim.advance(&params, &mut StdRng::seed_from_u64(1));

    assert_eq!(moved, 0);
    assert!(sim
        .station_by_mac("ab:cd:ef:00:00:02")
        .unwrap()
        .ranging_data()
        .is_empty());
}
