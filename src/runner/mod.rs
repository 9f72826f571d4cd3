// Startup fleet preparation and the periodic tick loop

use crate::bus::StationPublisher;
use crate::simulation::{SimulationConfig, SimulationService};
use crate::station::{DeviceType, MovementParams, Point, Station, StationRecord};
use crate::storage::StationStore;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};


/// Pause between stations while broadcasting startup status
pub const STATUS_PAUSE: Duration = Duration::from_millis(100);

/// What `prepare_stations` found and created
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PrepareReport {
    pub loaded_anchors: usize,
    pub loaded_tags: usize,
    pub created_anchors: usize,
    pub created_tags: usize,
}

/// Fill the fleet from the store, topping up to the configured counts.
///
/// Anchors keep their stored positions unless `regenerate_positions` is set;
/// tags always restart at the origin with a fresh target near it. The whole
/// fleet is written back in one transaction.
pub fn prepare_stations<R: Rng + ?Sized>(
    service: &mut SimulationService,
    store: &dyn StationStore,
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<PrepareReport> {
    let mut report = PrepareReport::default();

    let tags = store
        .load_by_type(DeviceType::Tag, Some(config.num_tags))
        .context("Failed to load tags")?;
    let anchors = store
        .load_by_type(DeviceType::Anchor, Some(config.num_anchors))
        .context("Failed to load anchors")?;
    report.loaded_tags = tags.len();
    report.loaded_anchors = anchors.len();

    for station in tags.into_iter().chain(anchors) {
        service.add_station(station)?;
    }

    let anchors_needed = config
        .num_anchors
        .saturating_sub(service.anchors().count());
    let tags_needed = config.num_tags.saturating_sub(service.tags().count());

    for _ in 0..anchors_needed {
        let mut anchor = new_station(DeviceType::Anchor, config, rng)?;
        anchor.set_random_position(config.size_x, config.size_y, rng);
        service.add_station(anchor)?;
    }
    for _ in 0..tags_needed {
        service.add_station(new_station(DeviceType::Tag, config, rng)?)?;
    }
    report.created_anchors = anchors_needed;
    report.created_tags = tags_needed;

    if config.regenerate_positions {
        for anchor in service.anchors_mut() {
            anchor.set_random_position(config.size_x, config.size_y, rng);
        }
    }

    for tag in service.tags_mut() {
        tag.set_position(Point::ORIGIN);
        tag.set_random_target_point(
            config.size_x,
            config.size_y,
            config.target_point_offset_radius,
            rng,
        );
    }

    service.update_device_knowledge();
    service.update_all_tag_distances();

    store
        .upsert_all(service.stations())
        .context("Failed to save prepared stations")?;

    info!(
        loaded_anchors = report.loaded_anchors,
        loaded_tags = report.loaded_tags,
        created_anchors = report.created_anchors,
        created_tags = report.created_tags,
        "Prepared stations"
    );

    Ok(report)
}

fn new_station<R: Rng + ?Sized>(
    device_type: DeviceType,
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<Station> {
    let mut record = StationRecord::new(device_type);
    record.cluster_name = config.default_cluster.clone();
    Ok(Station::from_record_with_rng(record, rng)?)
}

/// Counters for one tick
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    /// Tags that moved
    pub moved: usize,
    /// Stations written to the store
    pub persisted: usize,
    /// Stations that failed to persist
    pub persist_failures: usize,
    /// Stations handed to the publisher
    pub published: usize,
    /// Fields left dirty after a failed publish
    pub failed_fields: usize,
}

/// Drives the simulation: move, persist, publish, wait
pub struct SimulationRunner {
    service: SimulationService,
    store: Box<dyn StationStore>,
    publisher: StationPublisher,
    movement: MovementParams,
    interval: Duration,
    rng: StdRng,
    clear_retained_on_exit: bool,
    ticks: u64,
}

impl SimulationRunner {
    pub fn new(
        service: SimulationService,
        store: Box<dyn StationStore>,
        publisher: StationPublisher,
        config: &SimulationConfig,
    ) -> Self {
        Self {
            service,
            store,
            publisher,
            movement: config.movement(),
            interval: config.update_interval(),
            rng: StdRng::from_entropy(),
            clear_retained_on_exit: false,
            ticks: 0,
        }
    }

    /// Use a fixed random source
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_clear_retained_on_exit(mut self, clear: bool) -> Self {
        self.clear_retained_on_exit = clear;
        self
    }

    pub fn service(&self) -> &SimulationService {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut SimulationService {
        &mut self.service
    }

    pub fn store(&self) -> &dyn StationStore {
        self.store.as_ref()
    }

    /// Completed ticks
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Publish every station once, pausing between stations.
    ///
    /// Dirty stations are stamped and persisted first, exactly as in a tick.
    pub async fn publish_status(&mut self) -> Result<TickReport> {
        info!(
            stations = self.service.stations().len(),
            "Publishing station status"
        );

        let mut report = TickReport::default();
        for (i, station) in self.service.stations_mut().iter_mut().enumerate() {
            if i > 0 {
                tokio::time::sleep(STATUS_PAUSE).await;
            }
            if station.is_dirty() {
                flush_station(self.store.as_ref(), &self.publisher, station, &mut report).await?;
            } else {
                self.publisher.publish_station(station).await?;
                report.published += 1;
            }
        }

        Ok(report)
    }

    /// Run one tick.
    ///
    /// A station whose store write fails is neither published nor cleared,
    /// so the next tick retries it. An error return means the loop cannot
    /// continue.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport {
            moved: self.service.advance(&self.movement, &mut self.rng),
            ..Default::default()
        };

        for station in self.service.stations_mut() {
            if station.is_dirty() {
                flush_station(self.store.as_ref(), &self.publisher, station, &mut report).await?;
            }
        }

        self.ticks += 1;
        Ok(report)
    }

    /// Tick at a fixed cadence until `shutdown` resolves.
    ///
    /// `shutdown` is only observed between ticks. If a tick fails, the whole
    /// fleet is saved before the error is returned.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.interval.as_secs_f64(),
            stations = self.service.stations().len(),
            "Started simulation loop"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(ticks = self.ticks, "Stopping simulation loop");
                    return Ok(());
                }
                _ = timer.tick() => {}
            }

            match self.tick().await {
                Ok(report) if report.moved > 0 || report.published > 0 => {
                    debug!(
                        moved = report.moved,
                        persisted = report.persisted,
                        published = report.published,
                        "Tick complete"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Error in simulation loop");
                    if let Err(save_err) = self.save_all() {
                        error!(error = %save_err, "Failed to save stations after loop error");
                    }
                    return Err(e.context("Simulation loop aborted"));
                }
            }
        }
    }

    /// Write the whole fleet in one transaction
    pub fn save_all(&self) -> Result<()> {
        self.store
            .upsert_all(self.service.stations())
            .context("Failed to save stations")?;
        info!(stations = self.service.stations().len(), "Saved stations");
        Ok(())
    }

    /// Save the fleet and disconnect from the bus
    pub async fn shutdown(&mut self) {
        info!("Saving state before exit");
        if let Err(e) = self.save_all() {
            error!(error = %e, "Failed to save stations on shutdown");
        }
        self.publisher
            .bus()
            .disconnect(self.clear_retained_on_exit)
            .await;
    }
}

/// Stamp, persist and publish one dirty station
async fn flush_station(
    store: &dyn StationStore,
    publisher: &StationPublisher,
    station: &mut Station,
    report: &mut TickReport,
) -> Result<()> {
    station.touch();

    if let Err(e) = store.upsert(station) {
        error!(station = %station.name(), error = %e, "Failed to persist station");
        report.persist_failures += 1;
        return Ok(());
    }
    debug!(station = %station.name(), "Persisted station");
    report.persisted += 1;

    let outcome = publisher.publish_station(station).await?;
    report.published += 1;
    report.failed_fields += outcome.failed.len();
    Ok(())
}
