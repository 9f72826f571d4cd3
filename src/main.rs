use gpsno_sim::bus::{Bus, NatsBus, StationPublisher};
use gpsno_sim::config::Config;
use gpsno_sim::runner::{prepare_stations, SimulationRunner};
use gpsno_sim::simulation::SimulationService;
use gpsno_sim::storage::open_store;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

const EXIT_BUS_UNAVAILABLE: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_STORAGE_UNAVAILABLE: u8 = 3;
const EXIT_LOOP_ABORTED: u8 = 4;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gpsno_sim=info".into()),
        )
        .init();

    info!("GPS:No simulation starting...");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    info!(
        anchors = config.simulation.num_anchors,
        tags = config.simulation.num_tags,
        size_x = config.simulation.size_x,
        size_y = config.simulation.size_y,
        storage = %config.storage.backend,
        "Configuration loaded"
    );

    let store = match open_store(&config.storage) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Storage unavailable");
            return ExitCode::from(EXIT_STORAGE_UNAVAILABLE);
        }
    };

    let mut service = SimulationService::from_config(&config.simulation);
    if let Err(e) = prepare_stations(
        &mut service,
        store.as_ref(),
        &config.simulation,
        &mut rand::thread_rng(),
    ) {
        error!(error = %format!("{:#}", e), "Failed to prepare stations");
        return ExitCode::from(EXIT_STORAGE_UNAVAILABLE);
    }

    let bus = match NatsBus::connect(config.bus.clone()).await {
        Ok(bus) => Arc::new(bus),
        Err(e) => {
            warn!(error = %e, "Message bus is not available - exiting simulation");
            return ExitCode::from(EXIT_BUS_UNAVAILABLE);
        }
    };

    if config.bus.clear_retained_on_start {
        match bus.clear_namespace(&config.bus.base_topic).await {
            Ok(cleared) => info!(cleared = cleared, "Cleared retained messages on start"),
            Err(e) => warn!(error = %format!("{:#}", e), "Failed to clear retained messages"),
        }
    }

    let publisher = StationPublisher::new(
        bus,
        config.bus.base_topic.clone(),
        config.bus.retain_messages,
    );
    let mut runner = SimulationRunner::new(service, store, publisher, &config.simulation)
        .with_clear_retained_on_exit(config.bus.clear_retained_on_exit);

    if let Err(e) = runner.publish_status().await {
        error!(error = %format!("{:#}", e), "Failed to publish station status");
        runner.shutdown().await;
        return ExitCode::from(EXIT_BUS_UNAVAILABLE);
    }

    let result = runner.run(shutdown_signal()).await;
    runner.shutdown().await;

    match result {
        Ok(()) => {
            info!("GPS:No simulation stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Simulation loop aborted");
            ExitCode::from(EXIT_LOOP_ABORTED)
        }
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl_c signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Received signal to terminate, saving state");
}
