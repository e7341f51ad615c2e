use std::{
    future::Future,
    sync::OnceLock,
    time::{Duration, Instant},
};

use anyhow::Context;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use chiller_common::EdgeConfig;

use crate::{
    client::HttpCoordinator,
    controller::{EdgeController, TickOutcome},
    hardware::{LoggingRelays, SimulatedProbe},
    snapshot::SnapshotStore,
};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = EdgeConfig::from_env();

    let snapshots = SnapshotStore::new(&config.snapshot_path);
    let seed = match snapshots.load().await {
        Some(restored) => {
            info!(
                "restored thresholds start={} stop={} from {}",
                restored.start, restored.stop, config.snapshot_path
            );
            restored
        }
        None => config.default_compressor,
    };

    let coordinator =
        HttpCoordinator::new(&config).context("failed to build coordinator client")?;

    // Hardware integration point:
    // swap the simulated probe and logging relays for real drivers on the target board.
    let mut controller = EdgeController::new(
        coordinator,
        SimulatedProbe::new(config.sim_dropout_every),
        LoggingRelays::default(),
        snapshots,
        &config,
        seed,
    );

    info!(
        "edge controller started, coordinator at {}, tick {} ms",
        config.coordinator_url, config.tick_ms
    );

    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = interval.tick() => {
                if let TickOutcome::SensorUnavailable = controller.tick(monotonic_ms()).await {
                    warn!("sensor read failed");
                }
            }
        }
    }

    controller.shutdown();
    info!("edge controller stopped in {:?} state", controller.state());
    Ok(())
}

fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let terminate = signal(SignalKind::terminate());

    async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {err}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match terminate {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    warn!("failed to listen for SIGTERM: {err}");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
        }
        info!("shutdown requested");
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
