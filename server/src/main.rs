use clap::Parser;
use log::{error, info, warn};
use server::backend::BackendResult;
use server::clock::SystemClock;
use server::hub::HubClient;
use server::pipeline::ShipService;
use server::store::SnapshotStore;
use server::worker::Worker;
use shared::{GridCatalog, SeaConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;

/// Movement worker: the single writer of ship movement state.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Hub address to connect to
    #[clap(short = 'H', long, default_value = "127.0.0.1:7400")]
    hub: String,
    /// JSON config file; defaults apply when omitted
    #[clap(short, long, env = "SEA_CONFIG_PATH")]
    config: Option<PathBuf>,
    /// How long one queue poll may wait, in milliseconds
    #[clap(short, long, default_value = "50")]
    poll_ms: u64,
    /// Connection attempts before giving up
    #[clap(long, default_value = "10")]
    connect_attempts: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = SeaConfig::load(args.config.as_deref())?;
    let catalog = Arc::new(GridCatalog::from_config(&config.grid));
    info!(
        "Loaded grid of {} sectors, ship speed {}",
        catalog.len(),
        config.movement.ship_speed
    );

    // The worker's own calls and its queue polls share one connection; they never overlap.
    let hub = connect_with_retry(&args.hub, args.connect_attempts).await?;

    let store = SnapshotStore::new(hub.clone(), SystemClock, catalog, &config);
    let service = ShipService::new(store, hub.clone(), hub.clone(), &config);
    let worker = Worker::new(
        service,
        hub.clone(),
        hub,
        &config,
        Duration::from_millis(args.poll_ms),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut worker_handle = tokio::spawn(worker.run(stop_rx));

    tokio::select! {
        result = &mut worker_handle => {
            if let Err(e) = result {
                error!("Worker task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            if stop_tx.send(true).is_err() {
                warn!("Worker already stopped");
            }
            if let Err(e) = worker_handle.await {
                error!("Worker task panicked: {}", e);
            }
        }
    }

    Ok(())
}

/// Connects to the hub, doubling the delay after each failure up to 5 seconds.
async fn connect_with_retry(addr: &str, attempts: u32) -> BackendResult<HubClient> {
    let mut delay = Duration::from_millis(200);
    let mut attempt = 1;
    loop {
        match HubClient::connect(addr).await {
            Ok(client) => {
                info!("Connected to hub at {}", addr);
                return Ok(client);
            }
            Err(e) if attempt < attempts => {
                warn!(
                    "Hub at {} not reachable ({}), retry {}/{} in {:?}",
                    addr, e, attempt, attempts, delay
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(5));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
