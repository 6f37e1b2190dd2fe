use clap::{Parser, Subcommand};
use server::clock::SystemClock;
use server::commands::handle_command;
use server::hub::HubClient;
use server::pipeline::ShipService;
use server::store::SnapshotStore;
use shared::{ClientCommand, FleetEvent, GridCatalog, SeaConfig, ServerReply};
use std::path::PathBuf;
use std::sync::Arc;

/// Acts as a request handler and relay against a running hub.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Hub address to connect to
    #[clap(short = 'H', long, default_value = "127.0.0.1:7400")]
    hub: String,
    /// JSON config file; defaults apply when omitted
    #[clap(short, long, env = "SEA_CONFIG_PATH")]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync a player, creating a ship if it is new
    State {
        #[clap(short = 'i', long)]
        player_id: Option<String>,
    },
    /// Queue a move to a plane position
    Move {
        #[clap(short = 'i', long)]
        player_id: String,
        /// Target sector label such as B-3; overrides x and y
        #[clap(short, long)]
        sector: Option<String>,
        #[clap(short, long, default_value = "0", allow_negative_numbers = true)]
        x: f64,
        #[clap(short, long, default_value = "0", allow_negative_numbers = true)]
        y: f64,
    },
    /// Print published fleet events as they arrive
    Watch {
        /// Stop after this many events
        #[clap(short, long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = SeaConfig::load(args.config.as_deref())?;
    let catalog = Arc::new(GridCatalog::from_config(&config.grid));
    let hub = HubClient::connect(&args.hub).await?;
    println!("Connected to hub at {}", hub.addr());

    let command = match args.command {
        Command::Watch { count } => {
            let mut subscription = hub.subscribe(&config.persistence.event_channel).await?;
            println!("Watching {}", subscription.channel());
            let mut seen = 0;
            while let Some(payload) = subscription.recv().await? {
                match FleetEvent::from_json(&payload) {
                    Ok(FleetEvent::FleetUpdate { ships }) => {
                        println!("fleet: {} ships", ships.len());
                        for ship in ships {
                            let heading = ship.target_sector.as_deref().unwrap_or("-");
                            println!(
                                "  {} at ({:.1}, {:.1}) in {} -> {}",
                                ship.id, ship.x, ship.y, ship.sector, heading
                            );
                        }
                    }
                    Ok(FleetEvent::SectorUpdate { player_id, sector }) => {
                        println!("sector: {} entered {}", player_id, sector);
                    }
                    Err(e) => println!("unreadable event: {}", e),
                }
                seen += 1;
                if count.map_or(false, |count| seen >= count) {
                    break;
                }
            }
            return Ok(());
        }
        Command::State { player_id } => ClientCommand::Sync { player_id },
        Command::Move {
            player_id,
            sector,
            x,
            y,
        } => {
            let (x, y) = match sector {
                Some(label) => match catalog.by_label(&label) {
                    Some(hex) => (hex.center.x, hex.center.y),
                    None => return Err(format!("unknown sector {}", label).into()),
                },
                None => (x, y),
            };
            ClientCommand::Move { player_id, x, y }
        }
    };

    let store = SnapshotStore::new(hub.clone(), SystemClock, catalog, &config);
    let service = ShipService::new(store, hub.clone(), hub, &config);
    let reply = handle_command(&service, command).await;

    if let ServerReply::Error { message } = &reply {
        eprintln!("error: {}", message);
    }
    println!("{}", reply.to_json()?);
    Ok(())
}
