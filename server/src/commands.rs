use crate::backend::{IntentQueue, KeyValueStore};
use crate::clock::Clock;
use crate::error::{ErrorKind, SeaResult};
use crate::pipeline::ShipService;
use log::{info, warn};
use rand::Rng;
use shared::{ClientCommand, MovementInfo, ServerReply};

/// Fresh player id: 32 lowercase hex digits.
pub fn new_player_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Answers one client command.
///
/// Failures are reported to the client as an error reply. Infrastructure
/// failures get a generic message so backend details stay server-side.
pub async fn handle_command<K, Q, C>(
    service: &ShipService<K, Q, C>,
    command: ClientCommand,
) -> ServerReply
where
    K: KeyValueStore + Clone,
    Q: IntentQueue,
    C: Clock,
{
    let result = match command {
        ClientCommand::Sync { player_id } | ClientCommand::Hello { player_id } => {
            sync(service, player_id).await
        }
        ClientCommand::Move { player_id, x, y } => service
            .submit_move(&player_id, x, y)
            .await
            .map(|()| ServerReply::MoveQueued),
    };

    result.unwrap_or_else(|e| {
        warn!("Command failed: {}", e);
        match e.kind() {
            ErrorKind::Unavailable => ServerReply::error("Service temporarily unavailable."),
            _ => ServerReply::error(e.to_string()),
        }
    })
}

/// Decodes a raw JSON command and answers it. Undecodable input gets an error reply.
pub async fn handle_raw<K, Q, C>(service: &ShipService<K, Q, C>, raw: &str) -> ServerReply
where
    K: KeyValueStore + Clone,
    Q: IntentQueue,
    C: Clock,
{
    match ClientCommand::from_json(raw) {
        Ok(command) => handle_command(service, command).await,
        Err(e) => {
            warn!("Rejecting unreadable command: {}", e);
            ServerReply::error("Unknown or malformed command.")
        }
    }
}

async fn sync<K, Q, C>(
    service: &ShipService<K, Q, C>,
    requested: Option<String>,
) -> SeaResult<ServerReply>
where
    K: KeyValueStore + Clone,
    Q: IntentQueue,
    C: Clock,
{
    let (player_id, assigned_new_id) = match requested.filter(|id| !id.is_empty()) {
        Some(id) => (id, None),
        None => {
            let id = new_player_id();
            info!("Assigned new player id {}", id);
            (id, Some(true))
        }
    };

    let snapshot = service.state_snapshot(&player_id).await?;
    let store = service.store();
    Ok(ServerReply::Sync {
        current_sector: snapshot.ship.sector.clone(),
        player_id,
        grid: store.catalog().payload(),
        ship: snapshot.ship,
        ships: snapshot.fleet,
        movement: MovementInfo {
            speed: store.ship_speed(),
        },
        assigned_new_id,
    })
}
