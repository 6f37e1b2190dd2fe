//! Two-phase handling of movement requests.
//!
//! Phase one ([`ShipService::request_move`]) validates a request and takes the
//! ship's intent lock without touching movement state. Phase two
//! ([`ShipService::process_intent`]) runs in the worker, commits the movement
//! and always releases the lock.

use crate::backend::{IntentQueue, KeyValueStore};
use crate::clock::Clock;
use crate::error::{BusyReason, SeaError, SeaResult};
use crate::lock::IntentLock;
use crate::store::SnapshotStore;
use log::{debug, info, warn};
use shared::{MoveIntent, PublicShip, SeaConfig};

/// Targets closer than this to the ship are rejected as already reached.
pub const MIN_MOVE_DISTANCE: f64 = 1.0;

/// What a client sees on connect: its own ship and the whole fleet.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub ship: PublicShip,
    pub fleet: Vec<PublicShip>,
}

#[derive(Debug, Clone)]
pub struct ShipService<K, Q, C> {
    store: SnapshotStore<K, C>,
    lock: IntentLock<K>,
    queue: Q,
    topic: String,
}

impl<K, Q, C> ShipService<K, Q, C>
where
    K: KeyValueStore + Clone,
    Q: IntentQueue,
    C: Clock,
{
    pub fn new(store: SnapshotStore<K, C>, kv: K, queue: Q, config: &SeaConfig) -> Self {
        Self {
            store,
            lock: IntentLock::new(kv, config.pending_move_ttl()),
            queue,
            topic: config.queue.topic.clone(),
        }
    }

    pub fn store(&self) -> &SnapshotStore<K, C> {
        &self.store
    }

    pub fn lock(&self) -> &IntentLock<K> {
        &self.lock
    }

    /// Returns the ship, creating it if new, together with the whole fleet.
    pub async fn state_snapshot(&self, player_id: &str) -> SeaResult<StateSnapshot> {
        let ship = self.store.ensure_public(player_id).await?;
        let fleet = self.store.list_all().await?;
        Ok(StateSnapshot { ship, fleet })
    }

    /// Validates a move and takes the intent lock. On success the caller owns
    /// the lock and must hand the intent to the worker.
    pub async fn request_move(&self, player_id: &str, x: f64, y: f64) -> SeaResult<()> {
        if self.store.catalog().find_hex_at(x, y).is_none() {
            return Err(SeaError::InvalidTarget);
        }

        let ship = self.store.ensure(player_id).await?;
        let target = shared::Point::new(x, y);
        if ship.position().distance_to(&target) < MIN_MOVE_DISTANCE {
            return Err(SeaError::AlreadyThere);
        }
        if ship.is_travelling(self.store.now()) {
            return Err(SeaError::Busy(BusyReason::Travelling));
        }
        if !self.lock.acquire(player_id).await? {
            return Err(SeaError::Busy(BusyReason::Queued));
        }
        Ok(())
    }

    /// Runs phase one and enqueues the intent for the worker.
    pub async fn submit_move(&self, player_id: &str, x: f64, y: f64) -> SeaResult<()> {
        self.request_move(player_id, x, y).await?;

        let enqueued = match MoveIntent::new(player_id, x, y).to_json() {
            Ok(payload) => self
                .queue
                .push(&self.topic, payload)
                .await
                .map_err(SeaError::from),
            Err(e) => Err(SeaError::from(e)),
        };

        if let Err(e) = enqueued {
            warn!("Failed to enqueue move for {}: {}", player_id, e);
            if let Err(release_err) = self.lock.release(player_id).await {
                warn!("Failed to release intent lock for {}: {}", player_id, release_err);
            }
            return Err(e);
        }

        debug!("Queued move for {} to ({:.1}, {:.1})", player_id, x, y);
        Ok(())
    }

    /// Commits a dequeued intent. The lock is released whatever the outcome.
    pub async fn process_intent(&self, intent: &MoveIntent) -> SeaResult<()> {
        let committed = self.commit_intent(intent).await;
        let released = self.lock.release(&intent.player_id).await;
        committed?;
        released
    }

    async fn commit_intent(&self, intent: &MoveIntent) -> SeaResult<()> {
        let Some(target) = self.store.catalog().find_hex_at(intent.x, intent.y) else {
            info!(
                "Dropping move for {}: ({:.1}, {:.1}) is no longer a sector",
                intent.player_id, intent.x, intent.y
            );
            return Ok(());
        };
        let target_sector = target.label.clone();

        let ship = self.store.ensure(&intent.player_id).await?;
        self.store
            .commit_movement(
                &intent.player_id,
                ship.x,
                ship.y,
                &ship.sector,
                intent.x,
                intent.y,
                &target_sector,
            )
            .await
    }
}
