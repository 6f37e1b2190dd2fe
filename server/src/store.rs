//! The authoritative snapshot of every ship, kept as one blob in the shared store.
//!
//! Every mutation is a read-modify-write of the whole blob. The store has no
//! per-key transactions, so correctness rests on there being exactly one
//! writer of movement state (the worker). Request handlers only ever add
//! missing ships or prune expired ones.

use crate::backend::KeyValueStore;
use crate::clock::Clock;
use crate::error::SeaResult;
use crate::movement::{advance_one, begin_movement, SectorCrossing};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use shared::grid::GridCatalog;
use shared::{Point, PublicShip, SeaConfig, ShipState, Snapshot};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SnapshotStore<K, C> {
    kv: K,
    clock: C,
    catalog: Arc<GridCatalog>,
    key: String,
    session_ttl: f64,
    ship_speed: f64,
}

impl<K: KeyValueStore, C: Clock> SnapshotStore<K, C> {
    pub fn new(kv: K, clock: C, catalog: Arc<GridCatalog>, config: &SeaConfig) -> Self {
        Self {
            kv,
            clock,
            catalog,
            key: config.persistence.state_key.clone(),
            session_ttl: config.movement.session_ttl_seconds as f64,
            ship_speed: config.movement.ship_speed,
        }
    }

    pub fn catalog(&self) -> &GridCatalog {
        &self.catalog
    }

    pub fn ship_speed(&self) -> f64 {
        self.ship_speed
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Loads the snapshot, replacing a missing or corrupt blob with an empty one.
    pub async fn read(&self) -> SeaResult<Snapshot> {
        if let Some(blob) = self.kv.get(&self.key).await? {
            match Snapshot::from_json(&blob) {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => warn!("Discarding unreadable snapshot under {}: {}", self.key, e),
            }
        }
        let snapshot = Snapshot::default();
        self.write(&snapshot).await?;
        Ok(snapshot)
    }

    pub async fn write(&self, snapshot: &Snapshot) -> SeaResult<()> {
        self.kv.set(&self.key, snapshot.to_json()?).await?;
        Ok(())
    }

    /// Drops expired ships from `snapshot`, returning how many were removed.
    /// The caller decides whether to persist the result.
    pub fn prune_expired(&self, snapshot: &mut Snapshot) -> usize {
        let removed = snapshot.prune_expired(self.clock.now(), self.session_ttl);
        if removed > 0 {
            debug!("Pruned {} expired ships", removed);
        }
        removed
    }

    async fn read_pruned(&self, persist: bool) -> SeaResult<Snapshot> {
        let mut snapshot = self.read().await?;
        if self.prune_expired(&mut snapshot) > 0 && persist {
            self.write(&snapshot).await?;
        }
        Ok(snapshot)
    }

    /// Returns the ship, creating it at a random sector center if it is new.
    pub async fn ensure(&self, id: &str) -> SeaResult<ShipState> {
        let mut snapshot = self.read_pruned(true).await?;
        if let Some(ship) = snapshot.ships.get(id) {
            return Ok(ship.clone());
        }

        let ship = self.spawn(id);
        info!("Created ship {} in sector {}", id, ship.sector);
        snapshot.ships.insert(id.to_string(), ship.clone());
        self.write(&snapshot).await?;
        Ok(ship)
    }

    pub async fn ensure_public(&self, id: &str) -> SeaResult<PublicShip> {
        Ok(self.ensure(id).await?.to_public())
    }

    pub async fn get(&self, id: &str) -> SeaResult<Option<ShipState>> {
        let snapshot = self.read_pruned(true).await?;
        Ok(snapshot.ships.get(id).cloned())
    }

    /// Public view of every live ship, ordered by id.
    pub async fn list_all(&self) -> SeaResult<Vec<PublicShip>> {
        let snapshot = self.read_pruned(true).await?;
        Ok(snapshot.public_ships())
    }

    pub async fn is_moving(&self, id: &str) -> SeaResult<bool> {
        let now = self.clock.now();
        Ok(self
            .get(id)
            .await?
            .map_or(false, |ship| ship.is_travelling(now)))
    }

    /// Starts moving `id` from the start point to the target point.
    ///
    /// A zero-length move changes nothing. A ship missing from the snapshot
    /// is recreated at the start point.
    #[allow(clippy::too_many_arguments)]
    pub async fn commit_movement(
        &self,
        id: &str,
        start_x: f64,
        start_y: f64,
        start_sector: &str,
        target_x: f64,
        target_y: f64,
        target_sector: &str,
    ) -> SeaResult<()> {
        let mut snapshot = self.read_pruned(false).await?;
        let now = self.clock.now();
        let start = Point::new(start_x, start_y);
        let target = Point::new(target_x, target_y);

        let Some(movement) = begin_movement(
            &self.catalog,
            start,
            start_sector,
            target,
            target_sector,
            self.ship_speed,
            now,
        ) else {
            debug!("Ignoring zero-length move for {}", id);
            return Ok(());
        };

        let ship = snapshot
            .ships
            .entry(id.to_string())
            .or_insert_with(|| ShipState::stationary(id, start_x, start_y, start_sector, now));
        ship.x = start_x;
        ship.y = start_y;
        info!(
            "Ship {} departing {} for {} ({:.1} units, arrives in {:.2}s)",
            id,
            ship.sector,
            target_sector,
            movement.remaining,
            movement.end_time - movement.start_time
        );
        ship.movement = Some(movement);
        ship.updated_at = now;

        self.write(&snapshot).await
    }

    /// Advances every travelling ship by `delta_seconds`, writing back only
    /// if something moved. Returns the sector crossings in the order they happened.
    pub async fn advance_all(&self, delta_seconds: f64) -> SeaResult<Vec<SectorCrossing>> {
        if !(delta_seconds > 0.0) {
            return Ok(Vec::new());
        }

        let mut snapshot = self.read_pruned(false).await?;
        let now = self.clock.now();
        let mut changed = false;
        let mut crossings = Vec::new();

        for ship in snapshot.ships.values_mut() {
            let advance = advance_one(ship, delta_seconds, now);
            if advance.arrived {
                info!("Ship {} arrived in {}", ship.id, ship.sector);
            }
            changed |= advance.moved;
            crossings.extend(advance.crossings);
        }

        if changed {
            self.write(&snapshot).await?;
        }
        Ok(crossings)
    }

    /// Puts `id` at a position as a stationary ship, replacing any movement.
    pub async fn place(&self, id: &str, x: f64, y: f64, sector: &str) -> SeaResult<()> {
        let mut snapshot = self.read_pruned(false).await?;
        let ship = ShipState::stationary(id, x, y, sector, self.clock.now());
        snapshot.ships.insert(id.to_string(), ship);
        self.write(&snapshot).await
    }

    fn spawn(&self, id: &str) -> ShipState {
        let now = self.clock.now();
        match self.catalog.hexes().choose(&mut rand::thread_rng()) {
            Some(hex) => ShipState::stationary(id, hex.center.x, hex.center.y, &hex.label, now),
            None => ShipState::stationary(id, 0.0, 0.0, "", now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::clock::ManualClock;
    use assert_approx_eq::assert_approx_eq;
    use tokio_test::assert_ok;

    fn setup() -> (SnapshotStore<MemoryBackend, ManualClock>, MemoryBackend, ManualClock) {
        let config = SeaConfig::default();
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(1_000.0);
        let catalog = Arc::new(GridCatalog::from_config(&config.grid));
        let store = SnapshotStore::new(backend.clone(), clock.clone(), catalog, &config);
        (store, backend, clock)
    }

    #[tokio::test]
    async fn test_read_initializes_missing_blob() {
        let (store, backend, _) = setup();
        let snapshot = store.read().await.unwrap();
        assert!(snapshot.ships.is_empty());
        assert_eq!(
            backend.get("ship_state_v2").await.unwrap().as_deref(),
            Some(r#"{"ships":{}}"#)
        );
    }

    #[tokio::test]
    async fn test_read_replaces_corrupt_blob() {
        let (store, backend, _) = setup();
        assert_ok!(backend.set("ship_state_v2", "{not json".into()).await);
        let snapshot = store.read().await.unwrap();
        assert!(snapshot.ships.is_empty());
        assert_eq!(
            backend.get("ship_state_v2").await.unwrap().as_deref(),
            Some(r#"{"ships":{}}"#)
        );
    }

    #[tokio::test]
    async fn test_ensure_creates_ship_at_sector_center() {
        let (store, _, _) = setup();
        let ship = store.ensure("p1").await.unwrap();
        let hex = store.catalog().by_label(&ship.sector).unwrap();
        assert_eq!(ship.position(), hex.center);
        assert!(ship.movement.is_none());
        assert_eq!(ship.updated_at, 1_000.0);

        let again = store.ensure("p1").await.unwrap();
        assert_eq!(again, ship);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_ship() {
        let (store, _, _) = setup();
        assert!(store.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_ship_is_pruned() {
        let (store, _, clock) = setup();
        assert_ok!(store.place("old", 0.0, 0.0, "A-1").await);
        clock.advance(200.0);
        assert_ok!(store.place("fresh", 0.0, 0.0, "A-1").await);

        clock.advance(150.0);
        let fleet = store.list_all().await.unwrap();
        let ids: Vec<&str> = fleet.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh"]);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_and_advance_to_arrival() {
        let (store, _, clock) = setup();
        let target = store.catalog().by_label("A-3").unwrap().center;
        assert_ok!(store.place("p1", 0.0, 0.0, "A-1").await);
        assert_ok!(
            store
                .commit_movement("p1", 0.0, 0.0, "A-1", target.x, target.y, "A-3")
                .await
        );

        let ship = store.get("p1").await.unwrap().unwrap();
        let movement = ship.movement.clone().unwrap();
        let distance = target.x;
        assert_approx_eq!(movement.remaining, distance, 1e-9);
        assert_approx_eq!(movement.end_time - movement.start_time, distance / 220.0, 1e-9);
        assert!(store.is_moving("p1").await.unwrap());

        let public = store.list_all().await.unwrap();
        assert_eq!(public[0].target_sector.as_deref(), Some("A-3"));

        let delta = distance / 220.0 + 0.01;
        clock.advance(delta);
        let crossings = store.advance_all(delta).await.unwrap();
        let sectors: Vec<&str> = crossings.iter().map(|c| c.sector.as_str()).collect();
        assert_eq!(sectors, vec!["A-2", "A-3"]);

        let ship = store.get("p1").await.unwrap().unwrap();
        assert!(ship.movement.is_none());
        assert_eq!(ship.sector, "A-3");
        assert_eq!(ship.position(), target);
        assert!(!store.is_moving("p1").await.unwrap());
        assert!(!store.list_all().await.unwrap()[0].is_moving());
    }

    #[tokio::test]
    async fn test_advance_in_small_ticks() {
        let (store, _, clock) = setup();
        let target = store.catalog().by_label("A-2").unwrap().center;
        assert_ok!(store.place("p1", 0.0, 0.0, "A-1").await);
        assert_ok!(
            store
                .commit_movement("p1", 0.0, 0.0, "A-1", target.x, target.y, "A-2")
                .await
        );

        let mut crossings = Vec::new();
        for _ in 0..20 {
            clock.advance(0.05);
            crossings.extend(store.advance_all(0.05).await.unwrap());
        }
        assert_eq!(crossings.len(), 1);
        let ship = store.get("p1").await.unwrap().unwrap();
        assert_eq!(ship.sector, "A-2");
        assert!(ship.movement.is_none());
    }

    #[tokio::test]
    async fn test_zero_length_commit_is_noop() {
        let (store, _, _) = setup();
        assert_ok!(store.place("p1", 5.0, 5.0, "A-1").await);
        assert_ok!(
            store
                .commit_movement("p1", 5.0, 5.0, "A-1", 5.0, 5.0, "A-1")
                .await
        );
        assert!(store.get("p1").await.unwrap().unwrap().movement.is_none());
    }

    #[tokio::test]
    async fn test_advance_without_movers_does_not_write() {
        let (store, backend, _) = setup();
        assert_ok!(store.place("p1", 0.0, 0.0, "A-1").await);
        let before = backend.get("ship_state_v2").await.unwrap();
        assert!(store.advance_all(1.0).await.unwrap().is_empty());
        assert_eq!(backend.get("ship_state_v2").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_store_unavailable_surfaces() {
        let (store, backend, _) = setup();
        backend.set_store_offline(true);
        let err = store.list_all().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unavailable);
    }
}
