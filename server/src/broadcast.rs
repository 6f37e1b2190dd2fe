use crate::backend::{EventChannel, KeyValueStore};
use crate::clock::Clock;
use crate::error::SeaResult;
use crate::publisher::EventPublisher;
use crate::store::SnapshotStore;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Shortest allowed interval between fleet broadcasts.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// What one broadcaster tick sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fleet_published: bool,
    pub ships: usize,
    pub sector_changes: usize,
}

/// Rate-limited publisher of whole-fleet snapshots.
///
/// Also diffs each ship's sector against the previous broadcast, so sector
/// changes missed by the movement events still reach subscribers.
#[derive(Debug)]
pub struct FleetBroadcaster<K, C, P> {
    store: SnapshotStore<K, C>,
    publisher: EventPublisher<P>,
    interval: f64,
    last_broadcast: Option<f64>,
    last_sectors: HashMap<String, String>,
}

impl<K, C, P> FleetBroadcaster<K, C, P>
where
    K: KeyValueStore,
    C: Clock,
    P: EventChannel,
{
    pub fn new(store: SnapshotStore<K, C>, publisher: EventPublisher<P>, interval: Duration) -> Self {
        Self {
            store,
            publisher,
            interval: interval.max(MIN_INTERVAL).as_secs_f64(),
            last_broadcast: None,
            last_sectors: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval)
    }

    pub fn is_due(&self, now: f64) -> bool {
        self.last_broadcast
            .map_or(true, |last| now - last >= self.interval)
    }

    pub async fn tick(&mut self) -> SeaResult<TickReport> {
        let now = self.store.now();
        if !self.is_due(now) {
            return Ok(TickReport::default());
        }

        let fleet = self.store.list_all().await?;
        self.publisher.publish_fleet_update(&fleet).await?;

        let mut sector_changes = 0;
        for ship in &fleet {
            let changed = self
                .last_sectors
                .get(&ship.id)
                .map_or(false, |previous| previous != &ship.sector);
            if changed {
                // A failed publish leaves the old sector cached so the next tick retries.
                self.publisher
                    .publish_sector_change(&ship.id, &ship.sector)
                    .await?;
                sector_changes += 1;
            }
            self.last_sectors.insert(ship.id.clone(), ship.sector.clone());
        }

        let live: HashSet<&str> = fleet.iter().map(|ship| ship.id.as_str()).collect();
        self.last_sectors.retain(|id, _| live.contains(id.as_str()));
        self.last_broadcast = Some(now);

        debug!(
            "Broadcast fleet of {} ships, {} sector changes",
            fleet.len(),
            sector_changes
        );
        Ok(TickReport {
            fleet_published: true,
            ships: fleet.len(),
            sector_changes,
        })
    }
}
