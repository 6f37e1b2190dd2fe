use crate::backend::EventChannel;
use crate::error::SeaResult;
use log::debug;
use shared::{FleetEvent, PublicShip};

/// Serializes fleet events and publishes them on one channel.
/// Delivery is at-most-once; nothing is retried.
#[derive(Debug, Clone)]
pub struct EventPublisher<P> {
    channel: P,
    name: String,
}

impl<P: EventChannel> EventPublisher<P> {
    pub fn new(channel: P, name: impl Into<String>) -> Self {
        Self {
            channel,
            name: name.into(),
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.name
    }

    pub async fn publish_fleet_update(&self, ships: &[PublicShip]) -> SeaResult<()> {
        self.publish(&FleetEvent::FleetUpdate {
            ships: ships.to_vec(),
        })
        .await
    }

    pub async fn publish_sector_change(&self, player_id: &str, sector: &str) -> SeaResult<()> {
        debug!("Ship {} entered {}", player_id, sector);
        self.publish(&FleetEvent::SectorUpdate {
            player_id: player_id.to_string(),
            sector: sector.to_string(),
        })
        .await
    }

    async fn publish(&self, event: &FleetEvent) -> SeaResult<()> {
        self.channel.publish(&self.name, event.to_json()?).await?;
        Ok(())
    }
}
