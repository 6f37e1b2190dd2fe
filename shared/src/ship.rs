use crate::hex::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// In-flight movement of a ship. Present only while the ship travels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub dir_x: f64,
    pub dir_y: f64,
    pub speed: f64,
    /// Distance left to the target, never negative.
    pub remaining: f64,
    pub traveled: f64,
    /// Cumulative distance at each waypoint; `thresholds[0] == 0`.
    pub thresholds: Vec<f64>,
    /// Sector label at each waypoint; the last one is the target sector.
    pub labels: Vec<String>,
    /// First waypoint not yet reached.
    pub next_index: usize,
    pub start: Point,
    pub target: Point,
    pub start_time: f64,
    pub end_time: f64,
    pub target_sector: String,
}

impl Movement {
    pub fn final_label(&self) -> Option<&str> {
        self.labels.last().map(String::as_str)
    }
}

/// Authoritative state of one ship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipState {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub sector: String,
    /// Seconds since the Unix epoch of the last change.
    pub updated_at: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement: Option<Movement>,
}

impl ShipState {
    pub fn stationary(id: &str, x: f64, y: f64, sector: &str, now: f64) -> Self {
        Self {
            id: id.to_string(),
            x,
            y,
            sector: sector.to_string(),
            updated_at: now,
            movement: None,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// True while a committed movement is scheduled to still be under way at `now`.
    pub fn is_travelling(&self, now: f64) -> bool {
        self.movement
            .as_ref()
            .map_or(false, |movement| movement.end_time > now)
    }

    pub fn is_expired(&self, now: f64, session_ttl: f64) -> bool {
        now - self.updated_at > session_ttl
    }

    pub fn to_public(&self) -> PublicShip {
        let mut public = PublicShip {
            id: self.id.clone(),
            x: self.x,
            y: self.y,
            sector: self.sector.clone(),
            start: None,
            target: None,
            start_time: None,
            end_time: None,
            target_sector: None,
        };
        if let Some(movement) = &self.movement {
            public.start = Some(movement.start);
            public.target = Some(movement.target);
            public.start_time = Some(movement.start_time);
            public.end_time = Some(movement.end_time);
            public.target_sector = Some(movement.target_sector.clone());
        }
        public
    }
}

/// Client-facing view of a ship; travel fields appear only while moving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicShip {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub sector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_sector: Option<String>,
}

impl PublicShip {
    pub fn is_moving(&self) -> bool {
        self.target.is_some()
    }
}

/// Every ship at one instant. Stored and replaced as a single blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub ships: BTreeMap<String, ShipState>,
}

impl Snapshot {
    pub fn from_json(blob: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(blob)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Removes every ship idle for longer than `session_ttl` seconds.
    /// Returns the number of ships removed.
    pub fn prune_expired(&mut self, now: f64, session_ttl: f64) -> usize {
        let before = self.ships.len();
        self.ships.retain(|_, ship| !ship.is_expired(now, session_ttl));
        before - self.ships.len()
    }

    pub fn public_ships(&self) -> Vec<PublicShip> {
        self.ships.values().map(ShipState::to_public).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn travelling_ship(now: f64) -> ShipState {
        let mut ship = ShipState::stationary("s1", 0.0, 0.0, "A-1", now);
        ship.movement = Some(Movement {
            dir_x: 1.0,
            dir_y: 0.0,
            speed: 220.0,
            remaining: 100.0,
            traveled: 0.0,
            thresholds: vec![0.0, 100.0],
            labels: vec!["A-1".into(), "A-2".into()],
            next_index: 1,
            start: Point::new(0.0, 0.0),
            target: Point::new(100.0, 0.0),
            start_time: now,
            end_time: now + 100.0 / 220.0,
            target_sector: "A-2".into(),
        });
        ship
    }

    #[test]
    fn test_stationary_public_view_has_no_travel_fields() {
        let ship = ShipState::stationary("s1", 1.0, 2.0, "B-2", 10.0);
        let json = serde_json::to_value(ship.to_public()).unwrap();
        assert_eq!(json["id"], "s1");
        assert_eq!(json["sector"], "B-2");
        assert!(json.get("target").is_none());
        assert!(json.get("startTime").is_none());
    }

    #[test]
    fn test_travelling_public_view() {
        let ship = travelling_ship(10.0);
        let public = ship.to_public();
        assert!(public.is_moving());
        assert_eq!(public.target, Some(Point::new(100.0, 0.0)));
        assert_eq!(public.target_sector.as_deref(), Some("A-2"));

        let json = serde_json::to_value(&public).unwrap();
        assert_eq!(json["target"]["x"], 100.0);
        assert_eq!(json["startTime"], 10.0);
    }

    #[test]
    fn test_is_travelling_depends_on_end_time() {
        let ship = travelling_ship(10.0);
        assert!(ship.is_travelling(10.1));
        assert!(!ship.is_travelling(20.0));
        assert!(!ShipState::stationary("s2", 0.0, 0.0, "A-1", 0.0).is_travelling(0.0));
    }

    #[test]
    fn test_prune_expired() {
        let mut snapshot = Snapshot::default();
        snapshot
            .ships
            .insert("old".into(), ShipState::stationary("old", 0.0, 0.0, "A-1", 0.0));
        snapshot
            .ships
            .insert("new".into(), ShipState::stationary("new", 0.0, 0.0, "A-1", 250.0));

        assert_eq!(snapshot.prune_expired(301.0, 300.0), 1);
        assert!(snapshot.ships.contains_key("new"));
        assert!(!snapshot.ships.contains_key("old"));
        assert_eq!(snapshot.prune_expired(301.0, 300.0), 0);
    }

    #[test]
    fn test_snapshot_json_layout() {
        let mut snapshot = Snapshot::default();
        snapshot.ships.insert("s1".into(), travelling_ship(5.0));
        let blob = snapshot.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(value["ships"]["s1"]["movement"]["nextIndex"], 1);
        assert_eq!(value["ships"]["s1"]["updatedAt"], 5.0);
        assert_eq!(Snapshot::from_json(&blob).unwrap(), snapshot);
    }

    #[test]
    fn test_malformed_blob_is_rejected() {
        assert!(Snapshot::from_json("{\"ships\": 3}").is_err());
        assert!(Snapshot::from_json("garbage").is_err());
    }
}
