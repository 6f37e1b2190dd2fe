//! JSON messages exchanged between the request handler, the worker and the relay.

use crate::grid::GridPayload;
use crate::ship::PublicShip;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("intent payload is not a JSON object")]
    NotAnObject,

    #[error("intent payload is missing playerId")]
    MissingPlayer,

    #[error("intent for {player_id} has a missing or non-numeric {field}")]
    BadCoordinate {
        player_id: String,
        field: &'static str,
    },
}

impl ProtocolError {
    /// Player named by the rejected payload, if it named one.
    pub fn player_id(&self) -> Option<&str> {
        match self {
            ProtocolError::BadCoordinate { player_id, .. } => Some(player_id),
            _ => None,
        }
    }
}

/// A movement request waiting in the queue between validation and commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveIntent {
    pub player_id: String,
    pub x: f64,
    pub y: f64,
}

impl MoveIntent {
    pub fn new(player_id: &str, x: f64, y: f64) -> Self {
        Self {
            player_id: player_id.to_string(),
            x,
            y,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a dequeued payload. Coordinates may be JSON numbers or numeric strings.
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(payload).map_err(|_| ProtocolError::NotAnObject)?;
        let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;

        let player_id = match object.get("playerId") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(ProtocolError::MissingPlayer),
        };

        let coordinate = |field: &'static str| -> Result<f64, ProtocolError> {
            let parsed = match object.get(field) {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            parsed
                .filter(|v| v.is_finite())
                .ok_or_else(|| ProtocolError::BadCoordinate {
                    player_id: player_id.clone(),
                    field,
                })
        };

        let x = coordinate("x")?;
        let y = coordinate("y")?;
        Ok(MoveIntent { player_id, x, y })
    }
}

/// Events published on the fan-out channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FleetEvent {
    #[serde(rename = "fleet:update")]
    FleetUpdate { ships: Vec<PublicShip> },
    #[serde(rename = "sector:update", rename_all = "camelCase")]
    SectorUpdate { player_id: String, sector: String },
}

impl FleetEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Commands a connected client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientCommand {
    Sync {
        #[serde(default, rename = "playerId")]
        player_id: Option<String>,
    },
    Hello {
        #[serde(default, rename = "playerId")]
        player_id: Option<String>,
    },
    Move {
        #[serde(rename = "playerId")]
        player_id: String,
        x: f64,
        y: f64,
    },
}

impl ClientCommand {
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementInfo {
    pub speed: f64,
}

/// Replies to [`ClientCommand`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerReply {
    #[serde(rename = "sync", rename_all = "camelCase")]
    Sync {
        player_id: String,
        grid: GridPayload,
        ship: PublicShip,
        ships: Vec<PublicShip>,
        current_sector: String,
        movement: MovementInfo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assigned_new_id: Option<bool>,
    },
    #[serde(rename = "move:queued")]
    MoveQueued,
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerReply {
    pub fn error(message: impl Into<String>) -> Self {
        ServerReply::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_parse_valid() {
        let intent = MoveIntent::parse(r#"{"playerId":"p1","x":10.5,"y":-3}"#).unwrap();
        assert_eq!(intent, MoveIntent::new("p1", 10.5, -3.0));
    }

    #[test]
    fn test_intent_parse_numeric_strings() {
        let intent = MoveIntent::parse(r#"{"playerId":"p1","x":"12","y":" 4.5 "}"#).unwrap();
        assert_eq!(intent, MoveIntent::new("p1", 12.0, 4.5));
    }

    #[test]
    fn test_intent_round_trip_through_queue_format() {
        let intent = MoveIntent::new("abc", 1.25, 2.5);
        let json = intent.to_json().unwrap();
        assert_eq!(json, r#"{"playerId":"abc","x":1.25,"y":2.5}"#);
        assert_eq!(MoveIntent::parse(&json).unwrap(), intent);
    }

    #[test]
    fn test_intent_parse_malformed() {
        assert_eq!(MoveIntent::parse("nope"), Err(ProtocolError::NotAnObject));
        assert_eq!(MoveIntent::parse("[1,2]"), Err(ProtocolError::NotAnObject));
        assert_eq!(
            MoveIntent::parse(r#"{"x":1,"y":2}"#),
            Err(ProtocolError::MissingPlayer)
        );

        let err = MoveIntent::parse(r#"{"playerId":"p9","x":"east","y":2}"#).unwrap_err();
        assert_eq!(err.player_id(), Some("p9"));
        let err = MoveIntent::parse(r#"{"playerId":"p9","x":1}"#).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::BadCoordinate {
                player_id: "p9".into(),
                field: "y"
            }
        );
    }

    #[test]
    fn test_fleet_event_wire_format() {
        let event = FleetEvent::SectorUpdate {
            player_id: "p1".into(),
            sector: "B-2".into(),
        };
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "sector:update");
        assert_eq!(value["playerId"], "p1");
        assert_eq!(value["sector"], "B-2");

        let fleet = FleetEvent::FleetUpdate { ships: vec![] };
        let value: Value = serde_json::from_str(&fleet.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "fleet:update");
        assert!(value["ships"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_client_command_dispatch_tags() {
        assert_eq!(
            ClientCommand::from_json(r#"{"type":"sync"}"#).unwrap(),
            ClientCommand::Sync { player_id: None }
        );
        assert_eq!(
            ClientCommand::from_json(r#"{"type":"hello","playerId":"p1"}"#).unwrap(),
            ClientCommand::Hello {
                player_id: Some("p1".into())
            }
        );
        assert_eq!(
            ClientCommand::from_json(r#"{"type":"move","playerId":"p1","x":1,"y":2}"#).unwrap(),
            ClientCommand::Move {
                player_id: "p1".into(),
                x: 1.0,
                y: 2.0
            }
        );
        assert!(ClientCommand::from_json(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientCommand::from_json(r#"{"type":"move","playerId":"p1"}"#).is_err());
    }

    #[test]
    fn test_server_reply_wire_format() {
        let queued: Value = serde_json::from_str(&ServerReply::MoveQueued.to_json().unwrap()).unwrap();
        assert_eq!(queued["type"], "move:queued");

        let error: Value =
            serde_json::from_str(&ServerReply::error("nope").to_json().unwrap()).unwrap();
        assert_eq!(error["type"], "error");
        assert_eq!(error["message"], "nope");
    }
}
