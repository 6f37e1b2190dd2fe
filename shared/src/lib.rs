//! # Shared Sea Model
//!
//! Pure types and math used by every process: the request handler, the
//! worker and the relay. Nothing in this crate performs I/O besides reading
//! an optional configuration file.
//!
//! - [`hex`]: axial/cube coordinates, plane layout, line walking
//! - [`grid`]: the fixed sector catalog built from configuration
//! - [`ship`]: authoritative ship state and the whole-fleet snapshot
//! - [`protocol`]: queue messages, published events and client commands
//! - [`config`]: the process configuration value

pub mod config;
pub mod grid;
pub mod hex;
pub mod protocol;
pub mod ship;

pub use config::{ConfigError, SeaConfig};
pub use grid::{GridCatalog, GridPayload, Hex};
pub use hex::{axial_round, cube_distance, hex_line, Axial, Cube, HexLayout, Point};
pub use protocol::{ClientCommand, FleetEvent, MoveIntent, MovementInfo, ProtocolError, ServerReply};
pub use ship::{Movement, PublicShip, ShipState, Snapshot};
