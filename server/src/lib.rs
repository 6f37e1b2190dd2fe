//! # Sea State Server Library
//!
//! Authoritative ship movement for the hex-sector sea. This crate holds
//! everything that reads or writes the shared external state: the fleet
//! snapshot, the intent queue and the event channel.
//!
//! ## Processes
//!
//! ### Request Handler
//! Stateless per call and freely replicated. It answers client commands
//! through [`pipeline::ShipService`], validating movement requests and
//! taking the ship's intent lock before queueing the intent. It only ever
//! creates missing ships; it never writes movement fields.
//!
//! ### Worker
//! The single writer of movement state. [`worker::Worker`] loops over
//! advancing every ship by elapsed wall time, committing at most one
//! dequeued intent, and running the rate-limited fleet broadcaster. Because
//! there is exactly one writer, the whole-blob read-modify-write of the
//! snapshot cannot lose movement updates.
//!
//! ### Hub
//! [`hub::HubServer`] serves an in-memory key-value store, work queue and
//! pub/sub channel over TCP so the processes above can run apart.
//!
//! ## Module Organization
//!
//! - [`backend`]: traits for the external collaborators, plus [`backend::MemoryBackend`]
//! - [`hub`]: the TCP broker and its client
//! - [`store`]: the snapshot blob and per-ship lifecycle
//! - [`movement`]: path planning and per-tick advancement
//! - [`lock`]: per-ship intent lease
//! - [`pipeline`]: the two-phase move pipeline and the state query
//! - [`commands`]: dispatch of client commands to replies
//! - [`publisher`], [`broadcast`]: event fan-out and its scheduler
//! - [`clock`], [`error`]: time source and error taxonomy
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::backend::MemoryBackend;
//! use server::clock::SystemClock;
//! use server::pipeline::ShipService;
//! use server::store::SnapshotStore;
//! use server::worker::Worker;
//! use shared::{GridCatalog, SeaConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SeaConfig::default();
//!     let backend = MemoryBackend::new();
//!     let catalog = Arc::new(GridCatalog::from_config(&config.grid));
//!     let store = SnapshotStore::new(backend.clone(), SystemClock, catalog, &config);
//!     let service = ShipService::new(store, backend.clone(), backend.clone(), &config);
//!
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!     let worker = Worker::new(
//!         service.clone(),
//!         backend.clone(),
//!         backend,
//!         &config,
//!         Duration::from_millis(50),
//!     );
//!     tokio::spawn(worker.run(shutdown));
//!
//!     service.submit_move("player-1", 138.0, 0.0).await.ok();
//! }
//! ```

pub mod backend;
pub mod broadcast;
pub mod clock;
pub mod commands;
pub mod error;
pub mod hub;
pub mod lock;
pub mod movement;
pub mod pipeline;
pub mod publisher;
pub mod store;
pub mod worker;
