//! Seams to the external services the processes share state through.
//!
//! The three traits mirror what the worker and the request handler need from
//! the outside world: a key-value store with an atomic set-if-absent, a work
//! queue with a bounded-wait pop, and a pub/sub channel. [`MemoryBackend`]
//! implements all three in-process; [`crate::hub::HubClient`] implements them
//! over the network.

mod memory;

pub use memory::MemoryBackend;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("connection to backend failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode backend frame: {0}")]
    Codec(#[from] bincode::Error),

    #[error("backend connection closed")]
    Closed,

    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),

    #[error("unexpected backend response: {0}")]
    Protocol(String),

    #[error("backend rejected request: {0}")]
    Rejected(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// String key-value store with per-key expiry.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> BackendResult<Option<String>>;

    async fn set(&self, key: &str, value: String) -> BackendResult<()>;

    /// Atomically stores `value` with a time-to-live only if `key` is absent.
    /// Returns whether the value was stored.
    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration)
        -> BackendResult<bool>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> BackendResult<()>;
}

/// Durable FIFO work queue, one per topic.
#[allow(async_fn_in_trait)]
pub trait IntentQueue {
    async fn push(&self, topic: &str, payload: String) -> BackendResult<()>;

    /// Waits at most `wait` for a message.
    async fn pop(&self, topic: &str, wait: Duration) -> BackendResult<Option<String>>;
}

/// Fire-and-forget publication to a named channel.
#[allow(async_fn_in_trait)]
pub trait EventChannel {
    async fn publish(&self, channel: &str, payload: String) -> BackendResult<()>;
}
