use crate::backend::KeyValueStore;
use crate::error::SeaResult;
use log::debug;
use std::time::Duration;

const KEY_PREFIX: &str = "ship_pending:";

/// Per-ship lease that marks an intent as outstanding.
///
/// The lease expires on its own after `ttl`, so a worker that dies between
/// dequeue and release cannot block a ship forever.
#[derive(Debug, Clone)]
pub struct IntentLock<K> {
    kv: K,
    ttl: Duration,
}

impl<K: KeyValueStore> IntentLock<K> {
    pub fn new(kv: K, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub fn key_for(id: &str) -> String {
        format!("{}{}", KEY_PREFIX, id)
    }

    /// Returns false when an intent for `id` is already outstanding.
    pub async fn acquire(&self, id: &str) -> SeaResult<bool> {
        let acquired = self
            .kv
            .set_if_absent(&Self::key_for(id), "1".to_string(), self.ttl)
            .await?;
        debug!("Intent lock for {}: acquired={}", id, acquired);
        Ok(acquired)
    }

    pub async fn release(&self, id: &str) -> SeaResult<()> {
        self.kv.delete(&Self::key_for(id)).await?;
        Ok(())
    }
}
