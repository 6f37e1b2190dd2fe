use super::{BackendError, BackendResult, EventChannel, IntentQueue, KeyValueStore};
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::{timeout_at, Instant};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    values: Mutex<HashMap<String, Entry>>,
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    queue_ready: Notify,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    store_offline: AtomicBool,
    queue_offline: AtomicBool,
}

/// In-process implementation of every backend trait.
///
/// Cloning yields another handle to the same state, so one instance can stand
/// in for the shared store across components. The hub process serves one of
/// these over TCP.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to `channel`. Messages published before this call are not seen.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        let mut channels = lock(&self.inner.channels);
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn queue_len(&self, topic: &str) -> usize {
        lock(&self.inner.queues).get(topic).map_or(0, VecDeque::len)
    }

    /// Makes key-value operations fail until cleared.
    pub fn set_store_offline(&self, offline: bool) {
        self.inner.store_offline.store(offline, Ordering::SeqCst);
    }

    /// Makes queue operations fail until cleared.
    pub fn set_queue_offline(&self, offline: bool) {
        self.inner.queue_offline.store(offline, Ordering::SeqCst);
    }

    fn check_store(&self) -> BackendResult<()> {
        if self.inner.store_offline.load(Ordering::SeqCst) {
            return Err(BackendError::Closed);
        }
        Ok(())
    }

    fn check_queue(&self) -> BackendResult<()> {
        if self.inner.queue_offline.load(Ordering::SeqCst) {
            return Err(BackendError::Closed);
        }
        Ok(())
    }

    fn try_pop(&self, topic: &str) -> Option<String> {
        lock(&self.inner.queues)
            .get_mut(topic)
            .and_then(VecDeque::pop_front)
    }
}

impl KeyValueStore for MemoryBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        self.check_store()?;
        let now = Instant::now();
        let mut values = lock(&self.inner.values);
        match values.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String) -> BackendResult<()> {
        self.check_store()?;
        lock(&self.inner.values).insert(
            key.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> BackendResult<bool> {
        self.check_store()?;
        let now = Instant::now();
        let mut values = lock(&self.inner.values);
        if values.get(key).map_or(false, |entry| entry.is_live(now)) {
            return Ok(false);
        }
        values.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        self.check_store()?;
        lock(&self.inner.values).remove(key);
        Ok(())
    }
}

impl IntentQueue for MemoryBackend {
    async fn push(&self, topic: &str, payload: String) -> BackendResult<()> {
        self.check_queue()?;
        lock(&self.inner.queues)
            .entry(topic.to_string())
            .or_default()
            .push_back(payload);
        self.inner.queue_ready.notify_waiters();
        self.inner.queue_ready.notify_one();
        Ok(())
    }

    async fn pop(&self, topic: &str, wait: Duration) -> BackendResult<Option<String>> {
        self.check_queue()?;
        let deadline = Instant::now() + wait;
        loop {
            if let Some(payload) = self.try_pop(topic) {
                return Ok(Some(payload));
            }
            if timeout_at(deadline, self.inner.queue_ready.notified())
                .await
                .is_err()
            {
                return Ok(self.try_pop(topic));
            }
        }
    }
}

impl EventChannel for MemoryBackend {
    async fn publish(&self, channel: &str, payload: String) -> BackendResult<()> {
        let sender = lock(&self.inner.channels).get(channel).cloned();
        match sender {
            Some(sender) => {
                if sender.send(payload).is_err() {
                    debug!("No subscribers on {}", channel);
                }
            }
            None => debug!("No subscribers on {}", channel),
        }
        Ok(())
    }
}
