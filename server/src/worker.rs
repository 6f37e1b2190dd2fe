//! The single serialized writer of movement state.
//!
//! Each iteration advances every ship by the wall time elapsed since the last
//! one, processes at most one queued intent, then runs the broadcaster. A
//! failure in any step is logged and the loop carries on.

use crate::backend::{EventChannel, IntentQueue, KeyValueStore};
use crate::broadcast::{FleetBroadcaster, TickReport};
use crate::clock::Clock;
use crate::error::{SeaError, SeaResult};
use crate::pipeline::ShipService;
use crate::publisher::EventPublisher;
use log::{debug, error, info, warn};
use shared::{MoveIntent, SeaConfig};
use std::time::Duration;
use tokio::sync::watch;

/// Outcome of one worker iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub crossings: usize,
    pub intent_processed: bool,
    pub broadcast: TickReport,
}

pub struct Worker<K, Q, C, P> {
    service: ShipService<K, Q, C>,
    queue: Q,
    topic: String,
    publisher: EventPublisher<P>,
    broadcaster: FleetBroadcaster<K, C, P>,
    poll_wait: Duration,
    error_backoff: Duration,
    last_advance: Option<f64>,
}

impl<K, Q, C, P> Worker<K, Q, C, P>
where
    K: KeyValueStore + Clone,
    Q: IntentQueue + Clone,
    C: Clock + Clone,
    P: EventChannel + Clone,
{
    pub fn new(
        service: ShipService<K, Q, C>,
        queue: Q,
        channel: P,
        config: &SeaConfig,
        poll_wait: Duration,
    ) -> Self {
        let publisher = EventPublisher::new(channel, config.persistence.event_channel.clone());
        let broadcaster = FleetBroadcaster::new(
            service.store().clone(),
            publisher.clone(),
            config.fleet_interval(),
        );
        Self {
            service,
            queue,
            topic: config.queue.topic.clone(),
            publisher,
            broadcaster,
            poll_wait,
            error_backoff: Duration::from_millis(500),
            last_advance: None,
        }
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Runs one iteration. Only infrastructure failures of the queue pop are
    /// returned; everything else is logged.
    pub async fn step(&mut self) -> SeaResult<StepReport> {
        let mut report = StepReport {
            crossings: self.advance().await,
            ..StepReport::default()
        };

        match self.queue.pop(&self.topic, self.poll_wait).await {
            Ok(Some(payload)) => {
                self.handle_payload(&payload).await;
                report.intent_processed = true;
            }
            Ok(None) => {}
            Err(e) => {
                self.run_broadcaster(&mut report).await;
                return Err(SeaError::from(e));
            }
        }

        self.run_broadcaster(&mut report).await;
        Ok(report)
    }

    /// Loops until `shutdown` flips to true.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Worker consuming {} every {:?}, broadcasting every {:?}",
            self.topic,
            self.poll_wait,
            self.broadcaster.interval()
        );

        while !*shutdown.borrow() {
            tokio::select! {
                result = self.step() => {
                    if let Err(e) = result {
                        warn!("Intent queue unavailable: {}", e);
                        tokio::select! {
                            _ = tokio::time::sleep(self.error_backoff) => {}
                            changed = shutdown.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
                changed = shutdown.changed() => {
                    // Sender gone: nobody can ask us to stop any more.
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Worker stopped");
    }

    async fn advance(&mut self) -> usize {
        let now = self.service.store().now();
        let delta = self.last_advance.map_or(0.0, |last| (now - last).max(0.0));

        // On failure the clock is not consumed; the next step applies the whole gap.
        let crossings = match self.service.store().advance_all(delta).await {
            Ok(crossings) => crossings,
            Err(e) => {
                warn!("Failed to advance fleet: {}", e);
                return 0;
            }
        };
        self.last_advance = Some(now);

        for crossing in &crossings {
            if let Err(e) = self
                .publisher
                .publish_sector_change(&crossing.ship_id, &crossing.sector)
                .await
            {
                warn!("Failed to publish sector change for {}: {}", crossing.ship_id, e);
            }
        }
        crossings.len()
    }

    async fn handle_payload(&self, payload: &str) {
        let intent = match MoveIntent::parse(payload) {
            Ok(intent) => intent,
            Err(e) => {
                if let Some(player_id) = e.player_id() {
                    if let Err(release_err) = self.service.lock().release(player_id).await {
                        warn!("Failed to release intent lock for {}: {}", player_id, release_err);
                    }
                }
                warn!("Dropping intent: {}", SeaError::from(e));
                return;
            }
        };

        debug!("Processing move for {}", intent.player_id);
        if let Err(e) = self.service.process_intent(&intent).await {
            error!("Failed to process move for {}: {}", intent.player_id, e);
        }
    }

    async fn run_broadcaster(&mut self, report: &mut StepReport) {
        match self.broadcaster.tick().await {
            Ok(tick) => report.broadcast = tick,
            Err(e) => warn!("Fleet broadcast failed: {}", e),
        }
    }
}
