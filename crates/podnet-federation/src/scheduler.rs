//! Federation scheduler
//!
//! Owns the periodic timer that triggers rounds. The timer task ticks every
//! interval (first tick one interval after activation) and skips a tick
//! when the previous round is still in flight. [`FederationScheduler::force_send`]
//! runs a round immediately and waits for any round in flight first.
//!
//! Round outcomes are published on a broadcast channel; see
//! [`FederationScheduler::subscribe`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use podnet_core::{ContentStore, ItemId, PodStore, PodTransport, PoolRequestStore, RequestKind};

use crate::config::FederationConfig;
use crate::dispatcher::{BatchDispatcher, RoundReport};
use crate::error::{FederationError, FederationResult};
use crate::queue::{ChangeQueue, EnqueueOutcome};
use crate::registry::PeerRegistry;
use crate::reputation::ReputationManager;

/// Events published by the scheduler
#[derive(Debug, Clone)]
pub enum FederationEvent {
    /// A round ran to completion (possibly with nothing to send)
    RoundCompleted(RoundReport),
    /// A timer tick found a round in flight and did nothing
    RoundSkipped,
    /// A round failed before broadcasting
    RoundFailed(String),
    /// The timer stopped after an invariant violation
    TimerStopped(String),
}

struct TimerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Periodic driver of federation rounds
pub struct FederationScheduler {
    queue: Arc<ChangeQueue>,
    registry: PeerRegistry,
    dispatcher: Arc<BatchDispatcher>,
    interval: Duration,
    events: broadcast::Sender<FederationEvent>,
    timer: Mutex<Option<TimerHandle>>,
}

impl FederationScheduler {
    /// Wire the federation core over its stores and transport
    pub fn new(
        config: FederationConfig,
        requests: Arc<dyn PoolRequestStore>,
        pods: Arc<dyn PodStore>,
        content: Arc<dyn ContentStore>,
        transport: Arc<dyn PodTransport>,
    ) -> FederationResult<Self> {
        config.validate()?;

        let queue = Arc::new(ChangeQueue::new(requests, config.conflict_policy));
        let registry = PeerRegistry::new(pods);
        let reputation = Arc::new(ReputationManager::new(
            registry.clone(),
            content,
            config.score,
            config.eviction_rule,
        ));
        let dispatcher = Arc::new(
            BatchDispatcher::new(
                queue.clone(),
                registry.clone(),
                reputation,
                transport,
                config.api_version.clone(),
            )
            .with_send_timeout(config.send_timeout),
        );
        let (events, _) = broadcast::channel(config.event_channel_capacity);

        Ok(Self {
            queue,
            registry,
            dispatcher,
            interval: config.interval,
            events,
            timer: Mutex::new(None),
        })
    }

    /// The change queue
    pub fn queue(&self) -> &Arc<ChangeQueue> {
        &self.queue
    }

    /// The peer registry
    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// The dispatcher
    pub fn dispatcher(&self) -> &Arc<BatchDispatcher> {
        &self.dispatcher
    }

    /// Subscribe to round events
    pub fn subscribe(&self) -> broadcast::Receiver<FederationEvent> {
        self.events.subscribe()
    }

    /// Queue a change for the next round
    pub async fn enqueue(
        &self,
        item_id: impl Into<ItemId>,
        kind: RequestKind,
        payload: impl Into<Bytes>,
    ) -> FederationResult<EnqueueOutcome> {
        self.queue.enqueue(item_id, kind, payload).await
    }

    /// Start the periodic timer
    ///
    /// # Errors
    ///
    /// Returns [`FederationError::AlreadyActive`] if the timer is running.
    pub async fn activate(&self) -> FederationResult<()> {
        let mut timer = self.timer.lock().await;
        if timer.as_ref().is_some_and(|t| !t.task.is_finished()) {
            warn!("Pool requests timer already active");
            return Err(FederationError::AlreadyActive);
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_timer(
            self.dispatcher.clone(),
            self.interval,
            cancel.clone(),
            self.events.clone(),
        ));
        *timer = Some(TimerHandle { cancel, task });

        info!(interval_ms = self.interval.as_millis() as u64, "Pool requests timer activated");
        Ok(())
    }

    /// Stop the periodic timer
    ///
    /// A round in flight is allowed to finish. Does nothing when inactive.
    pub async fn deactivate(&self) {
        let Some(handle) = self.timer.lock().await.take() else {
            return;
        };

        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            error!(error = %e, "Pool requests timer task panicked");
        }
        info!("Pool requests timer deactivated");
    }

    /// Whether the timer is running
    pub async fn is_active(&self) -> bool {
        self.timer
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.task.is_finished())
    }

    /// Run a round now, waiting for any round in flight to finish first
    pub async fn force_send(&self) -> FederationResult<RoundReport> {
        info!("Force pool requests sending");
        match self.dispatcher.run_round().await {
            Ok(report) => {
                let _ = self.events.send(FederationEvent::RoundCompleted(report.clone()));
                Ok(report)
            }
            Err(e) => {
                let _ = self.events.send(FederationEvent::RoundFailed(e.to_string()));
                Err(e)
            }
        }
    }
}

impl Drop for FederationScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.cancel.cancel();
        }
    }
}

/// Timer loop: one round attempt per tick until cancelled
async fn run_timer(
    dispatcher: Arc<BatchDispatcher>,
    period: Duration,
    cancel: CancellationToken,
    events: broadcast::Sender<FederationEvent>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Pool requests timer shutting down");
                break;
            }
            _ = ticker.tick() => {
                match dispatcher.try_run_round().await {
                    Ok(Some(report)) => {
                        let _ = events.send(FederationEvent::RoundCompleted(report));
                    }
                    Ok(None) => {
                        let _ = events.send(FederationEvent::RoundSkipped);
                    }
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "Stopping pool requests timer");
                        let _ = events.send(FederationEvent::TimerStopped(e.to_string()));
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Pool requests round failed");
                        let _ = events.send(FederationEvent::RoundFailed(e.to_string()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podnet_core::{MockPodTransport, Pod};
    use podnet_storage::InMemoryFederationStore;

    async fn scheduler(interval: Duration) -> (Arc<MockPodTransport>, FederationScheduler) {
        let store = Arc::new(InMemoryFederationStore::new());
        PodStore::upsert(store.as_ref(), Pod::new("a", "https://a.example", "key"))
            .await
            .unwrap();
        let transport = Arc::new(MockPodTransport::new());
        let scheduler = FederationScheduler::new(
            FederationConfig::default().with_interval(interval),
            store.clone(),
            store.clone(),
            store,
            transport.clone(),
        )
        .unwrap();
        (transport, scheduler)
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let store = Arc::new(InMemoryFederationStore::new());
        let result = FederationScheduler::new(
            FederationConfig::default().with_interval(Duration::ZERO),
            store.clone(),
            store.clone(),
            store,
            Arc::new(MockPodTransport::new()),
        );
        assert!(matches!(result, Err(FederationError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_activate_fails() {
        let (_, scheduler) = scheduler(Duration::from_secs(10)).await;
        scheduler.activate().await.unwrap();
        assert!(matches!(
            scheduler.activate().await,
            Err(FederationError::AlreadyActive)
        ));
        assert!(scheduler.is_active().await);

        scheduler.deactivate().await;
        assert!(!scheduler.is_active().await);

        // Deactivating twice is harmless, and the timer can be restarted
        scheduler.deactivate().await;
        scheduler.activate().await.unwrap();
        scheduler.deactivate().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let (transport, scheduler) = scheduler(Duration::from_secs(10)).await;
        let mut events = scheduler.subscribe();
        scheduler.enqueue("v1", RequestKind::Add, &b"x"[..]).await.unwrap();
        scheduler.activate().await.unwrap();

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(transport.deliveries().await.is_empty());

        match events.recv().await.unwrap() {
            FederationEvent::RoundCompleted(report) => assert_eq!(report.requests_sent(), 1),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(transport.deliveries().await.len(), 1);
        scheduler.deactivate().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_send_runs_immediately() {
        let (transport, scheduler) = scheduler(Duration::from_secs(3600)).await;
        scheduler.enqueue("v1", RequestKind::Remove, &b"x"[..]).await.unwrap();

        let report = scheduler.force_send().await.unwrap();
        assert_eq!(report.requests_sent(), 1);
        assert_eq!(transport.deliveries().await.len(), 1);
        assert_eq!(scheduler.queue().pending_count().await.unwrap(), 0);
    }
}
