//! Batch dispatcher
//!
//! Runs one federation round: claim every pending request, split the claim
//! by kind, broadcast each non-empty partition to every known pod in
//! parallel, score the pods, then delete the sent requests.
//!
//! A pod counts as good only when it answers with a success status; any
//! transport error, timeout or other status makes it bad. Rounds never
//! overlap: [`BatchDispatcher::run_round`] waits for the round in flight,
//! [`BatchDispatcher::try_run_round`] gives up instead.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use podnet_core::{
    PodEndpoint, PodId, PodTransport, PoolRequest, RequestBatch, RequestKind, TransportError,
    is_success_status,
};

use crate::error::FederationResult;
use crate::queue::ChangeQueue;
use crate::registry::PeerRegistry;
use crate::reputation::{ReputationManager, ReputationReport};

/// Outcome of broadcasting one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    /// Kind of every request in the partition
    pub kind: RequestKind,
    /// Number of requests in the batch
    pub request_count: usize,
    /// Pods that accepted the batch
    pub good: Vec<PodId>,
    /// Pods that failed the batch
    pub bad: Vec<PodId>,
    /// Score updates and evictions that followed
    pub outcome: ReputationReport,
    /// Requests deleted from the queue afterwards
    pub removed: usize,
}

/// Outcome of one round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// One entry per non-empty partition, adds first
    pub partitions: Vec<PartitionReport>,
}

impl RoundReport {
    /// Whether the round had nothing to send
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Report for one kind, if that partition was sent
    pub fn partition(&self, kind: RequestKind) -> Option<&PartitionReport> {
        self.partitions.iter().find(|p| p.kind == kind)
    }

    /// Total requests sent across partitions
    pub fn requests_sent(&self) -> usize {
        self.partitions.iter().map(|p| p.request_count).sum()
    }
}

/// Broadcasts queued requests to every known pod
pub struct BatchDispatcher {
    queue: Arc<ChangeQueue>,
    registry: PeerRegistry,
    reputation: Arc<ReputationManager>,
    transport: Arc<dyn PodTransport>,
    api_version: String,
    send_timeout: Option<Duration>,
    /// Held for the whole of a round
    round_lock: Mutex<()>,
}

impl BatchDispatcher {
    /// Create a dispatcher
    pub fn new(
        queue: Arc<ChangeQueue>,
        registry: PeerRegistry,
        reputation: Arc<ReputationManager>,
        transport: Arc<dyn PodTransport>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            registry,
            reputation,
            transport,
            api_version: api_version.into(),
            send_timeout: None,
            round_lock: Mutex::new(()),
        }
    }

    /// Bound every pod send; a pod that does not answer in time is bad
    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Queue this dispatcher drains
    pub fn queue(&self) -> &Arc<ChangeQueue> {
        &self.queue
    }

    /// Run a round, waiting for any round already in flight
    pub async fn run_round(&self) -> FederationResult<RoundReport> {
        let _round = self.round_lock.lock().await;
        self.round().await
    }

    /// Run a round unless one is already in flight
    ///
    /// Returns `Ok(None)` without touching the queue when busy.
    pub async fn try_run_round(&self) -> FederationResult<Option<RoundReport>> {
        let Ok(_round) = self.round_lock.try_lock() else {
            debug!("Round already in flight, skipping");
            return Ok(None);
        };
        self.round().await.map(Some)
    }

    /// Whether a round is in flight
    pub fn is_busy(&self) -> bool {
        self.round_lock.try_lock().is_err()
    }

    #[instrument(skip(self), name = "federation_round")]
    async fn round(&self) -> FederationResult<RoundReport> {
        info!("Making pool requests to pods");

        // Under the round lock nothing claimed is still in flight
        self.queue.purge_claimed().await;

        let drained = self.queue.drain_all().await?;
        if drained.is_empty() {
            debug!("No pool requests to send");
            return Ok(RoundReport::default());
        }

        let (adds, removes) = tokio::join!(
            self.dispatch_partition(RequestKind::Add, &drained.adds),
            self.dispatch_partition(RequestKind::Remove, &drained.removes),
        );

        let report = RoundReport {
            partitions: adds.into_iter().chain(removes).collect(),
        };
        info!(sent = report.requests_sent(), "Pool requests round finished");
        Ok(report)
    }

    /// Broadcast one partition, score the pods, delete the sent requests
    async fn dispatch_partition(
        &self,
        kind: RequestKind,
        requests: &[PoolRequest],
    ) -> Option<PartitionReport> {
        if requests.is_empty() {
            return None;
        }

        let batch = RequestBatch::new(kind, &self.api_version, requests);
        let (good, bad) = match self.registry.endpoints().await {
            Ok(pods) => self.broadcast(&batch, &pods).await,
            Err(e) => {
                error!(%kind, error = %e, "Cannot list pods for pool requests");
                (Vec::new(), Vec::new())
            }
        };

        if !bad.is_empty() {
            warn!(%kind, failed = bad.len(), "Some errors while sending pool requests");
        }

        let outcome = self.reputation.apply_round_outcome(&good, &bad).await;

        let ids: Vec<_> = requests.iter().map(|r| r.request_id).collect();
        let removed = self.queue.remove(&ids).await;

        Some(PartitionReport {
            kind,
            request_count: batch.len(),
            good,
            bad,
            outcome,
            removed,
        })
    }

    /// Send a batch to every pod concurrently, splitting pods by outcome
    async fn broadcast(&self, batch: &RequestBatch, pods: &[PodEndpoint]) -> (Vec<PodId>, Vec<PodId>) {
        debug!(kind = %batch.kind, pods = pods.len(), requests = batch.len(), "Broadcasting batch");

        let results = join_all(pods.iter().map(|pod| async move {
            let result = self.send(pod, batch).await;
            (pod, result)
        }))
        .await;

        let mut good = Vec::new();
        let mut bad = Vec::new();
        for (pod, result) in results {
            match result {
                Ok(status) if is_success_status(status) => good.push(pod.id.clone()),
                Ok(status) => {
                    warn!(pod = %pod.url, status, "Pod rejected pool requests");
                    bad.push(pod.id.clone());
                }
                Err(e) => {
                    error!(pod = %pod.url, error = %e, "Error sending pool requests to pod");
                    bad.push(pod.id.clone());
                }
            }
        }
        (good, bad)
    }

    async fn send(&self, pod: &PodEndpoint, batch: &RequestBatch) -> Result<u16, TransportError> {
        match self.send_timeout {
            Some(limit) => tokio::time::timeout(limit, self.transport.send(pod, batch))
                .await
                .unwrap_or(Err(TransportError::Timeout(limit.as_millis() as u64))),
            None => self.transport.send(pod, batch).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConflictPolicy, EvictionRule, ScoreConfig};
    use podnet_core::{MockPodTransport, MockResponse, Pod, PodStore};
    use podnet_storage::{InMemoryFederationStore, StoreOperation};

    struct Fixture {
        store: Arc<InMemoryFederationStore>,
        transport: Arc<MockPodTransport>,
        dispatcher: Arc<BatchDispatcher>,
    }

    async fn fixture(pods: &[&str]) -> Fixture {
        let store = Arc::new(InMemoryFederationStore::new());
        for id in pods {
            PodStore::upsert(store.as_ref(), Pod::new(*id, format!("https://{id}.example"), "key"))
                .await
                .unwrap();
        }
        let transport = Arc::new(MockPodTransport::new());
        let registry = PeerRegistry::new(store.clone());
        let queue = Arc::new(ChangeQueue::new(store.clone(), ConflictPolicy::Replace));
        let reputation = Arc::new(ReputationManager::new(
            registry.clone(),
            store.clone(),
            ScoreConfig::default(),
            EvictionRule::ExactThreshold,
        ));
        let dispatcher = Arc::new(BatchDispatcher::new(
            queue,
            registry,
            reputation,
            transport.clone(),
            "v1",
        ));
        Fixture {
            store,
            transport,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_empty_queue_sends_nothing() {
        let f = fixture(&["a"]).await;
        let report = f.dispatcher.run_round().await.unwrap();
        assert!(report.is_empty());
        assert!(f.transport.deliveries().await.is_empty());
    }

    #[tokio::test]
    async fn test_partitions_become_one_batch_per_pod() {
        let f = fixture(&["a", "b"]).await;
        let queue = f.dispatcher.queue();
        queue.enqueue("v1", RequestKind::Add, &b"one"[..]).await.unwrap();
        queue.enqueue("v2", RequestKind::Add, &b"two"[..]).await.unwrap();
        queue.enqueue("v3", RequestKind::Remove, &b"three"[..]).await.unwrap();

        let report = f.dispatcher.run_round().await.unwrap();
        assert_eq!(report.requests_sent(), 3);

        let to_a = f.transport.deliveries_to(&PodId::new("a")).await;
        assert_eq!(to_a.len(), 2);
        let add = to_a.iter().find(|d| d.batch.kind == RequestKind::Add).unwrap();
        assert_eq!(add.batch.path, "/api/v1/remotevideos/add");
        assert_eq!(add.batch.requests.len(), 2);
        let remove = to_a.iter().find(|d| d.batch.kind == RequestKind::Remove).unwrap();
        assert_eq!(remove.batch.path, "/api/v1/remotevideos/remove");

        assert_eq!(f.store.request_rows(), 0);
    }

    #[tokio::test]
    async fn test_only_remove_partition_is_sent() {
        let f = fixture(&["a"]).await;
        f.dispatcher
            .queue()
            .enqueue("v1", RequestKind::Remove, &b"r"[..])
            .await
            .unwrap();

        let report = f.dispatcher.run_round().await.unwrap();
        assert!(report.partition(RequestKind::Add).is_none());
        assert_eq!(report.partition(RequestKind::Remove).unwrap().request_count, 1);
        assert_eq!(f.transport.deliveries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_non_success_status_is_bad() {
        let f = fixture(&["a", "b"]).await;
        f.transport.respond(PodId::new("b"), MockResponse::Status(500));
        f.dispatcher
            .queue()
            .enqueue("v1", RequestKind::Add, &b"x"[..])
            .await
            .unwrap();

        let report = f.dispatcher.run_round().await.unwrap();
        let partition = report.partition(RequestKind::Add).unwrap();
        assert_eq!(partition.good, vec![PodId::new("a")]);
        assert_eq!(partition.bad, vec![PodId::new("b")]);
    }

    #[tokio::test]
    async fn test_next_round_purges_rows_left_claimed() {
        let f = fixture(&["a"]).await;
        f.dispatcher
            .queue()
            .enqueue("v1", RequestKind::Add, &b"x"[..])
            .await
            .unwrap();

        f.store.fail(StoreOperation::RemoveRequests);
        let report = f.dispatcher.run_round().await.unwrap();
        assert_eq!(report.partition(RequestKind::Add).unwrap().removed, 0);
        assert_eq!(f.store.claimed_rows(), 1);

        f.store.heal(StoreOperation::RemoveRequests);
        assert!(f.dispatcher.run_round().await.unwrap().is_empty());
        assert_eq!(f.store.request_rows(), 0);
        assert_eq!(f.transport.deliveries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sends_are_concurrent() {
        let f = fixture(&["a", "b", "c"]).await;
        for id in ["a", "b", "c"] {
            f.transport.delay(PodId::new(id), Duration::from_millis(50));
        }
        f.dispatcher
            .queue()
            .enqueue("v1", RequestKind::Add, &b"x"[..])
            .await
            .unwrap();

        f.dispatcher.run_round().await.unwrap();
        assert_eq!(f.transport.max_in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_counts_as_bad() {
        let f = fixture(&["slow", "fast"]).await;
        f.transport.delay(PodId::new("slow"), Duration::from_secs(30));
        let dispatcher = Arc::try_unwrap(f.dispatcher)
            .ok()
            .unwrap()
            .with_send_timeout(Some(Duration::from_secs(1)));
        dispatcher
            .queue()
            .enqueue("v1", RequestKind::Add, &b"x"[..])
            .await
            .unwrap();

        let report = dispatcher.run_round().await.unwrap();
        let partition = report.partition(RequestKind::Add).unwrap();
        assert_eq!(partition.good, vec![PodId::new("fast")]);
        assert_eq!(partition.bad, vec![PodId::new("slow")]);
    }

    #[tokio::test]
    async fn test_try_run_round_skips_when_busy() {
        let f = fixture(&["a"]).await;
        f.transport.delay(PodId::new("a"), Duration::from_millis(100));
        f.dispatcher
            .queue()
            .enqueue("v1", RequestKind::Add, &b"x"[..])
            .await
            .unwrap();

        let running = {
            let dispatcher = f.dispatcher.clone();
            tokio::spawn(async move { dispatcher.run_round().await })
        };
        while !f.dispatcher.is_busy() {
            tokio::task::yield_now().await;
        }

        assert!(f.dispatcher.try_run_round().await.unwrap().is_none());
        assert_eq!(running.await.unwrap().unwrap().requests_sent(), 1);
        assert!(!f.dispatcher.is_busy());
    }
}
