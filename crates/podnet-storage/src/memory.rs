//! In-memory storage implementation
//!
//! This module provides an in-memory implementation of all three store
//! contracts, suitable for testing and simulation environments.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use podnet_core::{
    ContentRecord, ContentStore, ItemId, Pod, PodId, PodStore, PoolRequest, PoolRequestStore,
    RequestId, StorageError,
};

/// Store operations that can be failed on purpose or observed in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    FindPending,
    InsertRequest,
    DeletePending,
    ReplacePending,
    ClaimRequests,
    RemoveRequests,
    PurgeClaimed,
    ListPods,
    IncrementScores,
    RemovePods,
    RemoveContent,
}

#[derive(Debug, Clone)]
struct RequestRow {
    request: PoolRequest,
    claimed: bool,
}

/// In-memory implementation of the federation stores
///
/// Uses `DashMap` for concurrent access. Mutating operations are appended
/// to an operation log so tests can assert on ordering, and any operation
/// can be made to fail with [`fail`](Self::fail).
#[derive(Debug, Default)]
pub struct InMemoryFederationStore {
    /// Pool requests by row identity
    requests: DashMap<RequestId, RequestRow>,
    /// Last allocated request identity
    last_request_id: AtomicU64,
    /// Known pods
    pods: DashMap<PodId, Pod>,
    /// Content records by record ID
    content: DashMap<String, ContentRecord>,
    /// Operations that currently fail
    failing: DashSet<StoreOperation>,
    /// Successful mutating operations, in order
    log: RwLock<Vec<StoreOperation>>,
}

impl InMemoryFederationStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an operation fail until [`heal`](Self::heal) is called
    pub fn fail(&self, op: StoreOperation) {
        self.failing.insert(op);
    }

    /// Stop failing an operation
    pub fn heal(&self, op: StoreOperation) {
        self.failing.remove(&op);
    }

    /// Successful mutating operations, in order
    pub async fn operations(&self) -> Vec<StoreOperation> {
        self.log.read().await.clone()
    }

    /// Number of request rows, pending or claimed
    pub fn request_rows(&self) -> usize {
        self.requests.len()
    }

    /// Number of claimed request rows not yet removed
    pub fn claimed_rows(&self) -> usize {
        self.requests.iter().filter(|r| r.claimed).count()
    }

    fn check(&self, op: StoreOperation) -> Result<(), StorageError> {
        if self.failing.contains(&op) {
            return Err(StorageError::database(format!("injected failure: {:?}", op)));
        }
        Ok(())
    }

    async fn record(&self, op: StoreOperation) {
        self.log.write().await.push(op);
    }
}

#[async_trait]
impl PoolRequestStore for InMemoryFederationStore {
    async fn next_request_id(&self) -> Result<RequestId, StorageError> {
        Ok(RequestId::new(
            self.last_request_id.fetch_add(1, Ordering::SeqCst) + 1,
        ))
    }

    async fn find_pending(&self, item_id: &ItemId) -> Result<Option<PoolRequest>, StorageError> {
        self.check(StoreOperation::FindPending)?;
        Ok(self
            .requests
            .iter()
            .find(|row| !row.claimed && &row.request.item_id == item_id)
            .map(|row| row.request.clone()))
    }

    async fn insert(&self, request: PoolRequest) -> Result<(), StorageError> {
        self.check(StoreOperation::InsertRequest)?;
        trace!(item = %request.item_id, request = %request.request_id, "Inserting pool request");
        self.requests.insert(
            request.request_id,
            RequestRow {
                request,
                claimed: false,
            },
        );
        self.record(StoreOperation::InsertRequest).await;
        Ok(())
    }

    async fn delete_pending(&self, item_id: &ItemId) -> Result<Option<PoolRequest>, StorageError> {
        self.check(StoreOperation::DeletePending)?;
        let key = self
            .requests
            .iter()
            .find(|row| !row.claimed && &row.request.item_id == item_id)
            .map(|row| *row.key());

        let removed = key
            .and_then(|key| self.requests.remove_if(&key, |_, row| !row.claimed))
            .map(|(_, row)| row.request);

        if removed.is_some() {
            self.record(StoreOperation::DeletePending).await;
        }
        Ok(removed)
    }

    async fn replace_pending(&self, request: PoolRequest) -> Result<Option<PoolRequest>, StorageError> {
        self.check(StoreOperation::ReplacePending)?;
        let key = self
            .requests
            .iter()
            .find(|row| !row.claimed && row.request.item_id == request.item_id)
            .map(|row| *row.key());

        // A row claimed since the lookup is left to its round
        let replaced = key
            .and_then(|key| self.requests.remove_if(&key, |_, row| !row.claimed))
            .map(|(_, row)| row.request);
        self.requests.insert(
            request.request_id,
            RequestRow {
                request,
                claimed: false,
            },
        );

        self.record(StoreOperation::ReplacePending).await;
        Ok(replaced)
    }

    async fn claim_all(&self) -> Result<Vec<PoolRequest>, StorageError> {
        self.check(StoreOperation::ClaimRequests)?;

        // iter_mut holds each shard's write lock, so the check-and-set is atomic per row
        let mut claimed: Vec<PoolRequest> = self
            .requests
            .iter_mut()
            .filter_map(|mut row| {
                if row.claimed {
                    return None;
                }
                row.claimed = true;
                Some(row.request.clone())
            })
            .collect();
        claimed.sort_by_key(|r| r.request_id);

        debug!(count = claimed.len(), "Claimed pending pool requests");
        self.record(StoreOperation::ClaimRequests).await;
        Ok(claimed)
    }

    async fn remove(&self, ids: &[RequestId]) -> Result<usize, StorageError> {
        self.check(StoreOperation::RemoveRequests)?;
        let removed = ids
            .iter()
            .filter(|id| self.requests.remove(id).is_some())
            .count();
        self.record(StoreOperation::RemoveRequests).await;
        Ok(removed)
    }

    async fn purge_claimed(&self) -> Result<usize, StorageError> {
        self.check(StoreOperation::PurgeClaimed)?;
        let before = self.requests.len();
        self.requests.retain(|_, row| !row.claimed);
        let purged = before.saturating_sub(self.requests.len());
        if purged > 0 {
            self.record(StoreOperation::PurgeClaimed).await;
        }
        Ok(purged)
    }

    async fn pending_count(&self) -> Result<usize, StorageError> {
        Ok(self.requests.iter().filter(|r| !r.claimed).count())
    }
}

#[async_trait]
impl PodStore for InMemoryFederationStore {
    async fn upsert(&self, pod: Pod) -> Result<(), StorageError> {
        self.pods.insert(pod.id.clone(), pod);
        Ok(())
    }

    async fn get(&self, id: &PodId) -> Result<Option<Pod>, StorageError> {
        Ok(self.pods.get(id).map(|p| p.value().clone()))
    }

    async fn all(&self) -> Result<Vec<Pod>, StorageError> {
        self.check(StoreOperation::ListPods)?;
        let mut pods: Vec<Pod> = self.pods.iter().map(|p| p.value().clone()).collect();
        pods.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(pods)
    }

    async fn increment_scores(&self, ids: &[PodId], delta: i64) -> Result<usize, StorageError> {
        self.check(StoreOperation::IncrementScores)?;
        let mut updated = 0;
        for id in ids {
            if let Some(mut pod) = self.pods.get_mut(id) {
                pod.score = pod.score.saturating_add(delta);
                updated += 1;
            }
        }
        self.record(StoreOperation::IncrementScores).await;
        Ok(updated)
    }

    async fn remove(&self, ids: &[PodId]) -> Result<usize, StorageError> {
        self.check(StoreOperation::RemovePods)?;
        let removed = ids.iter().filter(|id| self.pods.remove(id).is_some()).count();
        self.record(StoreOperation::RemovePods).await;
        Ok(removed)
    }
}

#[async_trait]
impl ContentStore for InMemoryFederationStore {
    async fn insert(&self, record: ContentRecord) -> Result<(), StorageError> {
        self.content.insert(record.id.clone(), record);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ContentRecord>, StorageError> {
        Ok(self.content.iter().map(|r| r.value().clone()).collect())
    }

    async fn count_by_owner(&self, url: &str) -> Result<usize, StorageError> {
        Ok(self
            .content
            .iter()
            .filter(|r| r.owner_pod_url == url)
            .count())
    }

    async fn remove_by_owner_urls(&self, urls: &[String]) -> Result<usize, StorageError> {
        self.check(StoreOperation::RemoveContent)?;
        let before = self.content.len();
        self.content
            .retain(|_, record| !urls.iter().any(|u| u == &record.owner_pod_url));
        let removed = before.saturating_sub(self.content.len());
        self.record(StoreOperation::RemoveContent).await;
        Ok(removed)
    }
}
