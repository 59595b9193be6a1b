//! Change queue
//!
//! Durable queue of pending add/remove changes with per-item
//! deduplication. At most one request is pending per item at any time:
//!
//! | pending | new    | result                                     |
//! |---------|--------|--------------------------------------------|
//! | none    | any    | inserted                                   |
//! | add     | add    | [`FederationError::DuplicateRequest`]      |
//! | add     | remove | depends on [`ConflictPolicy`]              |
//!
//! Draining claims every pending request at once; claimed requests are
//! invisible to deduplication, so a change enqueued mid-round for the same
//! item is queued for the next round instead of colliding with the batch
//! in flight.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use podnet_core::{ItemId, PoolRequest, PoolRequestStore, RequestId, RequestKind};

use crate::config::ConflictPolicy;
use crate::error::{FederationError, FederationResult};

/// What an enqueue did to the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Nothing was pending; the request was queued
    Inserted(RequestId),
    /// A request of the opposite kind was pending and got replaced
    Replaced {
        /// Kind of the dropped request
        previous: RequestKind,
        /// Identity of the newly queued request
        request_id: RequestId,
    },
    /// A request of the opposite kind was pending; both were dropped
    Cancelled {
        /// Kind of the dropped request
        previous: RequestKind,
    },
}

impl EnqueueOutcome {
    /// Identity of the queued request, if one was queued
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            EnqueueOutcome::Inserted(id) => Some(*id),
            EnqueueOutcome::Replaced { request_id, .. } => Some(*request_id),
            EnqueueOutcome::Cancelled { .. } => None,
        }
    }
}

/// Requests claimed for one round, partitioned by kind
#[derive(Debug, Clone, Default)]
pub struct DrainedRequests {
    /// Add requests in queue order
    pub adds: Vec<PoolRequest>,
    /// Remove requests in queue order
    pub removes: Vec<PoolRequest>,
}

impl DrainedRequests {
    fn from_claimed(claimed: Vec<PoolRequest>) -> Self {
        let (adds, removes) = claimed
            .into_iter()
            .partition(|request| request.kind == RequestKind::Add);
        Self { adds, removes }
    }

    /// Requests of one kind
    pub fn partition(&self, kind: RequestKind) -> &[PoolRequest] {
        match kind {
            RequestKind::Add => &self.adds,
            RequestKind::Remove => &self.removes,
        }
    }

    /// Total number of claimed requests
    pub fn len(&self) -> usize {
        self.adds.len() + self.removes.len()
    }

    /// Whether nothing was claimed
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }
}

/// Queue of pending pool requests
pub struct ChangeQueue {
    store: Arc<dyn PoolRequestStore>,
    policy: ConflictPolicy,
    /// Serializes lookup-then-write so two enqueues for one item cannot both
    /// observe an empty slot
    write_lock: Mutex<()>,
}

impl ChangeQueue {
    /// Create a queue over a request store
    pub fn new(store: Arc<dyn PoolRequestStore>, policy: ConflictPolicy) -> Self {
        Self {
            store,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    /// Conflict policy in effect
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Queue a change for an item
    ///
    /// # Errors
    ///
    /// Returns [`FederationError::DuplicateRequest`] if the same kind is
    /// already pending for the item; the queue is left unchanged.
    pub async fn enqueue(
        &self,
        item_id: impl Into<ItemId>,
        kind: RequestKind,
        payload: impl Into<Bytes>,
    ) -> FederationResult<EnqueueOutcome> {
        let item_id = item_id.into();
        let payload = payload.into();
        let _guard = self.write_lock.lock().await;

        let pending = self.store.find_pending(&item_id).await?;

        match pending {
            Some(existing) if existing.kind == kind => {
                error!(item = %item_id, %kind, "Cannot insert two same requests");
                Err(FederationError::DuplicateRequest { item_id, kind })
            }
            Some(existing) if matches!(self.policy, ConflictPolicy::Cancel) => {
                self.store.delete_pending(&item_id).await?;
                debug!(item = %item_id, previous = %existing.kind, %kind, "Opposite requests cancelled each other");
                Ok(EnqueueOutcome::Cancelled {
                    previous: existing.kind,
                })
            }
            Some(existing) => {
                let request_id = self.store.next_request_id().await?;
                self.store
                    .replace_pending(PoolRequest::new(request_id, item_id.clone(), kind, payload))
                    .await?;
                debug!(item = %item_id, previous = %existing.kind, %kind, request = %request_id, "Replaced pending request");
                Ok(EnqueueOutcome::Replaced {
                    previous: existing.kind,
                    request_id,
                })
            }
            None => {
                let request_id = self.store.next_request_id().await?;
                self.store
                    .insert(PoolRequest::new(request_id, item_id.clone(), kind, payload))
                    .await?;
                debug!(item = %item_id, %kind, request = %request_id, "Adding request to the pool");
                Ok(EnqueueOutcome::Inserted(request_id))
            }
        }
    }

    /// Claim every pending request for a round
    ///
    /// # Errors
    ///
    /// A stored request with an unknown kind surfaces as
    /// [`FederationError::InvariantViolation`]; nothing is claimed then.
    pub async fn drain_all(&self) -> FederationResult<DrainedRequests> {
        let _guard = self.write_lock.lock().await;
        let claimed = self.store.claim_all().await?;
        let drained = DrainedRequests::from_claimed(claimed);
        if !drained.is_empty() {
            info!(
                adds = drained.adds.len(),
                removes = drained.removes.len(),
                "Claimed pool requests"
            );
        }
        Ok(drained)
    }

    /// Delete requests sent in a round
    ///
    /// Failures are logged, not returned: the rows stay claimed and are
    /// never re-sent. Returns the number of rows deleted.
    pub async fn remove(&self, ids: &[RequestId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        match self.store.remove(ids).await {
            Ok(removed) => {
                debug!(count = removed, "Removed sent pool requests");
                removed
            }
            Err(e) => {
                error!(error = %e, count = ids.len(), "Cannot remove sent pool requests");
                0
            }
        }
    }

    /// Delete rows left claimed by an earlier round
    ///
    /// Only safe while no round is in flight; the dispatcher calls it under
    /// its round lock. Failures are logged. Returns the number of rows deleted.
    pub async fn purge_claimed(&self) -> usize {
        match self.store.purge_claimed().await {
            Ok(0) => 0,
            Ok(purged) => {
                warn!(count = purged, "Purged pool requests left claimed by an earlier round");
                purged
            }
            Err(e) => {
                error!(error = %e, "Cannot purge claimed pool requests");
                0
            }
        }
    }

    /// Number of requests waiting for the next round
    pub async fn pending_count(&self) -> FederationResult<usize> {
        Ok(self.store.pending_count().await?)
    }

    /// The request pending for an item, if any
    pub async fn pending(&self, item_id: &ItemId) -> FederationResult<Option<PoolRequest>> {
        Ok(self.store.find_pending(item_id).await?)
    }
}
