//! Storage contracts consumed by the federation core
//!
//! The federation core never talks to a database directly. It needs three
//! narrow stores: pending pool requests, known pods, and content records.
//! Implementations live in `podnet-storage` (in-memory and redb-backed).
//!
//! All operations distinguish "no rows" (`None`, empty vectors, zero counts)
//! from failures (`Err(StorageError)`).

use async_trait::async_trait;

use crate::content::ContentRecord;
use crate::error::StorageError;
use crate::identity::{ItemId, PodId, RequestId};
use crate::pod::Pod;
use crate::request::PoolRequest;

/// Store of queued pool requests
///
/// A request is *pending* from insertion until a [`claim_all`] hides it;
/// it is then *claimed* until [`remove`] deletes it. Only pending requests
/// are visible to [`find_pending`], [`delete_pending`] and later claims.
///
/// [`claim_all`]: PoolRequestStore::claim_all
/// [`remove`]: PoolRequestStore::remove
/// [`find_pending`]: PoolRequestStore::find_pending
/// [`delete_pending`]: PoolRequestStore::delete_pending
#[async_trait]
pub trait PoolRequestStore: Send + Sync {
    /// Allocate the next request identity
    ///
    /// Identities are strictly increasing so they double as insertion order.
    async fn next_request_id(&self) -> Result<RequestId, StorageError>;

    /// Look up the pending request for an item, if any
    async fn find_pending(&self, item_id: &ItemId) -> Result<Option<PoolRequest>, StorageError>;

    /// Insert a new pending request
    ///
    /// Callers are responsible for the at-most-one-pending-per-item invariant.
    async fn insert(&self, request: PoolRequest) -> Result<(), StorageError>;

    /// Delete the pending request for an item
    ///
    /// Returns the deleted request, or `None` if nothing was pending.
    async fn delete_pending(&self, item_id: &ItemId) -> Result<Option<PoolRequest>, StorageError>;

    /// Swap the pending request for `request.item_id` with `request`
    ///
    /// Delete and insert happen together: on error the previous request is
    /// still pending. Returns the replaced request, if one was pending.
    async fn replace_pending(&self, request: PoolRequest) -> Result<Option<PoolRequest>, StorageError>;

    /// Claim every pending request
    ///
    /// Returns the claimed requests ordered by request identity. The claim is
    /// atomic: two concurrent calls never return the same request.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if a stored row cannot be decoded
    /// into a known request kind.
    async fn claim_all(&self) -> Result<Vec<PoolRequest>, StorageError>;

    /// Delete claimed (or pending) requests by identity
    ///
    /// Returns the number of rows deleted. Unknown identities are ignored.
    async fn remove(&self, ids: &[RequestId]) -> Result<usize, StorageError>;

    /// Delete every claimed request
    ///
    /// Claimed rows are only left behind by a failed [`remove`] or a crash
    /// mid-round; they were already sent and are never sent again. Returns
    /// the number of rows deleted.
    ///
    /// [`remove`]: PoolRequestStore::remove
    async fn purge_claimed(&self) -> Result<usize, StorageError>;

    /// Number of pending (unclaimed) requests
    async fn pending_count(&self) -> Result<usize, StorageError>;
}

/// Store of known pods
#[async_trait]
pub trait PodStore: Send + Sync {
    /// Register or replace a pod
    async fn upsert(&self, pod: Pod) -> Result<(), StorageError>;

    /// Get a pod by ID
    async fn get(&self, id: &PodId) -> Result<Option<Pod>, StorageError>;

    /// Get every known pod
    async fn all(&self) -> Result<Vec<Pod>, StorageError>;

    /// Add `delta` to the score of every pod in `ids`
    ///
    /// Returns the number of pods updated. IDs with no pod are ignored.
    async fn increment_scores(&self, ids: &[PodId], delta: i64) -> Result<usize, StorageError>;

    /// Delete pods by ID
    ///
    /// Returns the number of pods deleted.
    async fn remove(&self, ids: &[PodId]) -> Result<usize, StorageError>;
}

/// Store of content records owned by remote pods
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert or replace a content record
    async fn insert(&self, record: ContentRecord) -> Result<(), StorageError>;

    /// Get every content record
    async fn all(&self) -> Result<Vec<ContentRecord>, StorageError>;

    /// Count records owned by the pod at `url`
    async fn count_by_owner(&self, url: &str) -> Result<usize, StorageError>;

    /// Delete every record owned by any of the given pod URLs
    ///
    /// Returns the number of records deleted.
    async fn remove_by_owner_urls(&self, urls: &[String]) -> Result<usize, StorageError>;
}
