//! Peer registry
//!
//! Thin access layer over the [`PodStore`]: listing the pods a round is
//! broadcast to, bulk score updates and removal.

use std::sync::Arc;

use tracing::debug;

use podnet_core::{Pod, PodEndpoint, PodId, PodStore};

use crate::error::FederationResult;

/// Registry of known remote pods
#[derive(Clone)]
pub struct PeerRegistry {
    store: Arc<dyn PodStore>,
}

impl PeerRegistry {
    /// Create a registry over a pod store
    pub fn new(store: Arc<dyn PodStore>) -> Self {
        Self { store }
    }

    /// Register a pod, replacing any previous record with the same ID
    pub async fn register(&self, pod: Pod) -> FederationResult<()> {
        debug!(pod = %pod.id.short_id(), url = %pod.url, score = pod.score, "Registering pod");
        self.store.upsert(pod).await?;
        Ok(())
    }

    /// Get a pod by ID
    pub async fn get(&self, id: &PodId) -> FederationResult<Option<Pod>> {
        Ok(self.store.get(id).await?)
    }

    /// Every known pod with its current score
    pub async fn pods(&self) -> FederationResult<Vec<Pod>> {
        Ok(self.store.all().await?)
    }

    /// Addressing information of every known pod
    pub async fn endpoints(&self) -> FederationResult<Vec<PodEndpoint>> {
        Ok(self.pods().await?.iter().map(Pod::endpoint).collect())
    }

    /// Number of known pods
    pub async fn count(&self) -> FederationResult<usize> {
        Ok(self.store.all().await?.len())
    }

    /// Add `delta` to the score of each pod in `ids`
    ///
    /// Returns how many pods were updated.
    pub async fn adjust_scores(&self, ids: &[PodId], delta: i64) -> FederationResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(self.store.increment_scores(ids, delta).await?)
    }

    /// Delete pods by ID
    pub async fn remove(&self, ids: &[PodId]) -> FederationResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(self.store.remove(ids).await?)
    }
}
