//! Pod reputation
//!
//! After each broadcast, pods that accepted the batch are rewarded and pods
//! that failed it are penalized. Pods whose score reaches the elimination
//! threshold are evicted: first the content they own, then the pod records.
//! Pod records are only deleted once their content is gone, so no content
//! record ever references a pod that no longer exists.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use podnet_core::{ContentStore, PodId};

use crate::config::{EvictionRule, ScoreConfig};
use crate::registry::PeerRegistry;

/// Result of applying one round's outcome to pod scores
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReputationReport {
    /// Pods whose score was raised
    pub rewarded: usize,
    /// Pods whose score was lowered
    pub penalized: usize,
    /// Pods removed from the registry
    pub evicted: Vec<PodId>,
    /// Content records deleted along with the evicted pods
    pub removed_content: usize,
}

/// Score bookkeeping and eviction of unreliable pods
pub struct ReputationManager {
    registry: PeerRegistry,
    content: Arc<dyn ContentStore>,
    score: ScoreConfig,
    rule: EvictionRule,
    /// One outcome at a time: the eviction scan must see the scores its own
    /// update produced
    scoring: Mutex<()>,
}

impl ReputationManager {
    /// Create a reputation manager
    pub fn new(
        registry: PeerRegistry,
        content: Arc<dyn ContentStore>,
        score: ScoreConfig,
        rule: EvictionRule,
    ) -> Self {
        Self {
            registry,
            content,
            score,
            rule,
            scoring: Mutex::new(()),
        }
    }

    /// Score configuration in effect
    pub fn score_config(&self) -> ScoreConfig {
        self.score
    }

    /// Reward `good`, penalize `bad`, then evict pods at the threshold
    ///
    /// Never fails: storage errors are logged and the remaining steps still
    /// run, except that pods are kept when their content could not be
    /// deleted. Concurrent calls are applied one after the other.
    pub async fn apply_round_outcome(&self, good: &[PodId], bad: &[PodId]) -> ReputationReport {
        let _scoring = self.scoring.lock().await;
        let mut report = ReputationReport::default();
        info!(good = good.len(), bad = bad.len(), "Updating pods score");

        match self.registry.adjust_scores(good, self.score.bonus).await {
            Ok(updated) => report.rewarded = updated,
            Err(e) => error!(error = %e, "Cannot increment scores of good pods"),
        }

        match self.registry.adjust_scores(bad, self.score.malus).await {
            Ok(updated) => report.penalized = updated,
            Err(e) => error!(error = %e, "Cannot decrement scores of bad pods"),
        }

        self.evict_bad_pods(&mut report).await;
        report
    }

    /// Delete pods at the elimination threshold together with their content
    async fn evict_bad_pods(&self, report: &mut ReputationReport) {
        let pods = match self.registry.pods().await {
            Ok(pods) => pods,
            Err(e) => {
                error!(error = %e, "Cannot find bad pods");
                return;
            }
        };

        let threshold = self.score.elimination_threshold;
        let (urls, ids): (Vec<String>, Vec<PodId>) = pods
            .into_iter()
            .filter(|pod| self.rule.should_evict(pod.score, threshold))
            .map(|pod| (pod.url, pod.id))
            .unzip();

        if ids.is_empty() {
            return;
        }

        match self.content.remove_by_owner_urls(&urls).await {
            Ok(removed) => {
                info!(count = removed, "Removed content of bad pods");
                report.removed_content = removed;
            }
            Err(e) => {
                warn!(error = %e, pods = ids.len(), "Cannot remove content of bad pods, keeping pods");
                return;
            }
        }

        match self.registry.remove(&ids).await {
            Ok(removed) => {
                info!(count = removed, "Removed bad pods");
                report.evicted = ids;
            }
            Err(e) => error!(error = %e, "Cannot remove bad pods"),
        }
    }
}
