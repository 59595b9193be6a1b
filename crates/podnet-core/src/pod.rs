//! Pod records
//!
//! A pod is a remote peer in the federation. Its score is the reputation
//! the local node keeps for it, raised and lowered by broadcast outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::PodId;

/// Score a newly discovered pod starts with
pub const DEFAULT_POD_SCORE: i64 = 100;

/// A known remote pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    /// Pod identifier
    pub id: PodId,
    /// Base URL the pod is reachable at
    pub url: String,
    /// Public key used to encrypt requests for this pod
    pub public_key: String,
    /// Reputation score
    pub score: i64,
    /// When the pod was first registered
    pub created_at: DateTime<Utc>,
}

impl Pod {
    /// Create a new pod with the default score
    pub fn new(id: impl Into<PodId>, url: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            public_key: public_key.into(),
            score: DEFAULT_POD_SCORE,
            created_at: Utc::now(),
        }
    }

    /// Set the score
    pub fn with_score(mut self, score: i64) -> Self {
        self.score = score;
        self
    }

    /// The fields a transport needs to reach this pod
    pub fn endpoint(&self) -> PodEndpoint {
        PodEndpoint {
            id: self.id.clone(),
            url: self.url.clone(),
            public_key: self.public_key.clone(),
        }
    }
}

/// Projection of a pod used for delivery
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodEndpoint {
    pub id: PodId,
    pub url: String,
    pub public_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pod_has_default_score() {
        let pod = Pod::new("pod-a", "https://a.example", "key-a");
        assert_eq!(pod.score, DEFAULT_POD_SCORE);
        assert_eq!(pod.with_score(3).score, 3);
    }

    #[test]
    fn test_endpoint_projection() {
        let pod = Pod::new("pod-b", "https://b.example", "key-b");
        let endpoint = pod.endpoint();
        assert_eq!(endpoint.id, pod.id);
        assert_eq!(endpoint.url, "https://b.example");
        assert_eq!(endpoint.public_key, "key-b");
    }
}
