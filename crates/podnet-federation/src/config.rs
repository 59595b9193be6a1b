//! Configuration for the federation core

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FederationError, FederationResult};

/// Default duration between automatic rounds
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default API version used in remote paths
pub const DEFAULT_API_VERSION: &str = "v1";

/// Score deltas and the eviction threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreConfig {
    /// Added to a pod's score after it accepted a batch (positive)
    pub bonus: i64,
    /// Added to a pod's score after it failed a batch (negative)
    pub malus: i64,
    /// Score at which a pod is evicted
    pub elimination_threshold: i64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            bonus: 10,
            malus: -10,
            elimination_threshold: 0,
        }
    }
}

impl ScoreConfig {
    /// Reject deltas pointing the wrong way
    pub fn validate(&self) -> FederationResult<()> {
        if self.bonus <= 0 {
            return Err(FederationError::InvalidConfig(format!(
                "score bonus must be positive, got {}",
                self.bonus
            )));
        }
        if self.malus >= 0 {
            return Err(FederationError::InvalidConfig(format!(
                "score malus must be negative, got {}",
                self.malus
            )));
        }
        Ok(())
    }
}

/// What enqueueing a request does when the opposite kind is pending for the same item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConflictPolicy {
    /// Drop the pending request and queue the new one in its place
    #[default]
    Replace,
    /// Drop the pending request and discard the new one too
    Cancel,
}

/// Which scores make a pod eligible for eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EvictionRule {
    /// Only a score exactly equal to the threshold
    #[default]
    ExactThreshold,
    /// Any score at or below the threshold
    AtOrBelowThreshold,
}

impl EvictionRule {
    /// Whether a pod with `score` should be evicted
    pub fn should_evict(&self, score: i64, threshold: i64) -> bool {
        match self {
            EvictionRule::ExactThreshold => score == threshold,
            EvictionRule::AtOrBelowThreshold => score <= threshold,
        }
    }
}

/// Configuration for the federation scheduler and its components
#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// Duration between automatic rounds
    pub interval: Duration,
    /// API version inserted into remote paths
    pub api_version: String,
    /// Reputation deltas and threshold
    pub score: ScoreConfig,
    /// Enqueue behavior on opposite-kind conflicts
    pub conflict_policy: ConflictPolicy,
    /// Eviction condition
    pub eviction_rule: EvictionRule,
    /// Upper bound on a single pod send; `None` leaves it to the transport
    pub send_timeout: Option<Duration>,
    /// Event broadcast channel capacity
    pub event_channel_capacity: usize,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            api_version: DEFAULT_API_VERSION.to_string(),
            score: ScoreConfig::default(),
            conflict_policy: ConflictPolicy::default(),
            eviction_rule: EvictionRule::default(),
            send_timeout: None,
            event_channel_capacity: 64,
        }
    }
}

impl FederationConfig {
    /// Set the round interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the API version
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Set the score configuration
    pub fn with_score(mut self, score: ScoreConfig) -> Self {
        self.score = score;
        self
    }

    /// Set the conflict policy
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Set the eviction rule
    pub fn with_eviction_rule(mut self, rule: EvictionRule) -> Self {
        self.eviction_rule = rule;
        self
    }

    /// Bound every pod send
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set the event channel capacity
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Check the configuration before wiring components
    pub fn validate(&self) -> FederationResult<()> {
        self.score.validate()?;
        if self.interval.is_zero() {
            return Err(FederationError::InvalidConfig(
                "round interval must be non-zero".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(FederationError::InvalidConfig(
                "event channel capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FederationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api_version, "v1");
        assert_eq!(config.eviction_rule, EvictionRule::ExactThreshold);
        assert_eq!(config.conflict_policy, ConflictPolicy::Replace);
    }

    #[test]
    fn test_score_signs_are_checked() {
        let bad_bonus = ScoreConfig {
            bonus: 0,
            ..Default::default()
        };
        assert!(matches!(bad_bonus.validate(), Err(FederationError::InvalidConfig(_))));

        let bad_malus = ScoreConfig {
            malus: 5,
            ..Default::default()
        };
        assert!(bad_malus.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = FederationConfig::default().with_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_eviction_rules() {
        assert!(EvictionRule::ExactThreshold.should_evict(0, 0));
        assert!(!EvictionRule::ExactThreshold.should_evict(-2, 0));
        assert!(EvictionRule::AtOrBelowThreshold.should_evict(-2, 0));
        assert!(!EvictionRule::AtOrBelowThreshold.should_evict(1, 0));
    }
}
